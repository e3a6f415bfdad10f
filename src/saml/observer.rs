//! Audit hook for outgoing requests and consumed responses.

use async_trait::async_trait;
use tracing::info;

/// Which leg of the exchange is being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Response => f.write_str("response"),
        }
    }
}

/// Receives every emitted request and consumed response.
///
/// Called from a spawned task; failures never reach the login flow.
#[async_trait]
pub trait RequestObserver: Send + Sync {
    async fn observe(&self, client_ip: Option<String>, xml: String, direction: Direction);
}

/// Writes exchanges to the log, e.g. for SPID audit retention.
#[derive(Debug, Default)]
pub struct TracingObserver {
    /// Include the full XML in the event.
    pub include_xml: bool,
}

#[async_trait]
impl RequestObserver for TracingObserver {
    async fn observe(&self, client_ip: Option<String>, xml: String, direction: Direction) {
        if self.include_xml {
            info!(
                direction = %direction,
                client_ip = client_ip.as_deref().unwrap_or("-"),
                xml = %xml,
                "SAML exchange"
            );
        } else {
            info!(
                direction = %direction,
                client_ip = client_ip.as_deref().unwrap_or("-"),
                bytes = xml.len(),
                "SAML exchange"
            );
        }
    }
}
