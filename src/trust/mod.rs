//! Trust configuration: SP settings plus the trusted IdPs.
//!
//! The builder aggregates IdP metadata, adds the pinned test IdPs and checks
//! the SP certificate. [`SharedTrust`] lets the result be swapped at runtime.

pub mod builder;
pub mod config;
pub mod pinned;
pub mod shared;
pub mod sp_metadata;
pub mod types;

pub use builder::{TrustBuildReport, TrustConfigurationBuilder};
pub use config::{Organization, RequiredAttributes, SpConfig, AUTOLOGIN_PARAM};
pub use pinned::{CIE_TEST_ALIAS, TESTENV_ALIAS};
pub use shared::SharedTrust;
pub use types::TrustConfiguration;
