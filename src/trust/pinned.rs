//! IdPs that are always trusted, regardless of remote metadata.
//!
//! `xx_testenv2` points at a local SPID test environment; `xx_servizicie_test`
//! is the CIE pre-production IdP. The built-in signing certificates are
//! placeholders; deployments replace them through
//! [`MetadataConfig::pinned_certificates`](crate::metadata::MetadataConfig).

use std::collections::BTreeMap;
use tracing::info;

use crate::metadata::IdentityProviderDescriptor;

/// Signing certificates (PEM) replacing the built-in ones, keyed by alias.
pub type PinnedCertificates = BTreeMap<String, Vec<String>>;

pub const TESTENV_ALIAS: &str = "xx_testenv2";
pub const CIE_TEST_ALIAS: &str = "xx_servizicie_test";

const CIE_TEST_ENTITY_ID: &str =
    "https://collaudo.idserver.servizicie.interno.gov.it/idp/profile/SAML2/POST/SSO";
const CIE_TEST_SSO_URL: &str =
    "https://collaudo.idserver.servizicie.interno.gov.it/idp/profile/SAML2/Redirect/SSO";
const CIE_TEST_SLO_URL: &str =
    "https://collaudo.idserver.servizicie.interno.gov.it/idp/profile/SAML2/Redirect/SLO";

const TESTENV_CERTIFICATE: &str = "\
-----BEGIN CERTIFICATE-----\n\
MIIDUTCCAjmgAwIBAgIUB1HLI0D0qlRLfiMAVgOv2N2wv/AwDQYJKoZIhvcNAQEL\n\
BQAwNzELMAkGA1UEBhMCSVQxEjAQBgNVBAoMCVNQSUQgVGVzdDEUMBIGA1UEAwwL\n\
dGVzdGVudi1pZHAwIBcNMjYxMDE3MTIyMzQ1WhgPMjA1MTA2MDgxMjIzNDVaMDcx\n\
CzAJBgNVBAYTAklUMRIwEAYDVQQKDAlTUElEIFRlc3QxFDASBgNVBAMMC3Rlc3Rl\n\
bnYtaWRwMIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAxG1mJ08QHcbM\n\
1Cx0f2l6gTddUrkuUMjJi6pchSOy5fwePleld0c1ppM9uPW6XOJNKer0bpBWKo11\n\
V8plaw9naY1t6NsSAf6loXHXV8Bm8bysvC0eNHIdlVDV6uTzb74p0T+DGrx/XoB5\n\
D5++1rGBBitrIadXa7n26LJK17/31xUTDZ7jiNbrRmoMIJ2yEpRwbGIYVCzC48Wx\n\
7Sw8FRXWnExedrKUYZQIQQ1y3sOY42ezYIVT9GUBsA0fuOSxfuf+YxZNezk8VuL5\n\
BO4nIcyboXmLyMwGQCFZIraSaqFRoiW7imQr8XXMvjCTL/izapj43mDdybgyftto\n\
8TNpAt6UewIDAQABo1MwUTAdBgNVHQ4EFgQU/gzCpmfoQE9IVMZKtD1jrkx76tsw\n\
HwYDVR0jBBgwFoAU/gzCpmfoQE9IVMZKtD1jrkx76tswDwYDVR0TAQH/BAUwAwEB\n\
/zANBgkqhkiG9w0BAQsFAAOCAQEAdAgcp+KQrxgRtD1K3Yl1p150JbFbf+oDV/q8\n\
qtgh+TAC37hGnmEymmk/d+mokaZG0NmlOJsg85BpEEBwk5DO9KgHiC9awOygCs7F\n\
3Utd53XDUgM4ZWuyZ1FjpgrZ1m5OHDYhIzw3g5aXclmtAww4nf6xMdryqSINAxfx\n\
/butakt6tVHXAlKKwQOdsLmbyqPKvUu2ljLMBKL/td3SZWMzCHn33HAbI6Dpv3oq\n\
HU0j4vkcMkubNJ9TLZx9auQCQQQrzWNo8gsBVp5wpSrxnxBOv4mWt+JgFq+1aRaV\n\
1NAhzPu+36ld/QB1mQljBEL9ePOXi44VpXN8hpzuyPzFNhi4rA==\n\
-----END CERTIFICATE-----";

const CIE_TEST_CERTIFICATE: &str = "\
-----BEGIN CERTIFICATE-----\n\
MIIDSTCCAjGgAwIBAgIUc0VssM4PmvwTZ6VypNZEPkqmNIMwDQYJKoZIhvcNAQEL\n\
BQAwMzELMAkGA1UEBhMCSVQxEjAQBgNVBAoMCVNQSUQgVGVzdDEQMA4GA1UEAwwH\n\
Y2llLWlkcDAgFw0yNjEwMTcxMjIzNDVaGA8yMDUxMDYwODEyMjM0NVowMzELMAkG\n\
A1UEBhMCSVQxEjAQBgNVBAoMCVNQSUQgVGVzdDEQMA4GA1UEAwwHY2llLWlkcDCC\n\
ASIwDQYJKoZIhvcNAQEBBQADggEPADCCAQoCggEBAMIbrWRqkNQm+iXLbfqvtK4E\n\
IhjeosEgY8tX4xHIw04hg69/3ggkpcw78GopVffOWmTn9kUK3iNkAi41TkhwSFxM\n\
chhevCg9hLSAS8mZUTN0omESjJIzmgi58nvDpEc0vDnI2CMarSxKa0AXX5zOD7vy\n\
Q/CdFtnO5wkPcsgBfr+QKfv5IZRc0Q4SNLDDSE3ARMcj2p4w7h9hcU+R7UOAlrai\n\
hd8bDftUPStz2rOp1UWE/4Pm45Iyg7IkLVEvYuX0BLr3TlbTM6kAKOuWHWg7Tow4\n\
J35MBgDxY8xFPlfy05sH0j0hkNG4fjwWB1AFEDzMYdivDbVFeh72aD1EvLmKJCMC\n\
AwEAAaNTMFEwHQYDVR0OBBYEFNPwxIOaNbxYP+BbT7FmGSD/Jb1iMB8GA1UdIwQY\n\
MBaAFNPwxIOaNbxYP+BbT7FmGSD/Jb1iMA8GA1UdEwEB/wQFMAMBAf8wDQYJKoZI\n\
hvcNAQELBQADggEBAF+I4Zgs10MqGpxItCN8EBbVFcn4WNw/M7VeSlrJsa3wJJ1r\n\
bZEKBR4xx1uuz+wL/H0tWaXrHRAEevtn1A7Cx3iYuf/QMU80ok01kV2iNUDrWhwd\n\
+g/EYoBVVvrAUTyLNHh92lJ1Qlps6c33qtpSEmYEhUys5VNZi3EIAX+IYY2SrKFi\n\
LWrBPg1HED19IjpJIHMB64Gx4XwVURYN4r/HgN5l2qsvQiy11E3SabpnE1SRnMGd\n\
rJaN43GPrjzaK0cAcOXADRoUD1UhtyZS7jL5bFDbGU62MuLiJ2j5umWei4UCb++v\n\
KEbMhOpjENRmS2g5ggB4fmXYITJAPqVqdcjYgzg=\n\
-----END CERTIFICATE-----";

/// Descriptor of the SPID test environment served at `testenv_url`.
pub fn testenv_descriptor(testenv_url: &str) -> IdentityProviderDescriptor {
    let base = testenv_url.trim_end_matches('/');
    IdentityProviderDescriptor {
        entity_id: base.to_string(),
        signing_certificates: vec![TESTENV_CERTIFICATE.to_string()],
        sso_url: format!("{}/sso", base),
        slo_url: format!("{}/slo", base),
    }
}

/// Descriptor of the CIE test IdP.
pub fn cie_test_descriptor() -> IdentityProviderDescriptor {
    IdentityProviderDescriptor {
        entity_id: CIE_TEST_ENTITY_ID.to_string(),
        signing_certificates: vec![CIE_TEST_CERTIFICATE.to_string()],
        sso_url: CIE_TEST_SSO_URL.to_string(),
        slo_url: CIE_TEST_SLO_URL.to_string(),
    }
}

/// Whether `alias` names a pinned IdP.
pub fn is_pinned_alias(alias: &str) -> bool {
    alias == TESTENV_ALIAS || alias == CIE_TEST_ALIAS
}

/// All pinned IdPs keyed by alias, with `overrides` applied.
pub fn pinned_identity_providers(
    testenv_url: &str,
    overrides: &PinnedCertificates,
) -> Vec<(&'static str, IdentityProviderDescriptor)> {
    let mut pinned = vec![
        (TESTENV_ALIAS, testenv_descriptor(testenv_url)),
        (CIE_TEST_ALIAS, cie_test_descriptor()),
    ];

    for (alias, descriptor) in &mut pinned {
        if let Some(certificates) = overrides.get(*alias).filter(|c| !c.is_empty()) {
            info!(
                alias = %alias,
                certificates = certificates.len(),
                "Pinned IdP certificates overridden"
            );
            descriptor.signing_certificates = certificates.clone();
        }
    }

    pinned
}
