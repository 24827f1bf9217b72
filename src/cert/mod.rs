// src/cert/mod.rs
pub mod ca;
pub mod csr;
pub mod freshness;
pub mod identity;
mod openssl;
pub mod types;
pub mod verification;

pub use ca::{generate_authority, generate_leaf};
pub use csr::{issue_via_cluster, CsrClient};
pub use freshness::{check_cluster, check_local, Freshness, MintReason};
pub use identity::{resolve_identities, DomainTemplates, Identity};
pub use types::{
    Authority, CertificateBundle, IssuanceRequest, Issuer, KeyAlgorithm, KeyUsage,
};
pub use verification::{parse_certificate, verify_bundle, CertificateInfo};
