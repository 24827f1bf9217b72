// src/cert/freshness.rs
//! Rules deciding whether persisted material can be kept. Pure: no I/O, the
//! clock is an argument.

use super::identity::identity_set;
use super::types::CertificateBundle;
use super::verification::{parse_certificate, verify_bundle};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Residual validity below which locally issued material is renewed (six months).
pub fn default_soon_window() -> Duration {
    Duration::hours(4380)
}

/// Residual validity below which a cluster-signed leaf is re-requested.
pub fn default_csr_reuse_window() -> Duration {
    Duration::days(15)
}

/// Why a pass had to mint new material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintReason {
    Absent,
    Corrupt,
    CaExpiring,
    LeafExpiring,
    IdentitiesChanged,
    SubjectChanged,
}

impl std::fmt::Display for MintReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MintReason::Absent => "no persisted certificate",
            MintReason::Corrupt => "persisted certificate is corrupt",
            MintReason::CaExpiring => "CA expires soon",
            MintReason::LeafExpiring => "certificate expires soon",
            MintReason::IdentitiesChanged => "identities changed",
            MintReason::SubjectChanged => "subject changed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Outdated(MintReason),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

/// Locally issued bundle: the CA and the leaf must both outlive `soon_window`
/// and the leaf's SANs must equal `resolved_identities`.
pub fn check_local(
    bundle: &CertificateBundle,
    resolved_identities: &[String],
    now: DateTime<Utc>,
    soon_window: Duration,
) -> Freshness {
    let ca = match parse_certificate("ca.crt", &bundle.ca_pem) {
        Ok(ca) => ca,
        Err(_) => return Freshness::Outdated(MintReason::Corrupt),
    };
    if ca.expires_within(now, soon_window) {
        return Freshness::Outdated(MintReason::CaExpiring);
    }

    let leaf = match parse_certificate("tls.crt", &bundle.cert_pem) {
        Ok(leaf) => leaf,
        Err(_) => return Freshness::Outdated(MintReason::Corrupt),
    };
    if leaf.expires_within(now, soon_window) {
        return Freshness::Outdated(MintReason::LeafExpiring);
    }
    if leaf.san_set() != identity_set(resolved_identities) {
        return Freshness::Outdated(MintReason::IdentitiesChanged);
    }

    if verify_bundle(bundle, true).is_err() {
        return Freshness::Outdated(MintReason::Corrupt);
    }
    Freshness::Fresh
}

/// Cluster-signed bundle: CA is not consulted. The leaf must carry the
/// requested common name, organizations and SANs and outlive `reuse_window`.
pub fn check_cluster(
    bundle: &CertificateBundle,
    common_name: &str,
    groups: &[String],
    resolved_identities: &[String],
    now: DateTime<Utc>,
    reuse_window: Duration,
) -> Freshness {
    let leaf = match parse_certificate("tls.crt", &bundle.cert_pem) {
        Ok(leaf) => leaf,
        Err(_) => return Freshness::Outdated(MintReason::Corrupt),
    };
    if verify_bundle(bundle, false).is_err() {
        return Freshness::Outdated(MintReason::Corrupt);
    }

    let organizations: BTreeSet<&str> = leaf.organizations.iter().map(String::as_str).collect();
    let wanted: BTreeSet<&str> = groups.iter().map(String::as_str).collect();
    if leaf.common_name.as_deref() != Some(common_name) || organizations != wanted {
        return Freshness::Outdated(MintReason::SubjectChanged);
    }
    if leaf.san_set() != identity_set(resolved_identities) {
        return Freshness::Outdated(MintReason::IdentitiesChanged);
    }
    if leaf.expires_within(now, reuse_window) {
        return Freshness::Outdated(MintReason::LeafExpiring);
    }
    Freshness::Fresh
}
