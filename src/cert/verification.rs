// src/cert/verification.rs
use super::openssl::{certificate_from_pem, private_key_from_pem};
use super::types::CertificateBundle;
use crate::error::{PkiError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::net::IpAddr;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;

/// The parts of a certificate the lifecycle rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    pub organizations: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
    pub is_ca: bool,
}

impl CertificateInfo {
    /// DNS names and textual IP addresses, sorted and unique.
    pub fn san_set(&self) -> BTreeSet<String> {
        self.dns_names
            .iter()
            .cloned()
            .chain(self.ip_addresses.iter().map(IpAddr::to_string))
            .collect()
    }

    /// True when less than, or exactly, `window` of validity remains.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.not_after - now <= window
    }
}

fn timestamp(what: &str, seconds: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| PkiError::parse(what, format!("invalid timestamp {}", seconds)))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Parses the first PEM block of `pem`, which must be a certificate.
pub fn parse_certificate(what: &str, pem: &str) -> Result<CertificateInfo> {
    if pem.trim().is_empty() {
        return Err(PkiError::parse(what, "empty PEM"));
    }

    let (_, block) = parse_x509_pem(pem.as_bytes()).map_err(|e| PkiError::parse(what, e))?;
    if block.label != "CERTIFICATE" {
        return Err(PkiError::parse(
            what,
            format!("unexpected PEM block type {}", block.label),
        ));
    }
    let cert = block.parse_x509().map_err(|e| PkiError::parse(what, e))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    let organizations = cert
        .subject()
        .iter_organization()
        .filter_map(|o| o.as_str().ok())
        .map(str::to_string)
        .collect();

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Some(san) = cert
        .subject_alternative_name()
        .map_err(|e| PkiError::parse(what, e))?
    {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ip_addresses.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    let is_ca = cert
        .extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => Some(bc.ca),
            _ => None,
        })
        .unwrap_or(false);

    let fingerprint = openssl::hash::hash(openssl::hash::MessageDigest::sha256(), &block.contents)
        .map_err(|e| PkiError::parse(what, e))?;

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        organizations,
        dns_names,
        ip_addresses,
        not_before: timestamp(what, cert.validity().not_before.timestamp())?,
        not_after: timestamp(what, cert.validity().not_after.timestamp())?,
        serial: hex::encode(cert.raw_serial()),
        fingerprint: hex::encode(fingerprint),
        is_ca,
    })
}

/// Checks that the leaf's signature verifies with the CA's public key.
pub fn verify_signed_by(leaf_pem: &str, ca_pem: &str) -> Result<bool> {
    let leaf = certificate_from_pem("tls.crt", leaf_pem)?;
    let ca = certificate_from_pem("ca.crt", ca_pem)?;
    let ca_key = ca.public_key().map_err(|e| PkiError::parse("ca.crt", e))?;
    leaf.verify(&ca_key).map_err(|e| PkiError::Sign(e.to_string()))
}

/// Checks that `key_pem` is the private half of the certificate's key.
pub fn key_matches_certificate(cert_pem: &str, key_pem: &str) -> Result<bool> {
    let cert = certificate_from_pem("tls.crt", cert_pem)?;
    let key = private_key_from_pem(key_pem)?;
    let public = cert.public_key().map_err(|e| PkiError::parse("tls.crt", e))?;
    Ok(public.public_eq(&key))
}

/// Structural checks on a persisted bundle: the leaf and key parse and
/// belong together, and when a CA is present it signed the leaf.
pub fn verify_bundle(bundle: &CertificateBundle, require_ca: bool) -> Result<()> {
    if !key_matches_certificate(&bundle.cert_pem, &bundle.key_pem)? {
        return Err(PkiError::parse("tls.key", "key does not match tls.crt"));
    }

    if bundle.ca_pem.trim().is_empty() {
        if require_ca {
            return Err(PkiError::parse("ca.crt", "empty PEM"));
        }
        return Ok(());
    }

    if !verify_signed_by(&bundle.cert_pem, &bundle.ca_pem)? {
        return Err(PkiError::parse("tls.crt", "not signed by ca.crt"));
    }
    Ok(())
}
