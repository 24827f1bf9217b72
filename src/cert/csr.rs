// src/cert/csr.rs
//! Issuance through the cluster's CertificateSigningRequest API: generate a
//! key locally, submit a request, approve it and wait for the signer.

use super::identity::classify;
use super::openssl::{csr_to_pem, generate_csr, generate_private_key, private_key_to_pem};
use super::types::{CertificateBundle, IssuanceRequest};
use super::verification::{key_matches_certificate, parse_certificate};
use crate::error::{PkiError, Result};
use crate::kube::csr::{
    CertificateSigningRequest, CsrCondition, CONDITION_APPROVED, CONDITION_DENIED,
    CONDITION_FAILED,
};
use crate::utils::duration::format_duration;
use crate::utils::logging::Logger;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// How often the request is re-read while waiting for the signer.
pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// The four cluster calls the issuer needs.
#[async_trait]
pub trait CsrClient: Send + Sync {
    async fn create(&self, csr: &CertificateSigningRequest) -> Result<()>;

    /// Pushes `csr`, which already carries the Approved condition, to the
    /// approval subresource.
    async fn approve(&self, csr: &CertificateSigningRequest) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>>;

    /// Returns false when there was nothing to delete.
    async fn delete(&self, name: &str) -> Result<bool>;
}

fn approved_condition(now: DateTime<Utc>) -> CsrCondition {
    CsrCondition {
        type_: CONDITION_APPROVED.to_string(),
        status: "True".to_string(),
        reason: Some("AutoApproved".to_string()),
        message: Some(format!("approved by {}", env!("CARGO_PKG_NAME"))),
        last_update_time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

async fn delete_quietly(client: &dyn CsrClient, name: &str, logger: &mut dyn Logger) {
    match client.delete(name).await {
        Ok(true) => logger.debug_log(&format!("Deleted CSR {}", name)),
        Ok(false) => {}
        Err(e) => logger.debug_log(&format!("Could not delete CSR {}: {}", name, e)),
    }
}

async fn poll_certificate(
    client: &dyn CsrClient,
    name: &str,
    interval: std::time::Duration,
) -> Result<String> {
    loop {
        let csr = client
            .get(name)
            .await?
            .ok_or_else(|| PkiError::SignerDidNotSign {
                name: name.to_string(),
                reason: "request disappeared while waiting".to_string(),
            })?;

        for rejected in [CONDITION_DENIED, CONDITION_FAILED] {
            if csr.has_condition(rejected) {
                let message = csr
                    .conditions()
                    .iter()
                    .find(|c| c.type_ == rejected)
                    .and_then(|c| c.message.clone())
                    .unwrap_or_default();
                return Err(PkiError::SignerDidNotSign {
                    name: name.to_string(),
                    reason: format!("{} {}", rejected, message).trim_end().to_string(),
                });
            }
        }

        if let Some(pem) = csr.certificate_pem()? {
            return Ok(pem);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Polls until the signer attaches a certificate, it rejects the request, or
/// `timeout` passes. Expiry of the deadline is reported as the signer not
/// having signed.
pub async fn wait_for_certificate(
    client: &dyn CsrClient,
    name: &str,
    timeout: Duration,
    interval: std::time::Duration,
) -> Result<String> {
    let deadline = timeout
        .to_std()
        .map_err(|_| PkiError::InputInvalid(format!("negative wait timeout for CSR {}", name)))?;

    match tokio::time::timeout(deadline, poll_certificate(client, name, interval)).await {
        Ok(result) => result,
        Err(_) => Err(PkiError::SignerDidNotSign {
            name: name.to_string(),
            reason: format!("no certificate after {}", format_duration(&timeout)),
        }),
    }
}

/// Obtains a leaf from the cluster signer. The returned bundle has an empty
/// CA; the cluster's own CA is the trust root.
pub async fn issue_via_cluster(
    client: &dyn CsrClient,
    request: &IssuanceRequest,
    identities: &[String],
    now: DateTime<Utc>,
    logger: &mut dyn Logger,
) -> Result<CertificateBundle> {
    let signer_name = request.signer_name.as_deref().unwrap_or_default();
    if signer_name.is_empty() {
        return Err(PkiError::InputInvalid(format!(
            "no signerName for {}",
            request.common_name
        )));
    }
    let name = request.csr_name();

    delete_quietly(client, name, logger).await;

    let key = generate_private_key(request.key_algorithm(), logger)?;
    let req = generate_csr(
        &request.common_name,
        &request.groups,
        &classify(identities),
        &key,
        logger,
    )?;

    let mut usages: Vec<String> = Vec::new();
    for usage in &request.leaf_usages {
        let usage = usage.cluster_name().to_string();
        if !usages.contains(&usage) {
            usages.push(usage);
        }
    }

    let mut csr = CertificateSigningRequest::new(
        name,
        &csr_to_pem(&req)?,
        signer_name,
        usages,
        request.expiration_seconds,
    );
    logger.debug_log(&format!("Submitting CSR {} to signer {}", name, signer_name));
    client.create(&csr).await?;

    csr.add_condition(approved_condition(now));
    client.approve(&csr).await?;

    let issued = match wait_for_certificate(client, name, request.wait_timeout, POLL_INTERVAL).await
    {
        Ok(pem) => pem,
        Err(e) => {
            delete_quietly(client, name, logger).await;
            return Err(e);
        }
    };
    delete_quietly(client, name, logger).await;

    let key_pem = private_key_to_pem(&key)?;
    let rejected = |reason: String| PkiError::SignerDidNotSign {
        name: name.to_string(),
        reason,
    };
    let info = parse_certificate("issued certificate", &issued)
        .map_err(|e| rejected(e.to_string()))?;
    if !key_matches_certificate(&issued, &key_pem)? {
        return Err(rejected("issued certificate does not carry the submitted key".to_string()));
    }
    if info.not_after <= now {
        return Err(rejected(format!("issued certificate expired at {}", info.not_after)));
    }

    Ok(CertificateBundle::new(String::new(), issued, key_pem))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::cert::identity::Identity;
    use crate::cert::openssl::{
        certificate_from_pem, certificate_to_pem, private_key_from_pem, sign_certificate,
        CertificateProfile, SigningAuthority,
    };
    use crate::cert::types::{Authority, KeyUsage};
    use crate::utils::logging::MemoryLogger;
    use openssl::x509::X509Req;
    use std::collections::BTreeMap;
    use std::net::IpAddr;
    use std::sync::Mutex;
    use x509_parser::certification_request::X509CertificationRequest;
    use x509_parser::extensions::{GeneralName, ParsedExtension};
    use x509_parser::pem::parse_x509_pem;
    use x509_parser::prelude::FromDer;

    pub enum Behaviour {
        Sign(Authority),
        Deny,
        Ignore,
    }

    /// In-memory stand-in for the cluster, with a signer acting on approval.
    pub struct FakeCsrClient {
        behaviour: Behaviour,
        pub validity: Duration,
        objects: Mutex<BTreeMap<String, CertificateSigningRequest>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCsrClient {
        pub fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                validity: Duration::days(365),
                objects: Mutex::new(BTreeMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn stored(&self, name: &str) -> Option<CertificateSigningRequest> {
            self.objects.lock().unwrap().get(name).cloned()
        }

        pub fn insert(&self, csr: CertificateSigningRequest) {
            self.objects
                .lock()
                .unwrap()
                .insert(csr.name().to_string(), csr);
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn sign(&self, authority: &Authority, csr: &CertificateSigningRequest) -> String {
            let pem = csr.request_pem().unwrap();
            let req = X509Req::from_pem(pem.as_bytes()).unwrap();
            let ca_cert = certificate_from_pem("ca.crt", &authority.cert_pem).unwrap();
            let ca_key = private_key_from_pem(&authority.key_pem).unwrap();
            let cert = sign_certificate(
                &req,
                &requested_identities(&pem),
                SigningAuthority::Ca {
                    cert: &ca_cert,
                    key: &ca_key,
                },
                &CertificateProfile::leaf(Utc::now(), self.validity, &[KeyUsage::ClientAuth]),
                &mut MemoryLogger::new(),
            )
            .unwrap();
            certificate_to_pem(&cert).unwrap()
        }
    }

    pub fn requested_identities(pem: &str) -> Vec<Identity> {
        let (_, block) = parse_x509_pem(pem.as_bytes()).unwrap();
        let (_, req) = X509CertificationRequest::from_der(&block.contents).unwrap();
        let mut identities = Vec::new();
        if let Some(extensions) = req.requested_extensions() {
            for extension in extensions {
                if let ParsedExtension::SubjectAlternativeName(san) = extension {
                    for name in &san.general_names {
                        match name {
                            GeneralName::DNSName(dns) => {
                                identities.push(Identity::Dns(dns.to_string()))
                            }
                            GeneralName::IPAddress(bytes) if bytes.len() == 4 => {
                                let octets = <[u8; 4]>::try_from(*bytes).unwrap();
                                identities.push(Identity::Ip(IpAddr::from(octets)))
                            }
                            GeneralName::IPAddress(bytes) if bytes.len() == 16 => {
                                let octets = <[u8; 16]>::try_from(*bytes).unwrap();
                                identities.push(Identity::Ip(IpAddr::from(octets)))
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        identities
    }

    #[async_trait]
    impl CsrClient for FakeCsrClient {
        async fn create(&self, csr: &CertificateSigningRequest) -> Result<()> {
            self.record(format!("create {}", csr.name()));
            let mut objects = self.objects.lock().unwrap();
            if objects.contains_key(csr.name()) {
                return Err(PkiError::Cluster(format!("{} already exists", csr.name())));
            }
            objects.insert(csr.name().to_string(), csr.clone());
            Ok(())
        }

        async fn approve(&self, csr: &CertificateSigningRequest) -> Result<()> {
            self.record(format!("approve {}", csr.name()));
            let mut updated = csr.clone();
            match &self.behaviour {
                Behaviour::Sign(authority) => {
                    let cert = self.sign(authority, csr);
                    updated.set_certificate_pem(&cert);
                }
                Behaviour::Deny => updated.add_condition(CsrCondition {
                    type_: CONDITION_DENIED.to_string(),
                    status: "True".to_string(),
                    reason: None,
                    message: Some("policy".to_string()),
                    last_update_time: None,
                }),
                Behaviour::Ignore => {}
            }
            self.objects
                .lock()
                .unwrap()
                .insert(csr.name().to_string(), updated);
            Ok(())
        }

        async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>> {
            self.record(format!("get {}", name));
            Ok(self.objects.lock().unwrap().get(name).cloned())
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            self.record(format!("delete {}", name));
            Ok(self.objects.lock().unwrap().remove(name).is_some())
        }
    }
}
