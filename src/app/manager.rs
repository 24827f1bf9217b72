// src/app/manager.rs
use crate::cert::ca::{generate_authority, generate_leaf};
use crate::cert::csr::{issue_via_cluster, CsrClient};
use crate::cert::freshness::{
    check_cluster, check_local, default_csr_reuse_window, default_soon_window, Freshness,
    MintReason,
};
use crate::cert::identity::{resolve_identities, DomainTemplates};
use crate::cert::types::{CertificateBundle, IssuanceRequest, Issuer};
use crate::cert::verification::parse_certificate;
use crate::config::HookConfig;
use crate::error::{PkiError, Result};
use crate::utils::logging::Logger;
use crate::values::ValuesTree;
use chrono::{DateTime, Duration, Utc};

/// What a pass did with the persisted material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Reused,
    Minted(MintReason),
}

/// Values paths of the three leaves written under a request's prefix.
pub fn value_paths(prefix: &str) -> [String; 3] {
    [
        format!("{}.ca", prefix),
        format!("{}.crt", prefix),
        format!("{}.key", prefix),
    ]
}

/// Reads back what a previous pass wrote under `prefix`, if all three leaves
/// are present.
pub fn read_bundle(values: &ValuesTree, prefix: &str) -> Option<CertificateBundle> {
    let [ca, crt, key] = value_paths(prefix);
    Some(CertificateBundle::new(
        values.get_str(&ca)?.to_string(),
        values.get_str(&crt)?.to_string(),
        values.get_str(&key)?.to_string(),
    ))
}

/// Reconciliation driver. Stateless between passes apart from its settings
/// and log sink.
pub struct CertManager {
    logger: Box<dyn Logger>,
    pub soon_window: Duration,
    pub csr_reuse_window: Duration,
}

impl CertManager {
    pub fn new(logger: Box<dyn Logger>) -> Self {
        Self {
            logger,
            soon_window: default_soon_window(),
            csr_reuse_window: default_csr_reuse_window(),
        }
    }

    pub fn from_config(config: &HookConfig, logger: Box<dyn Logger>) -> Self {
        Self {
            logger,
            soon_window: config.soon_window,
            csr_reuse_window: config.csr_reuse_window,
        }
    }

    pub fn log(&mut self, message: &str) {
        self.logger.log(message);
    }

    fn debug_log(&mut self, message: &str) {
        self.logger.debug_log(message);
    }

    /// Local path: reuse the snapshot bundle while it is fresh, otherwise mint
    /// a new CA and leaf. `values` is only touched on success.
    pub fn reconcile(
        &mut self,
        request: &IssuanceRequest,
        snapshot: &[CertificateBundle],
        values: &mut ValuesTree,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let result = self.reconcile_local(request, snapshot, values, now);
        self.finish(request, result)
    }

    /// Cluster path: reuse the snapshot leaf while it matches the request and
    /// outlives the reuse window, otherwise obtain one from the cluster signer.
    pub async fn reconcile_via_cluster(
        &mut self,
        request: &IssuanceRequest,
        snapshot: &[CertificateBundle],
        values: &mut ValuesTree,
        now: DateTime<Utc>,
        client: &dyn CsrClient,
    ) -> Result<ReconcileOutcome> {
        let result = self
            .reconcile_cluster(request, snapshot, values, now, client)
            .await;
        self.finish(request, result)
    }

    /// Dispatches on the request's issuer.
    pub async fn reconcile_request(
        &mut self,
        request: &IssuanceRequest,
        snapshot: &[CertificateBundle],
        values: &mut ValuesTree,
        now: DateTime<Utc>,
        client: &dyn CsrClient,
    ) -> Result<ReconcileOutcome> {
        match request.issuer {
            Issuer::Local => self.reconcile(request, snapshot, values, now),
            Issuer::Cluster => {
                self.reconcile_via_cluster(request, snapshot, values, now, client)
                    .await
            }
        }
    }

    fn finish(
        &mut self,
        request: &IssuanceRequest,
        result: Result<ReconcileOutcome>,
    ) -> Result<ReconcileOutcome> {
        if let Err(e) = &result {
            self.log(&format!(
                "Failed to reconcile certificate {} ({}): [{}] {}",
                request.common_name,
                request.values_prefix,
                e.kind(),
                e
            ));
        }
        result
    }

    /// Validates the request, checks the snapshot size and resolves identity
    /// templates against the values tree.
    fn prepare<'a>(
        &self,
        request: &IssuanceRequest,
        snapshot: &'a [CertificateBundle],
        values: &ValuesTree,
    ) -> Result<(Option<&'a CertificateBundle>, Vec<String>)> {
        request.validate()?;
        if snapshot.len() > 1 {
            return Err(PkiError::SnapshotAmbiguous(snapshot.len()));
        }
        let identities =
            resolve_identities(&request.identities, &DomainTemplates::from_values(values))?;
        Ok((snapshot.first(), identities))
    }

    fn reconcile_local(
        &mut self,
        request: &IssuanceRequest,
        snapshot: &[CertificateBundle],
        values: &mut ValuesTree,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        if request.issuer != Issuer::Local {
            return Err(PkiError::InputInvalid(format!(
                "request {} is for the cluster issuer",
                request.common_name
            )));
        }
        let (existing, identities) = self.prepare(request, snapshot, values)?;

        let freshness = match existing {
            None => Freshness::Outdated(MintReason::Absent),
            Some(bundle) => check_local(bundle, &identities, now, self.soon_window),
        };
        if let (Freshness::Fresh, Some(bundle)) = (freshness, existing) {
            self.debug_log(&format!(
                "Certificate {} in {}/{} is fresh, reusing it",
                request.common_name, request.namespace, request.secret_name
            ));
            write_bundle(values, &request.values_prefix, bundle)?;
            return Ok(ReconcileOutcome::Reused);
        }
        let reason = match freshness {
            Freshness::Outdated(reason) => reason,
            Freshness::Fresh => MintReason::Absent,
        };

        let key_algorithm = request.key_algorithm();
        let authority = generate_authority(
            &request.common_name,
            key_algorithm,
            request.ca_expiry,
            now,
            self.logger.as_mut(),
        )?;
        let bundle = generate_leaf(
            &request.common_name,
            &identities,
            &authority,
            request.leaf_expiry,
            key_algorithm,
            &request.leaf_usages,
            now,
            self.logger.as_mut(),
        )?;

        write_bundle(values, &request.values_prefix, &bundle)?;
        self.log_mint(request, reason, &bundle);
        Ok(ReconcileOutcome::Minted(reason))
    }

    async fn reconcile_cluster(
        &mut self,
        request: &IssuanceRequest,
        snapshot: &[CertificateBundle],
        values: &mut ValuesTree,
        now: DateTime<Utc>,
        client: &dyn CsrClient,
    ) -> Result<ReconcileOutcome> {
        if request.issuer != Issuer::Cluster {
            return Err(PkiError::InputInvalid(format!(
                "request {} is for the local issuer",
                request.common_name
            )));
        }
        let (existing, identities) = self.prepare(request, snapshot, values)?;

        let freshness = match existing {
            None => Freshness::Outdated(MintReason::Absent),
            Some(bundle) => check_cluster(
                bundle,
                &request.common_name,
                &request.groups,
                &identities,
                now,
                self.csr_reuse_window,
            ),
        };
        if let (Freshness::Fresh, Some(bundle)) = (freshness, existing) {
            self.debug_log(&format!(
                "Cluster-signed certificate {} in {}/{} is still valid, reusing it",
                request.common_name, request.namespace, request.secret_name
            ));
            write_bundle(values, &request.values_prefix, bundle)?;
            return Ok(ReconcileOutcome::Reused);
        }
        let reason = match freshness {
            Freshness::Outdated(reason) => reason,
            Freshness::Fresh => MintReason::Absent,
        };

        let bundle =
            issue_via_cluster(client, request, &identities, now, self.logger.as_mut()).await?;

        write_bundle(values, &request.values_prefix, &bundle)?;
        self.log_mint(request, reason, &bundle);
        Ok(ReconcileOutcome::Minted(reason))
    }

    fn log_mint(&mut self, request: &IssuanceRequest, reason: MintReason, bundle: &CertificateBundle) {
        let detail = match parse_certificate("tls.crt", &bundle.cert_pem) {
            Ok(info) => format!(
                "fingerprint {}, expires {}",
                info.fingerprint,
                info.not_after.to_rfc3339()
            ),
            Err(e) => format!("unreadable leaf: {}", e),
        };
        self.log(&format!(
            "Minted certificate {} for {}/{} ({}): {}",
            request.common_name, request.namespace, request.secret_name, reason, detail
        ));
    }
}

/// Writes all three leaves or none of them.
fn write_bundle(values: &mut ValuesTree, prefix: &str, bundle: &CertificateBundle) -> Result<()> {
    let [ca, crt, key] = value_paths(prefix);
    let mut staged = values.clone();
    staged.set(&ca, bundle.ca_pem.as_str())?;
    staged.set(&crt, bundle.cert_pem.as_str())?;
    staged.set(&key, bundle.key_pem.as_str())?;
    *values = staged;
    Ok(())
}
