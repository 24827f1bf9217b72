// src/kube/secret.rs
//! `kubernetes.io/tls` Secret manifests as they appear in a snapshot and as
//! the orchestrator renders them.

use crate::cert::types::{CertificateBundle, CA_CERT_KEY, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::error::{PkiError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "Secret".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: SecretMeta,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Base64 values, keyed by file name.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Renders `bundle` into the Secret layout the orchestrator persists.
    pub fn from_bundle(namespace: &str, name: &str, bundle: &CertificateBundle) -> Self {
        let data = [
            (CA_CERT_KEY, &bundle.ca_pem),
            (TLS_CERT_KEY, &bundle.cert_pem),
            (TLS_KEY_KEY, &bundle.key_pem),
        ]
        .into_iter()
        .map(|(key, pem)| (key.to_string(), general_purpose::STANDARD.encode(pem)))
        .collect();

        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: SecretMeta {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
            },
            type_: Some(TLS_SECRET_TYPE.to_string()),
            data,
        }
    }

    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.metadata.name == name
            && self
                .metadata
                .namespace
                .as_deref()
                .map_or(true, |ns| ns == namespace)
    }

    fn decoded(&self, key: &str) -> Result<String> {
        let Some(encoded) = self.data.get(key) else {
            return Ok(String::new());
        };
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| PkiError::parse(key, e))?;
        String::from_utf8(bytes).map_err(|e| PkiError::parse(key, e))
    }

    /// Missing keys decode to empty strings; the freshness rules decide what
    /// an empty field means.
    pub fn to_bundle(&self) -> Result<CertificateBundle> {
        Ok(CertificateBundle::new(
            self.decoded(CA_CERT_KEY)?,
            self.decoded(TLS_CERT_KEY)?,
            self.decoded(TLS_KEY_KEY)?,
        ))
    }
}

/// Reads every Secret out of a multi-document YAML stream. `List` documents
/// are flattened; other kinds and empty documents are skipped.
pub fn parse_secrets(yaml: &str) -> Result<Vec<Secret>> {
    let mut secrets = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)?;
        collect_secrets(value, &mut secrets)?;
    }
    Ok(secrets)
}

fn collect_secrets(value: serde_yaml::Value, out: &mut Vec<Secret>) -> Result<()> {
    match value.get("kind").and_then(serde_yaml::Value::as_str) {
        Some("Secret") => out.push(serde_yaml::from_value(value)?),
        Some("List") => {
            if let Some(serde_yaml::Value::Sequence(items)) = value.get("items") {
                for item in items {
                    collect_secrets(item.clone(), out)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// The snapshot for one request: bundles of every Secret named `name` in
/// `namespace`. A Secret whose data does not decode yields an empty bundle,
/// which reads as corrupt.
pub fn filter_snapshot(secrets: &[Secret], namespace: &str, name: &str) -> Vec<CertificateBundle> {
    secrets
        .iter()
        .filter(|secret| secret.matches(namespace, name))
        .map(|secret| secret.to_bundle().unwrap_or_default())
        .collect()
}

pub fn render_secrets(secrets: &[Secret]) -> Result<String> {
    let mut out = String::new();
    for secret in secrets {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(secret)?);
    }
    Ok(out)
}
