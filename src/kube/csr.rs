// src/kube/csr.rs
//! The subset of `certificates.k8s.io/v1` CertificateSigningRequest the
//! cluster issuer reads and writes.

use crate::error::{PkiError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

pub const CSR_API_VERSION: &str = "certificates.k8s.io/v1";
pub const CSR_KIND: &str = "CertificateSigningRequest";

pub const CONDITION_APPROVED: &str = "Approved";
pub const CONDITION_DENIED: &str = "Denied";
pub const CONDITION_FAILED: &str = "Failed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrSpec {
    /// Base64 of the PEM-encoded PKCS#10 request.
    pub request: String,
    pub signer_name: String,
    #[serde(default)]
    pub usages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CsrCondition>,
    /// Base64 of the issued PEM certificate once the signer has acted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSigningRequest {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: CsrSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CsrStatus>,
}

impl CertificateSigningRequest {
    pub fn new(
        name: &str,
        request_pem: &str,
        signer_name: &str,
        usages: Vec<String>,
        expiration_seconds: Option<i32>,
    ) -> Self {
        Self {
            api_version: CSR_API_VERSION.to_string(),
            kind: CSR_KIND.to_string(),
            metadata: ObjectMeta {
                name: name.to_string(),
                resource_version: None,
            },
            spec: CsrSpec {
                request: general_purpose::STANDARD.encode(request_pem),
                signer_name: signer_name.to_string(),
                usages,
                expiration_seconds,
            },
            status: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn request_pem(&self) -> Result<String> {
        decode_pem("spec.request", &self.spec.request)
    }

    pub fn conditions(&self) -> &[CsrCondition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    pub fn has_condition(&self, type_: &str) -> bool {
        self.conditions()
            .iter()
            .any(|c| c.type_ == type_ && c.status == "True")
    }

    pub fn add_condition(&mut self, condition: CsrCondition) {
        self.status
            .get_or_insert_with(CsrStatus::default)
            .conditions
            .push(condition);
    }

    /// Issued certificate PEM, if the signer has attached one.
    pub fn certificate_pem(&self) -> Result<Option<String>> {
        match self.status.as_ref().and_then(|s| s.certificate.as_deref()) {
            Some(encoded) if !encoded.is_empty() => {
                decode_pem("status.certificate", encoded).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn set_certificate_pem(&mut self, pem: &str) {
        self.status.get_or_insert_with(CsrStatus::default).certificate =
            Some(general_purpose::STANDARD.encode(pem));
    }
}

fn decode_pem(what: &str, encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PkiError::parse(what, e))?;
    String::from_utf8(bytes).map_err(|e| PkiError::parse(what, e))
}
