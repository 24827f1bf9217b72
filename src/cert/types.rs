// cert/types.rs
use crate::error::{PkiError, Result};
use crate::utils::duration;
use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const CA_CERT_KEY: &str = "ca.crt";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_KEY_KEY: &str = "tls.key";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "algo", rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Ecdsa { size: u32 },
    Rsa { size: u32 },
}

impl KeyAlgorithm {
    pub const LOCAL_DEFAULT: KeyAlgorithm = KeyAlgorithm::Ecdsa { size: 256 };
    pub const CLUSTER_DEFAULT: KeyAlgorithm = KeyAlgorithm::Rsa { size: 2048 };

    pub fn validate(&self) -> Result<()> {
        match *self {
            KeyAlgorithm::Ecdsa { size: 256 | 384 } => Ok(()),
            KeyAlgorithm::Ecdsa { size } => Err(PkiError::InputInvalid(format!(
                "unsupported ecdsa key size {}, expected 256 or 384",
                size
            ))),
            KeyAlgorithm::Rsa { size } if (2048..=8192).contains(&size) => Ok(()),
            KeyAlgorithm::Rsa { size } => Err(PkiError::InputInvalid(format!(
                "unsupported rsa key size {}, expected 2048..=8192",
                size
            ))),
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAlgorithm::Ecdsa { size } => write!(f, "ecdsa/{}", size),
            KeyAlgorithm::Rsa { size } => write!(f, "rsa/{}", size),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum KeyUsage {
    DigitalSignature,
    KeyEncipherment,
    ClientAuth,
    ServerAuth,
    RequestheaderClient,
}

impl KeyUsage {
    /// Usage string understood by the cluster's CertificateSigningRequest API.
    pub fn cluster_name(&self) -> &'static str {
        match self {
            KeyUsage::DigitalSignature => "digital signature",
            KeyUsage::KeyEncipherment => "key encipherment",
            KeyUsage::ClientAuth | KeyUsage::RequestheaderClient => "client auth",
            KeyUsage::ServerAuth => "server auth",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Issuer {
    /// Self-signed CA kept inside the bundle.
    #[default]
    Local,
    /// The cluster's CertificateSigningRequest signer.
    Cluster,
}

fn default_expiry() -> Duration {
    Duration::days(3650)
}

fn default_wait_timeout() -> Duration {
    Duration::minutes(1)
}

fn default_usages() -> Vec<KeyUsage> {
    vec![
        KeyUsage::DigitalSignature,
        KeyUsage::KeyEncipherment,
        KeyUsage::ServerAuth,
        KeyUsage::ClientAuth,
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceRequest {
    pub common_name: String,
    #[serde(default)]
    pub identities: Vec<String>,
    /// Subject organizations; only sent by the cluster issuer.
    #[serde(default)]
    pub groups: Vec<String>,
    pub namespace: String,
    pub secret_name: String,
    pub values_prefix: String,
    #[serde(default)]
    pub issuer: Issuer,
    #[serde(default)]
    pub key_algorithm: Option<KeyAlgorithm>,
    #[serde(default = "default_expiry", with = "duration")]
    pub ca_expiry: Duration,
    #[serde(default = "default_expiry", with = "duration")]
    pub leaf_expiry: Duration,
    #[serde(default = "default_usages")]
    pub leaf_usages: Vec<KeyUsage>,
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default = "default_wait_timeout", with = "duration")]
    pub wait_timeout: Duration,
    #[serde(default)]
    pub expiration_seconds: Option<i32>,
    /// Name of the CertificateSigningRequest object; defaults to `secret_name`.
    #[serde(default)]
    pub csr_name: Option<String>,
}

impl IssuanceRequest {
    pub fn new(
        common_name: &str,
        namespace: &str,
        secret_name: &str,
        values_prefix: &str,
    ) -> Self {
        Self {
            common_name: common_name.to_string(),
            identities: Vec::new(),
            groups: Vec::new(),
            namespace: namespace.to_string(),
            secret_name: secret_name.to_string(),
            values_prefix: values_prefix.to_string(),
            issuer: Issuer::Local,
            key_algorithm: None,
            ca_expiry: default_expiry(),
            leaf_expiry: default_expiry(),
            leaf_usages: default_usages(),
            signer_name: None,
            wait_timeout: default_wait_timeout(),
            expiration_seconds: None,
            csr_name: None,
        }
    }

    pub fn with_identities<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identities = identities.into_iter().map(Into::into).collect();
        self
    }

    pub fn via_cluster(mut self, signer_name: &str) -> Self {
        self.issuer = Issuer::Cluster;
        self.signer_name = Some(signer_name.to_string());
        self
    }

    pub fn key_algorithm(&self) -> KeyAlgorithm {
        self.key_algorithm.unwrap_or(match self.issuer {
            Issuer::Local => KeyAlgorithm::LOCAL_DEFAULT,
            Issuer::Cluster => KeyAlgorithm::CLUSTER_DEFAULT,
        })
    }

    pub fn csr_name(&self) -> &str {
        self.csr_name.as_deref().unwrap_or(&self.secret_name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(PkiError::InputInvalid("common name is empty".to_string()));
        }
        if self.namespace.is_empty() || self.secret_name.is_empty() {
            return Err(PkiError::InputInvalid(format!(
                "request '{}' needs both namespace and secret name",
                self.common_name
            )));
        }
        if self.values_prefix.is_empty() || self.values_prefix.split('.').any(str::is_empty) {
            return Err(PkiError::InputInvalid(format!(
                "invalid values prefix '{}'",
                self.values_prefix
            )));
        }
        for (name, value) in [
            ("caExpiry", self.ca_expiry),
            ("leafExpiry", self.leaf_expiry),
            ("waitTimeout", self.wait_timeout),
        ] {
            if value <= Duration::zero() {
                return Err(PkiError::InputInvalid(format!("{} must be positive", name)));
            }
        }
        self.key_algorithm().validate()?;

        if self.issuer == Issuer::Cluster {
            if self.signer_name.as_deref().map_or(true, str::is_empty) {
                return Err(PkiError::InputInvalid(format!(
                    "request '{}' uses the cluster issuer but has no signerName",
                    self.common_name
                )));
            }
            if matches!(self.expiration_seconds, Some(s) if s < 600) {
                return Err(PkiError::InputInvalid(
                    "expirationSeconds must be at least 600".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A CA certificate with its private key, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub cert_pem: String,
    pub key_pem: String,
}

/// The persisted unit: CA, leaf certificate and leaf key, all PEM.
/// `ca_pem` is empty for bundles issued by the cluster signer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificateBundle {
    pub ca_pem: String,
    pub cert_pem: String,
    pub key_pem: String,
}

impl CertificateBundle {
    pub fn new(ca_pem: String, cert_pem: String, key_pem: String) -> Self {
        Self {
            ca_pem,
            cert_pem,
            key_pem,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults() {
        let request: IssuanceRequest = serde_yaml::from_str(
            r#"
commonName: svc
namespace: ns
secretName: svc-tls
valuesPrefix: m.tls
identities: ["svc.ns.svc", "127.0.0.1"]
"#,
        )
        .unwrap();

        assert_eq!(request.issuer, Issuer::Local);
        assert_eq!(request.key_algorithm(), KeyAlgorithm::LOCAL_DEFAULT);
        assert_eq!(request.ca_expiry, Duration::days(3650));
        assert_eq!(request.wait_timeout, Duration::minutes(1));
        assert_eq!(request.leaf_usages.len(), 4);
        assert_eq!(request.csr_name(), "svc-tls");
        request.validate().unwrap();
    }

    #[test]
    fn deserializes_cluster_request() {
        let request: IssuanceRequest = serde_yaml::from_str(
            r#"
commonName: system:node:worker
groups: ["system:nodes"]
namespace: ns
secretName: node-tls
valuesPrefix: m.node
issuer: cluster
signerName: kubernetes.io/kube-apiserver-client
keyAlgorithm: { algo: rsa, size: 4096 }
leafUsages: [digital-signature, key-encipherment, client-auth]
waitTimeout: 30s
expirationSeconds: 86400
"#,
        )
        .unwrap();

        assert_eq!(request.key_algorithm(), KeyAlgorithm::Rsa { size: 4096 });
        assert_eq!(request.wait_timeout, Duration::seconds(30));
        assert_eq!(request.leaf_usages[2].cluster_name(), "client auth");
        request.validate().unwrap();
    }

    #[test]
    fn cluster_default_key_is_rsa() {
        let request = IssuanceRequest::new("svc", "ns", "s", "p").via_cluster("example.com/signer");
        assert_eq!(request.key_algorithm(), KeyAlgorithm::Rsa { size: 2048 });
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let base = IssuanceRequest::new("svc", "ns", "s", "m.tls");
        base.validate().unwrap();

        let mut empty_cn = base.clone();
        empty_cn.common_name = " ".to_string();
        assert!(matches!(empty_cn.validate(), Err(PkiError::InputInvalid(_))));

        let mut bad_prefix = base.clone();
        bad_prefix.values_prefix = "m..tls".to_string();
        assert!(bad_prefix.validate().is_err());

        let mut small_rsa = base.clone();
        small_rsa.key_algorithm = Some(KeyAlgorithm::Rsa { size: 1024 });
        assert!(small_rsa.validate().is_err());

        let mut odd_curve = base.clone();
        odd_curve.key_algorithm = Some(KeyAlgorithm::Ecdsa { size: 521 });
        assert!(odd_curve.validate().is_err());

        let mut no_signer = base.clone();
        no_signer.issuer = Issuer::Cluster;
        assert!(no_signer.validate().is_err());

        let mut zero_expiry = base;
        zero_expiry.leaf_expiry = Duration::zero();
        assert!(zero_expiry.validate().is_err());
    }
}
