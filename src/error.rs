// src/error.rs
use thiserror::Error;

/// Everything that can abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("invalid input: {0}")]
    InputInvalid(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("signer did not sign CSR {name}: {reason}")]
    SignerDidNotSign { name: String, reason: String },

    #[error("snapshot is ambiguous: expected at most one secret, got {0}")]
    SnapshotAmbiguous(usize),

    #[error("cluster API error: {0}")]
    Cluster(String),

    #[error("values error: {0}")]
    Values(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PkiError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        PkiError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable kebab-case name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => "input-invalid",
            Self::KeyGeneration(_) => "key-generation-failed",
            Self::Sign(_) => "sign-failed",
            Self::Parse { .. } => "parse-failed",
            Self::SignerDidNotSign { .. } => "signer-did-not-sign",
            Self::SnapshotAmbiguous(_) => "snapshot-ambiguous",
            Self::Cluster(_) => "cluster-error",
            Self::Values(_) => "values-error",
            Self::Config(_) => "config-error",
            Self::Io(_) => "io-error",
            Self::Json(_) | Self::Yaml(_) => "serialization-error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PkiError>;
