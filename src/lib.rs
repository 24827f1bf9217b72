//! Certificate lifecycle for cluster hooks: keeps a CA, a leaf certificate
//! and its key in a values tree, reusing persisted material while it is fresh
//! and minting replacements, locally or through the cluster signer, when not.

pub mod app;
pub mod cert;
pub mod config;
pub mod error;
pub mod kube;
pub mod utils;
pub mod values;

pub use app::{CertManager, ReconcileOutcome};
pub use error::{PkiError, Result};
pub use values::ValuesTree;
