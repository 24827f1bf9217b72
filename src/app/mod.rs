mod manager;

pub use manager::{read_bundle, value_paths, CertManager, ReconcileOutcome};
