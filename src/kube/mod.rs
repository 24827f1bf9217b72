// src/kube/mod.rs
pub mod csr;
pub mod kubectl;
pub mod secret;

pub use kubectl::KubectlCsrClient;
pub use secret::{filter_snapshot, parse_secrets, render_secrets, Secret};
