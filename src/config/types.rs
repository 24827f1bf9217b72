// config/types.rs
use crate::cert::freshness::{default_csr_reuse_window, default_soon_window};
use crate::cert::types::{IssuanceRequest, Issuer};
use crate::error::{PkiError, Result};
use crate::utils::duration;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    #[serde(default)]
    pub requests: Vec<IssuanceRequest>,
    #[serde(default = "default_soon_window", with = "duration")]
    pub soon_window: Duration,
    #[serde(default = "default_csr_reuse_window", with = "duration")]
    pub csr_reuse_window: Duration,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            requests: Vec::new(),
            soon_window: default_soon_window(),
            csr_reuse_window: default_csr_reuse_window(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}

impl HookConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path).to_string();
        let config_str = fs::read_to_string(&path)
            .map_err(|e| PkiError::Config(format!("cannot read {}: {}", path, e)))?;

        if is_json(Path::new(&path)) {
            Ok(serde_json::from_str(&config_str)?)
        } else {
            Ok(serde_yaml::from_str(&config_str)?)
        }
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let path = shellexpand::tilde(path).to_string();
        let config_str = if is_json(Path::new(&path)) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        fs::write(&path, config_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, window) in [
            ("soonWindow", self.soon_window),
            ("csrReuseWindow", self.csr_reuse_window),
        ] {
            if window <= Duration::zero() {
                return Err(PkiError::Config(format!("{} must be positive", name)));
            }
        }

        let mut prefixes = HashSet::new();
        let mut secrets = HashSet::new();
        for request in &self.requests {
            request.validate()?;
            self.check_lifetimes(request)?;
            if !prefixes.insert(request.values_prefix.as_str()) {
                return Err(PkiError::Config(format!(
                    "values prefix '{}' is used by more than one request",
                    request.values_prefix
                )));
            }
            if !secrets.insert((request.namespace.as_str(), request.secret_name.as_str())) {
                return Err(PkiError::Config(format!(
                    "secret {}/{} is used by more than one request",
                    request.namespace, request.secret_name
                )));
            }
        }
        Ok(())
    }

    /// Material must outlive its renewal window, or every pass would mint again.
    fn check_lifetimes(&self, request: &IssuanceRequest) -> Result<()> {
        match request.issuer {
            Issuer::Local => {
                for (name, lifetime) in [
                    ("caExpiry", request.ca_expiry),
                    ("leafExpiry", request.leaf_expiry),
                ] {
                    if lifetime <= self.soon_window {
                        return Err(PkiError::Config(format!(
                            "{} of '{}' ({}) must exceed soonWindow ({})",
                            name,
                            request.common_name,
                            duration::format_duration(&lifetime),
                            duration::format_duration(&self.soon_window)
                        )));
                    }
                }
            }
            Issuer::Cluster => {
                if let Some(seconds) = request.expiration_seconds {
                    if Duration::seconds(i64::from(seconds)) <= self.csr_reuse_window {
                        return Err(PkiError::Config(format!(
                            "expirationSeconds of '{}' ({}) must exceed csrReuseWindow ({})",
                            request.common_name,
                            seconds,
                            duration::format_duration(&self.csr_reuse_window)
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
