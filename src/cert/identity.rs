// src/cert/identity.rs
use crate::error::{PkiError, Result};
use crate::values::{ValuesTree, CLUSTER_DOMAIN_PATH, PUBLIC_DOMAIN_TEMPLATE_PATH};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;

const CLUSTER_DOMAIN_TOKEN: &str = "cluster-domain:";
const PUBLIC_DOMAIN_TOKEN: &str = "public-domain:";

/// One subject alternative name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Dns(String),
    Ip(IpAddr),
}

impl Identity {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<IpAddr>() {
            Ok(ip) => Identity::Ip(ip),
            Err(_) => Identity::Dns(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Dns(name) => write!(f, "{}", name),
            Identity::Ip(ip) => write!(f, "{}", ip),
        }
    }
}

/// Templates read from the global section of the values tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainTemplates {
    pub cluster_domain: String,
    pub public_domain_template: String,
}

impl DomainTemplates {
    pub fn from_values(values: &ValuesTree) -> Self {
        Self {
            cluster_domain: values
                .get_str(CLUSTER_DOMAIN_PATH)
                .unwrap_or_default()
                .to_string(),
            public_domain_template: values
                .get_str(PUBLIC_DOMAIN_TEMPLATE_PATH)
                .unwrap_or_default()
                .to_string(),
        }
    }

    fn expand(&self, raw: &str) -> Result<String> {
        if let Some(rest) = raw.strip_prefix(CLUSTER_DOMAIN_TOKEN) {
            if rest.is_empty() {
                return Err(PkiError::InputInvalid(format!("identity token '{}' is empty", raw)));
            }
            if self.cluster_domain.is_empty() {
                return Ok(raw.to_string());
            }
            return Ok(format!("{}.{}", rest, self.cluster_domain));
        }

        if let Some(rest) = raw.strip_prefix(PUBLIC_DOMAIN_TOKEN) {
            if rest.is_empty() {
                return Err(PkiError::InputInvalid(format!("identity token '{}' is empty", raw)));
            }
            if self.public_domain_template.is_empty() {
                return Ok(raw.to_string());
            }
            if !self.public_domain_template.contains("%s") {
                return Err(PkiError::InputInvalid(format!(
                    "public domain template '{}' has no %s placeholder",
                    self.public_domain_template
                )));
            }
            return Ok(self.public_domain_template.replace("%s", rest));
        }

        if raw.trim().is_empty() {
            return Err(PkiError::InputInvalid("identity is empty".to_string()));
        }
        Ok(raw.to_string())
    }
}

/// Expands template tokens and drops duplicates, keeping first occurrences.
/// IP literals come back in canonical textual form.
pub fn resolve_identities(identities: &[String], templates: &DomainTemplates) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(identities.len());

    for raw in identities {
        let expanded = Identity::parse(&templates.expand(raw)?).to_string();
        if seen.insert(expanded.clone()) {
            resolved.push(expanded);
        }
    }
    Ok(resolved)
}

pub fn classify(resolved: &[String]) -> Vec<Identity> {
    resolved.iter().map(|raw| Identity::parse(raw)).collect()
}

/// Sorted, unique form used for comparisons against a certificate's SANs.
pub fn identity_set<'a, I>(identities: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    identities
        .into_iter()
        .map(|raw| Identity::parse(raw).to_string())
        .collect()
}
