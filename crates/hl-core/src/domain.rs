use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{GENERAL_DOMAIN_CODE, GENERAL_DOMAIN_NAME};

/// Known domain codes and their display names.
///
/// The General domain is always present. Lookups for codes outside the
/// catalogue fall back to the code itself as the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DomainCatalog {
    names: BTreeMap<String, String>,
}

impl Default for DomainCatalog {
    fn default() -> Self {
        Self::from(BTreeMap::new())
    }
}

impl From<BTreeMap<String, String>> for DomainCatalog {
    fn from(mut names: BTreeMap<String, String>) -> Self {
        names.insert(GENERAL_DOMAIN_CODE.to_string(), GENERAL_DOMAIN_NAME.to_string());
        Self { names }
    }
}

impl From<DomainCatalog> for BTreeMap<String, String> {
    fn from(catalog: DomainCatalog) -> Self {
        catalog.names
    }
}

impl DomainCatalog {
    pub fn insert(&mut self, code: &str, name: &str) {
        if code == GENERAL_DOMAIN_CODE {
            return;
        }
        self.names.insert(code.to_string(), name.to_string());
    }

    pub fn contains(&self, code: &str) -> bool {
        self.names.contains_key(code)
    }

    pub fn name_for(&self, code: &str) -> String {
        self.names
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
