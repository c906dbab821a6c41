//! Location-to-module lookup.
//!
//! Zoho adjustments name a location (or warehouse) per line item. Outlet stock
//! is keyed by *module*: the physical outlet or kitchen that holds it. The
//! association between the two is a static table, optionally replaced at
//! startup from configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Built-in association table: Zoho location name → module.
const DEFAULT_LOCATION_MODULES: &[(&str, &str)] = &[
    ("Central Kitchen", "central_kitchen"),
    ("Main Warehouse", "warehouse"),
    ("Downtown Outlet", "downtown"),
    ("Mall Outlet", "mall"),
    ("Airport Outlet", "airport"),
];

/// A physical outlet or kitchen holding stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Module(String);

impl Module {
    /// Create a module from its identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The module identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors building a location-to-module table.
#[derive(Debug, Error)]
pub enum ModuleMapError {
    #[error("invalid location module map JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("location module map entry has an empty {0}")]
    EmptyEntry(&'static str),
    #[error("location \"{0}\" is mapped more than once")]
    DuplicateLocation(String),
}

/// Case- and whitespace-insensitive lookup from Zoho location names to modules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationModuleMap {
    entries: HashMap<String, Module>,
}

impl LocationModuleMap {
    /// Build a table from `(location, module)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `ModuleMapError` if an entry is blank or a location appears
    /// twice after normalization.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ModuleMapError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries = HashMap::new();
        for (location, module) in pairs {
            let key = normalize(location);
            if key.is_empty() {
                return Err(ModuleMapError::EmptyEntry("location"));
            }
            let module = module.trim();
            if module.is_empty() {
                return Err(ModuleMapError::EmptyEntry("module"));
            }
            if entries.insert(key, Module::new(module)).is_some() {
                return Err(ModuleMapError::DuplicateLocation(location.trim().to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// Parse a JSON object of `{"Location name": "module"}`.
    ///
    /// # Errors
    ///
    /// Returns `ModuleMapError` if the JSON is malformed or an entry is invalid.
    pub fn from_json(json: &str) -> Result<Self, ModuleMapError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        Self::from_pairs(raw.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Resolve a Zoho location name to its module.
    #[must_use]
    pub fn resolve(&self, location: &str) -> Option<&Module> {
        self.entries.get(&normalize(location))
    }

    /// Number of mapped locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LocationModuleMap {
    fn default() -> Self {
        let entries = DEFAULT_LOCATION_MODULES
            .iter()
            .map(|(location, module)| (normalize(location), Module::new(*module)))
            .collect();
        Self { entries }
    }
}

fn normalize(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_resolves_known_locations() {
        let map = LocationModuleMap::default();
        assert_eq!(map.len(), DEFAULT_LOCATION_MODULES.len());
        assert_eq!(
            map.resolve("Central Kitchen").map(Module::as_str),
            Some("central_kitchen")
        );
    }

    #[test]
    fn test_resolve_ignores_case_and_spacing() {
        let map = LocationModuleMap::default();
        assert_eq!(
            map.resolve("  central   KITCHEN ").map(Module::as_str),
            Some("central_kitchen")
        );
        assert!(map.resolve("Unknown Location").is_none());
    }

    #[test]
    fn test_from_json() {
        let map = LocationModuleMap::from_json(r#"{"Harbour Front": "harbour"}"#).unwrap();
        assert_eq!(map.resolve("harbour front").map(Module::as_str), Some("harbour"));
        assert!(map.resolve("Central Kitchen").is_none());
    }

    #[test]
    fn test_from_pairs_rejects_duplicates_after_normalization() {
        let err = LocationModuleMap::from_pairs([("Outlet A", "a"), ("outlet  a", "b")]).unwrap_err();
        assert!(matches!(err, ModuleMapError::DuplicateLocation(_)));
    }

    #[test]
    fn test_from_pairs_rejects_blank_entries() {
        assert!(matches!(
            LocationModuleMap::from_pairs([("  ", "a")]),
            Err(ModuleMapError::EmptyEntry("location"))
        ));
        assert!(matches!(
            LocationModuleMap::from_pairs([("Outlet A", " ")]),
            Err(ModuleMapError::EmptyEntry("module"))
        ));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(
            LocationModuleMap::from_json("[1, 2]"),
            Err(ModuleMapError::Json(_))
        ));
    }
}
