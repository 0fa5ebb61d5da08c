//! Category registry: the ordered, case-insensitively unique taxonomy

use crate::error::{LabelerError, Result};
use serde::{Deserialize, Serialize};

/// Sentinel category that is always valid and never listed in the config
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Ordered set of valid category names
///
/// Passed by reference into every component that needs it, so several
/// taxonomies can coexist (e.g. one per test) without shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryRegistry {
    categories: Vec<String>,
}

impl CategoryRegistry {
    /// Build a registry, rejecting empty names and case-insensitive duplicates
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self {
            categories: Vec::new(),
        };
        for name in names {
            let name = name.into();
            if !registry.insert(&name)? {
                return Err(LabelerError::ConfigError(format!(
                    "Duplicate category '{}'",
                    name
                )));
            }
        }
        Ok(registry)
    }

    /// Add a category at the end. Returns `Ok(false)` if a category with the
    /// same name (ignoring case) is already present.
    pub fn insert(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LabelerError::ConfigError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if self.contains_ignore_case(name) {
            return Ok(false);
        }
        self.categories.push(name.to_string());
        Ok(true)
    }

    /// Configured categories, in order, without the sentinel
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Configured categories followed by `Uncategorized`
    pub fn with_sentinel(&self) -> Vec<&str> {
        self.categories
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(UNCATEGORIZED))
            .collect()
    }

    /// Exact, case-sensitive membership (sentinel included)
    pub fn contains_exact(&self, name: &str) -> bool {
        name == UNCATEGORIZED || self.categories.iter().any(|c| c == name)
    }

    /// Case-insensitive membership (sentinel included)
    pub fn contains_ignore_case(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(UNCATEGORIZED)
            || self.categories.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self {
            categories: default_categories(),
        }
    }
}

impl TryFrom<Vec<String>> for CategoryRegistry {
    type Error = LabelerError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<CategoryRegistry> for Vec<String> {
    fn from(registry: CategoryRegistry) -> Self {
        registry.categories
    }
}

fn default_categories() -> Vec<String> {
    [
        "Work",
        "Personal",
        "Finance",
        "Promotions",
        "Spam",
        "Social",
        "Updates",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}
