// src/editions.rs

use crate::models::TOTAL_PAGES;
use serde::{Deserialize, Serialize};

/// A named set of page images with its own remote location and file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub id: String,
    /// Base URL every page number is appended to.
    pub provider: String,
    /// Cache namespace; unique per edition.
    pub partition: String,
    /// File extension including the leading dot, e.g. `.png`.
    pub extension: String,
    #[serde(default = "default_total_units")]
    pub total_units: u16,
}

fn default_total_units() -> u16 {
    TOTAL_PAGES
}

impl Edition {
    pub fn new(id: &str, provider: &str, partition: &str, extension: &str) -> Self {
        Self {
            id: id.to_owned(),
            provider: provider.to_owned(),
            partition: partition.to_owned(),
            extension: extension.to_owned(),
            total_units: TOTAL_PAGES,
        }
    }

    /// Canonical remote URL of a page: base, zero-padded 3-digit number, extension.
    pub fn page_url(&self, unit: u16) -> String {
        format!("{}{:03}{}", self.provider, unit, self.extension)
    }

    pub fn units(&self) -> impl Iterator<Item = u16> {
        1..=self.total_units
    }
}

/// Lookup table from edition id to its descriptor.
///
/// Unknown ids resolve to the default edition.
#[derive(Debug, Clone)]
pub struct EditionRegistry {
    editions: Vec<Edition>,
    default_index: usize,
}

impl EditionRegistry {
    /// Builds a registry from a table. Falls back to the first entry when
    /// `default_id` is not in the table. Returns `None` for an empty table.
    pub fn new(editions: Vec<Edition>, default_id: &str) -> Option<Self> {
        if editions.is_empty() {
            return None;
        }
        let default_index = editions
            .iter()
            .position(|e| e.id == default_id)
            .unwrap_or(0);
        Some(Self {
            editions,
            default_index,
        })
    }

    /// The editions shipped with the application.
    pub fn builtin() -> Self {
        Self {
            editions: builtin_editions(),
            default_index: 0,
        }
    }

    /// Same table as [`builtin`](Self::builtin) with a different default.
    pub fn with_default(mut self, default_id: &str) -> Self {
        if let Some(index) = self.editions.iter().position(|e| e.id == default_id) {
            self.default_index = index;
        }
        self
    }

    pub fn default_edition(&self) -> &Edition {
        &self.editions[self.default_index]
    }

    /// Resolves an id, or the default when `id` is `None` or unknown.
    pub fn get(&self, id: Option<&str>) -> &Edition {
        id.and_then(|id| self.editions.iter().find(|e| e.id == id))
            .unwrap_or_else(|| self.default_edition())
    }

    pub fn all(&self) -> &[Edition] {
        &self.editions
    }
}

impl Default for EditionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_editions() -> Vec<Edition> {
    vec![
        Edition::new(
            "madani",
            "https://raw.githubusercontent.com/GovarJabbar/Quran-PNG/master/",
            "madani",
            ".png",
        ),
        Edition::new(
            "tajweed",
            "https://www.searchtruth.org/quran/images2/large/page-",
            "tajweed",
            ".jpeg",
        ),
    ]
}
