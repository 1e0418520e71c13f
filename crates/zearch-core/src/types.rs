//! Core type definitions for Zearch
//!
//! These types map directly to the JSON object the extension persists under
//! its settings key, so every serde name here is part of the stored format.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Settings schema version written into fresh settings objects.
pub const SETTINGS_VERSION: &str = "0.0.1";

// =============================================================================
// Block rules
// =============================================================================

/// A user-defined block rule.
///
/// The persisted field is called `domain` for compatibility with the
/// extension's historical storage shape, but it always holds a regular
/// expression pattern produced by [`crate::rules::generate`] (or supplied
/// verbatim by the user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BlockRule {
    /// Regex pattern matched against result hostnames.
    #[serde(rename = "domain")]
    pub pattern: String,
    /// All-time number of results this rule has matched.
    #[serde(default)]
    pub blocked_count: u64,
    /// Creation time, milliseconds since the Unix epoch. Zero means unknown;
    /// the store back-fills it on load.
    #[serde(default)]
    pub added_at: u64,
    /// Time of the most recent match, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_blocked: Option<u64>,
    /// Always true for generated rules; kept for stored-data compatibility.
    #[serde(default)]
    pub is_regex: bool,
    /// Human-readable label shown in the rule list and notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BlockRule {
    /// Create a fresh rule with zero counters.
    pub fn new(pattern: String, description: Option<String>, added_at: u64) -> Self {
        Self {
            pattern,
            blocked_count: 0,
            added_at,
            last_blocked: None,
            is_regex: true,
            description,
        }
    }

    /// Display label: the description when present, the pattern otherwise.
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.pattern)
    }
}

// =============================================================================
// Display treatment mode
// =============================================================================

/// How a matched search result is treated on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum BlockMode {
    /// Remove the result from layout.
    #[default]
    Hide,
    /// Keep the result visible but dimmed, with an indicator overlay.
    Dim,
    /// Swap the result's content for a placeholder offering to restore it.
    Replace,
}

impl BlockMode {
    /// Parse from the lowercase wire/CLI form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hide" => Some(Self::Hide),
            "dim" => Some(Self::Dim),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Dim => "dim",
            Self::Replace => "replace",
        }
    }
}

// =============================================================================
// Results-per-page preference
// =============================================================================

/// Allowed values for the search engine's `num` parameter.
///
/// Serializes as the plain integer (10/20/50/100) the stored settings use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(try_from = "u32", into = "u32")]
#[ts(export, as = "u32")]
pub enum ResultsPerPage {
    #[default]
    Ten,
    Twenty,
    Fifty,
    Hundred,
}

impl ResultsPerPage {
    pub const fn count(&self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Fifty => 50,
            Self::Hundred => 100,
        }
    }
}

impl TryFrom<u32> for ResultsPerPage {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            50 => Ok(Self::Fifty),
            100 => Ok(Self::Hundred),
            other => Err(format!("results per page must be 10, 20, 50 or 100, got {other}")),
        }
    }
}

impl From<ResultsPerPage> for u32 {
    fn from(value: ResultsPerPage) -> Self {
        value.count()
    }
}

// =============================================================================
// Settings
// =============================================================================

/// The full persisted settings object.
///
/// Invariant: `total_blocked` is at least the sum of every rule's
/// `blocked_count` at any settled state. Counts for rules deleted between a
/// match and its stat update are dropped silently, so the global counter can
/// run ahead of the per-rule sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Settings {
    /// Master switch for filtering.
    pub is_enabled: bool,
    /// Active rules; insertion order is display order and match priority.
    pub blocked_sites: Vec<BlockRule>,
    /// Running all-time match counter.
    pub total_blocked: u64,
    pub block_mode: BlockMode,
    pub show_notifications: bool,
    pub search_results_per_page: ResultsPerPage,
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            blocked_sites: Vec::new(),
            total_blocked: 0,
            block_mode: BlockMode::Hide,
            show_notifications: true,
            search_results_per_page: ResultsPerPage::Ten,
            version: SETTINGS_VERSION.to_string(),
        }
    }
}

impl Settings {
    /// Look up a rule by its exact pattern string.
    pub fn rule(&self, pattern: &str) -> Option<&BlockRule> {
        self.blocked_sites.iter().find(|r| r.pattern == pattern)
    }

    /// True if a rule with this exact pattern already exists.
    pub fn has_rule(&self, pattern: &str) -> bool {
        self.rule(pattern).is_some()
    }
}
