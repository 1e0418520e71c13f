//! Settings store
//!
//! Single source of truth for configuration. Bridges the in-memory
//! [`Settings`] object and a [`SettingsBackend`], and fans out every
//! successful load/save to an explicit subscription registry. There is no
//! global singleton: each execution context constructs its own store and
//! hands it to consumers.
//!
//! Every mutating operation performs exactly one backend write (the whole
//! object, never field-level) and one synchronous broadcast in registration
//! order. A failed write is logged and surfaced to the caller; it is never
//! retried, and observers are not notified.

use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::clock::Clock;
use crate::rules;
use crate::storage::{SettingsBackend, StorageError};
use crate::types::{BlockMode, BlockRule, ResultsPerPage, Settings};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid rule pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule already exists: {0}")]
    DuplicateRule(String),
    #[error("invalid settings import: {0}")]
    InvalidImport(String),
    #[error("settings serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Handle returned by [`SettingsStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Aggregate match statistics since some day boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TodayStats {
    /// Lifetime counts of the rules that matched today.
    pub blocked: u64,
    /// Number of rules that matched today.
    pub sites: usize,
}

type Observer = Box<dyn FnMut(&Settings)>;

pub struct SettingsStore<B: SettingsBackend> {
    backend: B,
    clock: Rc<dyn Clock>,
    settings: Settings,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl<B: SettingsBackend> SettingsStore<B> {
    /// Construct a store with default in-memory settings. Call [`load`]
    /// (or seed via mutations) before reading.
    ///
    /// [`load`]: SettingsStore::load
    pub fn new(backend: B, clock: Rc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            settings: Settings::default(),
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Current in-memory settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================================
    // Load / save
    // =========================================================================

    /// Read persisted settings, seed defaults when absent, migrate old data.
    ///
    /// Persisted fields are merged over the default template so fields
    /// introduced after the data was saved appear with their defaults.
    /// Rules missing an `addedAt` are back-filled with the current time.
    /// Broadcasts the result to all observers.
    pub fn load(&mut self) -> Result<&Settings, Error> {
        let stored = self.backend.read()?;
        let mut settings = match stored {
            Some(value) => merge_into_defaults(value),
            None => Settings::default(),
        };

        let now = self.clock.now_ms();
        for rule in &mut settings.blocked_sites {
            if rule.added_at == 0 {
                rule.added_at = now;
            }
        }

        self.settings = settings;
        self.notify();
        Ok(&self.settings)
    }

    /// Apply a partial update and persist the whole object.
    pub fn update(&mut self, apply: impl FnOnce(&mut Settings)) -> Result<(), Error> {
        apply(&mut self.settings);
        self.persist()
    }

    fn persist(&mut self) -> Result<(), Error> {
        let value = serde_json::to_value(&self.settings)?;
        if let Err(err) = self.backend.write(&value) {
            log::error!("failed to persist settings: {err}");
            return Err(err.into());
        }
        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        let settings = &self.settings;
        for (_, observer) in &mut self.observers {
            observer(settings);
        }
    }

    // =========================================================================
    // Rule management
    // =========================================================================

    /// Generate a rule from user input and append it.
    ///
    /// Fails with [`Error::DuplicateRule`] when the generated pattern already
    /// exists and [`Error::InvalidPattern`] when it does not compile; adding
    /// the same effective rule twice leaves exactly one entry.
    pub fn add_rule(&mut self, input: &str, description: Option<&str>) -> Result<BlockRule, Error> {
        let generated = rules::generate(input);

        if self.settings.has_rule(&generated.pattern) {
            return Err(Error::DuplicateRule(generated.pattern));
        }
        if let Err(source) = rules::validate(&generated.pattern) {
            return Err(Error::InvalidPattern {
                pattern: generated.pattern,
                source,
            });
        }

        let description = description
            .map(str::to_string)
            .unwrap_or(generated.description);
        let rule = BlockRule::new(generated.pattern, Some(description), self.clock.now_ms());
        self.settings.blocked_sites.push(rule.clone());
        self.persist()?;
        Ok(rule)
    }

    /// Remove a rule by its exact pattern string. Returns whether a rule was
    /// removed; the object is persisted either way.
    pub fn remove_rule(&mut self, pattern: &str) -> Result<bool, Error> {
        let before = self.settings.blocked_sites.len();
        self.settings.blocked_sites.retain(|r| r.pattern != pattern);
        let removed = self.settings.blocked_sites.len() < before;
        self.persist()?;
        Ok(removed)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Record one match against the rule with this exact pattern.
    ///
    /// Silently a no-op when the pattern is not found: the rule may have
    /// been deleted between match detection and this call, and that count is
    /// accepted as lost.
    pub fn record_match(&mut self, pattern: &str) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let Some(rule) = self
            .settings
            .blocked_sites
            .iter_mut()
            .find(|r| r.pattern == pattern)
        else {
            log::debug!("stat update for unknown rule '{pattern}' dropped");
            return Ok(());
        };

        rule.blocked_count += 1;
        rule.last_blocked = Some(now);
        self.settings.total_blocked += 1;
        self.persist()
    }

    /// Zero every counter and clear last-match times.
    pub fn reset_stats(&mut self) -> Result<(), Error> {
        for rule in &mut self.settings.blocked_sites {
            rule.blocked_count = 0;
            rule.last_blocked = None;
        }
        self.settings.total_blocked = 0;
        self.persist()
    }

    /// Totals over rules whose most recent match is at or after
    /// `day_start_ms` (see [`crate::clock::day_start_utc`]).
    pub fn today_stats(&self, day_start_ms: u64) -> TodayStats {
        let mut stats = TodayStats::default();
        for rule in &self.settings.blocked_sites {
            if rule.last_blocked.is_some_and(|t| t >= day_start_ms) {
                stats.blocked += rule.blocked_count;
                stats.sites += 1;
            }
        }
        stats
    }

    // =========================================================================
    // Toggles and preferences
    // =========================================================================

    /// Flip the enabled flag; returns the new value.
    pub fn toggle_enabled(&mut self) -> Result<bool, Error> {
        self.settings.is_enabled = !self.settings.is_enabled;
        self.persist()?;
        Ok(self.settings.is_enabled)
    }

    pub fn set_block_mode(&mut self, mode: BlockMode) -> Result<(), Error> {
        self.settings.block_mode = mode;
        self.persist()
    }

    pub fn set_results_per_page(&mut self, per_page: ResultsPerPage) -> Result<(), Error> {
        self.settings.search_results_per_page = per_page;
        self.persist()
    }

    // =========================================================================
    // Import / export
    // =========================================================================

    /// Serialize the full settings object as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.settings)?)
    }

    /// Replace settings from exported JSON.
    ///
    /// The payload must carry a `blockedSites` array; anything else is
    /// rejected wholesale without touching current state. Accepted payloads
    /// go through the same field-merge as [`load`], so partial exports from
    /// older versions import cleanly.
    ///
    /// [`load`]: SettingsStore::load
    pub fn import_json(&mut self, text: &str) -> Result<(), Error> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| Error::InvalidImport(err.to_string()))?;

        if !value
            .get("blockedSites")
            .is_some_and(|sites| sites.is_array())
        {
            return Err(Error::InvalidImport(
                "blockedSites must be present and an array".to_string(),
            ));
        }

        let imported = merge_into_defaults(value);
        self.settings = imported;
        self.persist()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register an observer invoked synchronously, in registration order, on
    /// every successful load/save.
    pub fn subscribe(&mut self, observer: impl FnMut(&Settings) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() < before
    }
}

/// Merge a persisted object over the default template, field by field.
///
/// Unknown top-level fields are dropped, known fields override the default,
/// and malformed fields fall back to the default rather than poisoning the
/// rest of the object. Malformed rule entries are skipped individually so one
/// corrupt rule cannot wipe the list.
fn merge_into_defaults(stored: Value) -> Settings {
    let defaults = Settings::default();
    let Value::Object(stored) = stored else {
        log::warn!("persisted settings are not an object; using defaults");
        return defaults;
    };

    // Infallible: Settings serializes to a JSON object.
    let Ok(Value::Object(mut merged)) = serde_json::to_value(&defaults) else {
        return defaults;
    };

    let mut rule_values: Vec<Value> = Vec::new();
    for (key, value) in stored {
        if key == "blockedSites" {
            match value {
                Value::Array(entries) => rule_values = entries,
                _ => log::warn!("persisted blockedSites is not an array; keeping default"),
            }
            continue;
        }
        if merged.contains_key(&key) {
            merged.insert(key, value);
        }
    }

    let mut settings: Settings = match serde_json::from_value(Value::Object(merged.clone())) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("persisted settings are malformed ({err}); re-merging field by field");
            recover_fields(merged)
        }
    };

    settings.blocked_sites = rule_values
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<BlockRule>(entry) {
            Ok(rule) => Some(rule),
            Err(err) => {
                log::warn!("skipping malformed stored rule: {err}");
                None
            }
        })
        .collect();

    settings
}

/// Second-chance merge: drop each field that fails to deserialize on its own.
fn recover_fields(merged: serde_json::Map<String, Value>) -> Settings {
    let Ok(Value::Object(defaults)) = serde_json::to_value(Settings::default()) else {
        return Settings::default();
    };

    let mut repaired = defaults.clone();
    for (key, default_value) in defaults {
        let Some(candidate) = merged.get(&key) else {
            continue;
        };
        repaired.insert(key.clone(), candidate.clone());
        if serde_json::from_value::<Settings>(Value::Object(repaired.clone())).is_err() {
            repaired.insert(key, default_value);
        }
    }

    serde_json::from_value(Value::Object(repaired)).unwrap_or_default()
}
