//! WebAssembly bindings for Zearch
//!
//! The extension keeps its DOM and `chrome.*` access in JavaScript and calls
//! into this module for everything else. The settings store lives in a
//! thread-local engine instance backed by memory; the JS side seeds it with
//! [`init`] at context startup and persists [`settings_json`] back to
//! extension storage after each mutation (extension storage is
//! last-write-wins, so handing over whole objects matches its semantics).

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;

use zearch_core::clock::Clock;
use zearch_core::scanner::{PageSnapshot, ScanOutcome, ScanTrigger, Scanner};
use zearch_core::storage::MemoryBackend;
use zearch_core::{BlockMode, ResultsPerPage, SettingsStore};

/// Millisecond clock backed by `Date.now()`.
struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }
}

thread_local! {
    static STORE: RefCell<SettingsStore<MemoryBackend>> = RefCell::new(SettingsStore::new(
        MemoryBackend::new(),
        Rc::new(JsClock),
    ));
}

fn with_store<R>(f: impl FnOnce(&mut SettingsStore<MemoryBackend>) -> R) -> R {
    STORE.with(|store| f(&mut store.borrow_mut()))
}

fn warn(context: &str, err: impl std::fmt::Display) {
    web_sys::console::warn_1(&JsValue::from_str(&format!("zearch: {context}: {err}")));
}

/// Round-trip a serde-serializable value into a JS object.
fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("serialization failed: {e}")))?;
    js_sys::JSON::parse(&json)
}

fn from_js<T: serde::de::DeserializeOwned>(value: &JsValue) -> Result<T, JsValue> {
    let json: String = js_sys::JSON::stringify(value)
        .map(String::from)
        .map_err(|_| JsValue::from_str("value is not JSON-serializable"))?;
    serde_json::from_str(&json).map_err(|e| JsValue::from_str(&format!("invalid value: {e}")))
}

// =============================================================================
// Settings store surface
// =============================================================================

/// Seed the store from the JSON persisted in extension storage, or from
/// defaults when nothing is stored yet.
#[wasm_bindgen]
pub fn init(settings_json: Option<String>) -> Result<(), JsValue> {
    STORE.with(|store| {
        let backend = match settings_json {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => MemoryBackend::with_value(value),
                Err(err) => {
                    // Corrupt stored data falls back to defaults
                    warn("init", err);
                    MemoryBackend::new()
                }
            },
            None => MemoryBackend::new(),
        };
        let mut fresh = SettingsStore::new(backend, Rc::new(JsClock));
        fresh
            .load()
            .map_err(|e| JsValue::from_str(&format!("failed to load settings: {e}")))?;
        *store.borrow_mut() = fresh;
        Ok(())
    })
}

/// Current settings as a JS object (the shape persisted to storage).
#[wasm_bindgen]
pub fn get_settings() -> Result<JsValue, JsValue> {
    with_store(|store| to_js(store.settings()))
}

/// Current settings as compact JSON, for writing back to extension storage.
#[wasm_bindgen]
pub fn settings_json() -> String {
    with_store(|store| serde_json::to_string(store.settings()).unwrap_or_else(|_| "{}".into()))
}

#[wasm_bindgen]
pub fn add_blocked_site(input: &str, description: Option<String>) -> bool {
    with_store(|store| match store.add_rule(input, description.as_deref()) {
        Ok(_) => true,
        Err(err) => {
            warn("add_blocked_site", err);
            false
        }
    })
}

#[wasm_bindgen]
pub fn remove_blocked_site(pattern: &str) -> bool {
    with_store(|store| match store.remove_rule(pattern) {
        Ok(removed) => removed,
        Err(err) => {
            warn("remove_blocked_site", err);
            false
        }
    })
}

/// Record one match for the rule with this exact pattern. Missing rules are
/// an accepted no-op.
#[wasm_bindgen]
pub fn record_match(pattern: &str) -> bool {
    with_store(|store| match store.record_match(pattern) {
        Ok(()) => true,
        Err(err) => {
            warn("record_match", err);
            false
        }
    })
}

/// Flip the master switch and return the new value. The content script must
/// mirror the result into its [`ContentFilter`] via `set_enabled` so treated
/// nodes are reverted and rescans re-armed; `scan` itself stays empty while
/// the store is disabled.
#[wasm_bindgen]
pub fn toggle_enabled() -> bool {
    with_store(|store| match store.toggle_enabled() {
        Ok(enabled) => enabled,
        Err(err) => {
            warn("toggle_enabled", err);
            store.settings().is_enabled
        }
    })
}

#[wasm_bindgen]
pub fn reset_stats() -> bool {
    with_store(|store| match store.reset_stats() {
        Ok(()) => true,
        Err(err) => {
            warn("reset_stats", err);
            false
        }
    })
}

#[wasm_bindgen]
pub fn set_block_mode(mode: &str) -> bool {
    let Some(mode) = BlockMode::parse(mode) else {
        return false;
    };
    with_store(|store| match store.set_block_mode(mode) {
        Ok(()) => true,
        Err(err) => {
            warn("set_block_mode", err);
            false
        }
    })
}

#[wasm_bindgen]
pub fn set_results_per_page(count: u32) -> bool {
    let Ok(per_page) = ResultsPerPage::try_from(count) else {
        return false;
    };
    with_store(|store| match store.set_results_per_page(per_page) {
        Ok(()) => true,
        Err(err) => {
            warn("set_results_per_page", err);
            false
        }
    })
}

#[wasm_bindgen]
pub fn export_settings() -> Result<String, JsValue> {
    with_store(|store| {
        store
            .export_json()
            .map_err(|e| JsValue::from_str(&format!("export failed: {e}")))
    })
}

#[wasm_bindgen]
pub fn import_settings(text: &str) -> bool {
    with_store(|store| match store.import_json(text) {
        Ok(()) => true,
        Err(err) => {
            warn("import_settings", err);
            false
        }
    })
}

/// Today's totals: `{ blocked, sites }` over rules that matched since the
/// most recent UTC midnight.
#[wasm_bindgen]
pub fn today_stats() -> Result<JsValue, JsValue> {
    let day_start = zearch_core::clock::day_start_utc(JsClock.now_ms());
    let stats = with_store(|store| store.today_stats(day_start));
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"blocked".into(), &JsValue::from(stats.blocked as f64));
    let _ = js_sys::Reflect::set(&result, &"sites".into(), &JsValue::from(stats.sites as u32));
    Ok(result.into())
}

// =============================================================================
// Rule matching surface
// =============================================================================

/// Translate user input into `{ pattern, description }` without adding it.
#[wasm_bindgen]
pub fn generate_rule(input: &str) -> JsValue {
    let generated = zearch_core::rules::generate(input);
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"pattern".into(), &JsValue::from_str(&generated.pattern));
    let _ = js_sys::Reflect::set(
        &result,
        &"description".into(),
        &JsValue::from_str(&generated.description),
    );
    result.into()
}

/// Evaluate a hostname against the active rules. Returns
/// `{ pattern, label }` for the first match, or `null`.
#[wasm_bindgen]
pub fn evaluate_hostname(hostname: &str) -> JsValue {
    with_store(|store| {
        match zearch_core::rules::evaluate(hostname, &store.settings().blocked_sites) {
            Some(rule) => {
                let result = js_sys::Object::new();
                let _ = js_sys::Reflect::set(&result, &"pattern".into(), &JsValue::from_str(&rule.pattern));
                let _ = js_sys::Reflect::set(&result, &"label".into(), &JsValue::from_str(rule.label()));
                result.into()
            }
            None => JsValue::NULL,
        }
    })
}

// =============================================================================
// URL helpers
// =============================================================================

/// Rewritten search URL carrying the requested `num` parameter, or `null`
/// when no rewrite is needed.
#[wasm_bindgen]
pub fn results_page_url(url: &str, per_page: u32) -> Option<String> {
    zearch_core::url::set_results_per_page(url, per_page)
}

#[wasm_bindgen]
pub fn is_blockable_url(url: &str) -> bool {
    zearch_core::url::is_blockable_url(url)
}

// =============================================================================
// Content filter
// =============================================================================

/// Per-page scan driver for the content script.
///
/// The script forwards DOM events as triggers, polls [`scan_due`] from its
/// timer, snapshots candidate containers when a scan is due, and applies the
/// returned actions to the DOM.
///
/// [`scan_due`]: ContentFilter::scan_due
#[wasm_bindgen]
pub struct ContentFilter {
    scanner: Scanner,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl ContentFilter {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            scanner: Scanner::new(),
        }
    }

    /// `kind`: "load" | "mutation" | "scroll" | "visibility".
    pub fn note_trigger(&mut self, kind: &str, now: f64) {
        let trigger = match kind {
            "load" => ScanTrigger::InitialLoad,
            "mutation" => ScanTrigger::Mutation,
            "scroll" => ScanTrigger::Scroll,
            "visibility" => ScanTrigger::VisibilityRegained,
            _ => return,
        };
        self.scanner.note_trigger(trigger, now as u64);
    }

    pub fn scan_due(&mut self, now: f64) -> bool {
        self.scanner.scan_due(now as u64)
    }

    /// Earliest pending deadline, for scheduling the next poll.
    pub fn next_deadline(&self) -> Option<f64> {
        self.scanner.next_deadline().map(|d| d as f64)
    }

    /// Run one scan pass over a page snapshot (see `PageSnapshot` in the
    /// core crate for the expected shape). Returns the scan outcome with
    /// `actions` and `stats` arrays. Empty while the store's enabled flag is
    /// off, whatever this filter's own flag says.
    pub fn scan(&mut self, page: JsValue, now: f64) -> Result<JsValue, JsValue> {
        let snapshot: PageSnapshot = from_js(&page)?;
        let outcome = with_store(|store| {
            let settings = store.settings();
            if !settings.is_enabled {
                return ScanOutcome::default();
            }
            self.scanner.scan(
                &snapshot,
                &settings.blocked_sites,
                settings.block_mode,
                now as u64,
            )
        });
        to_js(&outcome)
    }

    /// Returns the node ids whose treatments must be reverted (non-empty
    /// only when disabling).
    pub fn set_enabled(&mut self, enabled: bool, now: f64) -> Result<JsValue, JsValue> {
        let reverts = self.scanner.set_enabled(enabled, now as u64);
        to_js(&reverts)
    }

    /// One batched notification per scan burst, or `null` while the window
    /// is still open.
    pub fn take_notification(&mut self, now: f64) -> Result<JsValue, JsValue> {
        match self.scanner.take_notification(now as u64) {
            Some(batch) => to_js(&batch),
            None => Ok(JsValue::NULL),
        }
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn test_generate_rule_shape() {
        let value = generate_rule("example.com");
        let pattern = js_sys::Reflect::get(&value, &"pattern".into())
            .unwrap()
            .as_string()
            .unwrap();
        assert_eq!(pattern, "(^|\\.)example\\.com$");
    }

    #[wasm_bindgen_test]
    fn test_content_filter_debounce() {
        let mut filter = ContentFilter::new();
        filter.note_trigger("mutation", 0.0);
        filter.note_trigger("mutation", 100.0);
        assert!(!filter.scan_due(200.0));
        assert!(filter.scan_due(250.0));
        assert!(!filter.scan_due(251.0));
    }

    #[wasm_bindgen_test]
    fn test_scan_is_empty_while_store_disabled() {
        init(None).unwrap();
        assert!(add_blocked_site("example.com", None));
        assert!(!toggle_enabled()); // switched off

        let page = js_sys::JSON::parse(
            r#"{"origin":"https://www.google.com","groups":[{"selector":"div.g","nodes":[{"id":1,"href":"https://example.com/a"}]}]}"#,
        )
        .unwrap();
        let mut filter = ContentFilter::new();
        let outcome = filter.scan(page.clone(), 0.0).unwrap();
        let actions = js_sys::Reflect::get(&outcome, &"actions".into()).unwrap();
        assert_eq!(js_sys::Array::from(&actions).length(), 0);

        assert!(toggle_enabled()); // back on
        let outcome = filter.scan(page, 1.0).unwrap();
        let actions = js_sys::Reflect::get(&outcome, &"actions".into()).unwrap();
        assert_eq!(js_sys::Array::from(&actions).length(), 1);
    }

    #[wasm_bindgen_test]
    fn test_store_round_trip() {
        init(None).unwrap();
        assert!(add_blocked_site("example.com", None));
        assert!(!add_blocked_site("example.com", None)); // duplicate
        let matched = evaluate_hostname("blog.example.com");
        assert!(!matched.is_null());
        assert!(remove_blocked_site("(^|\\.)example\\.com$"));
        assert!(evaluate_hostname("blog.example.com").is_null());
    }
}
