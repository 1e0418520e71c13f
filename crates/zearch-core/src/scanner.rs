//! Page-scan decision engine
//!
//! The scanner classifies search-result containers against the active rule
//! set and decides a display treatment for each match. It never touches a
//! DOM: the host (the extension's content script, or a test double) presents
//! the page through the [`SearchPage`] trait and applies the returned
//! actions. This keeps the matching logic independent of the observation
//! mechanism: mutation observers, scroll handlers and visibility events all
//! collapse into [`ScanTrigger`]s.
//!
//! One `Scanner` instance serves one page for its lifetime. Node ids are
//! host-assigned and must stay stable across scans.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::debounce::Debounce;
use crate::rules;
use crate::types::{BlockMode, BlockRule};
use crate::url::resolve_hostname;

// =============================================================================
// Host-page contract
// =============================================================================

/// Structural selectors tried in order when discovering result containers.
/// Earlier entries are more specific; the first one yielding any nodes wins.
/// Best-effort against host markup drift, not a guaranteed contract.
pub const RESULT_SELECTORS: &[&str] = &[
    "div.g",
    "div[data-hveid]",
    "div[jscontroller]",
    "div[jsname]",
    "div[data-ved]",
    "div[jsaction]",
    ".srg > div",
    ".rc",
];

/// Ancestor selectors marking page chrome (navigation, pagination, ads).
/// A container inside any of these is not a result, whatever it looks like.
pub const CHROME_SELECTORS: &[&str] = &[
    "#searchform",
    "#appbar",
    "#botstuff",
    "#footcnt",
    "[role=\"navigation\"]",
    "#tads",
    "#bottomads",
];

/// Shape of a DOM node added by a mutation, for filtering the mutation
/// stream before it ever reaches the scanner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeShape {
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Attribute names present on the node.
    #[serde(default)]
    pub attrs: Vec<String>,
}

/// Predicate over an added node's shape: does it look like a result
/// container? Mirrors [`RESULT_SELECTORS`] minus the structural ones a bare
/// node cannot answer.
pub fn matches_result_shape(shape: &NodeShape) -> bool {
    let has_class = |c: &str| shape.classes.iter().any(|x| x == c);
    if has_class("rc") {
        return true;
    }
    if !shape.tag.eq_ignore_ascii_case("div") {
        return false;
    }
    has_class("g")
        || shape.attrs.iter().any(|a| {
            matches!(
                a.as_str(),
                "data-hveid" | "jscontroller" | "jsname" | "data-ved" | "jsaction"
            )
        })
}

/// Host-assigned stable identifier for a page node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Read-only view of a search results page.
pub trait SearchPage {
    /// Page origin, e.g. `https://www.google.com`.
    fn origin(&self) -> &str;

    /// Nodes matching a selector, in document order.
    fn query(&self, selector: &str) -> Vec<NodeId>;

    /// `href` of the node's first anchor, if any.
    fn anchor_href(&self, node: NodeId) -> Option<String>;

    /// Whether the node sits inside page chrome (see [`CHROME_SELECTORS`]).
    fn is_chrome(&self, node: NodeId) -> bool;
}

// =============================================================================
// Treatments and actions
// =============================================================================

/// Display treatment applied to a matched result. The host renders these;
/// the parameters carry everything it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Treatment {
    /// Remove the container from layout.
    Hide,
    /// Keep it visible but faded, with an indicator overlay.
    Dim { opacity: f32, scale: f32, grayscale: bool },
    /// Swap the subtree for a placeholder that offers to restore it.
    Replace { restorable: bool },
}

impl Treatment {
    pub fn for_mode(mode: BlockMode) -> Self {
        match mode {
            BlockMode::Hide => Self::Hide,
            BlockMode::Dim => Self::Dim {
                opacity: 0.3,
                scale: 0.95,
                grayscale: true,
            },
            BlockMode::Replace => Self::Replace { restorable: true },
        }
    }
}

/// One decision for one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAction {
    pub node: NodeId,
    pub treatment: Treatment,
    /// Pattern of the rule that matched; the host tags the container with it.
    pub pattern: String,
    /// Display label for indicators and placeholders.
    pub label: String,
}

/// Result of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// Treatments to apply, in document order.
    pub actions: Vec<NodeAction>,
    /// Patterns to report as stat updates, one entry per matched result.
    pub stats: Vec<String>,
    /// Selector that yielded the container set, when any did.
    pub selector: Option<String>,
}

/// Accumulated matches flushed as one notification per scan burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationBatch {
    /// Label -> match count, in first-seen order.
    pub domains: Vec<(String, u32)>,
    pub total: u32,
    pub message: String,
}

// =============================================================================
// Scan triggers and timing
// =============================================================================

/// Events that can lead to a re-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// Page just loaded; wait a fixed settle delay before the first pass.
    InitialLoad,
    /// A mutation batch added a node matching the result heuristic.
    Mutation,
    /// The page scrolled (incremental result loading).
    Scroll,
    /// The page became visible again.
    VisibilityRegained,
}

/// Settle delay after load/visibility before scanning.
pub const SETTLE_DELAY_MS: u64 = 100;
/// Debounce window collapsing a burst of mutations into one scan.
pub const MUTATION_DEBOUNCE_MS: u64 = 150;
/// Scroll fires far more often than mutation, so its window is longer.
pub const SCROLL_DEBOUNCE_MS: u64 = 300;
/// Window for batching match notifications, reset on every new match.
pub const NOTIFY_DEBOUNCE_MS: u64 = 500;

// =============================================================================
// Scanner
// =============================================================================

/// Per-page scan state machine: idle between passes, scanning inside
/// [`Scanner::scan`], disabled when the extension is switched off.
pub struct Scanner {
    enabled: bool,
    /// Containers already visited; at most one visit per container unless
    /// cleanup unmarks it.
    processed: HashSet<NodeId>,
    /// Treated containers and the pattern that matched them.
    treated: HashMap<NodeId, String>,
    settle: Debounce,
    mutation: Debounce,
    scroll: Debounce,
    notify: Debounce,
    pending_notify: Vec<(String, u32)>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            enabled: true,
            processed: HashSet::new(),
            treated: HashMap::new(),
            settle: Debounce::new(SETTLE_DELAY_MS),
            mutation: Debounce::new(MUTATION_DEBOUNCE_MS),
            scroll: Debounce::new(SCROLL_DEBOUNCE_MS),
            notify: Debounce::new(NOTIFY_DEBOUNCE_MS),
            pending_notify: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Note a re-scan trigger. Ignored while disabled.
    pub fn note_trigger(&mut self, trigger: ScanTrigger, now: u64) {
        if !self.enabled {
            return;
        }
        match trigger {
            ScanTrigger::InitialLoad | ScanTrigger::VisibilityRegained => {
                self.settle.trigger(now)
            }
            ScanTrigger::Mutation => self.mutation.trigger(now),
            ScanTrigger::Scroll => self.scroll.trigger(now),
        }
    }

    /// True when at least one armed window has elapsed. All elapsed windows
    /// drain together, so a poll that returns true accounts for every
    /// trigger seen so far: N triggers in a window mean one scan.
    pub fn scan_due(&mut self, now: u64) -> bool {
        if !self.enabled {
            return false;
        }
        // Evaluate all three; short-circuiting would leave a window armed.
        let settle = self.settle.fire(now);
        let mutation = self.mutation.fire(now);
        let scroll = self.scroll.fire(now);
        settle || mutation || scroll
    }

    /// Earliest pending deadline across all windows, for host scheduling.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.settle.deadline(),
            self.mutation.deadline(),
            self.scroll.deadline(),
            self.notify.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// One scan pass over the page.
    ///
    /// Containers are discovered with the first selector that yields any
    /// nodes. Each unprocessed, non-chrome container is visited exactly once:
    /// its first anchor is resolved to a hostname and evaluated against the
    /// rules; a match produces a [`NodeAction`] plus a stat entry and feeds
    /// the notification batch. Containers with no anchor or an unresolvable
    /// href are skipped without error.
    pub fn scan(
        &mut self,
        page: &impl SearchPage,
        rules_list: &[BlockRule],
        mode: BlockMode,
        now: u64,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        if !self.enabled {
            return outcome;
        }

        let mut containers = Vec::new();
        for selector in RESULT_SELECTORS {
            containers = page.query(selector);
            if !containers.is_empty() {
                outcome.selector = Some((*selector).to_string());
                break;
            }
        }

        for node in containers {
            if self.processed.contains(&node) {
                continue;
            }
            // Chrome containers are excluded entirely, not processed-marked:
            // a later scan may see them re-parented into a result slot.
            if page.is_chrome(node) {
                continue;
            }
            self.processed.insert(node);

            let Some(href) = page.anchor_href(node) else {
                continue;
            };
            let Some(hostname) = resolve_hostname(&href, page.origin()) else {
                continue;
            };

            let Some(rule) = rules::evaluate(&hostname, rules_list) else {
                continue;
            };

            let label = rule.label().to_string();
            log::debug!("blocked {hostname} via '{}'", rule.pattern);

            outcome.actions.push(NodeAction {
                node,
                treatment: Treatment::for_mode(mode),
                pattern: rule.pattern.clone(),
                label: label.clone(),
            });
            outcome.stats.push(rule.pattern.clone());
            self.treated.insert(node, rule.pattern.clone());
            self.note_match(label, now);
        }

        outcome
    }

    fn note_match(&mut self, label: String, now: u64) {
        match self.pending_notify.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => self.pending_notify.push((label, 1)),
        }
        self.notify.trigger(now);
    }

    /// Flush the accumulated match counts as one notification, when the
    /// batching window has elapsed. At most one batch per scan burst.
    pub fn take_notification(&mut self, now: u64) -> Option<NotificationBatch> {
        if !self.notify.fire(now) || self.pending_notify.is_empty() {
            return None;
        }
        let domains = std::mem::take(&mut self.pending_notify);
        let total: u32 = domains.iter().map(|(_, n)| n).sum();
        Some(NotificationBatch {
            message: format!("Blocked {total} search results"),
            domains,
            total,
        })
    }

    /// Enable or disable scanning.
    ///
    /// Disabling returns the containers whose treatments the host must
    /// revert, and clears every processed marker and pending timer so a
    /// re-enable starts from scratch. Re-enabling arms an immediate rescan.
    pub fn set_enabled(&mut self, enabled: bool, now: u64) -> Vec<NodeId> {
        if enabled == self.enabled {
            return Vec::new();
        }
        self.enabled = enabled;

        if enabled {
            self.settle.trigger(now);
            return Vec::new();
        }

        let reverts: Vec<NodeId> = self.treated.keys().copied().collect();
        self.treated.clear();
        self.processed.clear();
        self.pending_notify.clear();
        self.settle.cancel();
        self.mutation.cancel();
        self.scroll.cancel();
        self.notify.cancel();
        reverts
    }
}

// =============================================================================
// Serializable page view
// =============================================================================

/// A [`SearchPage`] captured as plain data, for crossing the wasm boundary:
/// the content script snapshots candidate containers per selector and hands
/// the whole thing over in one call.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub origin: String,
    pub groups: Vec<SelectorGroup>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorGroup {
    pub selector: String,
    pub nodes: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    pub id: u64,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub chrome: bool,
}

impl PageSnapshot {
    fn find(&self, node: NodeId) -> Option<&SnapshotNode> {
        self.groups
            .iter()
            .flat_map(|g| g.nodes.iter())
            .find(|n| n.id == node.0)
    }
}

impl SearchPage for PageSnapshot {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn query(&self, selector: &str) -> Vec<NodeId> {
        self.groups
            .iter()
            .filter(|g| g.selector == selector)
            .flat_map(|g| g.nodes.iter().map(|n| NodeId(n.id)))
            .collect()
    }

    fn anchor_href(&self, node: NodeId) -> Option<String> {
        self.find(node).and_then(|n| n.href.clone())
    }

    fn is_chrome(&self, node: NodeId) -> bool {
        self.find(node).is_some_and(|n| n.chrome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, label: &str) -> BlockRule {
        BlockRule::new(pattern.to_string(), Some(label.to_string()), 0)
    }

    fn page(nodes: Vec<SnapshotNode>) -> PageSnapshot {
        PageSnapshot {
            origin: "https://www.google.com".to_string(),
            groups: vec![SelectorGroup {
                selector: "div.g".to_string(),
                nodes,
            }],
        }
    }

    fn result(id: u64, href: &str) -> SnapshotNode {
        SnapshotNode {
            id,
            href: Some(href.to_string()),
            chrome: false,
        }
    }

    fn rules_example() -> Vec<BlockRule> {
        vec![rule("(^|\\.)example\\.com$", "example.com and its subdomains")]
    }

    #[test]
    fn test_scan_matches_and_marks_processed() {
        let mut scanner = Scanner::new();
        let page = page(vec![
            result(1, "https://example.com/a"),
            result(2, "https://other.org/b"),
            result(3, "https://blog.example.com/c"),
        ]);

        let outcome = scanner.scan(&page, &rules_example(), BlockMode::Hide, 0);
        assert_eq!(outcome.selector.as_deref(), Some("div.g"));
        assert_eq!(outcome.actions.len(), 2);
        assert_eq!(outcome.actions[0].node, NodeId(1));
        assert_eq!(outcome.actions[0].treatment, Treatment::Hide);
        assert_eq!(outcome.actions[1].node, NodeId(3));
        assert_eq!(outcome.stats.len(), 2);

        // Second pass over the same page: everything already processed
        let outcome = scanner.scan(&page, &rules_example(), BlockMode::Hide, 1);
        assert!(outcome.actions.is_empty());
        assert!(outcome.stats.is_empty());
    }

    #[test]
    fn test_scan_skips_chrome_containers() {
        let mut scanner = Scanner::new();
        let mut nodes = vec![result(1, "https://example.com/nav")];
        nodes[0].chrome = true;
        let page = page(nodes);

        let outcome = scanner.scan(&page, &rules_example(), BlockMode::Hide, 0);
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn test_scan_selector_fallback_order() {
        let snapshot = PageSnapshot {
            origin: "https://www.google.com".to_string(),
            groups: vec![
                SelectorGroup {
                    selector: "div.g".to_string(),
                    nodes: vec![],
                },
                SelectorGroup {
                    selector: "div[data-hveid]".to_string(),
                    nodes: vec![result(9, "https://example.com/x")],
                },
            ],
        };

        let mut scanner = Scanner::new();
        let outcome = scanner.scan(&snapshot, &rules_example(), BlockMode::Hide, 0);
        assert_eq!(outcome.selector.as_deref(), Some("div[data-hveid]"));
        assert_eq!(outcome.actions.len(), 1);
    }

    #[test]
    fn test_scan_tolerates_missing_and_bad_hrefs() {
        let mut scanner = Scanner::new();
        let page = page(vec![
            SnapshotNode {
                id: 1,
                href: None,
                chrome: false,
            },
            result(2, "javascript:void(0)"),
            result(3, "https://example.com/ok"),
        ]);

        let outcome = scanner.scan(&page, &rules_example(), BlockMode::Hide, 0);
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].node, NodeId(3));
    }

    #[test]
    fn test_relative_href_resolves_against_origin() {
        let mut scanner = Scanner::new();
        let page = page(vec![result(1, "/relative/path")]);
        let rules = vec![rule("(^|\\.)google\\.com$", "google")];

        let outcome = scanner.scan(&page, &rules, BlockMode::Hide, 0);
        assert_eq!(outcome.actions.len(), 1);
    }

    #[test]
    fn test_treatment_follows_block_mode() {
        let rules = rules_example();

        let mut scanner = Scanner::new();
        let p = page(vec![result(1, "https://example.com/")]);
        let outcome = scanner.scan(&p, &rules, BlockMode::Dim, 0);
        assert!(matches!(
            outcome.actions[0].treatment,
            Treatment::Dim { grayscale: true, .. }
        ));

        let mut scanner = Scanner::new();
        let p = page(vec![result(1, "https://example.com/")]);
        let outcome = scanner.scan(&p, &rules, BlockMode::Replace, 0);
        assert!(matches!(
            outcome.actions[0].treatment,
            Treatment::Replace { restorable: true }
        ));
    }

    #[test]
    fn test_debounced_triggers_collapse_to_one_scan() {
        let mut scanner = Scanner::new();

        for t in [0, 30, 60, 90, 120] {
            scanner.note_trigger(ScanTrigger::Mutation, t);
        }
        assert!(!scanner.scan_due(200)); // last trigger 120 -> due at 270
        assert!(scanner.scan_due(270));
        assert!(!scanner.scan_due(271));
    }

    #[test]
    fn test_scroll_window_is_independent_of_mutation() {
        let mut scanner = Scanner::new();
        scanner.note_trigger(ScanTrigger::Scroll, 0);
        scanner.note_trigger(ScanTrigger::Mutation, 0);

        // Mutation window (150) elapses first and drains; scroll (300) would
        // fire later but drains in the same poll once elapsed.
        assert!(scanner.scan_due(150));
        assert!(!scanner.scan_due(200));
        assert!(scanner.scan_due(300));
    }

    #[test]
    fn test_settle_delay_for_load_and_visibility() {
        let mut scanner = Scanner::new();
        scanner.note_trigger(ScanTrigger::InitialLoad, 0);
        assert!(!scanner.scan_due(99));
        assert!(scanner.scan_due(100));

        scanner.note_trigger(ScanTrigger::VisibilityRegained, 500);
        assert!(scanner.scan_due(600));
    }

    #[test]
    fn test_notifications_batch_per_burst() {
        let mut scanner = Scanner::new();
        let page = page(vec![
            result(1, "https://example.com/a"),
            result(2, "https://www.example.com/b"),
        ]);

        scanner.scan(&page, &rules_example(), BlockMode::Hide, 1_000);
        // Window still open right after the scan
        assert!(scanner.take_notification(1_100).is_none());

        let batch = scanner.take_notification(1_500).unwrap();
        assert_eq!(batch.total, 2);
        assert_eq!(batch.domains.len(), 1);
        assert_eq!(batch.domains[0].1, 2);
        assert_eq!(batch.message, "Blocked 2 search results");

        // Flushed: nothing further until new matches arrive
        assert!(scanner.take_notification(10_000).is_none());
    }

    #[test]
    fn test_disable_reverts_everything() {
        let mut scanner = Scanner::new();
        let p = page(vec![
            result(1, "https://example.com/a"),
            result(2, "https://other.org/b"),
        ]);
        scanner.scan(&p, &rules_example(), BlockMode::Hide, 0);
        scanner.note_trigger(ScanTrigger::Mutation, 10);

        let reverts = scanner.set_enabled(false, 20);
        assert_eq!(reverts, vec![NodeId(1)]);
        assert!(!scanner.scan_due(10_000)); // timers cancelled
        assert!(scanner.take_notification(10_000).is_none());

        // Triggers are ignored while disabled
        scanner.note_trigger(ScanTrigger::Mutation, 30);
        assert!(!scanner.scan_due(10_000));

        // Re-enable arms an immediate rescan and processed markers are gone
        scanner.set_enabled(true, 100);
        assert!(scanner.scan_due(100 + SETTLE_DELAY_MS));
        let outcome = scanner.scan(&p, &rules_example(), BlockMode::Hide, 300);
        assert_eq!(outcome.actions.len(), 1);
    }

    #[test]
    fn test_scan_while_disabled_is_empty() {
        let mut scanner = Scanner::new();
        scanner.set_enabled(false, 0);
        let p = page(vec![result(1, "https://example.com/a")]);
        let outcome = scanner.scan(&p, &rules_example(), BlockMode::Hide, 0);
        assert_eq!(outcome, ScanOutcome::default());
    }

    #[test]
    fn test_matches_result_shape() {
        let shape = |tag: &str, classes: &[&str], attrs: &[&str]| NodeShape {
            tag: tag.to_string(),
            classes: classes.iter().map(|s| s.to_string()).collect(),
            attrs: attrs.iter().map(|s| s.to_string()).collect(),
        };

        assert!(matches_result_shape(&shape("div", &["g"], &[])));
        assert!(matches_result_shape(&shape("div", &[], &["data-hveid"])));
        assert!(matches_result_shape(&shape("div", &[], &["jsaction"])));
        assert!(matches_result_shape(&shape("span", &["rc"], &[])));
        assert!(!matches_result_shape(&shape("span", &[], &["data-ved"])));
        assert!(!matches_result_shape(&shape("div", &["card"], &["id"])));
    }

    #[test]
    fn test_first_matching_rule_wins_across_scan() {
        let rules = vec![
            rule("(^|\\.)example\\.com$", "first"),
            rule(".*", "catch-all"),
        ];
        let mut scanner = Scanner::new();
        let p = page(vec![result(1, "https://example.com/")]);
        let outcome = scanner.scan(&p, &rules, BlockMode::Hide, 0);
        assert_eq!(outcome.actions[0].label, "first");
    }
}
