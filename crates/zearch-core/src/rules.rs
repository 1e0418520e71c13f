//! Rule generation and hostname matching
//!
//! User input is free-form: a full URL, a bare domain, a keyword, or an
//! explicit regex. [`generate`] normalizes it into a single regex pattern
//! with a human-readable label; [`evaluate`] tests a result's hostname
//! against the active rule set.

use regex::RegexBuilder;

use crate::types::BlockRule;

/// A generated rule: the regex pattern plus an auto-generated label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRule {
    pub pattern: String,
    pub description: String,
}

/// Characters escaped before the input is embedded in a pattern.
const META: &[char] = &['.', '*', '+', '?', '^', '$', '{', '}', '(', ')', '|', '[', ']', '\\'];

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Translate user input into a regex rule.
///
/// Input that already looks like a regex (contains a `.*` wildcard or a
/// backslash escape) is kept verbatim as a custom pattern. Anything else is
/// treated as a domain or keyword:
///
/// - `"example.com"` yields `(^|\.)example\.com$`, matching the domain and
///   every subdomain but not `myexample.com`
/// - a bare keyword like `"csdn"` yields `(^|\.)csdn\.[a-z]{2,}$`, matching
///   `csdn.net` / `www.csdn.net` across TLDs but never `somecsdn.com`; a
///   keyword is a domain stem, not a substring
pub fn generate(input: &str) -> GeneratedRule {
    let trimmed = input.trim().to_lowercase();

    if trimmed.contains(".*") || trimmed.contains('\\') {
        return GeneratedRule {
            description: format!("Custom regex: {trimmed}"),
            pattern: trimmed,
        };
    }

    // Strip scheme and path, then a leading www.
    let mut domain = trimmed.as_str();
    domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    if let Some(slash) = domain.find('/') {
        domain = &domain[..slash];
    }
    domain = domain.strip_prefix("www.").unwrap_or(domain);

    let escaped = escape_literal(domain);

    if domain.contains('.') {
        GeneratedRule {
            pattern: format!("(^|\\.){escaped}$"),
            description: format!("{domain} and its subdomains"),
        }
    } else {
        GeneratedRule {
            pattern: format!("(^|\\.){escaped}\\.[a-z]{{2,}}$"),
            description: format!("{domain}.* domains and their subdomains"),
        }
    }
}

/// Check that a pattern compiles as a case-insensitive regex.
pub fn validate(pattern: &str) -> Result<(), regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()?;
    Ok(())
}

/// Evaluate a hostname against the rule set in list order.
///
/// Returns the first matching rule; evaluation stops at the first hit, so
/// earlier-inserted rules win ties. A rule whose stored pattern no longer
/// compiles is skipped with a warning instead of aborting the scan.
pub fn evaluate<'a>(hostname: &str, rules: &'a [BlockRule]) -> Option<&'a BlockRule> {
    for rule in rules {
        let re = match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(err) => {
                log::warn!("skipping unparsable rule '{}': {err}", rule.pattern);
                continue;
            }
        };
        if re.is_match(hostname) {
            return Some(rule);
        }
    }
    None
}
