//! Coverage report parsing.

use std::sync::OnceLock;

use regex::Regex;

/// Extracts the total percentage from a `coverage report` table.
///
/// Looks for a `TOTAL` row whose last field is a percentage, integer or
/// decimal. Returns `None` when no such row exists.
pub fn parse_coverage(report: &str) -> Option<f64> {
    static TOTAL: OnceLock<Regex> = OnceLock::new();
    let re = TOTAL.get_or_init(|| {
        Regex::new(r"(?m)^TOTAL\s.*?(\d+(?:\.\d+)?)%\s*$").expect("Invalid regex for coverage total")
    });
    re.captures(report)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
