//! Rubric extraction from task source text.
//!
//! A rubric is a comment block embedded in the task file:
//!
//! ```text
//! <!-- rubric:
//! must: Verdict:
//! must: re:proof\s+sketch
//! should: edge case
//! -->
//! ```
//!
//! Formal-proof tasks use `/- rubric: ... -/` instead.

pub mod pattern;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub use pattern::{matches, Pattern};

/// Delimiters surrounding a rubric block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricStyle {
    /// `<!-- rubric: ... -->`
    HtmlComment,
    /// `/- rubric: ... -/`
    LeanComment,
}

impl RubricStyle {
    fn block_regex(&self) -> &'static Regex {
        static HTML: OnceLock<Regex> = OnceLock::new();
        static LEAN: OnceLock<Regex> = OnceLock::new();
        match self {
            RubricStyle::HtmlComment => HTML.get_or_init(|| {
                Regex::new(r"(?is)<!--\s*rubric:(.*?)-->").expect("Invalid regex for html rubric")
            }),
            RubricStyle::LeanComment => LEAN.get_or_init(|| {
                Regex::new(r"(?is)/-\s*rubric:(.*?)-/").expect("Invalid regex for lean rubric")
            }),
        }
    }
}

/// Required and optional patterns, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    pub must: Vec<String>,
    pub should: Vec<String>,
}

impl Rubric {
    /// Extracts the rubric from `text`. No block, or an unterminated one,
    /// yields an empty rubric.
    pub fn parse(text: &str, style: RubricStyle) -> Self {
        let Some(block) = style
            .block_regex()
            .captures(text)
            .and_then(|caps| caps.get(1))
        else {
            return Self::default();
        };

        let mut rubric = Self::default();
        for line in block.as_str().lines() {
            let line = line.trim();
            if let Some(pattern) = strip_prefix_ignore_case(line, "must:") {
                rubric.must.push(pattern.trim().to_string());
            } else if let Some(pattern) = strip_prefix_ignore_case(line, "should:") {
                rubric.should.push(pattern.trim().to_string());
            }
        }
        rubric
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty()
    }

    /// Required patterns not found in `answer`, in rubric order.
    pub fn missing(&self, answer: &str) -> Vec<String> {
        self.must
            .iter()
            .filter(|p| !matches(p, answer))
            .cloned()
            .collect()
    }

    /// Number of optional patterns found in `answer`.
    pub fn should_hits(&self, answer: &str) -> usize {
        self.should.iter().filter(|p| matches(p, answer)).count()
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MD_TASK: &str = "# Task\n\nDo something.\n\n<!-- rubric:\nmust: Verdict:\n  MUST: Proof sketch:\nmust: n=1\nshould: edge case\nnote: ignored line\n\n-->\n";

    #[test]
    fn test_parse_html_rubric() {
        let rubric = Rubric::parse(MD_TASK, RubricStyle::HtmlComment);
        assert_eq!(rubric.must, vec!["Verdict:", "Proof sketch:", "n=1"]);
        assert_eq!(rubric.should, vec!["edge case"]);
    }

    #[test]
    fn test_parse_lean_rubric() {
        let text = "-- Task\n/- rubric:\nmust: theorem\nmust: by\nShould: exists\n-/-\n";
        let rubric = Rubric::parse(text, RubricStyle::LeanComment);
        assert_eq!(rubric.must, vec!["theorem", "by"]);
        assert_eq!(rubric.should, vec!["exists"]);
    }

    #[test]
    fn test_wrong_style_yields_empty() {
        let rubric = Rubric::parse(MD_TASK, RubricStyle::LeanComment);
        assert!(rubric.is_empty());
    }

    #[test]
    fn test_absent_and_unterminated_blocks() {
        assert!(Rubric::parse("no rubric here", RubricStyle::HtmlComment).is_empty());

        let unterminated = "<!-- rubric:\nmust: Verdict:\n";
        assert!(Rubric::parse(unterminated, RubricStyle::HtmlComment).is_empty());
    }

    #[test]
    fn test_opening_is_case_insensitive() {
        let text = "<!--   RUBRIC:\nmust: x\n-->";
        let rubric = Rubric::parse(text, RubricStyle::HtmlComment);
        assert_eq!(rubric.must, vec!["x"]);
    }

    #[test]
    fn test_pattern_keeps_text_after_first_colon() {
        let text = "<!-- rubric:\nmust: re:^Verdict:\\s*(true|false)\n-->";
        let rubric = Rubric::parse(text, RubricStyle::HtmlComment);
        assert_eq!(rubric.must, vec![r"re:^Verdict:\s*(true|false)"]);
    }

    #[test]
    fn test_missing_and_should_hits() {
        let rubric = Rubric::parse(MD_TASK, RubricStyle::HtmlComment);
        let answer = "verdict: true. Check N=1 as an EDGE CASE.";
        assert_eq!(rubric.missing(answer), vec!["Proof sketch:"]);
        assert_eq!(rubric.should_hits(answer), 1);
    }
}
