//! Rubric pattern matching.
//!
//! Three forms, tried in order:
//! - `re:<regex>` explicit regex
//! - `/<regex>/` slash-delimited regex
//! - anything else is a literal substring
//!
//! All forms match case-insensitively. Regexes run in multi-line mode.

use regex::RegexBuilder;
use tracing::warn;

/// A classified rubric pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern<'a> {
    Regex(&'a str),
    Literal(&'a str),
}

impl<'a> Pattern<'a> {
    /// Classifies a raw rubric pattern.
    pub fn classify(raw: &'a str) -> Self {
        if let Some(regex) = raw.strip_prefix("re:") {
            return Pattern::Regex(regex.trim());
        }
        if raw.len() > 2 && raw.starts_with('/') && raw.ends_with('/') {
            return Pattern::Regex(&raw[1..raw.len() - 1]);
        }
        Pattern::Literal(raw)
    }

    /// Returns true if the pattern occurs in `text`.
    ///
    /// A regex that fails to compile never matches.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Pattern::Regex(source) => match RegexBuilder::new(source)
                .case_insensitive(true)
                .multi_line(true)
                .build()
            {
                Ok(re) => re.is_match(text),
                Err(e) => {
                    warn!(pattern = %source, error = %e, "Invalid rubric regex, treating as non-match");
                    false
                }
            },
            Pattern::Literal(needle) => text.to_lowercase().contains(&needle.to_lowercase()),
        }
    }
}

/// Tests whether a raw rubric pattern occurs in `text`.
pub fn matches(pattern: &str, text: &str) -> bool {
    Pattern::classify(pattern).is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Pattern::classify("re: a+b"), Pattern::Regex("a+b"));
        assert_eq!(Pattern::classify("/a+b/"), Pattern::Regex("a+b"));
        assert_eq!(Pattern::classify("//"), Pattern::Literal("//"));
        assert_eq!(Pattern::classify("Verdict:"), Pattern::Literal("Verdict:"));
    }

    #[test]
    fn test_literal_is_case_insensitive() {
        assert!(matches("Proof Sketch:", "proof sketch: by induction"));
        assert!(matches("verdict", "VERDICT: false"));
        assert!(!matches("lemma", "theorem only"));
    }

    #[test]
    fn test_explicit_regex_is_case_insensitive() {
        assert!(matches(r"re:^verdict:\s*(true|false)", "Intro\nVERDICT: False."));
        assert!(!matches(r"re:^verdict", "The verdict: false"));
    }

    #[test]
    fn test_slash_regex_is_case_insensitive() {
        assert!(matches(r"/n\s*=\s*1/", "Take N = 1"));
        assert!(matches("/^lemma:/", "intro\nLEMMA: every tree"));
        assert!(!matches("/^lemma:/", "intro lemma:"));
    }

    #[test]
    fn test_invalid_regex_does_not_match() {
        assert!(!matches("re:(unclosed", "(unclosed"));
        assert!(!matches("/[a-/", "anything"));
    }
}
