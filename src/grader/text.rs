//! Free-text grading: rubric patterns, per-family format checks, judge.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::judge::JudgeClient;
use crate::rubric::{Rubric, RubricStyle};
use crate::task::{ProofRules, SynthesisRules, TaskFamily, TextRules};

const CODE_FENCE: &str = "```";

/// Outcome of the family format heuristics.
///
/// Fields that do not apply to a family stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatChecks {
    pub length_ok: bool,
    pub fence_ok: Option<bool>,
    pub paragraphs_ok: Option<bool>,
    pub word_count: Option<usize>,
}

impl FormatChecks {
    pub fn passed(&self) -> bool {
        self.length_ok && self.fence_ok.unwrap_or(true) && self.paragraphs_ok.unwrap_or(true)
    }
}

/// Grade record for a free-text answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextGrade {
    pub passed: bool,
    /// Required patterns not found, in rubric order.
    pub missing: Vec<String>,
    pub should_hits: usize,
    pub length_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fence_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraphs_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    /// Judge verdict; absent when no judge is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_pass: Option<bool>,
}

/// Length in characters after trimming.
fn trimmed_chars(answer: &str) -> usize {
    answer.trim().chars().count()
}

/// Number of maximal `[A-Za-z0-9']` runs.
pub fn word_count(text: &str) -> usize {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[A-Za-z0-9']+").expect("Invalid regex for word count"))
        .find_iter(text)
        .count()
}

/// Non-blank blocks separated by a blank line.
pub fn paragraph_count(text: &str) -> usize {
    text.split("\n\n").filter(|p| !p.trim().is_empty()).count()
}

pub fn general_checks(rules: &TextRules, answer: &str) -> FormatChecks {
    FormatChecks {
        length_ok: trimmed_chars(answer) >= rules.min_chars,
        ..FormatChecks::default()
    }
}

pub fn proof_checks(rules: &ProofRules, answer: &str) -> FormatChecks {
    FormatChecks {
        length_ok: trimmed_chars(answer) >= rules.min_chars,
        fence_ok: Some(!(rules.forbid_fences && answer.contains(CODE_FENCE))),
        ..FormatChecks::default()
    }
}

pub fn synthesis_checks(rules: &SynthesisRules, answer: &str) -> FormatChecks {
    let words = word_count(answer);
    let paragraphs = paragraph_count(answer);
    FormatChecks {
        length_ok: (rules.min_words..=rules.max_words).contains(&words),
        fence_ok: None,
        paragraphs_ok: Some((rules.min_paragraphs..=rules.max_paragraphs).contains(&paragraphs)),
        word_count: Some(words),
    }
}

/// Combines rubric, format checks and the optional judge into one grade.
///
/// The judge can only veto: a heuristic failure is never overridden.
pub async fn grade_text(
    family: TaskFamily,
    style: RubricStyle,
    checks: FormatChecks,
    task_text: &str,
    answer: &str,
    judge: Option<&JudgeClient>,
) -> TextGrade {
    let rubric = Rubric::parse(task_text, style);
    let missing = rubric.missing(answer);
    let should_hits = rubric.should_hits(answer);
    let heuristics_pass = missing.is_empty() && checks.passed();

    let judge_pass = match judge {
        Some(judge) => Some(judge.verdict(family, task_text, answer).await.is_pass()),
        None => None,
    };

    TextGrade {
        passed: heuristics_pass && judge_pass.unwrap_or(true),
        missing,
        should_hits,
        length_ok: checks.length_ok,
        fence_ok: checks.fence_ok,
        paragraphs_ok: checks.paragraphs_ok,
        word_count: checks.word_count,
        judge_pass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;
    use std::sync::Arc;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_word_count_rules() {
        assert_eq!(word_count("don't stop-me now 42"), 5);
        assert_eq!(word_count("  \n "), 0);
        assert_eq!(word_count("élan vital"), 2);
    }

    #[test]
    fn test_synthesis_word_bounds() {
        let rules = SynthesisRules::default();
        assert!(!synthesis_checks(&rules, &words(39)).length_ok);
        assert!(synthesis_checks(&rules, &words(40)).length_ok);
        assert!(synthesis_checks(&rules, &words(220)).length_ok);
        assert!(!synthesis_checks(&rules, &words(221)).length_ok);
    }

    #[test]
    fn test_synthesis_paragraph_bounds() {
        let rules = SynthesisRules::default();
        let two = format!("{}\n\n{}", words(30), words(30));
        let three = format!("{}\n\n{}\n\n{}", words(20), words(20), words(20));
        let padded = format!("\n\n{}\n\n   \n\n", words(50));

        assert_eq!(synthesis_checks(&rules, &two).paragraphs_ok, Some(true));
        assert_eq!(synthesis_checks(&rules, &padded).paragraphs_ok, Some(true));

        let checks = synthesis_checks(&rules, &three);
        assert!(checks.length_ok);
        assert_eq!(checks.paragraphs_ok, Some(false));
        assert!(!checks.passed());
        assert_eq!(synthesis_checks(&rules, "").paragraphs_ok, Some(false));
    }

    #[test]
    fn test_length_counts_characters() {
        let rules = TextRules { min_chars: 5 };
        assert!(general_checks(&rules, "  ééééé  ").length_ok);
        assert!(!general_checks(&rules, "éééé").length_ok);
    }

    #[test]
    fn test_proof_rejects_fences() {
        let rules = ProofRules::default();
        let body = "theorem foo : True := by trivial. ".repeat(4);
        assert!(proof_checks(&rules, &body).passed());

        let fenced = format!("```lean\n{}\n```", body);
        let checks = proof_checks(&rules, &fenced);
        assert!(checks.length_ok);
        assert_eq!(checks.fence_ok, Some(false));
        assert!(!checks.passed());
    }

    #[tokio::test]
    async fn test_missing_patterns_fail() {
        let task = "Claim.\n<!-- rubric:\nmust: Verdict:\nmust: Proof sketch:\n-->";
        let answer = "Verdict: true.";
        let grade = grade_text(
            TaskFamily::Md,
            RubricStyle::HtmlComment,
            general_checks(&TextRules::default(), answer),
            task,
            answer,
            None,
        )
        .await;

        assert!(!grade.passed);
        assert_eq!(grade.missing, vec!["Proof sketch:"]);
        assert_eq!(grade.judge_pass, None);
    }

    #[tokio::test]
    async fn test_all_patterns_present_depends_on_format() {
        let task = "<!-- rubric:\nmust: Verdict:\nmust: /proof\\s+sketch/\n-->";
        let long = "Verdict: false.\nProof sketch: at n=1 the inequality fails, so the claim is false.";
        let short = "Verdict: no. Proof sketch: n=1.";
        let rules = TextRules::default();

        let pass = grade_text(TaskFamily::Md, RubricStyle::HtmlComment, general_checks(&rules, long), task, long, None).await;
        assert!(pass.passed);

        let fail = grade_text(TaskFamily::Md, RubricStyle::HtmlComment, general_checks(&rules, short), task, short, None).await;
        assert!(fail.missing.is_empty());
        assert!(!fail.passed);
    }

    #[tokio::test]
    async fn test_judge_vetoes_but_never_overrides() {
        let task = "<!-- rubric:\nmust: Verdict:\n-->";
        let good = "Verdict: false. The claim fails at the boundary n = 1 as shown by direct substitution.";
        let bad = "Verdict?";
        let rules = TextRules::default();
        let rules = &rules;

        let passing = JudgeClient::new(Arc::new(MockGenerator::empty().with_answer("md", "PASS")));
        let failing = JudgeClient::new(Arc::new(MockGenerator::empty().with_answer("md", "FAIL")));
        let ambiguous = JudgeClient::new(Arc::new(MockGenerator::empty().with_answer("md", "PASS or FAIL")));

        let grade = |answer: &'static str, judge: JudgeClient| async move {
            grade_text(
                TaskFamily::Md,
                RubricStyle::HtmlComment,
                general_checks(rules, answer),
                task,
                answer,
                Some(&judge),
            )
            .await
        };

        let g = grade(good, passing.clone()).await;
        assert!(g.passed);
        assert_eq!(g.judge_pass, Some(true));

        assert!(!grade(good, failing).await.passed);
        assert!(!grade(good, ambiguous).await.passed);

        let g = grade(bad, passing).await;
        assert_eq!(g.judge_pass, Some(true));
        assert!(!g.passed);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let grade = TextGrade {
            passed: true,
            missing: vec![],
            should_hits: 0,
            length_ok: true,
            fence_ok: None,
            paragraphs_ok: None,
            word_count: None,
            judge_pass: None,
        };
        let json = serde_json::to_value(&grade).unwrap();
        assert!(json.get("judge_pass").is_none());
        assert!(json.get("fence_ok").is_none());
        assert_eq!(json["length_ok"], true);
    }
}
