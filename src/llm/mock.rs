//! Offline generator returning canned answers.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{GenerationRequest, Generator};
use crate::error::GenerationError;

/// Built-in answers for the bundled sample tasks.
const SAMPLE_ANSWERS: &[(&str, &str)] = &[
    (
        "t01_bigO_edges",
        "Verdict: false.\n\
         Proof sketch: Plug in n=1 to get 1^2 + 1 = 2 while 1.5 * 1^2 = 1.5, so the \
         inequality fails at the edge case n=1. For C=1.5 we need n >= 2 so that n <= \
         0.5 * n^2. Thus the smallest n0 is 2.",
    ),
    (
        "t02_polygon_angles",
        "Verdict: false.\n\
         Proof sketch: The formula (n - 2) * pi is for simple polygons with n >= 3. \
         A 2-gon is excluded by the usual definition, so the n=2 case is not valid. \
         Self-intersecting polygons also do not satisfy the same interior-angle sum. \
         Therefore the claim is false.",
    ),
    (
        "s01_compactness",
        "Lemma: If K is compact and F is closed in K, then F is compact.\n\
         Proof sketch: Let {U_i} be an open cover of F in the subspace topology, so each \
         U_i = V_i intersect F with V_i open in X. Then {V_i} together with X \\ F covers K. \
         By compactness of K there is a finite subcover, which restricts to a finite \
         subcover of F.",
    ),
    (
        "s04_graph_lemma",
        "Lemma: Every tree with n vertices has n-1 edges.\n\
         Proof sketch: Use induction on n. For n=1 the statement is clear. A tree with \
         n>1 has a leaf; removing it gives a tree with n-1 vertices and n-2 edges. \
         Adding the leaf back adds one edge, yielding n-1 edges.",
    ),
];

/// Generator that never leaves the process.
///
/// Answers are looked up by task id; unknown tasks get a family fallback.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    answers: HashMap<String, String>,
}

impl MockGenerator {
    /// A mock with no canned answers; every task gets its family fallback.
    pub fn empty() -> Self {
        Self {
            answers: HashMap::new(),
        }
    }

    /// Registers a canned answer for `task_id`.
    pub fn with_answer(mut self, task_id: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers.insert(task_id.into(), answer.into());
        self
    }

    fn fallback(task_family: &str) -> &'static str {
        match task_family {
            "py" => "",
            "synth" => "Lemma: ...\nProof sketch: ...",
            _ => "Verdict: true.\nProof sketch: ...",
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        SAMPLE_ANSWERS
            .iter()
            .fold(Self::empty(), |mock, (id, answer)| mock.with_answer(*id, *answer))
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(self
            .answers
            .get(&request.task_id)
            .cloned()
            .unwrap_or_else(|| Self::fallback(&request.task_family).to_string()))
    }
}
