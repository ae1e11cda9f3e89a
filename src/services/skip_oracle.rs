//! Skip oracle adapter.
//!
//! Turns a heuristic skip proposal into a SKIP/RUN question for the oracle
//! port and parses the answer. Any failure resolves to RUN.

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use super::code_text::truncate_chars;
use crate::domain::models::{
    format_operations, ChecklistSnapshot, OperationTag, SkipDecision, SkipStage, Step,
};
use crate::domain::ports::Oracle;

static DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(skip|run)\b").unwrap_or_else(|e| panic!("invalid decision pattern: {e}"))
});

const QUESTION: &str = "A planning heuristic proposes skipping the analysis step below. \
Answer SKIP if the step would only repeat work that is already done, or RUN if it \
still contributes something the research question needs. Reply with SKIP or RUN, \
optionally followed by ': ' and a short reason.";

/// Run state the oracle is shown alongside a proposal.
#[derive(Debug, Clone)]
pub struct SkipContext<'a> {
    pub question: &'a str,
    pub checklist: &'a ChecklistSnapshot,
    pub executed_operations: &'a BTreeSet<OperationTag>,
    pub remaining_steps: &'a [String],
}

/// Asks the oracle to confirm or override skip proposals.
#[derive(Clone)]
pub struct SkipOracle {
    oracle: Arc<dyn Oracle>,
    excerpt_chars: usize,
}

impl SkipOracle {
    pub fn new(oracle: Arc<dyn Oracle>, excerpt_chars: usize) -> Self {
        Self {
            oracle,
            excerpt_chars,
        }
    }

    /// Decide whether `step` should be skipped.
    ///
    /// Never fails: oracle errors, empty answers and answers without a
    /// recognizable decision all yield RUN.
    pub async fn should_skip(
        &self,
        context: &SkipContext<'_>,
        step: &Step,
        proposed_reason: &str,
        stage: SkipStage,
        candidate_code: Option<&str>,
    ) -> SkipDecision {
        let prompt = self.build_context(context, step, proposed_reason, stage, candidate_code);

        match self.oracle.ask(QUESTION, &prompt).await {
            Ok(answer) => {
                let decision = parse_decision(&answer);
                tracing::debug!(
                    step = %step.description,
                    %stage,
                    skip = decision.skip,
                    "skip oracle answered"
                );
                decision
            }
            Err(e) => {
                tracing::warn!(
                    step = %step.description,
                    %stage,
                    error = %e,
                    "skip oracle failed, running step"
                );
                SkipDecision::run()
            }
        }
    }

    fn build_context(
        &self,
        context: &SkipContext<'_>,
        step: &Step,
        proposed_reason: &str,
        stage: SkipStage,
        candidate_code: Option<&str>,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Research question: {}", context.question);
        let _ = writeln!(out, "\nProgress: {}", context.checklist.status_line);
        let rendered = context.checklist.render();
        if !rendered.is_empty() {
            let _ = writeln!(out, "{rendered}");
        }
        let _ = writeln!(
            out,
            "\nOperations already performed: {}",
            format_operations(context.executed_operations)
        );
        if context.remaining_steps.is_empty() {
            let _ = writeln!(out, "Remaining steps: none");
        } else {
            let _ = writeln!(out, "Remaining steps:");
            for description in context.remaining_steps {
                let _ = writeln!(out, "- {description}");
            }
        }
        let _ = writeln!(out, "\nStep under review: {}", step.description);
        let _ = writeln!(out, "Stage: {stage}");
        let _ = writeln!(out, "Proposed reason: {proposed_reason}");

        if let Some(code) = candidate_code.filter(|c| !c.trim().is_empty()) {
            let _ = writeln!(
                out,
                "\nCandidate code:\n```\n{}\n```",
                truncate_chars(code, self.excerpt_chars)
            );
        }
        out
    }
}

/// Parse an oracle answer. The first SKIP or RUN token wins; text after a
/// following colon becomes the reason.
pub fn parse_decision(answer: &str) -> SkipDecision {
    let Some(found) = DECISION.find(answer) else {
        return SkipDecision::run();
    };

    let rest = answer[found.end()..].trim_start();
    let reason = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('-'))
        .and_then(|r| r.lines().next())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    if found.as_str().eq_ignore_ascii_case("skip") {
        SkipDecision::skip(reason)
    } else {
        SkipDecision { skip: false, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{DomainError, DomainResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedOracle {
        answer: DomainResult<String>,
        seen_context: Mutex<Option<String>>,
    }

    impl FixedOracle {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Ok(answer.to_string()),
                seen_context: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(DomainError::OracleFailed("connection refused".into())),
                seen_context: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn ask(&self, _question: &str, context: &str) -> DomainResult<String> {
            *self.seen_context.lock().unwrap() = Some(context.to_string());
            match &self.answer {
                Ok(a) => Ok(a.clone()),
                Err(e) => Err(DomainError::OracleFailed(e.to_string())),
            }
        }
    }

    fn context_parts() -> (ChecklistSnapshot, BTreeSet<OperationTag>, Vec<String>) {
        (
            ChecklistSnapshot::default(),
            [OperationTag::Normalize].into_iter().collect(),
            vec!["Visualize".to_string()],
        )
    }

    #[test]
    fn test_parse_decision_variants() {
        assert_eq!(parse_decision("SKIP"), SkipDecision::skip(None));
        assert_eq!(
            parse_decision("skip: already normalized"),
            SkipDecision::skip(Some("already normalized".into()))
        );
        assert_eq!(parse_decision("RUN"), SkipDecision::run());
        assert_eq!(
            parse_decision("Run - needs a new plot"),
            SkipDecision::run_because("needs a new plot")
        );
        assert_eq!(
            parse_decision("I think you should SKIP: dup\nmore text"),
            SkipDecision::skip(Some("dup".into()))
        );
    }

    #[test]
    fn test_parse_decision_fails_open() {
        assert!(!parse_decision("").skip);
        assert!(!parse_decision("maybe?").skip);
        assert!(!parse_decision("skipping is fine").skip);
    }

    #[tokio::test]
    async fn test_oracle_error_runs_step() {
        let oracle = SkipOracle::new(Arc::new(FixedOracle::failing()), 1400);
        let (checklist, executed, remaining) = context_parts();
        let ctx = SkipContext {
            question: "q",
            checklist: &checklist,
            executed_operations: &executed,
            remaining_steps: &remaining,
        };
        for stage in [SkipStage::PreGeneration, SkipStage::PostGeneration] {
            let decision = oracle
                .should_skip(&ctx, &Step::new("Normalize"), "no new operations", stage, None)
                .await;
            assert!(!decision.skip);
        }
    }

    #[tokio::test]
    async fn test_context_includes_state_and_truncated_code() {
        let fixed = Arc::new(FixedOracle::answering("SKIP: covered"));
        let oracle = SkipOracle::new(fixed.clone(), 10);
        let (checklist, executed, remaining) = context_parts();
        let ctx = SkipContext {
            question: "Which clusters differ?",
            checklist: &checklist,
            executed_operations: &executed,
            remaining_steps: &remaining,
        };

        let decision = oracle
            .should_skip(
                &ctx,
                &Step::new("Normalize again"),
                "duplicate code",
                SkipStage::PostGeneration,
                Some("sc.pp.normalize_total(adata)"),
            )
            .await;
        assert_eq!(decision, SkipDecision::skip(Some("covered".into())));

        let seen = fixed.seen_context.lock().unwrap().clone().unwrap();
        assert!(seen.contains("Which clusters differ?"));
        assert!(seen.contains("Operations already performed: normalize"));
        assert!(seen.contains("- Visualize"));
        assert!(seen.contains("Stage: post-generation"));
        assert!(seen.contains("Proposed reason: duplicate code"));
        assert!(seen.contains("sc.pp.norm\n... [truncated]"));
    }
}
