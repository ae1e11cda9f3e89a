use plancell::domain::models::{ChecklistStatus, OperationLedger, OperationTag};
use plancell::services::skip_oracle::parse_decision;
use plancell::services::{normalize, ChecklistTracker, OperationExtractor};
use proptest::prelude::*;
use std::collections::BTreeSet;

const SNIPPETS: [&str; 6] = [
    "adata = sc.read_h5ad(\"pbmc.h5ad\")",
    "sc.pp.filter_cells(adata, min_genes=200)",
    "sc.pp.normalize_total(adata)\nsc.pp.log1p(adata)",
    "sc.tl.pca(adata)",
    "sc.tl.leiden(adata, resolution=0.8)",
    "sc.pl.umap(adata, color=\"leiden\")",
];

fn token_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_=().,]{1,8}"
}

fn tag_strategy() -> impl Strategy<Value = OperationTag> {
    prop::sample::select(OperationTag::ALL.to_vec())
}

proptest! {
    /// Property: Fingerprints ignore whitespace
    ///
    /// Joining the same tokens with arbitrary runs of spaces, tabs and
    /// newlines always yields the fingerprint of the tokens joined directly.
    #[test]
    fn prop_fingerprint_ignores_whitespace(
        tokens in prop::collection::vec(token_strategy(), 1..12),
        separators in prop::collection::vec("[ \t\n]{0,3}", 12),
    ) {
        let compact = tokens.concat();
        let spaced: String = tokens
            .iter()
            .zip(separators.iter())
            .map(|(token, sep)| format!("{token}{sep}"))
            .collect();

        prop_assert!(normalize(&compact).is_some());
        prop_assert_eq!(normalize(&compact), normalize(&spaced));
    }

    /// Property: Fingerprints ignore letter case
    #[test]
    fn prop_fingerprint_ignores_case(
        tokens in prop::collection::vec(token_strategy(), 1..8),
    ) {
        let code = tokens.join(" ");
        prop_assert_eq!(normalize(&code), normalize(&code.to_uppercase()));
    }

    /// Property: Comment lines never change what code does
    ///
    /// Neither the extracted operations nor the fingerprint of a snippet
    /// changes when an arbitrary comment line is appended.
    #[test]
    fn prop_comments_are_inert(
        snippet in prop::sample::select(SNIPPETS.to_vec()),
        comment in "[a-z ]{0,30}",
    ) {
        let extractor = OperationExtractor::new();
        let commented = format!("{snippet}\n# {comment}");

        prop_assert_eq!(extractor.extract(snippet), extractor.extract(&commented));
        prop_assert_eq!(normalize(snippet), normalize(&commented));
    }

    /// Property: The ledger only grows
    ///
    /// After every record the executed set is a superset of the previous one,
    /// the returned tags are exactly the newly added ones, and coverage never
    /// reverts once reached.
    #[test]
    fn prop_ledger_is_monotonic(
        batches in prop::collection::vec(prop::collection::btree_set(tag_strategy(), 0..5), 1..10),
        threshold in 1usize..=10,
    ) {
        let mut ledger = OperationLedger::new(threshold);
        let mut was_covered = false;

        for batch in &batches {
            let before: BTreeSet<OperationTag> = ledger.executed().clone();
            let added = ledger.record(batch);

            prop_assert!(ledger.executed().is_superset(&before));
            let expected: BTreeSet<OperationTag> = batch.difference(&before).copied().collect();
            prop_assert_eq!(&added, &expected);
            prop_assert!(ledger.covers(batch));

            if was_covered {
                prop_assert!(ledger.is_fully_covered());
            }
            prop_assert_eq!(ledger.is_fully_covered(), ledger.core_count() >= threshold || was_covered);
            was_covered = ledger.is_fully_covered();
        }
    }

    /// Property: Repeating a checklist update changes nothing
    #[test]
    fn prop_checklist_update_is_idempotent(
        count in 1usize..8,
        index in 0usize..8,
        status in prop::sample::select(vec![
            ChecklistStatus::Completed,
            ChecklistStatus::Skipped,
            ChecklistStatus::Failed,
        ]),
        note in prop::option::of("[a-z ]{1,20}"),
    ) {
        let index = index % count;
        let mut tracker = ChecklistTracker::new();
        tracker.initialize((0..count).map(|i| format!("Step {i}")));

        tracker.update_at(index, status, note.clone());
        let once = tracker.snapshot();
        tracker.update_at(index, status, note);
        let twice = tracker.snapshot();

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.pending_count(), count - 1);
    }

    /// Property: A leading SKIP or RUN decides, and the text after the colon
    /// becomes the reason
    #[test]
    fn prop_decision_prefix_wins(
        skip in any::<bool>(),
        reason in "[a-z][a-z ]{0,20}[a-z]",
        lowercase in any::<bool>(),
    ) {
        let keyword = if skip { "SKIP" } else { "RUN" };
        let keyword = if lowercase { keyword.to_lowercase() } else { keyword.to_string() };
        let decision = parse_decision(&format!("{keyword}: {reason}"));

        prop_assert_eq!(decision.skip, skip);
        prop_assert_eq!(decision.reason.as_deref(), Some(reason.as_str()));
    }

    /// Property: Answers without a decision word run the step
    #[test]
    fn prop_undecided_answer_runs(answer in "[0-9 .,!?]{0,40}") {
        let decision = parse_decision(&answer);
        prop_assert!(!decision.skip);
        prop_assert!(decision.reason.is_none());
    }
}
