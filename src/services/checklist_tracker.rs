//! Checklist tracker with debounced progress emission.
//!
//! Every update replaces the latest snapshot synchronously, so a subscriber
//! that arrives late can always read the current state. Notifications on the
//! event bus are coalesced: a burst of updates within one scheduling tick
//! produces a single `ChecklistUpdated` event carrying the newest snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::event_bus::EventBus;
use crate::domain::models::{ChecklistEntry, ChecklistSnapshot, ChecklistStatus, PlanEvent};

/// Ordered progress checklist mirroring the plan's steps.
pub struct ChecklistTracker {
    entries: Vec<ChecklistEntry>,
    latest: watch::Sender<ChecklistSnapshot>,
    events: Option<Arc<EventBus>>,
    notify_pending: Arc<AtomicBool>,
}

impl ChecklistTracker {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(ChecklistSnapshot::default());
        Self {
            entries: Vec::new(),
            latest,
            events: None,
            notify_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish coalesced `ChecklistUpdated` events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Replace the checklist with one pending entry per description.
    pub fn initialize<I, S>(&mut self, descriptions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries = descriptions.into_iter().map(ChecklistEntry::pending).collect();
        self.emit();
    }

    /// Set the status of the entry for `description`.
    ///
    /// The first still-pending entry with that description wins, then any
    /// entry with it; unknown descriptions are appended. Repeating an update
    /// is a no-op that still re-emits the summary.
    pub fn update(&mut self, description: &str, status: ChecklistStatus, note: Option<String>) {
        let position = self
            .entries
            .iter()
            .position(|e| e.description == description && e.status == ChecklistStatus::Pending)
            .or_else(|| self.entries.iter().position(|e| e.description == description));

        match position {
            Some(index) => self.apply(index, status, note),
            None => {
                tracing::debug!(description, "checklist update for untracked entry, appending");
                self.entries.push(ChecklistEntry {
                    description: description.to_string(),
                    status,
                    note,
                });
            }
        }
        self.emit();
    }

    /// Set the status of the entry at `index` (plan order).
    pub fn update_at(&mut self, index: usize, status: ChecklistStatus, note: Option<String>) {
        if index < self.entries.len() {
            self.apply(index, status, note);
            self.emit();
        } else {
            tracing::warn!(index, len = self.entries.len(), "checklist index out of range");
        }
    }

    fn apply(&mut self, index: usize, status: ChecklistStatus, note: Option<String>) {
        let entry = &mut self.entries[index];
        entry.status = status;
        if note.is_some() {
            entry.note = note;
        }
    }

    pub fn entries(&self) -> &[ChecklistEntry] {
        &self.entries
    }

    pub fn status_at(&self, index: usize) -> Option<ChecklistStatus> {
        self.entries.get(index).map(|e| e.status)
    }

    /// Latest snapshot, readable synchronously at any time.
    pub fn snapshot(&self) -> ChecklistSnapshot {
        self.latest.borrow().clone()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChecklistSnapshot> {
        self.latest.subscribe()
    }

    /// Publish the current summary immediately.
    ///
    /// Any notification still scheduled is absorbed, so this is the last
    /// `ChecklistUpdated` for the burst.
    pub fn emit_summary(&self) {
        let snapshot = ChecklistSnapshot::from_entries(self.entries.clone());
        self.latest.send_replace(snapshot.clone());
        self.notify_pending.store(false, Ordering::Release);
        if let Some(bus) = &self.events {
            bus.publish(PlanEvent::ChecklistUpdated(snapshot));
        }
    }

    fn emit(&self) {
        self.latest
            .send_replace(ChecklistSnapshot::from_entries(self.entries.clone()));
        self.schedule_notification();
    }

    fn schedule_notification(&self) {
        let Some(bus) = self.events.clone() else {
            return;
        };
        if self.notify_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let pending = Arc::clone(&self.notify_pending);
        let latest = self.latest.subscribe();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::task::yield_now().await;
                    if !pending.swap(false, Ordering::AcqRel) {
                        return;
                    }
                    let snapshot = latest.borrow().clone();
                    bus.publish(PlanEvent::ChecklistUpdated(snapshot));
                });
            }
            Err(_) => {
                pending.store(false, Ordering::Release);
                let snapshot = latest.borrow().clone();
                bus.publish(PlanEvent::ChecklistUpdated(snapshot));
            }
        }
    }
}

impl Default for ChecklistTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initialize_creates_pending_entries() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["Load", "Normalize", "Cluster"]);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_count, 3);
        assert_eq!(snapshot.pending_count(), 3);
        assert!(snapshot.status_line.ends_with("next: Load"));
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["Load", "Normalize"]);
        tracker.update("Load", ChecklistStatus::Completed, None);
        let first = tracker.snapshot();
        tracker.update("Load", ChecklistStatus::Completed, None);
        assert_eq!(tracker.snapshot(), first);
        assert_eq!(first.completed_count, 1);
    }

    #[test]
    fn test_update_unknown_description_appends() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["Load"]);
        tracker.update("Export report", ChecklistStatus::Skipped, Some("not requested".into()));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_count, 2);
        assert_eq!(snapshot.skipped_count, 1);
        assert_eq!(snapshot.entries[1].note.as_deref(), Some("not requested"));
    }

    #[test]
    fn test_update_prefers_pending_duplicate() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["Normalize", "Normalize"]);
        tracker.update("Normalize", ChecklistStatus::Completed, None);
        tracker.update("Normalize", ChecklistStatus::Skipped, None);

        assert_eq!(tracker.status_at(0), Some(ChecklistStatus::Completed));
        assert_eq!(tracker.status_at(1), Some(ChecklistStatus::Skipped));
    }

    #[test]
    fn test_note_is_kept_when_not_replaced() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["Plot"]);
        tracker.update_at(0, ChecklistStatus::Pending, Some("retrying".into()));
        tracker.update_at(0, ChecklistStatus::Completed, None);
        assert_eq!(tracker.entries()[0].note.as_deref(), Some("retrying"));
    }

    #[tokio::test]
    async fn test_burst_of_updates_is_coalesced() {
        let bus = EventBus::shared();
        let mut rx = bus.subscribe();
        let mut tracker = ChecklistTracker::new().with_event_bus(Arc::clone(&bus));

        tracker.initialize(["A", "B", "C"]);
        tracker.update("A", ChecklistStatus::Completed, None);
        tracker.update("B", ChecklistStatus::Skipped, None);
        tracker.update("C", ChecklistStatus::Completed, None);

        let envelope = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification should arrive")
            .unwrap();
        match envelope.event {
            PlanEvent::ChecklistUpdated(snapshot) => {
                assert_eq!(snapshot.completed_count, 2);
                assert_eq!(snapshot.skipped_count, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Only one notification for the whole burst.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_summary_publishes_immediately_and_absorbs_pending() {
        let bus = EventBus::shared();
        let mut rx = bus.subscribe();
        let mut tracker = ChecklistTracker::new().with_event_bus(Arc::clone(&bus));

        tracker.initialize(["A", "B"]);
        tracker.update("A", ChecklistStatus::Completed, None);
        tracker.emit_summary();

        let envelope = rx.try_recv().expect("summary is published synchronously");
        match envelope.event {
            PlanEvent::ChecklistUpdated(snapshot) => assert_eq!(snapshot.completed_count, 1),
            other => panic!("unexpected event {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_subscriber_reads_latest_snapshot() {
        let mut tracker = ChecklistTracker::new();
        tracker.initialize(["A", "B"]);
        tracker.update("A", ChecklistStatus::Completed, None);

        let rx = tracker.subscribe();
        assert_eq!(rx.borrow().completed_count, 1);
    }
}
