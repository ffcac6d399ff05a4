use std::collections::HashSet;

use crate::entry::LogEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub merged: usize,
    pub duplicates: usize,
    pub evicted: usize,
}

/// Merges pushed entries into a bounded view and lets authoritative pulls
/// replace it.
///
/// View invariants, held after every mutation: ids are unique, entries are
/// ordered by timestamp descending, and `len <= capacity` with the oldest
/// entries evicted first.
#[derive(Debug, Clone)]
pub struct StreamReconciler<E: LogEntry> {
    capacity: usize,
    view: Vec<E>,
    pending: Vec<E>,
    pending_ids: HashSet<String>,
}

impl<E: LogEntry> StreamReconciler<E> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            view: Vec::new(),
            pending: Vec::new(),
            pending_ids: HashSet::new(),
        }
    }

    /// Buffers `entry` unless an entry with the same id is already pending.
    pub fn ingest(&mut self, entry: E) -> bool {
        if !self.pending_ids.insert(entry.id().to_string()) {
            return false;
        }
        self.pending.push(entry);
        true
    }

    /// Moves pending entries into the view in arrival order. An id already in
    /// the view keeps its existing entry.
    pub fn flush(&mut self) -> FlushReport {
        self.flush_admitted().0
    }

    /// Same as [`flush`](Self::flush), also returning the merged entries
    /// still in the view after truncation, in arrival order.
    pub fn flush_admitted(&mut self) -> (FlushReport, Vec<E>) {
        let mut report = FlushReport::default();
        if self.pending.is_empty() {
            return (report, Vec::new());
        }

        let mut seen = self
            .view
            .iter()
            .map(|entry| entry.id().to_string())
            .collect::<HashSet<_>>();
        let mut admitted = Vec::new();
        for entry in self.pending.drain(..) {
            if seen.insert(entry.id().to_string()) {
                admitted.push(entry.clone());
                self.view.push(entry);
                report.merged += 1;
            } else {
                report.duplicates += 1;
            }
        }
        self.pending_ids.clear();

        sort_newest_first(&mut self.view);
        report.evicted = self.truncate_view();
        if report.evicted > 0 {
            let kept = self
                .view
                .iter()
                .map(|entry| entry.id())
                .collect::<HashSet<_>>();
            admitted.retain(|entry| kept.contains(entry.id()));
        }
        (report, admitted)
    }

    /// Replaces the view with a pulled result set and drops everything
    /// pending.
    pub fn reconcile_with_authoritative(&mut self, entries: Vec<E>) {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut view = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.id().to_string()))
            .collect::<Vec<_>>();
        sort_newest_first(&mut view);
        self.view = view;
        self.truncate_view();
        self.discard_pending();
    }

    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.pending_ids.clear();
        dropped
    }

    #[must_use]
    pub fn view(&self) -> &[E] {
        &self.view
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest timestamp in the view and the ids that carry it.
    #[must_use]
    pub fn newest(&self) -> Option<(i64, Vec<&str>)> {
        let newest = self.view.first()?.timestamp();
        let ids = self
            .view
            .iter()
            .take_while(|entry| entry.timestamp() == newest)
            .map(|entry| entry.id())
            .collect();
        Some((newest, ids))
    }

    fn truncate_view(&mut self) -> usize {
        let evicted = self.view.len().saturating_sub(self.capacity);
        self.view.truncate(self.capacity);
        evicted
    }
}

fn sort_newest_first<E: LogEntry>(entries: &mut [E]) {
    entries.sort_by(|left, right| right.timestamp().cmp(&left.timestamp()));
}
