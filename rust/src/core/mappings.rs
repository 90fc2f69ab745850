// Position bookkeeping for the open thread's view of the store.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowEntry {
    pub(crate) unique_id: String,
    /// Commit id of the row's last write.
    pub(crate) version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowChange {
    pub(crate) kind: RowChangeKind,
    /// Position in the new row list.
    pub(crate) position: usize,
    pub(crate) unique_id: String,
}

/// The ordered rows of one thread as of `snapshot_commit`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ThreadMappings {
    thread_id: String,
    snapshot_commit: u64,
    rows: Vec<RowEntry>,
}

impl ThreadMappings {
    pub(crate) fn new(thread_id: String) -> Self {
        Self {
            thread_id,
            snapshot_commit: 0,
            rows: vec![],
        }
    }

    pub(crate) fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub(crate) fn snapshot_commit(&self) -> u64 {
        self.snapshot_commit
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Advance the snapshot without touching rows (a batch that didn't concern us).
    pub(crate) fn advance_to(&mut self, commit: u64) {
        self.snapshot_commit = self.snapshot_commit.max(commit);
    }

    /// Whether a batch naming `thread_ids` can affect this view.
    pub(crate) fn is_touched_by(&self, thread_ids: &[String]) -> bool {
        thread_ids.iter().any(|t| *t == self.thread_id)
    }

    /// Diff `rows` against the current rows. Removed rows are not reported.
    pub(crate) fn changes_to(&self, rows: &[RowEntry]) -> Vec<RowChange> {
        let known: HashMap<&str, u64> = self
            .rows
            .iter()
            .map(|r| (r.unique_id.as_str(), r.version))
            .collect();
        rows.iter()
            .enumerate()
            .filter_map(|(position, row)| {
                let kind = match known.get(row.unique_id.as_str()) {
                    None => RowChangeKind::Insert,
                    Some(v) if *v != row.version => RowChangeKind::Update,
                    Some(_) => return None,
                };
                Some(RowChange {
                    kind,
                    position,
                    unique_id: row.unique_id.clone(),
                })
            })
            .collect()
    }

    /// Take the rows of a read made at `commit`. Reads are serialized, so the
    /// rows are always at least as new as the current ones; the snapshot commit
    /// never moves backwards.
    pub(crate) fn update_with(&mut self, rows: Vec<RowEntry>, commit: u64) {
        self.rows = rows;
        self.snapshot_commit = self.snapshot_commit.max(commit);
    }
}
