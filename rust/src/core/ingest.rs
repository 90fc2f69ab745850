use std::collections::HashSet;
use std::sync::Mutex;

use rusqlite::Connection;
use sofa_protocol::{format_wei, SofaInit, SofaWrapper};

use super::decode::{
    decode_record, load_order, merge_update, should_process_on_load, ControlEffect, Decoded,
    Message,
};
use super::mappings::{RowChange, RowChangeKind, RowEntry, ThreadMappings};
use super::reconcile::SetChange;
use super::{lock, message_db, ChatCore};
use crate::state::{MessageDirection, MessageSound, RawRecord};
use crate::store::StoreNotification;
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};

#[derive(Debug)]
pub(crate) enum FetchOutcome {
    /// Rows that changed since the mappings' snapshot, resolved to records.
    Changes {
        rows: Vec<RowEntry>,
        commit: u64,
        changes: Vec<(RowChange, RawRecord)>,
    },
    /// Every record of the thread.
    Loaded {
        rows: Vec<RowEntry>,
        commit: u64,
        records: Vec<RawRecord>,
    },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Changes,
    Load,
}

fn read_changes(reader: &Mutex<Connection>, mappings: &ThreadMappings) -> rusqlite::Result<FetchOutcome> {
    let mut conn = lock(reader);
    let tx = conn.transaction()?;
    let thread_id = mappings.thread_id();
    let commit = message_db::latest_commit(&tx)?;
    let rows = message_db::thread_rows(&tx, thread_id)?;
    let mut changes = vec![];
    for change in mappings.changes_to(&rows) {
        match message_db::get_record(&tx, thread_id, &change.unique_id)? {
            Some(record) => changes.push((change, record)),
            None => tracing::debug!(id = %change.unique_id, "changed row vanished mid-read"),
        }
    }
    tx.commit()?;
    Ok(FetchOutcome::Changes {
        rows,
        commit,
        changes,
    })
}

fn read_all(reader: &Mutex<Connection>, thread_id: &str) -> rusqlite::Result<FetchOutcome> {
    let mut conn = lock(reader);
    let tx = conn.transaction()?;
    let commit = message_db::latest_commit(&tx)?;
    let rows = message_db::thread_rows(&tx, thread_id)?;
    let records = message_db::thread_records(&tx, thread_id)?;
    tx.commit()?;
    Ok(FetchOutcome::Loaded {
        rows,
        commit,
        records,
    })
}

impl ChatCore {
    pub(super) fn handle_store_notification(&mut self, note: StoreNotification) {
        if !self.mappings.is_touched_by(&note.thread_ids) {
            self.mappings.advance_to(note.commit_id);
            return;
        }
        self.request_fetch(FetchKind::Changes);
    }

    pub(super) fn request_load(&mut self) {
        self.request_fetch(FetchKind::Load);
    }

    fn request_fetch(&mut self, kind: FetchKind) {
        match kind {
            FetchKind::Changes => self.fetch_dirty = true,
            FetchKind::Load => self.load_pending = true,
        }
        if !self.fetch_in_flight {
            self.start_next_fetch();
        }
    }

    // One read at a time: every diff is taken against mappings that already
    // reflect the previous read.
    fn start_next_fetch(&mut self) {
        let kind = if self.load_pending {
            self.load_pending = false;
            FetchKind::Load
        } else if self.fetch_dirty {
            self.fetch_dirty = false;
            FetchKind::Changes
        } else {
            return;
        };

        self.fetch_in_flight = true;
        self.fetch_token = self.fetch_token.wrapping_add(1);
        let token = self.fetch_token;
        let reader = self.reader.clone();
        let mappings = self.mappings.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn_blocking(move || {
            let result = match kind {
                FetchKind::Changes => read_changes(&reader, &mappings),
                FetchKind::Load => read_all(&reader, mappings.thread_id()),
            };
            let outcome = result.unwrap_or_else(|e| FetchOutcome::Failed(e.to_string()));
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::FetchFinished {
                token,
                outcome,
            })));
        });
    }

    pub(super) fn handle_fetch_finished(&mut self, token: u64, outcome: FetchOutcome) {
        if token != self.fetch_token {
            tracing::debug!(token, current = self.fetch_token, "stale fetch result");
            return;
        }
        self.fetch_in_flight = false;

        match outcome {
            FetchOutcome::Changes {
                rows,
                commit,
                changes,
            } => {
                self.mappings.update_with(rows, commit);
                tracing::debug!(
                    snapshot = self.mappings.snapshot_commit(),
                    changes = changes.len(),
                    "store changes"
                );
                self.apply_changes(changes);
            }
            FetchOutcome::Loaded {
                rows,
                commit,
                records,
            } => {
                // A later reload keeps the old mappings so rows it skipped
                // still surface as changes.
                if self.mappings.len() == 0 {
                    self.mappings.update_with(rows, commit);
                }
                self.apply_bulk_load(records);
            }
            FetchOutcome::Failed(e) => {
                // Nothing changed; the next notification re-syncs.
                tracing::warn!(error = %e, "store read failed");
            }
        }

        self.start_next_fetch();
    }

    fn apply_changes(&mut self, changes: Vec<(RowChange, RawRecord)>) {
        for (change, record) in changes {
            match change.kind {
                RowChangeKind::Insert => self.ingest_insert(record),
                RowChangeKind::Update => self.ingest_update(change.position, record),
            }
        }
    }

    fn ingest_insert(&mut self, record: RawRecord) {
        if let Some(position) = self.reconciler.position_of(&record.unique_id) {
            // Seen already (bulk load or replay).
            self.ingest_update(position, record);
            return;
        }

        let Decoded { message, effects } = decode_record(&record, true);
        let id = message.id.clone();
        let direction = message.direction;
        let unread = message.is_unread_incoming();
        let control = message
            .payload
            .control_strip()
            .map(|(controls, show_keyboard)| (controls.to_vec(), show_keyboard));

        self.apply(SetChange::Append(message));

        if let Some((controls, show_keyboard)) = control {
            self.state.controls = controls.clone();
            self.state.show_keyboard = show_keyboard;
            let rev = self.next_rev();
            self.emit(ChatUpdate::KeyboardVisibilityRequired {
                rev,
                message_id: id.clone(),
                show_keyboard,
                controls,
            });
        }

        if self.config.sounds_enabled() {
            let sound = match direction {
                MessageDirection::Incoming => MessageSound::Received,
                MessageDirection::Outgoing => MessageSound::Sent,
            };
            let rev = self.next_rev();
            self.emit(ChatUpdate::SoundRequested { rev, sound });
        }

        if unread && self.config.auto_mark_read() {
            self.mark_read(id);
        }

        for effect in effects {
            self.handle_control_effect(effect);
        }
    }

    fn ingest_update(&mut self, position: usize, record: RawRecord) {
        let incoming = decode_record(&record, false).message;
        let position = match self.reconciler.message(position) {
            Some(held) if held.id == incoming.id => position,
            _ => match self.reconciler.position_of(&incoming.id) {
                Some(p) => p,
                None => {
                    tracing::debug!(id = %incoming.id, "update for unknown message");
                    return;
                }
            },
        };
        let Some(held) = self.reconciler.message(position) else {
            return;
        };
        let merged = merge_update(held, incoming);
        self.apply(SetChange::Update {
            position,
            message: merged,
        });
    }

    fn apply_bulk_load(&mut self, records: Vec<RawRecord>) {
        let held: HashSet<&str> = self
            .reconciler
            .messages()
            .iter()
            .map(|m| m.id.as_str())
            .collect();

        let mut effects = vec![];
        let mut fresh: Vec<Message> = vec![];
        for record in records.iter().filter(|r| !held.contains(r.unique_id.as_str())) {
            let process = should_process_on_load(&record.body);
            let Decoded {
                message,
                effects: found,
            } = decode_record(record, process);
            // Requests already seen don't prompt again.
            if message.is_unread_incoming() {
                effects.extend(found);
            }
            fresh.push(message);
        }
        fresh.sort_by(load_order);
        tracing::debug!(held = held.len(), fresh = fresh.len(), "bulk load");

        let mut merged: Vec<Message> = self.reconciler.messages().to_vec();
        merged.extend(fresh);
        merged.sort_by(load_order);

        if let Some((controls, show_keyboard)) =
            merged.iter().rev().find_map(|m| m.payload.control_strip())
        {
            self.state.controls = controls.to_vec();
            self.state.show_keyboard = show_keyboard;
        }

        self.apply(SetChange::Replace(merged));
        for effect in effects {
            self.handle_control_effect(effect);
        }
    }

    fn handle_control_effect(&mut self, effect: ControlEffect) {
        match effect {
            ControlEffect::AnswerInitRequest(request) => {
                let init = SofaInit::answering(
                    &request,
                    self.config.payment_address.as_deref(),
                    self.config.language.as_deref(),
                );
                self.send_outgoing(SofaWrapper::Init(init).encode());
            }
            ControlEffect::PaymentRequested {
                message_id,
                value_wei,
                destination,
            } => {
                let rev = self.next_rev();
                self.emit(ChatUpdate::PaymentRequested {
                    rev,
                    message_id,
                    value_wei: format_wei(value_wei),
                    destination_address: destination,
                });
            }
        }
    }

    fn mark_read(&self, unique_id: String) {
        let store = self.store.clone();
        let thread_id = self.thread_id.clone();
        self.runtime.spawn_blocking(move || {
            if let Err(e) = store.mark_read(thread_id, unique_id) {
                tracing::warn!(%e, "mark read failed");
            }
        });
    }
}
