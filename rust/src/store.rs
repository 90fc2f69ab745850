use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::core::message_db;
use crate::error::ChatError;
use crate::state::{ChatMessage, MessageDeliveryState, RawRecord};

/// One committed write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreNotification {
    pub commit_id: u64,
    pub thread_ids: Vec<String>,
}

/// The message store shared by every open chat screen.
///
/// All writes go through the one writer connection and fan a
/// [`StoreNotification`] out to every subscriber after they commit.
#[derive(uniffi::Object)]
pub struct ChatStore {
    data_dir: String,
    writer: Mutex<Connection>,
    subscribers: Mutex<Vec<flume::Sender<StoreNotification>>>,
}

#[uniffi::export]
impl ChatStore {
    #[uniffi::constructor]
    pub fn open(data_dir: String) -> Result<Arc<Self>, ChatError> {
        std::fs::create_dir_all(&data_dir)?;
        let conn = message_db::open_store_db(&data_dir)?;
        Ok(Arc::new(Self {
            data_dir,
            writer: Mutex::new(conn),
            subscribers: Mutex::new(vec![]),
        }))
    }

    /// Insert or replace a record. Returns the commit id.
    pub fn upsert_record(&self, record: RawRecord) -> Result<u64, ChatError> {
        if record.unique_id.trim().is_empty() {
            return Err(ChatError::InvalidRecord("empty unique_id".into()));
        }
        if record.thread_id.trim().is_empty() {
            return Err(ChatError::InvalidRecord("empty thread_id".into()));
        }
        let commit_id = {
            let mut conn = self.writer();
            message_db::upsert_record(&mut conn, &record)?
        };
        self.notify(commit_id, &record.thread_id);
        Ok(commit_id)
    }

    /// Transport hook for outgoing messages. `None` when nothing changed.
    pub fn set_delivery_state(
        &self,
        thread_id: String,
        unique_id: String,
        delivery: MessageDeliveryState,
    ) -> Result<Option<u64>, ChatError> {
        let commit = {
            let mut conn = self.writer();
            message_db::set_delivery_state(&mut conn, &thread_id, &unique_id, delivery)?
        };
        if let Some(commit_id) = commit {
            self.notify(commit_id, &thread_id);
        }
        Ok(commit)
    }

    pub fn mark_read(&self, thread_id: String, unique_id: String) -> Result<Option<u64>, ChatError> {
        let commit = {
            let mut conn = self.writer();
            message_db::mark_read(&mut conn, &thread_id, &unique_id)?
        };
        if let Some(commit_id) = commit {
            self.notify(commit_id, &thread_id);
        }
        Ok(commit)
    }

    pub fn latest_commit(&self) -> Result<u64, ChatError> {
        Ok(message_db::latest_commit(&self.writer())?)
    }

    /// The thread's visible messages, newest first, read straight from disk.
    pub fn visible_messages(&self, thread_id: String) -> Result<Vec<ChatMessage>, ChatError> {
        let records = message_db::thread_records(&self.writer(), &thread_id)?;
        Ok(crate::core::project_records(&records, &self.data_dir))
    }
}

impl ChatStore {
    pub(crate) fn data_dir(&self) -> &str {
        &self.data_dir
    }

    /// Subscribe to the change feed. Dropping the receiver unsubscribes.
    pub(crate) fn subscribe(&self) -> flume::Receiver<StoreNotification> {
        let (tx, rx) = flume::unbounded();
        self.subscribers().push(tx);
        rx
    }

    fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.writer.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<flume::Sender<StoreNotification>>> {
        match self.subscribers.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn notify(&self, commit_id: u64, thread_id: &str) {
        let note = StoreNotification {
            commit_id,
            thread_ids: vec![thread_id.to_string()],
        };
        self.subscribers().retain(|tx| tx.send(note.clone()).is_ok());
        tracing::debug!(commit_id, thread_id, "store commit");
    }
}
