use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use super::decode::Message;
use super::reload_queue::{ComputedReload, ReloadJob, ReloadOutcome, ReloadQueue};
use crate::error::{ChatError, ChatResult};

/// A mutation of the authoritative set.
#[derive(Debug, Clone)]
pub(crate) enum SetChange {
    Replace(Vec<Message>),
    Append(Message),
    Update { position: usize, message: Message },
}

/// Handle on the recomputation triggered by one `apply`. Clones share the
/// ticket; only one of them observes the outcome.
#[derive(Clone)]
pub(crate) struct ReloadHandle {
    generation: u64,
    cancelled: Arc<AtomicBool>,
    done: flume::Receiver<ReloadOutcome>,
}

impl ReloadHandle {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the recomputation is published or dropped. One abandoned
    /// without a verdict counts as cancelled.
    pub(crate) async fn finished(self) -> ReloadOutcome {
        self.done
            .recv_async()
            .await
            .unwrap_or(ReloadOutcome::Cancelled)
    }
}

/// A recomputation that won; the caller publishes it.
pub(crate) struct Publication {
    cancelled: Arc<AtomicBool>,
    done: flume::Sender<ReloadOutcome>,
}

impl Publication {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn complete(self) {
        let _ = self.done.send(ReloadOutcome::Published);
    }

    pub(crate) fn abandon(self) {
        let _ = self.done.send(ReloadOutcome::Cancelled);
    }
}

/// Owns the authoritative set and its visible projection for one thread.
pub(crate) struct Reconciler {
    messages: Vec<Message>,
    visible: Vec<Message>,
    generation: u64,
    pending: Option<Arc<AtomicBool>>,
    queue: ReloadQueue,
}

impl Reconciler {
    pub(crate) fn new(queue: ReloadQueue) -> Self {
        Self {
            messages: vec![],
            visible: vec![],
            generation: 0,
            pending: None,
            queue,
        }
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Newest first.
    pub(crate) fn visible(&self) -> &[Message] {
        &self.visible
    }

    pub(crate) fn message(&self, position: usize) -> Option<&Message> {
        self.messages.get(position)
    }

    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Apply `change`, cancel whatever recomputation is pending and queue a
    /// fresh one over the new set.
    pub(crate) fn apply(&mut self, change: SetChange) -> ChatResult<ReloadHandle> {
        match change {
            SetChange::Replace(messages) => self.messages = messages,
            SetChange::Append(message) => self.messages.push(message),
            SetChange::Update { position, message } => {
                let len = self.messages.len();
                let slot = self
                    .messages
                    .get_mut(position)
                    .ok_or(ChatError::PositionOutOfRange { position, len })?;
                *slot = message;
            }
        }

        self.cancel_pending();
        self.generation += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = flume::bounded(1);
        let job = ReloadJob {
            generation: self.generation,
            cancelled: cancelled.clone(),
            messages: self.messages.clone(),
            done: done_tx,
        };
        if self.queue.enqueue(job).is_err() {
            return Err(ChatError::Closed);
        }
        self.pending = Some(cancelled.clone());
        Ok(ReloadHandle {
            generation: self.generation,
            cancelled,
            done: done_rx,
        })
    }

    pub(crate) fn cancel_pending(&mut self) {
        if let Some(flag) = self.pending.take() {
            flag.store(true, Ordering::Release);
        }
    }

    /// Accept a computed reload if it is still the current one.
    pub(crate) fn finish(&mut self, computed: ComputedReload) -> Option<Publication> {
        let current = computed.generation == self.generation
            && !computed.cancelled.load(Ordering::Acquire);
        if !current {
            tracing::debug!(
                generation = computed.generation,
                current = self.generation,
                "dropping superseded reload"
            );
            let _ = computed.done.send(ReloadOutcome::Cancelled);
            return None;
        }
        self.pending = None;
        self.messages = computed.messages;
        self.visible = computed.visible;
        Some(Publication {
            cancelled: computed.cancelled,
            done: computed.done,
        })
    }

    pub(crate) fn stop(&mut self) {
        self.cancel_pending();
        self.queue.stop();
    }
}
