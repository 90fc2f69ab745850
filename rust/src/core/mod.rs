mod config;
mod controls;
pub(crate) mod decode;
mod ether;
mod ingest;
pub(crate) mod mappings;
pub(crate) mod message_db;
mod reconcile;
pub(crate) mod reload_queue;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use flume::Sender;
use rusqlite::Connection;
use sofa_protocol::{SofaMessage, SofaWrapper};

use crate::actions::ChatAction;
use crate::error::ChatResult;
use crate::pricing::SharedExchangeRateProvider;
use crate::state::{
    now_millis, ChatMessage, ChatViewState, MessageDeliveryState, MessageDirection, RawRecord,
};
use crate::store::ChatStore;
use crate::updates::{ChatUpdate, CoreMsg, InternalEvent};

pub use controls::display_state;
pub(crate) use ingest::FetchOutcome;
pub(crate) use reload_queue::ComputedReload;

use decode::Message;
use mappings::ThreadMappings;
use reconcile::{Reconciler, ReloadHandle, SetChange};
use reload_queue::{Pricing, ReloadQueue};

/// Author recorded on outgoing records when no payment address is configured.
const LOCAL_AUTHOR: &str = "local";

pub(crate) fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

/// One-shot projection of stored records without an open screen. Uses the
/// configured fallback rate; nothing is processed.
pub(crate) fn project_records(records: &[RawRecord], data_dir: &str) -> Vec<ChatMessage> {
    let config = config::load_chat_config(data_dir);
    let mut messages: Vec<Message> = records
        .iter()
        .map(|r| decode::decode_record(r, false).message)
        .collect();
    reload_queue::fill_derived(
        &mut messages,
        config.fallback_exchange_rate(),
        &config.fiat_currency_code(),
    );
    reload_queue::project(&messages)
        .iter()
        .map(Message::to_chat_message)
        .collect()
}

pub(crate) struct ChatCore {
    pub state: ChatViewState,
    rev: u64,
    thread_id: String,

    update_sender: Sender<ChatUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<ChatViewState>>,

    config: config::ChatConfig,
    runtime: tokio::runtime::Runtime,

    store: Arc<ChatStore>,
    // Long-lived read view; the only connection ingestion reads through.
    reader: Arc<Mutex<Connection>>,
    // Drafts only.
    editor: Arc<Mutex<Connection>>,

    mappings: ThreadMappings,
    fetch_in_flight: bool,
    fetch_dirty: bool,
    load_pending: bool,
    fetch_token: u64,

    reconciler: Reconciler,
    // Ticket of the latest `apply`; cleared once it publishes.
    pending_reload: Option<ReloadHandle>,

    alive: Arc<AtomicBool>,
    closed: bool,
}

impl ChatCore {
    pub fn new(
        update_sender: Sender<ChatUpdate>,
        core_sender: Sender<CoreMsg>,
        store: Arc<ChatStore>,
        thread_id: String,
        shared_state: Arc<RwLock<ChatViewState>>,
        rate_provider: SharedExchangeRateProvider,
    ) -> ChatResult<Self> {
        let data_dir = store.data_dir().to_string();
        let config = config::load_chat_config(&data_dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("toshi-core-io")
            .enable_time()
            .build()?;

        let reader = Arc::new(Mutex::new(message_db::open_reader(&data_dir)?));
        let editor = Arc::new(Mutex::new(message_db::open_editor(&data_dir)?));

        let pricing = Pricing {
            provider: rate_provider,
            fallback_rate: config.fallback_exchange_rate(),
            fiat_code: config.fiat_currency_code(),
        };
        let reload_tx = core_sender.clone();
        let queue = ReloadQueue::start(pricing, move |computed| {
            reload_tx
                .send(CoreMsg::Internal(Box::new(InternalEvent::ReloadComputed(
                    computed,
                ))))
                .is_ok()
        })?;

        let alive = Arc::new(AtomicBool::new(true));
        let mut this = Self {
            state: ChatViewState::empty(thread_id.clone()),
            rev: 0,
            thread_id: thread_id.clone(),
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            store,
            reader,
            editor,
            mappings: ThreadMappings::new(thread_id),
            fetch_in_flight: false,
            fetch_dirty: false,
            load_pending: false,
            fetch_token: 0,
            reconciler: Reconciler::new(queue),
            pending_reload: None,
            alive,
            closed: false,
        };

        // Subscribe before the first read; commits racing the load are diffed
        // against the loaded rows once it lands.
        this.start_change_feed();
        this.request_load();
        tracing::info!(thread_id = %this.thread_id, "chat opened");
        Ok(this)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn start_change_feed(&self) {
        let feed = self.store.subscribe();
        let tx = self.core_sender.clone();
        let alive = self.alive.clone();
        self.runtime.spawn(async move {
            while let Ok(note) = feed.recv_async().await {
                if !alive.load(Ordering::Relaxed) {
                    break;
                }
                let msg = CoreMsg::Internal(Box::new(InternalEvent::StoreModified(note)));
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &ChatViewState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(ChatUpdate::Reloaded(snapshot));
    }

    fn emit(&self, update: ChatUpdate) {
        let _ = self.update_sender.send(update);
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: it carries message and draft text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        if self.closed {
            return;
        }
        match internal {
            InternalEvent::StoreModified(note) => self.handle_store_notification(note),
            InternalEvent::FetchFinished { token, outcome } => {
                self.handle_fetch_finished(token, outcome)
            }
            InternalEvent::DraftLoaded { draft } => {
                let rev = self.next_rev();
                self.emit(ChatUpdate::DraftLoaded { rev, draft });
            }
            InternalEvent::ReloadComputed(computed) => self.handle_reload_computed(computed),
        }
    }

    fn handle_action(&mut self, action: ChatAction) {
        if self.closed {
            tracing::debug!(action = action.tag(), "chat closed; ignoring");
            return;
        }
        match action {
            // Messages
            ChatAction::LoadMessages => self.request_load(),
            ChatAction::SendMessage { text } => {
                let text = text.trim();
                if text.is_empty() {
                    return;
                }
                let body = SofaWrapper::Message(SofaMessage {
                    body: text.to_string(),
                    ..Default::default()
                })
                .encode();
                self.send_outgoing(body);
            }

            // Control strip
            ChatAction::SelectControl { control } => self.select_control(control),
            ChatAction::TapControl { control } => self.tap_control(control),

            // Drafts
            ChatAction::SaveDraft { text } => {
                let Some(text) = text else {
                    return;
                };
                let editor = self.editor.clone();
                let thread_id = self.thread_id.clone();
                self.runtime.spawn_blocking(move || {
                    if let Err(e) = message_db::set_draft(&lock(&editor), &thread_id, &text) {
                        tracing::warn!(%e, "save draft failed");
                    }
                });
            }
            ChatAction::ReloadDraft => {
                let editor = self.editor.clone();
                let thread_id = self.thread_id.clone();
                let tx = self.core_sender.clone();
                self.runtime.spawn_blocking(move || {
                    let draft = match message_db::get_draft(&lock(&editor), &thread_id) {
                        Ok(draft) => draft,
                        Err(e) => {
                            tracing::warn!(%e, "load draft failed");
                            return;
                        }
                    };
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::DraftLoaded {
                        draft,
                    })));
                });
            }

            // Pricing
            ChatAction::ExchangeRateUpdated => {
                let current = self.reconciler.messages().to_vec();
                self.apply(SetChange::Replace(current));
            }

            // Lifecycle
            ChatAction::Close => self.close(),
        }
    }

    /// Single entry point for mutating the authoritative set.
    fn apply(&mut self, change: SetChange) {
        match self.reconciler.apply(change) {
            Ok(handle) => {
                if let Some(previous) = self.pending_reload.take() {
                    tracing::trace!(
                        generation = previous.generation(),
                        cancelled = previous.is_cancelled(),
                        "reload superseded"
                    );
                }
                let generation = handle.generation();
                let settled = handle.clone();
                self.runtime.spawn(async move {
                    let outcome = settled.finished().await;
                    tracing::trace!(generation, ?outcome, "reload settled");
                });
                self.pending_reload = Some(handle);
            }
            Err(e) => tracing::warn!(%e, "apply failed"),
        }
    }

    fn handle_reload_computed(&mut self, computed: ComputedReload) {
        let Some(publication) = self.reconciler.finish(computed) else {
            return;
        };
        self.pending_reload = None;
        self.state.messages = self
            .reconciler
            .visible()
            .iter()
            .map(Message::to_chat_message)
            .collect();
        self.emit_state();

        if publication.is_cancelled() {
            publication.abandon();
            return;
        }
        let rev = self.next_rev();
        self.emit(ChatUpdate::LastMessageReceived { rev });
        publication.complete();
    }

    /// Append an outgoing record to the store; the change feed brings it back in.
    fn send_outgoing(&self, body: String) {
        let record = RawRecord {
            unique_id: uuid::Uuid::new_v4().to_string(),
            thread_id: self.thread_id.clone(),
            timestamp: now_millis(),
            author: self
                .config
                .payment_address
                .clone()
                .unwrap_or_else(|| LOCAL_AUTHOR.to_string()),
            body,
            has_attachments: false,
            direction: MessageDirection::Outgoing,
            delivery: MessageDeliveryState::Pending,
            was_read: true,
        };
        let store = self.store.clone();
        self.runtime.spawn_blocking(move || {
            if let Err(e) = store.upsert_record(record) {
                tracing::warn!(%e, "outgoing write failed");
            }
        });
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.alive.store(false, Ordering::Relaxed);
        if let Some(pending) = self.pending_reload.take() {
            pending.cancel();
        }
        self.reconciler.stop();
        tracing::info!(thread_id = %self.thread_id, "chat closed");
    }
}
