mod actions;
mod core;
mod error;
mod logging;
mod pricing;
mod state;
mod store;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::ChatAction;
pub use crate::core::display_state;
pub use error::*;
pub use pricing::{ExchangeRateProvider, FixedExchangeRate, SharedExchangeRateProvider};
pub use state::*;
pub use store::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait ChatReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: ChatUpdate);
}

/// One open conversation screen.
#[derive(uniffi::Object)]
pub struct FfiChat {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<ChatUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<ChatViewState>>,
    rate_provider: SharedExchangeRateProvider,
}

#[uniffi::export]
impl FfiChat {
    #[uniffi::constructor]
    pub fn new(store: Arc<ChatStore>, thread_id: String) -> Result<Arc<Self>, ChatError> {
        logging::init_logging(store.data_dir());
        tracing::info!(thread_id = %thread_id, "FfiChat::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(ChatViewState::empty(thread_id.clone())));
        let rate_provider: SharedExchangeRateProvider = Arc::new(RwLock::new(None));

        let mut core = crate::core::ChatCore::new(
            update_tx,
            core_tx.clone(),
            store,
            thread_id,
            shared_state.clone(),
            rate_provider.clone(),
        )?;

        // Actor loop thread (single threaded "chat actor").
        thread::Builder::new()
            .name("chat-actor".into())
            .spawn(move || {
                while let Ok(msg) = core_rx.recv() {
                    core.handle_message(msg);
                    if core.is_closed() {
                        break;
                    }
                }
            })?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            rate_provider,
        }))
    }

    pub fn state(&self) -> ChatViewState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Newest first, as of the last published reload.
    pub fn visible_message(&self, index: u32) -> Option<ChatMessage> {
        self.state().messages.get(index as usize).cloned()
    }

    pub fn dispatch(&self, action: ChatAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn ChatReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split updates.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_exchange_rate_provider(&self, provider: Box<dyn ExchangeRateProvider>) {
        let provider: Arc<dyn ExchangeRateProvider> = Arc::from(provider);
        match self.rate_provider.write() {
            Ok(mut slot) => *slot = Some(provider),
            Err(poison) => *poison.into_inner() = Some(provider),
        }
        let _ = self
            .core_tx
            .send(CoreMsg::Action(ChatAction::ExchangeRateUpdated));
    }
}

impl Drop for FfiChat {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Action(ChatAction::Close));
    }
}
