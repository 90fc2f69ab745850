// Single-concurrency worker that recomputes derived fields and the visible
// projection off the actor thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::decode::Message;
use super::ether::{ether_value_string, fiat_value_string_with_code};
use crate::pricing::{current_rate, SharedExchangeRateProvider};

const WORKER_NAME: &str = "chat-reload-queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadOutcome {
    Published,
    Cancelled,
}

/// Where the worker reads the live exchange rate from.
#[derive(Clone)]
pub(crate) struct Pricing {
    pub(crate) provider: SharedExchangeRateProvider,
    pub(crate) fallback_rate: f64,
    pub(crate) fiat_code: String,
}

impl Pricing {
    fn rate(&self) -> f64 {
        current_rate(&self.provider, self.fallback_rate)
    }
}

pub(crate) struct ReloadJob {
    pub(crate) generation: u64,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) messages: Vec<Message>,
    pub(crate) done: flume::Sender<ReloadOutcome>,
}

/// A finished recomputation on its way back to the actor.
#[derive(Debug)]
pub(crate) struct ComputedReload {
    pub(crate) generation: u64,
    pub(crate) cancelled: Arc<AtomicBool>,
    /// The full set with derived fields filled in.
    pub(crate) messages: Vec<Message>,
    pub(crate) visible: Vec<Message>,
    pub(crate) done: flume::Sender<ReloadOutcome>,
}

pub(crate) struct ReloadQueue {
    jobs: Option<flume::Sender<ReloadJob>>,
    worker: Option<JoinHandle<()>>,
}

impl ReloadQueue {
    /// `sink` returns false once nobody is listening, which stops the worker.
    pub(crate) fn start<F>(pricing: Pricing, sink: F) -> std::io::Result<Self>
    where
        F: Fn(ComputedReload) -> bool + Send + 'static,
    {
        let (tx, rx) = flume::unbounded::<ReloadJob>();
        let worker = std::thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if let Some(computed) = run_job(job, &pricing) {
                        if !sink(computed) {
                            break;
                        }
                    }
                }
                tracing::debug!("reload queue stopped");
            })?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Returns the job back if the queue has been stopped.
    pub(crate) fn enqueue(&self, job: ReloadJob) -> Result<(), ReloadJob> {
        match &self.jobs {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    pub(crate) fn stop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            // Never join ourselves (a sink that ends up dropping the queue).
            if worker.thread().id() != std::thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for ReloadQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Value strings for payment-shaped messages.
pub(crate) fn fill_derived(messages: &mut [Message], rate: f64, fiat_code: &str) {
    for msg in messages.iter_mut() {
        if let Some(wei) = msg.payload.value_wei() {
            msg.fiat_value = Some(fiat_value_string_with_code(wei, rate, fiat_code));
            msg.ether_value = Some(ether_value_string(wei));
        }
    }
}

/// Displayable messages, newest first.
pub(crate) fn project(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.is_displayable)
        .rev()
        .cloned()
        .collect()
}

fn run_job(job: ReloadJob, pricing: &Pricing) -> Option<ComputedReload> {
    let ReloadJob {
        generation,
        cancelled,
        mut messages,
        done,
    } = job;

    if cancelled.load(Ordering::Acquire) {
        let _ = done.send(ReloadOutcome::Cancelled);
        return None;
    }

    fill_derived(&mut messages, pricing.rate(), &pricing.fiat_code);
    let visible = project(&messages);

    if cancelled.load(Ordering::Acquire) {
        let _ = done.send(ReloadOutcome::Cancelled);
        return None;
    }

    Some(ComputedReload {
        generation,
        cancelled,
        messages,
        visible,
        done,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;
    use std::time::Duration;

    use super::*;
    use crate::core::decode::decode_record;
    use crate::pricing::{ExchangeRateProvider, FixedExchangeRate};
    use crate::state::{MessageDeliveryState, MessageDirection, RawRecord};

    fn pricing(rate: f64) -> Pricing {
        let provider: Arc<dyn ExchangeRateProvider> = Arc::new(FixedExchangeRate(rate));
        Pricing {
            provider: Arc::new(RwLock::new(Some(provider))),
            fallback_rate: 0.0,
            fiat_code: "USD".into(),
        }
    }

    fn message(id: &str, body: &str) -> Message {
        decode_record(
            &RawRecord {
                unique_id: id.into(),
                thread_id: "t".into(),
                timestamp: 1,
                author: "peer".into(),
                body: body.into(),
                has_attachments: false,
                direction: MessageDirection::Incoming,
                delivery: MessageDeliveryState::Delivered,
                was_read: true,
            },
            false,
        )
        .message
    }

    fn job(messages: Vec<Message>) -> (ReloadJob, flume::Receiver<ReloadOutcome>) {
        let (done, done_rx) = flume::bounded(1);
        (
            ReloadJob {
                generation: 1,
                cancelled: Arc::new(AtomicBool::new(false)),
                messages,
                done,
            },
            done_rx,
        )
    }

    #[test]
    fn computes_values_and_reversed_projection() {
        let pay = r#"SOFA::Payment:{"value":"0xde0b6b3a7640000"}"#;
        let (job, _rx) = job(vec![
            message("a", "first"),
            message("hidden", ""),
            message("b", pay),
        ]);
        let computed = run_job(job, &pricing(300.0)).unwrap();
        let ids: Vec<&str> = computed.visible.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(computed.visible[0].fiat_value.as_deref(), Some("$300.00 USD"));
        assert_eq!(computed.visible[0].ether_value.as_deref(), Some("1.0000 ETH"));
        assert_eq!(computed.visible[1].fiat_value, None);
        assert_eq!(computed.messages.len(), 3);
    }

    #[test]
    fn cancelled_job_reports_and_produces_nothing() {
        let (job, rx) = job(vec![message("a", "x")]);
        job.cancelled.store(true, Ordering::Release);
        assert!(run_job(job, &pricing(1.0)).is_none());
        assert_eq!(rx.try_recv().unwrap(), ReloadOutcome::Cancelled);
    }

    #[test]
    fn worker_drains_in_order_until_stopped() {
        let (out_tx, out_rx) = flume::unbounded::<ComputedReload>();
        let mut queue =
            ReloadQueue::start(pricing(1.0), move |c| out_tx.send(c).is_ok()).unwrap();
        for generation in 1..=3 {
            let (mut j, _rx) = job(vec![message("a", "x")]);
            j.generation = generation;
            assert!(queue.enqueue(j).is_ok());
        }
        let seen: Vec<u64> = (0..3)
            .map(|_| out_rx.recv_timeout(Duration::from_secs(5)).unwrap().generation)
            .collect();
        assert_eq!(seen, vec![1, 2, 3]);
        queue.stop();
        let (j, _rx) = job(vec![]);
        assert!(queue.enqueue(j).is_err());
    }
}
