//! # Command Dispatcher
//!
//! Composes the idempotency store, the retry executor, and a transport
//! adapter into the delivery path. One FIFO worker per device preserves
//! submission order to that device.

use crate::log::CommandLog;
use crate::retry::{retry_with_backoff, RetryPolicy};
use bridge_bus::BusPublisher;
use bridge_security::IdempotencyStore;
use bridge_types::{Ack, BridgeError, BridgeMessage, Command, DynAdapter};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Backoff policy for transport failures.
    pub retry: RetryPolicy,
    /// Timeout applied when a command carries none.
    pub default_timeout: Duration,
    /// Per-device queue depth before `dispatch` awaits.
    pub queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            default_timeout: Duration::from_millis(bridge_types::DEFAULT_COMMAND_TIMEOUT_MS),
            queue_depth: 64,
        }
    }
}

struct Job {
    command: Command,
    reply: oneshot::Sender<Result<Ack, BridgeError>>,
}

struct Inner {
    adapter: DynAdapter,
    idempotency: Arc<IdempotencyStore>,
    log: Arc<CommandLog>,
    bus: Arc<dyn BusPublisher>,
    config: DispatcherConfig,
}

/// Dispatches commands to devices with idempotency, retry, timeout, and
/// per-device ordering.
pub struct CommandDispatcher {
    inner: Arc<Inner>,
    queues: DashMap<String, mpsc::Sender<Job>>,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(
        adapter: DynAdapter,
        idempotency: Arc<IdempotencyStore>,
        log: Arc<CommandLog>,
        bus: Arc<dyn BusPublisher>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapter,
                idempotency,
                log,
                bus,
                config,
            }),
            queues: DashMap::new(),
        }
    }

    /// The command log backing this dispatcher.
    #[must_use]
    pub fn log(&self) -> Arc<CommandLog> {
        Arc::clone(&self.inner.log)
    }

    /// Dispatch a command and await its outcome.
    ///
    /// Resolves with the device's ack, a cached ack for a repeated
    /// idempotency key, or an error; a timed-out command fails rather than
    /// hanging the caller.
    pub async fn dispatch(&self, command: Command) -> Result<Ack, BridgeError> {
        command.validate()?;
        self.inner.log.record_pending(&command);

        let (reply, rx) = oneshot::channel();
        let queue = self.queue_for(&command.device_id);
        queue
            .send(Job { command, reply })
            .await
            .map_err(|_| BridgeError::RetryExhausted {
                attempts: 0,
                last_error: "dispatch worker stopped".into(),
            })?;

        rx.await.map_err(|_| BridgeError::RetryExhausted {
            attempts: 0,
            last_error: "dispatch worker dropped the command".into(),
        })?
    }

    /// Get or spawn the FIFO worker for a device.
    fn queue_for(&self, device_id: &str) -> mpsc::Sender<Job> {
        if let Some(queue) = self.queues.get(device_id) {
            if !queue.is_closed() {
                return queue.value().clone();
            }
        }

        match self.queues.entry(device_id.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    let queue = Self::spawn_worker(&self.inner, device_id);
                    occupied.insert(queue.clone());
                    queue
                } else {
                    occupied.get().clone()
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let queue = Self::spawn_worker(&self.inner, device_id);
                vacant.insert(queue.clone());
                queue
            }
        }
    }

    fn spawn_worker(inner: &Arc<Inner>, device_id: &str) -> mpsc::Sender<Job> {
        let (tx, mut rx) = mpsc::channel::<Job>(inner.config.queue_depth);
        let inner = Arc::clone(inner);
        let device_id = device_id.to_owned();

        tokio::spawn(async move {
            debug!(device_id = %device_id, "dispatch worker started");
            while let Some(job) = rx.recv().await {
                let result = inner.deliver(job.command).await;
                // The caller may have gone away; delivery already happened.
                let _ = job.reply.send(result);
            }
            debug!(device_id = %device_id, "dispatch worker stopped");
        });

        tx
    }
}

impl Inner {
    async fn deliver(&self, command: Command) -> Result<Ack, BridgeError> {
        let command_id = command.command_id;
        match command.idempotency_key.clone() {
            Some(key) => {
                let result = self
                    .idempotency
                    .handle(&key, || self.attempt(command))
                    .await;
                if let Ok(ack) = &result {
                    if ack.command_id != command_id {
                        // Cache hit from an earlier command with the same
                        // key: settle this command's log entry too.
                        let mirrored = Ack {
                            command_id,
                            ..ack.clone()
                        };
                        self.log.mark_acknowledged(&mirrored);
                    }
                }
                result
            }
            None => self.attempt(command).await,
        }
    }

    /// One delivery attempt chain: mark sent, retry over the transport,
    /// enforce the timeout, record the outcome, republish the ack.
    async fn attempt(&self, command: Command) -> Result<Ack, BridgeError> {
        let command_id = command.command_id;
        let timeout = command.timeout().unwrap_or(self.config.default_timeout);

        self.log.mark_sent(command_id);

        let adapter = Arc::clone(&self.adapter);
        let send = retry_with_backoff(self.config.retry, || {
            let adapter = Arc::clone(&adapter);
            let command = command.clone();
            async move {
                adapter
                    .send_command(command)
                    .await
                    .map_err(BridgeError::from)
            }
        });

        let outcome = match tokio::time::timeout(timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command_id = %command_id, timeout_ms = timeout.as_millis() as u64, "command timed out");
                Err(BridgeError::Delivery {
                    transport: self.adapter.transport(),
                    message: format!("command timed out after {} ms", timeout.as_millis()),
                })
            }
        };

        match outcome {
            Ok(ack) => {
                self.log.mark_acknowledged(&ack);
                self.bus.publish(BridgeMessage::Ack(ack.clone())).await;
                Ok(ack)
            }
            Err(err) => {
                self.log.mark_failed(command_id, &err.to_string());
                Err(err)
            }
        }
    }
}
