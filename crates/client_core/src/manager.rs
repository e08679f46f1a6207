use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;

/// Connection lifecycle as observed by subscribers. Driven only by socket
/// events and explicit `connect`/`disconnect` calls, never set directly by
/// consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// The reconnect budget is exhausted; only an explicit
    /// [`ConnectionManager::connect`] resumes retrying.
    Unreachable,
}

/// Owns exactly one logical socket to the gateway and hides reconnection
/// behind a status stream. Has no knowledge of message semantics: inbound
/// text frames are forwarded raw, outbound frames are submitted as text.
pub struct ConnectionManager {
    config: TransportConfig,
    status_tx: watch::Sender<ConnectionStatus>,
    messages: broadcast::Sender<String>,
    inner: Mutex<ManagerInner>,
}

struct ManagerInner {
    supervisor: Option<JoinHandle<()>>,
    /// Present only while the socket is open; `send` drops frames otherwise.
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl ConnectionManager {
    pub fn new(config: TransportConfig) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (messages, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            status_tx,
            messages,
            inner: Mutex::new(ManagerInner {
                supervisor: None,
                outbound: None,
            }),
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// The returned receiver already holds the current status, so a late
    /// subscriber is never out of sync.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Raw inbound text frames, in transport arrival order.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.messages.subscribe()
    }

    /// Starts the connection supervisor. Idempotent: a no-op while a
    /// supervisor is already live.
    pub async fn connect(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if let Some(task) = guard.supervisor.as_ref() {
            if !task.is_finished() {
                debug!("connect: session supervisor already running");
                return;
            }
        }
        self.status_tx.send_replace(ConnectionStatus::Connecting);
        let manager = Arc::clone(self);
        guard.supervisor = Some(tokio::spawn(async move {
            manager.run_session().await;
        }));
    }

    /// Submits one text frame if the socket is currently open; otherwise the
    /// frame is dropped with a warning. No queueing and no send retries.
    pub async fn send(&self, text: &str) {
        let guard = self.inner.lock().await;
        let delivered = match guard.outbound.as_ref() {
            Some(tx) => tx.send(Message::Text(text.to_string())).is_ok(),
            None => false,
        };
        if !delivered {
            warn!("socket not open; dropping outbound frame");
        }
    }

    /// Tears the connection down and stops all reconnection until the next
    /// explicit [`connect`](Self::connect). Idempotent.
    pub async fn disconnect(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(task) = guard.supervisor.take() {
            task.abort();
        }
        guard.outbound = None;
        self.status_tx.send_if_modified(|status| {
            if *status == ConnectionStatus::Disconnected {
                false
            } else {
                *status = ConnectionStatus::Disconnected;
                true
            }
        });
    }

    /// Supervisor loop: connect, pump frames until the socket drops, back
    /// off, repeat. Exactly one reconnect sleep is ever pending because this
    /// loop is the only scheduler.
    async fn run_session(self: Arc<Self>) {
        let mut attempts: u32 = 0;
        loop {
            match connect_async(self.config.url.as_str()).await {
                Ok((stream, _)) => {
                    attempts = 0;
                    info!(url = %self.config.url, "gateway socket connected");

                    let (mut writer, mut reader) = stream.split();
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                    self.inner.lock().await.outbound = Some(out_tx);
                    // install the sender first so a send() racing the
                    // Connected announcement cannot be dropped
                    self.status_tx.send_replace(ConnectionStatus::Connected);

                    loop {
                        tokio::select! {
                            frame = reader.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = self.messages.send(text);
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(err)) => {
                                    warn!("socket receive failed: {err}");
                                    break;
                                }
                            },
                            outbound = out_rx.recv() => match outbound {
                                Some(message) => {
                                    if let Err(err) = writer.send(message).await {
                                        warn!("socket send failed: {err}");
                                        break;
                                    }
                                }
                                None => break,
                            },
                        }
                    }

                    // Stop accepting outbound frames before tearing the
                    // writer down, then drain anything that raced in so no
                    // frame vanishes without the drop warning.
                    self.inner.lock().await.outbound = None;
                    out_rx.close();
                    while out_rx.try_recv().is_ok() {
                        warn!("socket closed before frame was written; dropping outbound frame");
                    }
                }
                Err(err) => {
                    warn!(url = %self.config.url, "gateway connect failed: {err}");
                }
            }

            if attempts >= self.config.max_reconnect_attempts {
                warn!(attempts, "reconnect budget exhausted; gateway unreachable");
                self.status_tx.send_replace(ConnectionStatus::Unreachable);
                return;
            }

            let delay = reconnect_delay(attempts, &self.config);
            attempts += 1;
            self.status_tx.send_replace(ConnectionStatus::Reconnecting);
            debug!(attempts, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            sleep(delay).await;
        }
    }
}

/// Exponential backoff: `initial * 2^attempts`, capped at `max_backoff`.
/// Defaults produce 1s, 2s, 4s, 8s, 16s, 30s, 30s, ...
pub(crate) fn reconnect_delay(attempts: u32, config: &TransportConfig) -> Duration {
    let base = config.initial_backoff.as_millis() as u64;
    let cap = config.max_backoff.as_millis() as u64;
    // The shift saturates well past the cap for any realistic config.
    let millis = base.saturating_mul(1u64 << attempts.min(20));
    Duration::from_millis(millis.min(cap))
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
