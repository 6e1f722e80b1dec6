use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use shared::domain::ChannelId;
use shared::protocol::{ClientCommand, Envelope, EventKind, EventMeta};

/// Observable lifecycle of a gateway session. Transitions are driven by the
/// runner task; callers read them through [`GatewaySession::watch_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
}

pub type EventHandler = Arc<dyn Fn(&serde_json::Value, &EventMeta) + Send + Sync>;

/// One open socket. Text frames only; the production impl folds ping/pong
/// and binary frames away below this seam.
#[async_trait]
pub trait GatewaySocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame. `None` means the peer closed the socket.
    async fn next_frame(&mut self) -> Option<Result<String>>;
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn GatewaySocket>>;
}

pub struct TungsteniteTransport;

struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl GatewayTransport for TungsteniteTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn GatewaySocket>> {
        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(Box::new(TungsteniteSocket { stream }))
    }
}

#[async_trait]
impl GatewaySocket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Some(Ok(text)),
                Some(Ok(WsMessage::Close(_))) => return None,
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Some(Err(err.into())),
                None => return None,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub url: Url,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub outbox_capacity: usize,
}

impl GatewayConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            outbox_capacity: 64,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, EventHandler)>>,
}

/// Fan-out list per event kind. Dispatch iterates a snapshot of the list so
/// a handler may subscribe or unsubscribe mid-pass without corrupting it.
pub(crate) struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

impl SubscriptionRegistry {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> u64 {
        let mut inner = self.inner.lock().expect("gateway registry lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    fn unsubscribe(&self, kind: EventKind, id: u64) {
        let mut inner = self.inner.lock().expect("gateway registry lock poisoned");
        if let Some(entries) = inner.handlers.get_mut(&kind) {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    fn dispatch(&self, kind: EventKind, payload: &serde_json::Value, meta: &EventMeta) {
        let snapshot: Vec<EventHandler> = {
            let inner = self.inner.lock().expect("gateway registry lock poisoned");
            inner
                .handlers
                .get(&kind)
                .map(|entries| entries.iter().map(|(_, handler)| handler.clone()).collect())
                .unwrap_or_default()
        };
        for handler in snapshot {
            handler(payload, meta);
        }
    }
}

/// Disposer for one registered handler. Dropping (or calling [`cancel`])
/// removes exactly this registration; other handlers for the same kind are
/// unaffected.
///
/// [`cancel`]: Subscription::cancel
pub struct Subscription {
    registry: Arc<SubscriptionRegistry>,
    kind: EventKind,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.registry.unsubscribe(self.kind, self.id);
            self.active = false;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

struct SessionInner {
    runner: Option<JoinHandle<()>>,
    outbox_tx: Option<mpsc::Sender<ClientCommand>>,
}

/// One gateway session: a single socket plus its reconnect loop and
/// subscription registry. Explicitly constructed and passed by reference;
/// the embedding application owns exactly one per logged-in session.
pub struct GatewaySession {
    config: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    registry: Arc<SubscriptionRegistry>,
    channel_interest: Mutex<HashSet<ChannelId>>,
    state_tx: watch::Sender<ConnectionState>,
    // Bumped on every connect/disconnect; a runner from a previous epoch
    // must not publish state after it has been replaced or stopped.
    epoch: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl GatewaySession {
    pub fn new(config: GatewayConfig, transport: Arc<dyn GatewayTransport>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Arc::new(Self {
            config,
            transport,
            registry: Arc::new(SubscriptionRegistry::new()),
            channel_interest: Mutex::new(HashSet::new()),
            state_tx,
            epoch: AtomicU64::new(0),
            inner: Mutex::new(SessionInner {
                runner: None,
                outbox_tx: None,
            }),
        })
    }

    pub fn with_default_transport(config: GatewayConfig) -> Arc<Self> {
        Self::new(config, Arc::new(TungsteniteTransport))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Registers `handler` for `kind`. Handlers for the same kind run in
    /// registration order, synchronously within the frame that carried the
    /// event.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&serde_json::Value, &EventMeta) + Send + Sync + 'static,
    ) -> Subscription {
        let handler: EventHandler = Arc::new(handler);
        let id = self.registry.subscribe(kind, handler);
        Subscription {
            registry: Arc::clone(&self.registry),
            kind,
            id,
            active: true,
        }
    }

    /// Opens the socket and keeps it open: transient failures reconnect with
    /// capped exponential backoff until [`disconnect`] is called. Calling
    /// `connect` on a running session replaces the previous runner.
    ///
    /// [`disconnect`]: GatewaySession::disconnect
    pub fn connect(self: &Arc<Self>, token: impl Into<String>) {
        let token = token.into();
        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbox_capacity);
        let mut inner = self.inner.lock().expect("gateway session lock poisoned");
        if let Some(previous) = inner.runner.take() {
            previous.abort();
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        inner.outbox_tx = Some(outbox_tx);
        let session = Arc::clone(self);
        inner.runner = Some(tokio::spawn(async move {
            session.run(epoch, token, outbox_rx).await;
        }));
    }

    /// Closes the socket and suppresses any pending reconnect. Terminal
    /// until the next [`connect`].
    ///
    /// [`connect`]: GatewaySession::connect
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock().expect("gateway session lock poisoned");
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(runner) = inner.runner.take() {
            runner.abort();
        }
        inner.outbox_tx = None;
        self.state_tx.send_replace(ConnectionState::Idle);
    }

    /// Queues a command for delivery. Never fails: while disconnected the
    /// command waits in a bounded outbox flushed on (re)connect; overflow
    /// drops the command with a warning.
    pub fn send(&self, command: ClientCommand) {
        let inner = self.inner.lock().expect("gateway session lock poisoned");
        let Some(outbox_tx) = inner.outbox_tx.as_ref() else {
            warn!("gateway: session not started, dropping command");
            return;
        };
        if outbox_tx.try_send(command).is_err() {
            warn!("gateway: outbox full or closed, dropping command");
        }
    }

    /// Replaces the channel interest set. The set is re-announced to the
    /// server after every reconnect.
    pub fn subscribe_channels(&self, channel_ids: Vec<ChannelId>) {
        {
            let mut interest = self
                .channel_interest
                .lock()
                .expect("gateway interest lock poisoned");
            *interest = channel_ids.iter().cloned().collect();
        }
        self.send(ClientCommand::Subscribe { channel_ids });
    }

    /// Publishes `state` unless this runner has been replaced or stopped.
    fn set_state(&self, epoch: u64, state: ConnectionState) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    async fn run(
        self: Arc<Self>,
        epoch: u64,
        token: String,
        mut outbox_rx: mpsc::Receiver<ClientCommand>,
    ) {
        let mut backoff = self.config.initial_backoff;
        loop {
            if !self.set_state(epoch, ConnectionState::Connecting) {
                return;
            }
            match self.transport.connect(&self.config.url).await {
                Ok(mut socket) => match self.start_session(socket.as_mut(), &token).await {
                    Ok(()) => {
                        backoff = self.config.initial_backoff;
                        if !self.set_state(epoch, ConnectionState::Connected) {
                            return;
                        }
                        info!(url = %self.config.url, "gateway: connected");
                        self.drive(socket.as_mut(), &mut outbox_rx).await;
                    }
                    Err(err) => {
                        warn!(%err, "gateway: handshake failed");
                    }
                },
                Err(err) => {
                    warn!(%err, "gateway: connect failed");
                }
            }
            if !self.set_state(epoch, ConnectionState::Reconnecting) {
                return;
            }
            debug!(delay_ms = backoff.as_millis() as u64, "gateway: retrying after backoff");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }

    /// Identify must be the first frame on a fresh socket; channel interest
    /// is re-announced right after so a reconnect restores the server-side
    /// subscription set.
    async fn start_session(&self, socket: &mut dyn GatewaySocket, token: &str) -> Result<()> {
        let identify = ClientCommand::Identify {
            token: token.to_string(),
        };
        socket.send_text(serde_json::to_string(&identify)?).await?;

        let channel_ids: Vec<ChannelId> = {
            let interest = self
                .channel_interest
                .lock()
                .expect("gateway interest lock poisoned");
            interest.iter().cloned().collect()
        };
        if !channel_ids.is_empty() {
            let subscribe = ClientCommand::Subscribe { channel_ids };
            socket.send_text(serde_json::to_string(&subscribe)?).await?;
        }
        Ok(())
    }

    async fn drive(
        &self,
        socket: &mut dyn GatewaySocket,
        outbox_rx: &mut mpsc::Receiver<ClientCommand>,
    ) {
        loop {
            tokio::select! {
                command = outbox_rx.recv() => {
                    let Some(command) = command else { return };
                    let text = match serde_json::to_string(&command) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(%err, "gateway: unserializable outbound command");
                            continue;
                        }
                    };
                    if let Err(err) = socket.send_text(text).await {
                        warn!(%err, "gateway: send failed");
                        return;
                    }
                }
                frame = socket.next_frame() => {
                    match frame {
                        Some(Ok(text)) => self.handle_frame(&text),
                        Some(Err(err)) => {
                            warn!(%err, "gateway: socket error");
                            return;
                        }
                        None => {
                            info!("gateway: socket closed by peer");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Decode failures and unknown event types are dropped here; nothing in
    /// this path may take down the read loop.
    fn handle_frame(&self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(%err, "gateway: discarding undecodable frame");
                return;
            }
        };
        let Some(kind) = EventKind::from_wire(&envelope.event.kind) else {
            debug!(kind = %envelope.event.kind, "gateway: ignoring unrecognized event");
            return;
        };
        self.registry.dispatch(kind, &envelope.event.payload, &envelope.meta);
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
