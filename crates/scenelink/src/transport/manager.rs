//! Reconnecting WebSocket manager
//!
//! Owns one connection to the scene authority. Each connection attempt runs
//! in its own task; the attempt's generation number lets handlers ignore
//! tasks that were superseded by `close()` or a newer attempt.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, trace, warn};

use scenelink_ecs::Signal;

use super::policy::ReconnectPolicy;
use super::protocol::{CloseInfo, CloseReason, ConnectionEvent, ConnectionState, Envelope, events};
use super::registry::EventRegistry;
use crate::context::AppContext;

/// Errors returned by the transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unsupported endpoint {endpoint}: {reason}")]
    Unsupported { endpoint: String, reason: String },

    #[error("No async runtime available")]
    NoRuntime,

    #[error("Not connected")]
    NotConnected,

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Mutable connection bookkeeping
#[derive(Default)]
struct Link {
    state: ConnectionState,
    reconnecting: bool,
    attempts: u32,
    /// Pending reconnect timer and its sequence number
    timer: Option<(u64, JoinHandle<()>)>,
    timer_seq: u64,
    /// Outbound frames for the open connection
    outbound: Option<mpsc::UnboundedSender<Message>>,
    /// Current connection attempt
    generation: u64,
    /// Set by `close()`; the next close counts as clean
    closing: bool,
}

struct WsInner {
    endpoint: String,
    policy: ReconnectPolicy,
    registry: EventRegistry,
    lifecycle: Signal<ConnectionEvent>,
    link: Mutex<Link>,
}

/// Reconnecting WebSocket client with a named-event interface.
#[derive(Clone)]
pub struct WsManager {
    inner: Arc<WsInner>,
}

impl WsManager {
    /// Create a manager for the endpoint and policy in the context's config.
    pub fn new(ctx: &AppContext) -> Self {
        let config = ctx.config();
        Self::with_endpoint(config.server.endpoint(), config.reconnect.policy())
    }

    pub fn with_endpoint(endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            inner: Arc::new(WsInner {
                endpoint: endpoint.into(),
                policy,
                registry: EventRegistry::new(),
                lifecycle: Signal::new(),
                link: Mutex::new(Link::default()),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.lock().state
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.inner.link.lock().attempts
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.link.lock().reconnecting
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.link.lock().timer.is_some()
    }

    /// Typed lifecycle events. The same events are also triggered by name.
    pub fn lifecycle(&self) -> &Signal<ConnectionEvent> {
        &self.inner.lifecycle
    }

    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.on_lifecycle(events::CONNECTED, callback);
    }

    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.on_lifecycle(events::DISCONNECTED, callback);
    }

    pub fn on_reconnecting<F>(&self, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.on_lifecycle(events::RECONNECTING, callback);
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.on_lifecycle(events::ERROR, callback);
    }

    fn on_lifecycle<F>(&self, name: &'static str, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner.lifecycle.connect(move |event: &ConnectionEvent| {
            if event.name() == name {
                callback(event);
            }
        });
    }

    /// Bind a callback to the raw `data` of every envelope named `name`.
    pub fn bind_event<F>(&self, name: &str, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.registry.bind(name, callback);
    }

    /// Bind a callback that receives `data` deserialized as `T`.
    ///
    /// Payloads that don't fit `T` are logged and dropped.
    pub fn bind<T, F>(&self, name: &str, callback: F)
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = name.to_string();
        self.inner
            .registry
            .bind(name, move |data| match T::deserialize(data) {
                Ok(payload) => callback(payload),
                Err(e) => warn!(event = %event, "Dropping event with unexpected payload: {}", e),
            });
    }

    /// Invoke the callbacks bound under `name`. Unbound names are a no-op.
    pub fn trigger_event(&self, name: &str, payload: &Value) -> usize {
        self.inner.registry.trigger(name, payload)
    }

    /// Open the socket.
    ///
    /// Fails only when the endpoint can't be served by this transport; every
    /// later failure is reported through the lifecycle events.
    pub fn connect(&self) -> Result<(), TransportError> {
        if let Err(e) = Self::check_endpoint(&self.inner.endpoint) {
            error!(endpoint = %self.inner.endpoint, "Cannot open socket: {}", e);
            return Err(e);
        }

        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let generation = {
            let mut link = self.inner.link.lock();
            if matches!(
                link.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                debug!(endpoint = %self.inner.endpoint, "Socket already open or opening");
                return Ok(());
            }
            link.generation += 1;
            link.state = ConnectionState::Connecting;
            link.closing = false;
            link.generation
        };

        debug!(endpoint = %self.inner.endpoint, generation, "Opening socket");
        runtime.spawn(self.clone().run_connection(generation));
        Ok(())
    }

    /// Cancel a pending reconnect. Safe to call when nothing is pending.
    pub fn stop_reconnect(&self) {
        let mut link = self.inner.link.lock();
        if let Some((_, timer)) = link.timer.take() {
            timer.abort();
            debug!(endpoint = %self.inner.endpoint, "Pending reconnect cancelled");
        }
        let was_reconnecting = std::mem::replace(&mut link.reconnecting, false);
        match link.state {
            ConnectionState::Reconnecting => link.state = ConnectionState::Disconnected,
            // A retry is mid-connect: orphan it so its outcome is ignored
            ConnectionState::Connecting if was_reconnecting => {
                link.generation += 1;
                link.state = ConnectionState::Disconnected;
                debug!(endpoint = %self.inner.endpoint, "In-flight reconnect abandoned");
            }
            _ => {}
        }
    }

    /// Close the connection cleanly and stop reconnecting.
    pub fn close(&self) {
        let outbound = {
            let mut link = self.inner.link.lock();
            if let Some((_, timer)) = link.timer.take() {
                timer.abort();
            }
            link.reconnecting = false;
            link.closing = true;

            if link.state == ConnectionState::Connected {
                link.outbound.clone()
            } else {
                // Orphan any attempt still in flight
                link.generation += 1;
                link.state = ConnectionState::Disconnected;
                link.outbound = None;
                None
            }
        };

        if let Some(tx) = outbound {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "client closing".into(),
            };
            if tx.send(Message::Close(Some(frame))).is_err() {
                debug!("Connection task already gone");
            }
        }
    }

    /// Send an envelope on the open connection.
    pub fn send(&self, event: &str, data: Value) -> Result<(), TransportError> {
        let text = serde_json::to_string(&Envelope::new(event, data))?;
        let link = self.inner.link.lock();
        match (&link.state, &link.outbound) {
            (ConnectionState::Connected, Some(tx)) => tx
                .send(Message::Text(text))
                .map_err(|_| TransportError::NotConnected),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn check_endpoint(endpoint: &str) -> Result<(), TransportError> {
        let unsupported = |reason: String| TransportError::Unsupported {
            endpoint: endpoint.to_string(),
            reason,
        };

        let uri = endpoint
            .parse::<Uri>()
            .map_err(|e| unsupported(e.to_string()))?;

        if uri.host().is_none() {
            return Err(unsupported("missing host".to_string()));
        }

        match uri.scheme_str() {
            Some("ws") => Ok(()),
            Some("wss") if cfg!(feature = "tls") => Ok(()),
            Some("wss") => Err(unsupported(
                "wss requires building with the `tls` feature".to_string(),
            )),
            Some(other) => Err(unsupported(format!("{other} is not a WebSocket scheme"))),
            None => Err(unsupported("missing scheme".to_string())),
        }
    }

    async fn run_connection(self, generation: u64) {
        let stream = match connect_async(self.inner.endpoint.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                self.handle_error(generation, e.to_string());
                self.handle_close(generation, CloseInfo::abnormal());
                return;
            }
        };

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        if !self.handle_open(generation, tx) {
            debug!(generation, "Connection attempt superseded, closing");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }

        let mut peer_close = None;
        let info = loop {
            tokio::select! {
                Some(message) = rx.recv() => {
                    if let Err(e) = sink.send(message).await {
                        self.handle_error(generation, e.to_string());
                        break CloseInfo::abnormal();
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_message(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_message(text),
                        Err(_) => warn!("Dropping binary frame that is not UTF-8"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        trace!(?frame, "Close frame received");
                        peer_close = Some(CloseInfo::from_frame(frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => match peer_close.take() {
                        Some(info) => break info,
                        None => {
                            self.handle_error(generation, e.to_string());
                            break CloseInfo::abnormal();
                        }
                    },
                    None => break peer_close.take().unwrap_or_else(CloseInfo::abnormal),
                },
            }
        };

        self.handle_close(generation, info);
    }

    /// Returns `false` if the attempt was superseded.
    fn handle_open(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        {
            let mut link = self.inner.link.lock();
            if link.generation != generation {
                return false;
            }
            if let Some((_, timer)) = link.timer.take() {
                timer.abort();
            }
            link.attempts = 0;
            link.reconnecting = false;
            link.state = ConnectionState::Connected;
            link.outbound = Some(outbound);
        }

        info!(endpoint = %self.inner.endpoint, "Connected");
        self.publish(ConnectionEvent::Connected {
            endpoint: self.inner.endpoint.clone(),
        });
        true
    }

    fn handle_message(&self, text: &str) {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => {
                let handled = self.inner.registry.trigger(&envelope.event, &envelope.data);
                if handled == 0 {
                    trace!(event = %envelope.event, "No handlers bound, dropping");
                }
            }
            Err(e) => {
                warn!("Dropping malformed envelope: {}", e);
            }
        }
    }

    fn handle_close(&self, generation: u64, info: CloseInfo) {
        let (notify, clean) = {
            let mut link = self.inner.link.lock();
            if link.generation != generation {
                trace!(generation, "Ignoring close of a superseded attempt");
                return;
            }
            link.outbound = None;
            let clean = info.clean || link.closing;
            let notify = !link.reconnecting;
            if clean {
                link.state = ConnectionState::Disconnected;
                link.reconnecting = false;
            }
            (notify, clean)
        };

        if notify {
            let reason = if clean {
                info!(endpoint = %self.inner.endpoint, code = info.code, "Disconnected");
                CloseReason::Clean
            } else {
                warn!(endpoint = %self.inner.endpoint, code = info.code, "Connection lost");
                CloseReason::Failed
            };
            self.publish(ConnectionEvent::Disconnected {
                endpoint: self.inner.endpoint.clone(),
                reason,
                code: info.code,
            });
        }

        if !clean {
            self.schedule_reconnect();
        }
    }

    fn handle_error(&self, generation: u64, message: String) {
        if self.inner.link.lock().generation != generation {
            return;
        }
        debug!(endpoint = %self.inner.endpoint, "Socket error: {}", message);
        self.publish(ConnectionEvent::Error {
            endpoint: self.inner.endpoint.clone(),
            message,
        });
    }

    fn schedule_reconnect(&self) {
        let exhausted = {
            let mut link = self.inner.link.lock();
            if !self.inner.policy.allows(link.attempts) {
                link.reconnecting = false;
                link.state = ConnectionState::Disconnected;
                Some(link.attempts)
            } else {
                link.reconnecting = true;
                link.state = ConnectionState::Reconnecting;

                if let Some((_, timer)) = link.timer.take() {
                    timer.abort();
                }

                let delay = self.inner.policy.delay(link.attempts);
                match Handle::try_current() {
                    Ok(runtime) => {
                        link.timer_seq += 1;
                        let seq = link.timer_seq;
                        let manager = self.clone();
                        let timer = runtime.spawn(async move {
                            tokio::time::sleep(delay).await;
                            manager.reconnect_tick(seq);
                        });
                        link.timer = Some((seq, timer));
                        debug!(
                            endpoint = %self.inner.endpoint,
                            delay_ms = delay.as_millis() as u64,
                            attempt = link.attempts,
                            "Reconnect scheduled"
                        );
                    }
                    Err(e) => error!("Cannot schedule reconnect: {}", e),
                }
                None
            }
        };

        if let Some(attempts) = exhausted {
            error!(endpoint = %self.inner.endpoint, attempts, "Giving up reconnecting");
            self.publish(ConnectionEvent::Error {
                endpoint: self.inner.endpoint.clone(),
                message: "reconnect attempts exhausted".to_string(),
            });
        }
    }

    fn reconnect_tick(&self, seq: u64) {
        let attempt = {
            let mut link = self.inner.link.lock();
            if link.timer.as_ref().is_some_and(|(current, _)| *current == seq) {
                link.timer = None;
            }
            if !link.reconnecting
                || matches!(
                    link.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                )
            {
                return;
            }
            let attempt = link.attempts;
            link.attempts += 1;
            attempt
        };

        info!(endpoint = %self.inner.endpoint, attempt, "Reconnecting");
        self.publish(ConnectionEvent::Reconnecting {
            endpoint: self.inner.endpoint.clone(),
            attempt,
        });

        if let Err(e) = self.connect() {
            error!(endpoint = %self.inner.endpoint, "Reconnect failed: {}", e);
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        self.inner.lifecycle.emit(&event);
        self.inner.registry.trigger(event.name(), &event.data());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const LONG: Duration = Duration::from_secs(60);

    fn manager(endpoint: &str, policy: ReconnectPolicy) -> WsManager {
        WsManager::with_endpoint(endpoint, policy)
    }

    fn events(manager: &WsManager) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        manager.lifecycle().connect(move |event: &ConnectionEvent| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn next_event<F>(
        rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
        mut wanted: F,
    ) -> ConnectionEvent
    where
        F: FnMut(&ConnectionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("lifecycle channel closed");
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for lifecycle event")
    }

    async fn local_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/", listener.local_addr().unwrap());
        (listener, endpoint)
    }

    #[test]
    fn test_connect_rejects_unsupported_scheme() {
        let m = manager("http://localhost:2345/", ReconnectPolicy::default());
        let err = m.connect().unwrap_err();
        assert!(matches!(err, TransportError::Unsupported { .. }));
        assert_eq!(m.state(), ConnectionState::Disconnected);

        let m = manager("not a url", ReconnectPolicy::default());
        assert!(matches!(m.connect(), Err(TransportError::Unsupported { .. })));
    }

    #[test]
    fn test_trigger_unbound_event() {
        let m = manager("ws://localhost:2345/", ReconnectPolicy::default());
        assert_eq!(m.trigger_event("colladaList", &json!(["a.dae"])), 0);
    }

    #[test]
    fn test_send_requires_connection() {
        let m = manager("ws://localhost:2345/", ReconnectPolicy::default());
        assert!(matches!(
            m.send("hello", Value::Null),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_messages_dispatch_by_event() {
        #[derive(Deserialize)]
        struct Ping {
            seq: u32,
        }

        let m = manager("ws://localhost:2345/", ReconnectPolicy::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            m.bind("ping", move |ping: Ping| seen.lock().push(format!("typed:{}", ping.seq)));
        }
        {
            let seen = seen.clone();
            m.bind_event("ping", move |data| seen.lock().push(format!("raw:{}", data["seq"])));
        }

        m.handle_message(r#"{"event":"ping","data":{"seq":3}}"#);
        m.handle_message(r#"{"event":"ping","data":{"seq":"three"}}"#);
        m.handle_message("{not json");
        m.handle_message(r#"{"event":"unbound","data":1}"#);

        assert_eq!(
            *seen.lock(),
            vec![
                "typed:3".to_string(),
                "raw:3".to_string(),
                "raw:\"three\"".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unclean_close_schedules_one_reconnect() {
        let m = manager("ws://127.0.0.1:9/", ReconnectPolicy::fixed(LONG));
        let mut rx = events(&m);

        m.handle_close(0, CloseInfo::abnormal());
        assert!(m.is_reconnecting());
        assert!(m.has_pending_reconnect());
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectionEvent::Disconnected {
                endpoint: "ws://127.0.0.1:9/".to_string(),
                reason: CloseReason::Failed,
                code: 1006,
            }
        );

        // Already reconnecting: no second disconnected, timer replaced not added
        m.handle_close(0, CloseInfo::abnormal());
        assert!(rx.try_recv().is_err());
        assert!(m.has_pending_reconnect());

        m.stop_reconnect();
        assert!(!m.has_pending_reconnect());
        assert!(!m.is_reconnecting());
        assert_eq!(m.state(), ConnectionState::Disconnected);

        m.stop_reconnect();
        assert!(!m.has_pending_reconnect());
    }

    #[tokio::test]
    async fn test_stop_reconnect_abandons_attempt_in_flight() {
        // Accepts TCP but never answers the handshake, until told to hang up
        let (listener, endpoint) = local_listener().await;
        let (hang_up, hung_up) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = hung_up.await;
            drop(stream);
        });

        let m = manager(&endpoint, ReconnectPolicy::fixed(Duration::from_millis(10)));
        let mut rx = events(&m);

        m.handle_close(0, CloseInfo::abnormal());
        next_event(&mut rx, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while m.state() != ConnectionState::Connecting {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("retry never started connecting");

        m.stop_reconnect();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.is_reconnecting());

        let _ = hang_up.send(());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut after_stop = Vec::new();
        while let Ok(event) = rx.try_recv() {
            after_stop.push(event.name());
        }
        assert!(after_stop.is_empty(), "events after stop: {after_stop:?}");
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.is_reconnecting());
        assert!(!m.has_pending_reconnect());
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_filter_by_kind() {
        let m = manager("ws://127.0.0.1:9/", ReconnectPolicy::fixed(LONG));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            m.on_disconnected(move |event| seen.lock().push(format!("typed:{}", event.name())));
        }
        {
            let seen = seen.clone();
            m.on_connected(move |event| seen.lock().push(format!("typed:{}", event.name())));
        }
        {
            let seen = seen.clone();
            m.bind_event("disconnected", move |data| {
                seen.lock().push(format!("named:{}", data["reason"].as_str().unwrap_or("")))
            });
        }

        m.handle_close(0, CloseInfo::abnormal());
        m.stop_reconnect();

        assert_eq!(
            *seen.lock(),
            vec!["typed:disconnected".to_string(), "named:failed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_open_resets_reconnect_state() {
        let m = manager("ws://127.0.0.1:9/", ReconnectPolicy::fixed(LONG));
        let mut rx = events(&m);

        m.handle_close(0, CloseInfo::abnormal());
        m.inner.link.lock().attempts = 4;

        let (tx, _outbound) = mpsc::unbounded_channel();
        assert!(m.handle_open(0, tx));
        assert_eq!(m.attempts(), 0);
        assert!(!m.is_reconnecting());
        assert!(!m.has_pending_reconnect());
        assert_eq!(m.state(), ConnectionState::Connected);

        let event = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
        assert_eq!(event.name(), "connected");
    }

    #[tokio::test]
    async fn test_clean_close_handshake_and_dispatch() {
        let (listener, endpoint) = local_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let hello = ws.next().await.unwrap().unwrap();
            let hello: Envelope = serde_json::from_str(hello.to_text().unwrap()).unwrap();
            assert_eq!(hello.event, "hello");

            let scene = json!({ "event": "scene", "data": "<scene/>" }).to_string();
            ws.send(Message::Text(scene)).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            }))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let m = manager(&endpoint, ReconnectPolicy::fixed(LONG));
        let mut rx = events(&m);
        let (scene_tx, mut scene_rx) = mpsc::unbounded_channel();
        for tag in ["first", "second"] {
            let scene_tx = scene_tx.clone();
            m.bind_event("scene", move |data| {
                let _ = scene_tx.send((tag, data.clone()));
            });
        }
        {
            let sender = m.clone();
            m.lifecycle().connect(move |event: &ConnectionEvent| {
                if matches!(event, ConnectionEvent::Connected { .. }) {
                    sender.send("hello", json!({})).unwrap();
                }
            });
        }

        m.connect().unwrap();
        next_event(&mut rx, |e| matches!(e, ConnectionEvent::Connected { .. })).await;

        assert_eq!(scene_rx.recv().await.unwrap(), ("first", json!("<scene/>")));
        assert_eq!(scene_rx.recv().await.unwrap(), ("second", json!("<scene/>")));

        let closed = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert_eq!(
            closed,
            ConnectionEvent::Disconnected {
                endpoint: endpoint.clone(),
                reason: CloseReason::Clean,
                code: 1000,
            }
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.has_pending_reconnect());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_connection_reconnects() {
        let (listener, endpoint) = local_listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            drop(ws);
        });

        let m = manager(&endpoint, ReconnectPolicy::fixed(LONG));
        let mut rx = events(&m);
        m.connect().unwrap();

        next_event(&mut rx, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
        let lost = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert_eq!(
            lost,
            ConnectionEvent::Disconnected {
                endpoint,
                reason: CloseReason::Failed,
                code: 1006,
            }
        );
        assert!(m.is_reconnecting());
        assert!(m.has_pending_reconnect());

        m.stop_reconnect();
        assert!(!m.has_pending_reconnect());
    }

    #[tokio::test]
    async fn test_reconnects_when_peer_returns() {
        // Reserve a port, then leave it closed so the first attempts are refused
        let (listener, endpoint) = local_listener().await;
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let m = manager(&endpoint, ReconnectPolicy::fixed(Duration::from_millis(50)));
        let mut rx = events(&m);
        m.connect().unwrap();

        let lost = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert!(matches!(
            lost,
            ConnectionEvent::Disconnected {
                reason: CloseReason::Failed,
                ..
            }
        ));
        let first = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await;
        assert!(matches!(first, ConnectionEvent::Reconnecting { attempt: 0, .. }));

        let listener = TcpListener::bind(addr).await.unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut disconnects = 0;
        let connected = next_event(&mut rx, |e| {
            if matches!(e, ConnectionEvent::Disconnected { .. }) {
                disconnects += 1;
            }
            matches!(e, ConnectionEvent::Connected { .. })
        })
        .await;
        assert_eq!(connected.name(), "connected");
        assert_eq!(disconnects, 0, "no disconnected events while reconnecting");
        assert_eq!(m.attempts(), 0);
        assert!(!m.is_reconnecting());
        assert_eq!(m.state(), ConnectionState::Connected);

        m.close();
        let closed = next_event(&mut rx, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
        assert!(matches!(
            closed,
            ConnectionEvent::Disconnected {
                reason: CloseReason::Clean,
                ..
            }
        ));
        assert!(!m.has_pending_reconnect());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (listener, endpoint) = local_listener().await;
        drop(listener);

        let policy = ReconnectPolicy::fixed(Duration::from_millis(10)).with_max_attempts(2);
        let m = manager(&endpoint, policy);
        let mut rx = events(&m);
        m.connect().unwrap();

        let given_up = next_event(&mut rx, |e| {
            matches!(e, ConnectionEvent::Error { message, .. } if message == "reconnect attempts exhausted")
        })
        .await;
        assert_eq!(given_up.name(), "error");
        assert_eq!(m.attempts(), 2);
        assert!(!m.is_reconnecting());
        assert!(!m.has_pending_reconnect());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }
}
