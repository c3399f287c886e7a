//! STOMP 1.2 over WebSocket, driven by a shared tokio runtime.
//!
//! The handshake and subscription calls block the caller (via `block_on`) until
//! the broker answers. Afterwards a reader task dispatches MESSAGE frames to the
//! subscription handlers and a writer task drains the outgoing queue.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    runtime::Runtime,
    sync::{mpsc, oneshot, watch},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{
    frame::{Command, Frame},
    transport::{BrokerTransport, ConnectCredentials, FrameHandler, TransportError, TransportFactory},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ReceiptResult = Result<(), String>;

const BROKER_READER_STOPPED: &str = "CHAT_BROKER_READER_STOPPED";
const BROKER_READ_FAILED: &str = "CHAT_BROKER_READ_FAILED";
const BROKER_ERROR_FRAME: &str = "CHAT_BROKER_ERROR_FRAME";
const BROKER_FRAME_INVALID: &str = "CHAT_BROKER_FRAME_INVALID";

#[derive(Debug, Clone)]
pub struct WebSocketTransportFactory {
    endpoint: String,
    runtime: Arc<Runtime>,
    timeout: Duration,
}

impl WebSocketTransportFactory {
    pub fn new(endpoint: impl Into<String>, runtime: Arc<Runtime>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            runtime,
            timeout,
        }
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(&self) -> Result<Box<dyn BrokerTransport>, TransportError> {
        Ok(Box::new(StompWebSocketTransport::new(
            self.endpoint.clone(),
            Arc::clone(&self.runtime),
            self.timeout,
        )))
    }
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    handlers: Mutex<HashMap<String, FrameHandler>>,
    receipts: Mutex<HashMap<String, oneshot::Sender<ReceiptResult>>>,
}

pub struct StompWebSocketTransport {
    endpoint: String,
    runtime: Arc<Runtime>,
    timeout: Duration,
    shared: Arc<Shared>,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    stop_tx: Option<watch::Sender<bool>>,
    next_id: u32,
}

impl StompWebSocketTransport {
    fn new(endpoint: String, runtime: Arc<Runtime>, timeout: Duration) -> Self {
        Self {
            endpoint,
            runtime,
            timeout,
            shared: Arc::new(Shared::default()),
            outgoing: None,
            stop_tx: None,
            next_id: 0,
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.next_id);
        self.next_id += 1;
        id
    }

    fn enqueue(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::NotConnected)?;
        outgoing
            .send(Message::text(frame.encode()))
            .map_err(|_| TransportError::NotConnected)
    }
}

impl BrokerTransport for StompWebSocketTransport {
    fn connect(&mut self, credentials: &ConnectCredentials) -> Result<(), TransportError> {
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;
        let connect_frame = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", host_of(&endpoint))
            .header("heart-beat", "0,0")
            .header("Authorization", format!("Bearer {}", credentials.token))
            .header("userId", credentials.user_id.to_string())
            .header("nickname", credentials.nickname.clone());

        let ws = self.runtime.block_on(async move {
            let (mut ws, _) = tokio::time::timeout(timeout, connect_async(endpoint.as_str()))
                .await
                .map_err(|_| TransportError::Timeout("websocket connect"))?
                .map_err(|error| TransportError::Connect(error.to_string()))?;

            ws.send(Message::text(connect_frame.encode()))
                .await
                .map_err(|error| TransportError::Connect(error.to_string()))?;

            tokio::time::timeout(timeout, await_connected(&mut ws))
                .await
                .map_err(|_| TransportError::Timeout("CONNECTED frame"))??;

            Ok::<_, TransportError>(ws)
        })?;

        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        self.runtime.spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    next = stream.next() => match next {
                        Some(Ok(Message::Text(text))) => dispatch(&shared, text.as_str()),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(
                                code = BROKER_READ_FAILED,
                                error = %error,
                                "broker websocket read failed"
                            );
                            break;
                        }
                    }
                }
            }
            shared.connected.store(false, Ordering::SeqCst);
            tracing::debug!(code = BROKER_READER_STOPPED, "broker reader stopped");
        });

        self.outgoing = Some(out_tx);
        self.stop_tx = Some(stop_tx);
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(
        &mut self,
        destination: &str,
        handler: FrameHandler,
    ) -> Result<(), TransportError> {
        let subscription_id = self.next_id("sub");
        let receipt_id = self.next_id("receipt");
        let (receipt_tx, receipt_rx) = oneshot::channel();

        lock(&self.shared.receipts).insert(receipt_id.clone(), receipt_tx);
        lock(&self.shared.handlers).insert(subscription_id.clone(), handler);

        let frame = Frame::new(Command::Subscribe)
            .header("id", subscription_id.clone())
            .header("destination", destination)
            .header("ack", "auto")
            .header("receipt", receipt_id.clone());
        let outcome = self.enqueue(&frame).and_then(|()| {
            let timeout = self.timeout;
            match self
                .runtime
                .block_on(async move { tokio::time::timeout(timeout, receipt_rx).await })
            {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(message))) => Err(TransportError::Rejected(message)),
                Ok(Err(_)) => Err(TransportError::NotConnected),
                Err(_) => Err(TransportError::Timeout("subscription receipt")),
            }
        });

        if outcome.is_err() {
            lock(&self.shared.receipts).remove(&receipt_id);
            lock(&self.shared.handlers).remove(&subscription_id);
        }
        outcome
    }

    fn send(&mut self, destination: &str, body: &str) -> Result<(), TransportError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json;charset=UTF-8")
            .with_body(body);
        self.enqueue(&frame)
    }

    fn disconnect(&mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            if self.shared.connected.load(Ordering::SeqCst) {
                let _ = outgoing.send(Message::text(Frame::new(Command::Disconnect).encode()));
            }
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        self.shared.connected.store(false, Ordering::SeqCst);
        lock(&self.shared.handlers).clear();
        lock(&self.shared.receipts).clear();
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for StompWebSocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn await_connected(ws: &mut WsStream) -> Result<(), TransportError> {
    while let Some(next) = ws.next().await {
        let message = next.map_err(|error| TransportError::Connect(error.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match Frame::decode(text.as_str()) {
            Ok(Some(frame)) if frame.command == Command::Connected => return Ok(()),
            Ok(Some(frame)) if frame.command == Command::Error => {
                return Err(TransportError::Rejected(error_summary(&frame)));
            }
            Ok(_) => continue,
            Err(error) => return Err(TransportError::Protocol(error.to_string())),
        }
    }

    Err(TransportError::Connect(
        "connection closed during handshake".to_owned(),
    ))
}

fn dispatch(shared: &Shared, raw: &str) {
    let frame = match Frame::decode(raw) {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(error) => {
            tracing::warn!(code = BROKER_FRAME_INVALID, error = %error, "ignoring invalid frame");
            return;
        }
    };

    match frame.command {
        Command::Message => {
            let Some(subscription) = frame.header_value("subscription") else {
                return;
            };
            if let Some(handler) = lock(&shared.handlers).get_mut(subscription) {
                handler(frame.body);
            }
        }
        Command::Receipt => {
            if let Some(receipt_id) = frame.header_value("receipt-id") {
                if let Some(waiter) = lock(&shared.receipts).remove(receipt_id) {
                    let _ = waiter.send(Ok(()));
                }
            }
        }
        Command::Error => {
            let summary = error_summary(&frame);
            tracing::warn!(code = BROKER_ERROR_FRAME, error = %summary, "broker sent ERROR frame");
            if let Some(receipt_id) = frame.header_value("receipt-id") {
                if let Some(waiter) = lock(&shared.receipts).remove(receipt_id) {
                    let _ = waiter.send(Err(summary));
                }
            }
        }
        _ => {}
    }
}

fn error_summary(frame: &Frame) -> String {
    frame
        .header_value("message")
        .map(str::to_owned)
        .unwrap_or_else(|| frame.body.trim().to_owned())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Host header value for the CONNECT frame.
fn host_of(endpoint: &str) -> &str {
    let without_scheme = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    authority
        .rsplit_once(':')
        .map_or(authority, |(host, _)| host)
}
