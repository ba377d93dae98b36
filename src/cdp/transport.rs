//! One WebSocket connection to one CDP target.
//!
//! Outgoing calls carry a monotonically increasing id and rendezvous
//! with their reply through a per-id oneshot slot. Incoming frames
//! with a `method` are events; they go to an unbounded queue drained
//! by a dispatch task that invokes registered listeners. Listener
//! callbacks run on the dispatch task and must not block.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{DualError, Result};

/// Interval at which blocked callers re-check the stop flag.
const POLL_SLICE: Duration = Duration::from_secs(1);

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

struct SessionState {
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    listeners: Mutex<HashMap<String, EventHandler>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

/// A live CDP session. Cheap to clone; all clones share the socket.
#[derive(Clone)]
pub struct CdpSession {
    state: Arc<SessionState>,
    outgoing: mpsc::UnboundedSender<Message>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    ws_url: String,
}

impl CdpSession {
    /// Connect and start the reader/writer/dispatch tasks.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| DualError::BrowserConnect(format!("{ws_url}: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let state = Arc::new(SessionState {
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        });

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<(String, Value)>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_state = Arc::clone(&state);
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text.to_string(),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let json: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("unparseable CDP frame: {e}");
                        continue;
                    }
                };
                if let Some(id) = json.get("id").and_then(Value::as_u64) {
                    if let Some(slot) = reader_state.pending.lock().await.remove(&id) {
                        let _ = slot.send(json);
                    } else {
                        tracing::debug!("reply for unknown call id {id}");
                    }
                } else if let Some(method) = json.get("method").and_then(Value::as_str) {
                    let params = json.get("params").cloned().unwrap_or(Value::Null);
                    if event_tx.send((method.to_string(), params)).is_err() {
                        break;
                    }
                }
            }
            // Socket gone: unblock every pending caller.
            reader_state.stopped.store(true, Ordering::SeqCst);
            reader_state.pending.lock().await.clear();
        });

        let dispatch_state = Arc::clone(&state);
        let dispatcher = tokio::spawn(async move {
            while let Some((method, params)) = event_rx.recv().await {
                let handler = dispatch_state.listeners.lock().await.get(&method).cloned();
                if let Some(handler) = handler {
                    handler(params);
                }
            }
        });

        Ok(Self {
            state,
            outgoing,
            tasks: Arc::new(Mutex::new(vec![writer, reader, dispatcher])),
            ws_url: ws_url.to_string(),
        })
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Issue one CDP command and wait for its reply.
    ///
    /// Waits in one-second slices so `stop()` is honored promptly even
    /// under a long deadline. A CDP `error` reply becomes a typed
    /// error; a deadline expiry raises `Timeout`.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if self.is_stopped() {
            return Err(DualError::ConnectionStopped);
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.state.pending.lock().await.insert(id, reply_tx);

        let frame = serde_json::json!({ "id": id, "method": method, "params": params });
        if self
            .outgoing
            .send(Message::Text(frame.to_string().into()))
            .is_err()
        {
            self.state.pending.lock().await.remove(&id);
            return Err(DualError::ConnectionStopped);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_stopped() {
                self.state.pending.lock().await.remove(&id);
                return Err(DualError::ConnectionStopped);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                self.state.pending.lock().await.remove(&id);
                return Err(DualError::Timeout(format!("{method} ({timeout:?})")));
            }
            let slice = POLL_SLICE.min(deadline - now);
            match tokio::time::timeout(slice, &mut reply_rx).await {
                Ok(Ok(reply)) => return Self::unpack_reply(method, reply),
                Ok(Err(_)) => return Err(DualError::ConnectionStopped),
                Err(_) => continue,
            }
        }
    }

    fn unpack_reply(method: &str, reply: Value) -> Result<Value> {
        if let Some(error) = reply.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown CDP error")
                .to_string();
            return Err(DualError::from_cdp_reply(method, code, message));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Register (or with `None`, unregister) the listener for one
    /// event method. One listener per method; later wins.
    pub async fn set_listener(&self, method: &str, handler: Option<EventHandler>) {
        let mut listeners = self.state.listeners.lock().await;
        match handler {
            Some(h) => {
                listeners.insert(method.to_string(), h);
            }
            None => {
                listeners.remove(method);
            }
        }
    }

    /// Stop the session: close the socket, cancel the tasks, fail all
    /// pending and future calls. Idempotent.
    pub async fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outgoing.send(Message::Close(None));
        // Dropping the pending slots unblocks waiting callers with
        // ConnectionStopped.
        self.state.pending.lock().await.clear();
        self.state.listeners.lock().await.clear();
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal in-process CDP endpoint: answers `Test.echo` with its
    /// params, emits one `Test.event` after an `Test.emit` call, and
    /// never answers `Test.black_hole`.
    async fn spawn_fake_cdp() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut stream) = ws.split();
            while let Some(Ok(Message::Text(text))) = stream.next().await {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let id = frame["id"].as_u64().unwrap();
                match frame["method"].as_str().unwrap() {
                    "Test.echo" => {
                        let reply = serde_json::json!({
                            "id": id,
                            "result": frame["params"].clone(),
                        });
                        sink.send(Message::Text(reply.to_string().into())).await.unwrap();
                    }
                    "Test.emit" => {
                        let event = serde_json::json!({
                            "method": "Test.event",
                            "params": { "seq": 7 },
                        });
                        sink.send(Message::Text(event.to_string().into())).await.unwrap();
                        let reply = serde_json::json!({ "id": id, "result": {} });
                        sink.send(Message::Text(reply.to_string().into())).await.unwrap();
                    }
                    "Test.fail" => {
                        let reply = serde_json::json!({
                            "id": id,
                            "error": { "code": -32000, "message": "Could not find node with given id" },
                        });
                        sink.send(Message::Text(reply.to_string().into())).await.unwrap();
                    }
                    "Test.black_hole" => {}
                    other => panic!("unexpected method {other}"),
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn call_round_trips_params() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        let result = session
            .call(
                "Test.echo",
                serde_json::json!({"x": 1}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(result["x"], 1);
    }

    #[tokio::test]
    async fn events_reach_registered_listener() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();

        let (seen_tx, seen_rx) = oneshot::channel::<Value>();
        let seen_tx = std::sync::Mutex::new(Some(seen_tx));
        session
            .set_listener(
                "Test.event",
                Some(Arc::new(move |params| {
                    if let Some(tx) = seen_tx.lock().unwrap().take() {
                        let _ = tx.send(params);
                    }
                })),
            )
            .await;

        session
            .call("Test.emit", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();

        let params = tokio::time::timeout(Duration::from_secs(5), seen_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(params["seq"], 7);
    }

    #[tokio::test]
    async fn unregistered_listener_is_silent() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        session
            .set_listener("Test.event", Some(Arc::new(|_| panic!("should not fire"))))
            .await;
        session.set_listener("Test.event", None).await;
        session
            .call("Test.emit", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        // Give the dispatcher a moment; a registered listener would panic.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn later_listener_replaces_earlier() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();

        let (seen_tx, seen_rx) = oneshot::channel::<&'static str>();
        let seen_tx = std::sync::Mutex::new(Some(seen_tx));
        session
            .set_listener("Test.event", Some(Arc::new(|_| panic!("replaced listener fired"))))
            .await;
        session
            .set_listener(
                "Test.event",
                Some(Arc::new(move |_| {
                    if let Some(tx) = seen_tx.lock().unwrap().take() {
                        let _ = tx.send("second");
                    }
                })),
            )
            .await;

        session
            .call("Test.emit", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap();
        let winner = tokio::time::timeout(Duration::from_secs(5), seen_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(winner, "second");
    }

    #[tokio::test]
    async fn cdp_error_reply_is_typed() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        let err = session
            .call("Test.fail", serde_json::json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DualError::ElementLost(_)));
    }

    #[tokio::test]
    async fn unanswered_call_times_out() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        let err = session
            .call(
                "Test.black_hole",
                serde_json::json!({}),
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DualError::Timeout(_)));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_fails_future_calls() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        session.stop().await;
        session.stop().await;
        let err = session
            .call("Test.echo", serde_json::json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DualError::ConnectionStopped));
    }

    #[tokio::test]
    async fn stop_unblocks_pending_caller() {
        let url = spawn_fake_cdp().await;
        let session = CdpSession::connect(&url).await.unwrap();
        let blocked = session.clone();
        let handle = tokio::spawn(async move {
            blocked
                .call(
                    "Test.black_hole",
                    serde_json::json!({}),
                    Duration::from_secs(30),
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.stop().await;
        let err = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, DualError::ConnectionStopped));
    }
}
