use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::{HUB_HEARTBEAT_SECS, HUB_REQUEST_TIMEOUT_SECS, RECONNECT_BACKOFF_MS};
use crate::error::{AppError, Result};
use crate::hub::messages::{build_justsaying, build_request, build_response, parse_hub_frame, HubFrame};

/// Manages the single persistent WebSocket connection to the ledger hub.
///
/// Outbound requests are tagged and correlated to `response` frames through
/// `pending`; connection generations are published on a watch channel so the
/// discovery trigger loop can observe connects and reconnects.
pub struct HubClient {
    hub_url: String,
    /// tag → reply slot for in-flight requests.
    pending: DashMap<String, oneshot::Sender<Value>>,
    /// Addresses re-registered with the hub after every reconnect.
    watched: DashSet<String>,
    /// Raw frames queued for the writer half of the current connection.
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    /// Monotonic connection generation; 0 = never connected.
    status_tx: watch::Sender<u64>,
    next_tag: AtomicU64,
}

impl HubClient {
    pub fn new(hub_url: String) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (status_tx, _) = watch::channel(0u64);
        Self {
            hub_url,
            pending: DashMap::new(),
            watched: DashSet::new(),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            status_tx,
            next_tag: AtomicU64::new(1),
        }
    }

    /// Subscribe to connection-generation changes. The value increments on
    /// every successful (re)connect.
    pub fn subscribe_status(&self) -> watch::Receiver<u64> {
        self.status_tx.subscribe()
    }

    pub async fn run(&self) {
        let mut backoff_idx = 0usize;
        let mut generation = 0u64;

        loop {
            info!("hub connecting to {}", self.hub_url);
            match self.connect_once(&mut generation).await {
                Ok(()) => {
                    info!("hub connection closed cleanly");
                    backoff_idx = 0;
                }
                Err(e) => {
                    error!("hub connection error: {e}");
                }
            }

            self.fail_pending("connection lost");

            let delay_ms = RECONNECT_BACKOFF_MS
                .get(backoff_idx)
                .copied()
                .unwrap_or(*RECONNECT_BACKOFF_MS.last().unwrap());
            backoff_idx = (backoff_idx + 1).min(RECONNECT_BACKOFF_MS.len() - 1);

            warn!("hub reconnecting in {delay_ms}ms");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn connect_once(&self, generation: &mut u64) -> Result<()> {
        let (ws_stream, _) = connect_async(&self.hub_url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Re-register every watched address before announcing the connection,
        // so discovery triggered by the generation bump only has to handle
        // genuinely new markets.
        let watched: Vec<String> = self.watched.iter().map(|e| e.key().clone()).collect();
        for addr in &watched {
            let tag = self.fresh_tag();
            let frame =
                build_request("light/new_address_to_watch", Value::String(addr.clone()), &tag);
            write.send(Message::Text(frame.into())).await?;
        }
        if !watched.is_empty() {
            info!("hub re-watching {} addresses", watched.len());
        }

        *generation += 1;
        let _ = self.status_tx.send(*generation);
        info!(generation = *generation, "hub connected");

        let mut heartbeat = interval(Duration::from_secs(HUB_HEARTBEAT_SECS));
        heartbeat.tick().await; // consume immediate first tick

        let mut outbound_rx = self.outbound_rx.lock().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_frame(&text) {
                                write.send(Message::Text(reply.into())).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        Some(Ok(_)) => {}
                    }
                }

                frame = outbound_rx.recv() => {
                    match frame {
                        Some(text) => write.send(Message::Text(text.into())).await?,
                        None => return Ok(()),
                    }
                }

                _ = heartbeat.tick() => {
                    debug!("hub heartbeat");
                    let frame = build_justsaying("heartbeat", Value::Null);
                    write.send(Message::Text(frame.into())).await?;
                }
            }
        }
    }

    /// Handle one inbound frame. Returns a reply frame when the hub expects one.
    fn handle_frame(&self, text: &str) -> Option<String> {
        match parse_hub_frame(text)? {
            HubFrame::Response { tag, response } => {
                if let Some((_, reply)) = self.pending.remove(&tag) {
                    let _ = reply.send(response);
                } else {
                    debug!(tag = %tag, "hub response with no pending request");
                }
                None
            }
            HubFrame::Request { command, tag } => match command.as_str() {
                "heartbeat" => tag.map(|t| build_response(&t, Value::Null)),
                "subscribe" => {
                    // We are a light client; refuse full-node subscription.
                    tag.map(|t| build_response(&t, Value::String("light client".to_string())))
                }
                _ => {
                    debug!(command = %command, "unhandled hub request");
                    None
                }
            },
            HubFrame::JustSaying { subject, .. } => {
                debug!(subject = %subject, "hub justsaying");
                None
            }
        }
    }

    /// Issue one tagged request and await its correlated response.
    pub async fn request(&self, command: &str, params: Value) -> Result<Value> {
        let tag = self.fresh_tag();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(tag.clone(), reply_tx);

        let frame = build_request(command, params, &tag);
        if self.outbound_tx.send(frame).await.is_err() {
            self.pending.remove(&tag);
            return Err(AppError::Hub("hub writer is gone".to_string()));
        }

        match timeout(Duration::from_secs(HUB_REQUEST_TIMEOUT_SECS), reply_rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.get("error").and_then(|e| e.as_str()) {
                    return Err(AppError::Hub(format!("{command}: {err}")));
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(AppError::Hub(format!("{command}: connection dropped"))),
            Err(_) => {
                self.pending.remove(&tag);
                Err(AppError::Hub(format!("{command}: request timed out")))
            }
        }
    }

    /// Register an address for change notifications, re-issued on reconnect.
    pub async fn watch_address(&self, address: &str) -> Result<()> {
        self.request("light/new_address_to_watch", Value::String(address.to_string()))
            .await?;
        self.watched.insert(address.to_string());
        Ok(())
    }

    fn fresh_tag(&self) -> String {
        self.next_tag.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Drop all in-flight requests; their callers get a Hub error.
    fn fail_pending(&self, reason: &str) {
        let tags: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for tag in tags {
            if let Some((_, reply)) = self.pending.remove(&tag) {
                let _ = reply.send(serde_json::json!({ "error": reason }));
            }
        }
    }
}
