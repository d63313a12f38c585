/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Websocket transport worker.
//!
//! A single background task owns the socket. Callers enqueue frames through
//! an unbounded channel and receive inbound events from a broadcast fan-out.
//! The worker stops on cancellation or disconnect; there is no reconnect.

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use http::header::AUTHORIZATION;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    INBOUND_CHANNEL_CAPACITY, InboundEvent, OutboundFrame, Transport, TransportError, WireFrame,
};

pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    inbound: broadcast::Sender<InboundEvent>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Open the socket and spawn its worker on the current tokio runtime.
    pub async fn connect(url: &Url, token: Option<&str>) -> Result<Self, TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        log::info!("transport: connecting to {url}");
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(socket_worker(stream, outbound_rx, inbound.clone(), cancel.clone()));

        Ok(Self {
            outbound,
            inbound,
            cancel,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Flush queued frames, close the socket and wait for the worker to exit.
    pub async fn close(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            log::warn!("transport: worker ended abnormally: {e}");
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inbound.subscribe()
    }
}

async fn socket_worker(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    inbound: broadcast::Sender<InboundEvent>,
    cancel: CancellationToken,
) {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("transport: worker cancelled");
                while let Ok(frame) = outbound.try_recv() {
                    if let Some(text) = encode(&frame)
                        && sink.send(Message::text(text)).await.is_err()
                    {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let Some(text) = encode(&frame) else {
                    continue;
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    log::warn!("transport: send failed, closing: {e}");
                    break;
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => dispatch(&inbound, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        log::warn!("transport: connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("transport: connection lost: {e}");
                        break;
                    }
                }
            }
        }
    }
    outbound.close();
}

fn encode(frame: &OutboundFrame) -> Option<String> {
    match frame
        .to_wire()
        .and_then(|wire| serde_json::to_string(&wire).map_err(TransportError::from))
    {
        Ok(text) => Some(text),
        Err(e) => {
            log::warn!("transport: dropped {} frame: {e}", frame.event_name());
            None
        },
    }
}

fn dispatch(inbound: &broadcast::Sender<InboundEvent>, text: &str) {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("transport: unparseable frame: {e}");
            return;
        },
    };
    if let Some(event) = InboundEvent::from_wire(frame) {
        // No subscribers is fine; events are not buffered for late joiners.
        let _ = inbound.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_forwards_decoded_events_only() {
        let (inbound, mut rx) = broadcast::channel(8);
        dispatch(&inbound, "not json");
        dispatch(&inbound, r#"{ "event": "heartbeat" }"#);
        dispatch(&inbound, r#"{ "event": "joined_device_room", "data": 4 }"#);

        assert_eq!(rx.try_recv().unwrap(), InboundEvent::JoinedRoom(serde_json::json!(4)));
        assert!(rx.try_recv().is_err());
    }
}
