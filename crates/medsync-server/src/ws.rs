use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};

use medsync_core::{DispatchError, IncomingMessage, SERVER_PUSH};
use medsync_dispatch::Dispatcher;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Drive one upgraded WebSocket connection: register a dispatch client,
/// split the socket into a reader and a writer task, and deregister the
/// client when either side ends.
///
/// The reader task is the sole mutator of the client's subscription state;
/// the writer task is the sole drain of its outgoing queue. A transport
/// failure terminates only this connection's tasks.
pub async fn handle_connection(socket: WebSocket, dispatcher: Arc<Dispatcher>) {
    let (client, mut outgoing_rx) = dispatcher.create_client();
    let client_id = client.id().clone();
    tracing::info!(client_id = %client_id, "websocket client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let last_pong = Arc::new(AtomicU64::new(now_secs()));

    // Writer: forward the outgoing queue to the socket, ping on an interval,
    // and give up when pongs stop arriving.
    let writer_pong = last_pong.clone();
    let writer_cid = client_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = outgoing_rx.recv() => {
                    match msg {
                        Some(outgoing) => {
                            let Ok(text) = serde_json::to_string(&outgoing) else { continue };
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    let silence = now_secs().saturating_sub(writer_pong.load(Ordering::Relaxed));
                    if silence > CLIENT_TIMEOUT.as_secs() {
                        tracing::info!(client_id = %writer_cid, "no pong within timeout, closing");
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: decode frames into control messages. Decode failures become
    // bad_request replies on this client's own queue; they never touch the
    // fan-out loop or other clients.
    let reader_client = client.clone();
    let reader_pong = last_pong.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<IncomingMessage>(&text) {
                    Ok(incoming) => reader_client.handle_incoming(incoming).await,
                    Err(err) => {
                        reader_client
                            .send(DispatchError::BadRequest(err.to_string()).into_message(SERVER_PUSH))
                            .await;
                    }
                },
                WsMessage::Pong(_) => {
                    reader_pong.store(now_secs(), Ordering::Relaxed);
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum replies with pong automatically
                _ => {}
            }
        }
    });

    // Either task ending tears the connection down.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    dispatcher.remove_client(&client_id);
    tracing::info!(client_id = %client_id, "websocket client disconnected");
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
