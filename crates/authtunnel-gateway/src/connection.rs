//! WebSocket connection lifecycle — boundary parsing, outbound pump,
//! teardown ordering.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use authtunnel_core::protocol::{OperatorEvent, ServerEvent};

use crate::session::{Session, SessionAction, SessionContext};
use crate::state::ServerState;

/// Capacity of the per-connection FIFO action queue. Ticks are dropped when
/// it fills; operator commands apply backpressure instead.
const ACTION_QUEUE_DEPTH: usize = 32;

/// Handle an authenticated, upgraded operator connection.
///
/// The token was already verified before the upgrade; from here on the
/// connection owns exactly one browser instance via its session task.
pub async fn handle_ws_connection(state: Arc<ServerState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "Operator connected via tunnel");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (action_tx, action_rx) = mpsc::channel::<SessionAction>(ACTION_QUEUE_DEPTH);
    let cancel = CancellationToken::new();

    state.register(&conn_id).await;

    // Outbound pump: serialize server events onto the socket in order.
    let sender_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let ctx = SessionContext {
        conn_id: conn_id.clone(),
        driver: state.driver.clone(),
        launch: state.launch_options(),
        start_url: state.config.start_url.clone(),
        artifact_path: state.config.session_file_path(),
        frame_interval: Duration::from_millis(state.config.frame_interval_ms),
        events: event_tx,
        cancel: cancel.clone(),
    };
    let session_task = tokio::spawn(Session::new(ctx).run(action_tx.clone(), action_rx));

    // Inbound loop: boundary-validate frames into the action queue.
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<OperatorEvent>(&text) {
                        Ok(event) => {
                            if action_tx
                                .send(SessionAction::Dispatch(event.into()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            // Closed command set: anything unrecognized is
                            // rejected here, before it can touch the page.
                            warn!(conn_id = %conn_id, %e, "Rejected unrecognized frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by axum
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    drop(action_tx);
    cancel.cancel();
    // Teardown waits for any in-flight automation call to settle; there is
    // no mid-flight abort.
    let _ = session_task.await;
    let _ = sender_task.await;

    state.unregister(&conn_id).await;
    info!(conn_id = %conn_id, "Operator disconnected");
}
