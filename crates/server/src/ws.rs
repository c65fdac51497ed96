use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use uuid::Uuid;

use visionlink_core::pipeline::frame_pipeline::FramePipeline;
use visionlink_core::pipeline::pipeline_logger::LogPipelineLogger;
use visionlink_core::pipeline::session_state::SessionState;

use crate::protocol::{BatchOut, FrameIn};
use crate::state::AppState;

/// Room for the JSON wrapper around the image envelope.
const MESSAGE_OVERHEAD: usize = 4096;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message = state.pipeline.config().max_payload_bytes + MESSAGE_OVERHEAD;
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// One session per connection; frames are handled strictly one at a time.
///
/// The next message is not read until the previous reply was sent, so a
/// slow pipeline applies backpressure to the client instead of queueing.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4().to_string();
    let _guard = state.enter_session();
    let session = Arc::new(Mutex::new(
        state
            .pipeline
            .open_session(id.clone(), Box::new(LogPipelineLogger::new(id.clone()))),
    ));
    log::info!("Client connected: {id}");

    while let Some(message) = socket.recv().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                log::debug!("[{id}] socket error: {e}");
                break;
            }
        };

        let pipeline = Arc::clone(&state.pipeline);
        let frame_session = Arc::clone(&session);
        let reply = tokio::task::spawn_blocking(move || {
            let mut session = frame_session.lock().unwrap_or_else(|e| e.into_inner());
            frame_reply(&pipeline, &mut session, &text)
        })
        .await
        .unwrap_or_else(|e| {
            log::error!("[{id}] frame task failed: {e}");
            None
        });

        if let Some(json) = reply {
            if let Err(e) = socket.send(Message::Text(json)).await {
                log::debug!("[{id}] send failed: {e}");
                break;
            }
        }
    }

    log::info!("Client disconnected: {id}");
    match Arc::try_unwrap(session) {
        Ok(session) => state
            .pipeline
            .close_session(session.into_inner().unwrap_or_else(|e| e.into_inner())),
        Err(_) => log::debug!("[{id}] session still referenced at close"),
    }
}

/// Runs one frame event through the pipeline.
///
/// Returns the serialized detection event, or `None` when the frame is
/// dropped (not JSON, no `image`, or undecodable).
pub fn frame_reply(pipeline: &FramePipeline, session: &mut SessionState, text: &str) -> Option<String> {
    let frame: FrameIn = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("[{}] ignoring non-frame message: {e}", session.id());
            return None;
        }
    };
    let image = frame.image?;
    let batch = pipeline.process(session, &image).ok()?;
    match serde_json::to_string(&BatchOut::from(batch.as_ref())) {
        Ok(json) => Some(json),
        Err(e) => {
            log::error!("[{}] failed to serialize detections: {e}", session.id());
            None
        }
    }
}
