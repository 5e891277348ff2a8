//! Per-client streaming protocol state machine: a non-blocking
//! receive-with-timeout loop, action dispatch, and playhead tick math,
//! re-expressed over `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use model::{FRAME_HZ, TICK_HZ};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::ServerError;
use crate::session_manager::SessionManager;

#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Command {
    Play { speed: Option<f64> },
    Pause,
    Seek { frame: f64 },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum StreamState {
    Playing,
    Paused,
    Ended,
    Closed,
}

const COMMAND_POLL_MS: u64 = 10;
const TICK_S: f64 = 1.0 / TICK_HZ;
const ADVANCE_PER_TICK: f64 = FRAME_HZ / TICK_HZ;

pub async fn handle_connection(
    manager: Arc<SessionManager>,
    mut ws: WebSocketStream<TcpStream>,
    session_id: String,
) {
    let entry = match manager.get(&session_id) {
        Some(e) => e,
        None => {
            send_error(&mut ws, &ServerError::NotFound(session_id)).await;
            let _ = ws.close(None).await;
            return;
        }
    };

    let wait_deadline = tokio::time::Instant::now() + Duration::from_secs_f64(manager.config.ready_wait_timeout_s);
    loop {
        match entry.state() {
            model::ReplayState::Ready => break,
            model::ReplayState::Error => {
                let msg = entry.session.lock().metadata.error.clone().unwrap_or_else(|| "load failed".to_string());
                send_error(&mut ws, &ServerError::UpstreamUnavailable(msg)).await;
                let _ = ws.close(None).await;
                return;
            }
            _ => {
                if tokio::time::Instant::now() >= wait_deadline {
                    let timeout_err =
                        ServerError::UpstreamUnavailable("timed out waiting for session to load".to_string());
                    send_error(&mut ws, &timeout_err).await;
                    let _ = ws.close(None).await;
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
    let mut state = StreamState::Paused;

    let mut playhead_f: f64 = 0.0;
    let mut speed: f64 = 1.0;
    let mut last_sent_idx: i64 = -1;

    while state != StreamState::Closed {
        match tokio::time::timeout(Duration::from_millis(COMMAND_POLL_MS), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                match serde_json::from_str::<Command>(&text) {
                    Ok(Command::Play { speed: s }) => {
                        speed = s.unwrap_or(1.0);
                        state = StreamState::Playing;
                    }
                    Ok(Command::Pause) => state = StreamState::Paused,
                    Ok(Command::Seek { frame }) => {
                        playhead_f = frame;
                        last_sent_idx = -1;
                    }
                    Err(err) => {
                        let invalid = ServerError::InvalidInput(err.to_string());
                        tracing::warn!(%invalid, "ignoring malformed streaming command");
                    }
                }
            }
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                state = StreamState::Closed;
            }
            Ok(Some(Err(_))) => {
                state = StreamState::Closed;
            }
            Ok(Some(Ok(_))) => {}
            Err(_) => {}
        }

        if state == StreamState::Playing {
            playhead_f += speed * ADVANCE_PER_TICK;
        }

        let frame_count = entry.session.lock().frames.len();
        if frame_count == 0 {
            if state == StreamState::Playing {
                state = StreamState::Ended;
            }
        } else if playhead_f >= frame_count as f64 {
            if state == StreamState::Playing {
                state = StreamState::Ended;
            }
            playhead_f = (frame_count - 1) as f64;
        } else {
            let idx = playhead_f.floor() as i64;
            if idx >= 0 && idx != last_sent_idx {
                if let Some(bytes) = frame_bytes(&entry, idx as usize) {
                    if ws.send(Message::Binary(bytes)).await.is_err() {
                        state = StreamState::Closed;
                    } else {
                        last_sent_idx = idx;
                    }
                }
            }
        }

        if state == StreamState::Closed {
            break;
        }
        tokio::time::sleep(Duration::from_secs_f64(TICK_S)).await;
    }

    let _ = ws.close(None).await;
}

fn frame_bytes(entry: &crate::session_manager::SessionEntry, idx: usize) -> Option<Vec<u8>> {
    if let Some(cached) = entry.serialized_frames.lock().as_ref() {
        return cached.get(idx).cloned();
    }
    let session = entry.session.lock();
    session.frames.get(idx).and_then(|f| bincode::serialize(f).ok())
}

async fn send_error(ws: &mut WebSocketStream<TcpStream>, err: &ServerError) {
    let payload = serde_json::json!({ "error": err.to_string() }).to_string();
    let _ = ws.send(Message::Text(payload)).await;
}
