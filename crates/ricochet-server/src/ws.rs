use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use ricochet_core::net::messages::{
    ClientMessage, ErrorReportMsg, JoinAcceptedMsg, MatchCreatedMsg, MessageType, ServerMessage,
};
use ricochet_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, decode_message_type,
    encode_server_message,
};
use ricochet_core::player::{PlayerId, Side};
use ricochet_sim::PaddleInput;

use crate::game_loop::MatchCommand;
use crate::state::{AppState, ConnectionGuard};

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state)))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // First message must open or join a match.
    let first_msg = match ws_receiver.next().await {
        Some(Ok(Message::Binary(data))) => data,
        _ => return,
    };
    let Ok(client_msg) = decode_client_message(&first_msg) else {
        return;
    };

    let (code, player_id, side, rx) = match client_msg {
        ClientMessage::CreateMatch(create) => {
            if !protocol_version_ok(create.protocol_version) {
                send_error(&mut ws_sender, "Protocol version mismatch").await;
                return;
            }
            let Some(name) = sanitize_name(&create.player_name) else {
                send_error(&mut ws_sender, "Invalid player name").await;
                return;
            };
            let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
            let mut matches = state.matches.write().await;
            let (code, player_id) = matches.create_match(name, tx);
            drop(matches);

            let reply = ServerMessage::MatchCreated(MatchCreatedMsg { code: code.clone() });
            if !send_direct(&mut ws_sender, &reply).await {
                let mut matches = state.matches.write().await;
                matches.leave_match(&code, player_id);
                return;
            }
            (code, player_id, Side::Left, rx)
        },
        ClientMessage::JoinMatch(join) => {
            if !protocol_version_ok(join.protocol_version) {
                send_error(&mut ws_sender, "Protocol version mismatch").await;
                return;
            }
            let Some(name) = sanitize_name(&join.player_name) else {
                send_error(&mut ws_sender, "Invalid player name").await;
                return;
            };
            let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
            let mut matches = state.matches.write().await;
            let result = matches.join_match(&state.config, &join.code, name, tx);
            drop(matches);

            match result {
                Ok((player_id, side)) => {
                    let reply = ServerMessage::JoinAccepted(JoinAcceptedMsg {
                        code: join.code.clone(),
                        side,
                    });
                    if !send_direct(&mut ws_sender, &reply).await {
                        let mut matches = state.matches.write().await;
                        matches.leave_match(&join.code, player_id);
                        return;
                    }
                    (join.code.clone(), player_id, side, rx)
                },
                Err(err) => {
                    send_error(&mut ws_sender, &err).await;
                    return;
                },
            }
        },
        _ => return,
    };

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, &code, player_id, side).await;

    // Player disconnected: halt the match and notify the peer.
    let mut matches = state.matches.write().await;
    matches.leave_match(&code, player_id);
    drop(matches);

    tracing::info!(player_id, match_code = %code, "Player disconnected");
}

fn protocol_version_ok(version: u8) -> bool {
    version == 0 || version == PROTOCOL_VERSION
}

fn sanitize_name(raw: &str) -> Option<String> {
    let name = raw.trim().to_string();
    if name.is_empty() || name.len() > 32 || name.chars().any(|c| c.is_control()) {
        return None;
    }
    Some(name)
}

async fn send_direct(
    ws_sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match encode_server_message(msg) {
        Ok(data) => ws_sender.send(Message::Binary(data.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode direct reply");
            false
        },
    }
}

async fn send_error(
    ws_sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &str,
) {
    let msg = ServerMessage::ErrorReport(ErrorReportMsg {
        message: message.to_string(),
    });
    if !send_direct(ws_sender, &msg).await {
        tracing::debug!(message, "Failed to deliver error report");
    }
}

fn spawn_writer(
    mut ws_sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender
                .send(Message::Binary(data.to_vec().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    code: &str,
    player_id: PlayerId,
    side: Side,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(player_id, code, "Rate limited");
            continue;
        }
        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        // Malformed frames are dropped silently: best-effort protocol.
        let Ok(msg_type) = decode_message_type(&data) else {
            continue;
        };

        // Server-authoritative: lifecycle and state messages only flow
        // host -> client.
        if matches!(
            msg_type,
            MessageType::MatchCreated
                | MessageType::JoinAccepted
                | MessageType::MatchStarted
                | MessageType::Snapshot
                | MessageType::MatchOver
                | MessageType::OpponentDisconnected
                | MessageType::ErrorReport
                | MessageType::Ping
        ) {
            tracing::warn!(player_id, code, ?msg_type, "Rejected server-only message");
            continue;
        }

        let Ok(decoded) = decode_client_message(&data) else {
            continue;
        };

        let command = match decoded {
            ClientMessage::PaddleMove(m) => Some(MatchCommand::PaddleMove {
                side,
                input: PaddleInput {
                    y: m.y,
                    vy: m.vy,
                    client_timestamp: m.client_timestamp,
                },
            }),
            ClientMessage::ItemChosen(m) => Some(MatchCommand::ItemChosen {
                side,
                effect_id: m.effect_id,
            }),
            ClientMessage::ItemReroll(m) => Some(MatchCommand::ItemReroll {
                side,
                slot: m.slot as usize,
            }),
            ClientMessage::ActivateAbility(m) => Some(MatchCommand::ActivateAbility {
                side,
                effect_id: m.effect_id,
            }),
            ClientMessage::PostMatchChoice(m) => Some(MatchCommand::PostMatch {
                side,
                choice: m.choice,
            }),
            ClientMessage::Pong(m) => Some(MatchCommand::Pong {
                side,
                echo_timestamp: m.echo_timestamp,
            }),
            // A second CreateMatch/JoinMatch on a live connection is noise.
            ClientMessage::CreateMatch(_) | ClientMessage::JoinMatch(_) => None,
        };

        if let Some(command) = command {
            let matches = state.matches.read().await;
            matches.route_command(code, command);
        }
    }
}
