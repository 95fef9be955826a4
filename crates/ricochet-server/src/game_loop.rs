use std::panic::AssertUnwindSafe;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ricochet_core::net::messages::{
    MatchOverMsg, MatchStartedMsg, PingMsg, PostMatchChoice, ServerMessage, SnapshotMsg,
};
use ricochet_core::net::protocol::encode_server_message;
use ricochet_core::player::Side;
use ricochet_sim::config::SimConfig;
use ricochet_sim::effects::EffectTable;
use ricochet_sim::events::SimEvent;
use ricochet_sim::{GameState, PaddleInput, Simulator};

/// Commands sent from the WebSocket handlers to a match tick loop.
#[derive(Debug)]
pub enum MatchCommand {
    PaddleMove { side: Side, input: PaddleInput },
    ItemChosen { side: Side, effect_id: String },
    ItemReroll { side: Side, slot: usize },
    ActivateAbility { side: Side, effect_id: String },
    PostMatch { side: Side, choice: PostMatchChoice },
    Pong { side: Side, echo_timestamp: f64 },
    Stop,
}

/// Broadcasts sent from a match tick loop to both connected clients.
#[derive(Debug, Clone)]
pub enum MatchBroadcast {
    /// Serialized ServerMessage bytes ready to send over WebSocket.
    /// Uses `Bytes` for zero-copy cloning across player channels.
    Encoded(Bytes),
    /// Signal that the match has ended and the loop has exited.
    Ended,
}

/// Configuration for one spawned match session.
pub struct MatchSessionConfig {
    pub sim: SimConfig,
    pub table: EffectTable,
    pub allowed_effects: Option<Vec<String>>,
    pub left_name: String,
    pub right_name: String,
}

/// Spawn the authoritative tick loop for one match as a tokio task.
/// Returns the command sender and broadcast receiver.
pub fn spawn_match_session(
    config: MatchSessionConfig,
) -> (
    mpsc::UnboundedSender<MatchCommand>,
    mpsc::UnboundedReceiver<MatchBroadcast>,
    JoinHandle<()>,
) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        run_match_loop(config, cmd_rx, broadcast_tx).await;
    });

    (cmd_tx, broadcast_rx, handle)
}

fn send_encoded(
    broadcast_tx: &mpsc::UnboundedSender<MatchBroadcast>,
    msg: &ServerMessage,
    context: &str,
) {
    match encode_server_message(msg) {
        Ok(data) => {
            let _ = broadcast_tx.send(MatchBroadcast::Encoded(Bytes::from(data)));
        },
        Err(e) => tracing::error!(context, error = %e, "Failed to encode server message"),
    }
}

/// The single-writer authoritative loop: one tokio task per match, driven by
/// a fixed-rate interval, draining queued inputs at the top of each tick.
async fn run_match_loop(
    config: MatchSessionConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<MatchCommand>,
    broadcast_tx: mpsc::UnboundedSender<MatchBroadcast>,
) {
    const PING_INTERVAL_MS: f64 = 5_000.0;

    let sim_config = config.sim.clone();
    let tick_rate = sim_config.tick_rate_hz.max(1);
    let mut simulator = Simulator::new(
        sim_config.clone(),
        config.table.clone(),
        config.allowed_effects.clone(),
    );
    let mut state = GameState::new(&sim_config);

    send_encoded(
        &broadcast_tx,
        &ServerMessage::MatchStarted(MatchStartedMsg {
            left_name: config.left_name.clone(),
            right_name: config.right_name.clone(),
            tick_rate_hz: tick_rate,
        }),
        "MatchStarted",
    );

    let tick_interval = Duration::from_secs_f64(1.0 / tick_rate as f64);
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // The match clock: milliseconds since session start. Client timestamps
    // are expressed on this clock.
    let epoch = tokio::time::Instant::now();
    let now_ms = |instant: tokio::time::Instant| instant.duration_since(epoch).as_secs_f64() * 1_000.0;

    let mut tick: u32 = 0;
    let dt = 1.0f32 / tick_rate as f32;
    let mut input_buffer: Vec<(Side, PaddleInput)> = Vec::new();
    let mut last_ping_at = 0.0f64;

    loop {
        tokio::select! {
            tick_at = interval.tick() => {
                let now = now_ms(tick_at);
                tick = tick.wrapping_add(1);
                let inputs = std::mem::take(&mut input_buffer);

                // A panicking tick must not take the match down: restore the
                // pre-tick state and keep ticking.
                let backup = state.clone();
                let stepped = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    simulator.step(&mut state, dt, now, &inputs)
                }));
                let events = match stepped {
                    Ok(events) => events,
                    Err(_) => {
                        tracing::error!(tick, "Simulation tick panicked; state restored");
                        state = backup;
                        Vec::new()
                    },
                };

                send_encoded(
                    &broadcast_tx,
                    &ServerMessage::Snapshot(SnapshotMsg {
                        tick,
                        server_timestamp: now,
                        state_data: Simulator::serialize_state(&state),
                    }),
                    "Snapshot",
                );

                for event in &events {
                    if let SimEvent::MatchOver { winner } = event {
                        tracing::info!(?winner, tick, "Match over");
                        send_encoded(
                            &broadcast_tx,
                            &ServerMessage::MatchOver(MatchOverMsg { winner: *winner }),
                            "MatchOver",
                        );
                    }
                }

                if now - last_ping_at >= PING_INTERVAL_MS {
                    last_ping_at = now;
                    send_encoded(
                        &broadcast_tx,
                        &ServerMessage::Ping(PingMsg { timestamp: now }),
                        "Ping",
                    );
                }
            }
            cmd = cmd_rx.recv() => {
                let now = now_ms(tokio::time::Instant::now());
                match cmd {
                    Some(MatchCommand::PaddleMove { side, input }) => {
                        input_buffer.push((side, input));
                    },
                    Some(MatchCommand::ItemChosen { side, effect_id }) => {
                        simulator.choose_item(&mut state, side, &effect_id);
                    },
                    Some(MatchCommand::ItemReroll { side, slot }) => {
                        simulator.reroll_item(&mut state, side, slot);
                    },
                    Some(MatchCommand::ActivateAbility { side, effect_id }) => {
                        let mut events = Vec::new();
                        simulator.activate_ability(&mut state, side, &effect_id, now, &mut events);
                    },
                    Some(MatchCommand::PostMatch { side, choice }) => {
                        match choice {
                            PostMatchChoice::Continue => {
                                tracing::info!(?side, "Continuing in endless mode");
                                simulator.continue_endless(&mut state, now);
                            },
                            PostMatchChoice::Menu => break,
                        }
                    },
                    Some(MatchCommand::Pong { side, echo_timestamp }) => {
                        tracing::trace!(?side, echo_timestamp, "Keepalive pong");
                    },
                    Some(MatchCommand::Stop) | None => break,
                }
            }
        }
    }

    let _ = broadcast_tx.send(MatchBroadcast::Ended);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ricochet_core::net::protocol::decode_server_message;

    fn session_config() -> MatchSessionConfig {
        MatchSessionConfig {
            sim: SimConfig::default(),
            table: EffectTable::builtin(),
            allowed_effects: None,
            left_name: "Alice".to_string(),
            right_name: "Bob".to_string(),
        }
    }

    async fn next_decoded(
        rx: &mut mpsc::UnboundedReceiver<MatchBroadcast>,
    ) -> Option<ServerMessage> {
        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Some(MatchBroadcast::Encoded(data))) => decode_server_message(&data).ok(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn session_starts_and_broadcasts_snapshots() {
        let (cmd_tx, mut rx, handle) = spawn_match_session(session_config());

        let first = next_decoded(&mut rx).await.expect("first broadcast");
        match first {
            ServerMessage::MatchStarted(m) => {
                assert_eq!(m.left_name, "Alice");
                assert_eq!(m.right_name, "Bob");
                assert_eq!(m.tick_rate_hz, 20);
            },
            other => panic!("Expected MatchStarted, got: {other:?}"),
        }

        let mut got_snapshot = false;
        for _ in 0..5 {
            if let Some(ServerMessage::Snapshot(s)) = next_decoded(&mut rx).await {
                assert!(Simulator::deserialize_state(&s.state_data).is_some());
                got_snapshot = true;
                break;
            }
        }
        assert!(got_snapshot, "tick loop must broadcast snapshots");

        let _ = cmd_tx.send(MatchCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn paddle_input_reaches_the_simulation() {
        let (cmd_tx, mut rx, handle) = spawn_match_session(session_config());
        let _ = next_decoded(&mut rx).await; // MatchStarted

        let _ = cmd_tx.send(MatchCommand::PaddleMove {
            side: Side::Left,
            input: PaddleInput {
                y: 100.0,
                vy: 0.0,
                client_timestamp: 0.0,
            },
        });

        let mut seen = false;
        for _ in 0..10 {
            if let Some(ServerMessage::Snapshot(s)) = next_decoded(&mut rx).await
                && let Some(state) = Simulator::deserialize_state(&s.state_data)
                && state.left.paddle.target_y == 100.0
            {
                seen = true;
                break;
            }
        }
        assert!(seen, "queued input must land in the broadcast state");

        let _ = cmd_tx.send(MatchCommand::Stop);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn stop_command_ends_session_cleanly() {
        let (cmd_tx, mut rx, handle) = spawn_match_session(session_config());
        let _ = next_decoded(&mut rx).await;

        let _ = cmd_tx.send(MatchCommand::Stop);

        let mut got_ended = false;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(MatchBroadcast::Ended)) => {
                    got_ended = true;
                    break;
                },
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(got_ended, "Stop must produce an Ended broadcast");
        let _ = handle.await;
    }

    #[tokio::test]
    async fn menu_choice_ends_session() {
        let (cmd_tx, mut rx, handle) = spawn_match_session(session_config());
        let _ = next_decoded(&mut rx).await;

        let _ = cmd_tx.send(MatchCommand::PostMatch {
            side: Side::Left,
            choice: PostMatchChoice::Menu,
        });

        let mut got_ended = false;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(MatchBroadcast::Ended)) => {
                    got_ended = true;
                    break;
                },
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(got_ended);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn dropping_command_sender_ends_session() {
        let (cmd_tx, mut rx, handle) = spawn_match_session(session_config());
        let _ = next_decoded(&mut rx).await;
        drop(cmd_tx);

        let mut got_ended = false;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
                Ok(Some(MatchBroadcast::Ended)) => {
                    got_ended = true;
                    break;
                },
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(got_ended, "loop must exit when all senders are gone");
        let _ = handle.await;
    }
}
