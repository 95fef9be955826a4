use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use ricochet_core::match_code::{generate_match_code, is_valid_match_code};
use ricochet_core::net::messages::{OpponentDisconnectedMsg, ServerMessage};
use ricochet_core::net::protocol::encode_server_message;
use ricochet_core::player::{PlayerId, Side};
use ricochet_sim::effects::EffectTable;

use crate::config::ServerConfig;
use crate::game_loop::{MatchBroadcast, MatchCommand, MatchSessionConfig, spawn_match_session};

struct PlayerSlot {
    id: PlayerId,
    name: String,
    side: Side,
    tx: mpsc::Sender<Bytes>,
}

/// One match: up to two players plus, once both are present, a running
/// session task.
struct MatchRoom {
    session_id: Uuid,
    players: Vec<PlayerSlot>,
    cmd_tx: Option<mpsc::UnboundedSender<MatchCommand>>,
    handle: Option<JoinHandle<()>>,
}

/// Registry of live matches keyed by their join code. Matches are
/// independent; each owns its session task, and a disconnect tears the
/// whole match down.
pub struct MatchManager {
    matches: HashMap<String, MatchRoom>,
    next_player_id: PlayerId,
}

impl Default for MatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchManager {
    pub fn new() -> Self {
        Self {
            matches: HashMap::new(),
            next_player_id: 1,
        }
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Open a new match; the creator defends the left goal.
    pub fn create_match(&mut self, name: String, tx: mpsc::Sender<Bytes>) -> (String, PlayerId) {
        let mut rng = rand::rng();
        let mut code = generate_match_code(&mut rng);
        while self.matches.contains_key(&code) {
            code = generate_match_code(&mut rng);
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let session_id = Uuid::new_v4();
        self.matches.insert(
            code.clone(),
            MatchRoom {
                session_id,
                players: vec![PlayerSlot {
                    id: player_id,
                    name,
                    side: Side::Left,
                    tx,
                }],
                cmd_tx: None,
                handle: None,
            },
        );
        tracing::info!(%code, %session_id, player_id, "Match created");
        (code, player_id)
    }

    /// Join an existing match; the second player defends the right goal and
    /// the session task starts immediately.
    pub fn join_match(
        &mut self,
        config: &ServerConfig,
        code: &str,
        name: String,
        tx: mpsc::Sender<Bytes>,
    ) -> Result<(PlayerId, Side), String> {
        if !is_valid_match_code(code) {
            return Err("Invalid match code".to_string());
        }
        let room = self
            .matches
            .get_mut(code)
            .ok_or_else(|| "Match not found".to_string())?;
        if room.players.len() >= 2 {
            return Err("Match is full".to_string());
        }

        let player_id = self.next_player_id;
        self.next_player_id += 1;
        room.players.push(PlayerSlot {
            id: player_id,
            name,
            side: Side::Right,
            tx,
        });

        let session_config = MatchSessionConfig {
            sim: config.sim.clone(),
            table: EffectTable::builtin(),
            allowed_effects: config.allowed_effects.clone(),
            left_name: room.players[0].name.clone(),
            right_name: room.players[1].name.clone(),
        };
        let (cmd_tx, mut broadcast_rx, handle) = spawn_match_session(session_config);
        room.cmd_tx = Some(cmd_tx);
        room.handle = Some(handle);

        // Fan broadcasts out to both players. Delivery is fire-and-forget:
        // a full player buffer drops the frame, the next full snapshot
        // supersedes it.
        let player_txs: Vec<mpsc::Sender<Bytes>> =
            room.players.iter().map(|p| p.tx.clone()).collect();
        let session_id = room.session_id;
        tokio::spawn(async move {
            while let Some(broadcast) = broadcast_rx.recv().await {
                match broadcast {
                    MatchBroadcast::Encoded(data) => {
                        for tx in &player_txs {
                            let _ = tx.try_send(data.clone());
                        }
                    },
                    MatchBroadcast::Ended => break,
                }
            }
            tracing::debug!(%session_id, "Broadcast fan-out finished");
        });

        tracing::info!(%code, player_id, "Player joined; session started");
        Ok((player_id, Side::Right))
    }

    /// Forward a client command into the match's session task.
    pub fn route_command(&self, code: &str, cmd: MatchCommand) {
        if let Some(room) = self.matches.get(code)
            && let Some(tx) = &room.cmd_tx
        {
            let _ = tx.send(cmd);
        }
    }

    pub fn side_of(&self, code: &str, player_id: PlayerId) -> Option<Side> {
        self.matches
            .get(code)?
            .players
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.side)
    }

    /// Tear the match down on any departure: stop the session task, notify
    /// the remaining player, release the room.
    pub fn leave_match(&mut self, code: &str, player_id: PlayerId) {
        let Some(mut room) = self.matches.remove(code) else {
            return;
        };
        let leaver_side = room
            .players
            .iter()
            .find(|p| p.id == player_id)
            .map(|p| p.side);

        if let Some(cmd_tx) = room.cmd_tx.take() {
            let _ = cmd_tx.send(MatchCommand::Stop);
        }
        // Detach the task handle; the Stop command lets the loop drain out.
        let _ = room.handle.take();

        if let Some(side) = leaver_side {
            let notice =
                ServerMessage::OpponentDisconnected(OpponentDisconnectedMsg { side });
            if let Ok(encoded) = encode_server_message(&notice) {
                let data = Bytes::from(encoded);
                for peer in room.players.iter().filter(|p| p.id != player_id) {
                    let _ = peer.tx.try_send(data.clone());
                }
            }
        }
        tracing::info!(%code, player_id, "Match torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ricochet_core::net::protocol::decode_server_message;
    use std::time::Duration;

    fn player_channel() -> (mpsc::Sender<Bytes>, mpsc::Receiver<Bytes>) {
        mpsc::channel(64)
    }

    async fn next_msg(rx: &mut mpsc::Receiver<Bytes>) -> Option<ServerMessage> {
        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Some(data)) => decode_server_message(&data).ok(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn create_produces_valid_code() {
        let mut manager = MatchManager::new();
        let (tx, _rx) = player_channel();
        let (code, player_id) = manager.create_match("Alice".to_string(), tx);
        assert!(is_valid_match_code(&code));
        assert_eq!(player_id, 1);
        assert_eq!(manager.match_count(), 1);
    }

    #[tokio::test]
    async fn join_unknown_or_invalid_code_fails() {
        let mut manager = MatchManager::new();
        let config = ServerConfig::default();
        let (tx, _rx) = player_channel();
        assert!(
            manager
                .join_match(&config, "nope", "Bob".to_string(), tx.clone())
                .is_err()
        );
        assert!(
            manager
                .join_match(&config, "ABCD-2345", "Bob".to_string(), tx)
                .is_err()
        );
    }

    #[tokio::test]
    async fn join_starts_session_and_both_players_hear_it() {
        let mut manager = MatchManager::new();
        let config = ServerConfig::default();
        let (tx_a, mut rx_a) = player_channel();
        let (tx_b, mut rx_b) = player_channel();

        let (code, _creator) = manager.create_match("Alice".to_string(), tx_a);
        let (joiner, side) = manager
            .join_match(&config, &code, "Bob".to_string(), tx_b)
            .expect("join should succeed");
        assert_eq!(side, Side::Right);
        assert_eq!(manager.side_of(&code, joiner), Some(Side::Right));

        for rx in [&mut rx_a, &mut rx_b] {
            match next_msg(rx).await {
                Some(ServerMessage::MatchStarted(m)) => {
                    assert_eq!(m.left_name, "Alice");
                    assert_eq!(m.right_name, "Bob");
                },
                other => panic!("Expected MatchStarted, got: {other:?}"),
            }
        }

        // Ticks flow to both.
        assert!(matches!(
            next_msg(&mut rx_a).await,
            Some(ServerMessage::Snapshot(_))
        ));
        assert!(matches!(
            next_msg(&mut rx_b).await,
            Some(ServerMessage::Snapshot(_))
        ));

        manager.leave_match(&code, joiner);
    }

    #[tokio::test]
    async fn third_join_is_rejected() {
        let mut manager = MatchManager::new();
        let config = ServerConfig::default();
        let (tx_a, _rx_a) = player_channel();
        let (tx_b, _rx_b) = player_channel();
        let (tx_c, _rx_c) = player_channel();

        let (code, _) = manager.create_match("Alice".to_string(), tx_a);
        manager
            .join_match(&config, &code, "Bob".to_string(), tx_b)
            .unwrap();
        let result = manager.join_match(&config, &code, "Carol".to_string(), tx_c);
        assert_eq!(result.unwrap_err(), "Match is full");
    }

    #[tokio::test]
    async fn leave_notifies_peer_and_frees_the_match() {
        let mut manager = MatchManager::new();
        let config = ServerConfig::default();
        let (tx_a, mut rx_a) = player_channel();
        let (tx_b, _rx_b) = player_channel();

        let (code, creator) = manager.create_match("Alice".to_string(), tx_a);
        let (joiner, _) = manager
            .join_match(&config, &code, "Bob".to_string(), tx_b)
            .unwrap();

        manager.leave_match(&code, joiner);
        assert_eq!(manager.match_count(), 0, "match is freed on departure");

        // The remaining player hears about the disconnect (skipping any
        // queued session broadcasts).
        let mut notified = false;
        for _ in 0..20 {
            match next_msg(&mut rx_a).await {
                Some(ServerMessage::OpponentDisconnected(m)) => {
                    assert_eq!(m.side, Side::Right);
                    notified = true;
                    break;
                },
                Some(_) => continue,
                None => break,
            }
        }
        assert!(notified, "peer must be told about the disconnect");

        // Commands to a dead match are dropped quietly.
        manager.route_command(
            &code,
            MatchCommand::PaddleMove {
                side: Side::Left,
                input: ricochet_sim::PaddleInput {
                    y: 0.0,
                    vy: 0.0,
                    client_timestamp: 0.0,
                },
            },
        );
        let _ = creator;
    }
}
