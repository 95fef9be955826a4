use serde::{Deserialize, Serialize};

use crate::player::Side;

/// Network message type discriminator (first byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Host
    CreateMatch = 0x01,
    JoinMatch = 0x02,
    PaddleMove = 0x03,
    ItemChosen = 0x04,
    ItemReroll = 0x05,
    ActivateAbility = 0x06,
    PostMatchChoice = 0x07,
    Pong = 0x08,

    // Host -> Client
    MatchCreated = 0x10,
    JoinAccepted = 0x11,
    MatchStarted = 0x12,
    Snapshot = 0x13,
    MatchOver = 0x14,
    OpponentDisconnected = 0x15,
    ErrorReport = 0x16,
    Ping = 0x17,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<MessageType> {
        match b {
            0x01 => Some(Self::CreateMatch),
            0x02 => Some(Self::JoinMatch),
            0x03 => Some(Self::PaddleMove),
            0x04 => Some(Self::ItemChosen),
            0x05 => Some(Self::ItemReroll),
            0x06 => Some(Self::ActivateAbility),
            0x07 => Some(Self::PostMatchChoice),
            0x08 => Some(Self::Pong),
            0x10 => Some(Self::MatchCreated),
            0x11 => Some(Self::JoinAccepted),
            0x12 => Some(Self::MatchStarted),
            0x13 => Some(Self::Snapshot),
            0x14 => Some(Self::MatchOver),
            0x15 => Some(Self::OpponentDisconnected),
            0x16 => Some(Self::ErrorReport),
            0x17 => Some(Self::Ping),
            _ => None,
        }
    }
}

/// Open a fresh match and wait for an opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchMsg {
    pub player_name: String,
    pub protocol_version: u8,
}

/// Join an existing match by its code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinMatchMsg {
    pub code: String,
    pub player_name: String,
    pub protocol_version: u8,
}

/// Paddle movement report. `client_timestamp` is the sender's match clock
/// (ms) at the moment the position was sampled; the host rewinds to it for
/// lag compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddleMoveMsg {
    pub y: f32,
    pub vy: f32,
    pub client_timestamp: f64,
}

/// Selection-screen pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemChosenMsg {
    pub effect_id: String,
}

/// Reroll one selection slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRerollMsg {
    pub slot: u8,
}

/// Trigger a manually activated ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateAbilityMsg {
    pub effect_id: String,
}

/// What to do after the match ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostMatchChoice {
    Menu,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMatchChoiceMsg {
    pub choice: PostMatchChoice,
}

/// Keepalive response echoing the host's ping timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMsg {
    pub echo_timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCreatedMsg {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinAcceptedMsg {
    pub code: String,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStartedMsg {
    pub left_name: String,
    pub right_name: String,
    pub tick_rate_hz: u32,
}

/// Full authoritative state broadcast, sent every tick. `state_data` is the
/// MessagePack-encoded game state; the envelope stays schema-agnostic so the
/// simulation types can evolve without touching the protocol layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMsg {
    pub tick: u32,
    pub server_timestamp: f64,
    pub state_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOverMsg {
    pub winner: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentDisconnectedMsg {
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReportMsg {
    pub message: String,
}

/// Keepalive probe carrying the host's match clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingMsg {
    pub timestamp: f64,
}

/// All messages a client may send to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    CreateMatch(CreateMatchMsg),
    JoinMatch(JoinMatchMsg),
    PaddleMove(PaddleMoveMsg),
    ItemChosen(ItemChosenMsg),
    ItemReroll(ItemRerollMsg),
    ActivateAbility(ActivateAbilityMsg),
    PostMatchChoice(PostMatchChoiceMsg),
    Pong(PongMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::CreateMatch(_) => MessageType::CreateMatch,
            Self::JoinMatch(_) => MessageType::JoinMatch,
            Self::PaddleMove(_) => MessageType::PaddleMove,
            Self::ItemChosen(_) => MessageType::ItemChosen,
            Self::ItemReroll(_) => MessageType::ItemReroll,
            Self::ActivateAbility(_) => MessageType::ActivateAbility,
            Self::PostMatchChoice(_) => MessageType::PostMatchChoice,
            Self::Pong(_) => MessageType::Pong,
        }
    }
}

/// All messages the host may send to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    MatchCreated(MatchCreatedMsg),
    JoinAccepted(JoinAcceptedMsg),
    MatchStarted(MatchStartedMsg),
    Snapshot(SnapshotMsg),
    MatchOver(MatchOverMsg),
    OpponentDisconnected(OpponentDisconnectedMsg),
    ErrorReport(ErrorReportMsg),
    Ping(PingMsg),
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::MatchCreated(_) => MessageType::MatchCreated,
            Self::JoinAccepted(_) => MessageType::JoinAccepted,
            Self::MatchStarted(_) => MessageType::MatchStarted,
            Self::Snapshot(_) => MessageType::Snapshot,
            Self::MatchOver(_) => MessageType::MatchOver,
            Self::OpponentDisconnected(_) => MessageType::OpponentDisconnected,
            Self::ErrorReport(_) => MessageType::ErrorReport,
            Self::Ping(_) => MessageType::Ping,
        }
    }
}
