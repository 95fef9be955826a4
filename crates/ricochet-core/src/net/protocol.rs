use serde::{Deserialize, Serialize};

use super::messages::{
    ActivateAbilityMsg, ClientMessage, CreateMatchMsg, ErrorReportMsg, ItemChosenMsg,
    ItemRerollMsg, JoinAcceptedMsg, JoinMatchMsg, MatchCreatedMsg, MatchOverMsg, MatchStartedMsg,
    MessageType, OpponentDisconnectedMsg, PaddleMoveMsg, PingMsg, PongMsg, PostMatchChoiceMsg,
    ServerMessage, SnapshotMsg,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Authoritative tick rate in Hz.
pub const DEFAULT_TICK_RATE_HZ: u32 = 20;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ClientMessage::CreateMatch(m) => encode_message(MessageType::CreateMatch, m),
        ClientMessage::JoinMatch(m) => encode_message(MessageType::JoinMatch, m),
        ClientMessage::PaddleMove(m) => encode_message(MessageType::PaddleMove, m),
        ClientMessage::ItemChosen(m) => encode_message(MessageType::ItemChosen, m),
        ClientMessage::ItemReroll(m) => encode_message(MessageType::ItemReroll, m),
        ClientMessage::ActivateAbility(m) => encode_message(MessageType::ActivateAbility, m),
        ClientMessage::PostMatchChoice(m) => encode_message(MessageType::PostMatchChoice, m),
        ClientMessage::Pong(m) => encode_message(MessageType::Pong, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    match msg {
        ServerMessage::MatchCreated(m) => encode_message(MessageType::MatchCreated, m),
        ServerMessage::JoinAccepted(m) => encode_message(MessageType::JoinAccepted, m),
        ServerMessage::MatchStarted(m) => encode_message(MessageType::MatchStarted, m),
        ServerMessage::Snapshot(m) => encode_message(MessageType::Snapshot, m),
        ServerMessage::MatchOver(m) => encode_message(MessageType::MatchOver, m),
        ServerMessage::OpponentDisconnected(m) => {
            encode_message(MessageType::OpponentDisconnected, m)
        },
        ServerMessage::ErrorReport(m) => encode_message(MessageType::ErrorReport, m),
        ServerMessage::Ping(m) => encode_message(MessageType::Ping, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::CreateMatch => Ok(ClientMessage::CreateMatch(
            decode_payload::<CreateMatchMsg>(data)?,
        )),
        MessageType::JoinMatch => Ok(ClientMessage::JoinMatch(decode_payload::<JoinMatchMsg>(
            data,
        )?)),
        MessageType::PaddleMove => Ok(ClientMessage::PaddleMove(
            decode_payload::<PaddleMoveMsg>(data)?,
        )),
        MessageType::ItemChosen => Ok(ClientMessage::ItemChosen(
            decode_payload::<ItemChosenMsg>(data)?,
        )),
        MessageType::ItemReroll => Ok(ClientMessage::ItemReroll(
            decode_payload::<ItemRerollMsg>(data)?,
        )),
        MessageType::ActivateAbility => Ok(ClientMessage::ActivateAbility(decode_payload::<
            ActivateAbilityMsg,
        >(data)?)),
        MessageType::PostMatchChoice => Ok(ClientMessage::PostMatchChoice(decode_payload::<
            PostMatchChoiceMsg,
        >(data)?)),
        MessageType::Pong => Ok(ClientMessage::Pong(decode_payload::<PongMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::MatchCreated => Ok(ServerMessage::MatchCreated(decode_payload::<
            MatchCreatedMsg,
        >(data)?)),
        MessageType::JoinAccepted => Ok(ServerMessage::JoinAccepted(decode_payload::<
            JoinAcceptedMsg,
        >(data)?)),
        MessageType::MatchStarted => Ok(ServerMessage::MatchStarted(decode_payload::<
            MatchStartedMsg,
        >(data)?)),
        MessageType::Snapshot => Ok(ServerMessage::Snapshot(decode_payload::<SnapshotMsg>(
            data,
        )?)),
        MessageType::MatchOver => Ok(ServerMessage::MatchOver(decode_payload::<MatchOverMsg>(
            data,
        )?)),
        MessageType::OpponentDisconnected => Ok(ServerMessage::OpponentDisconnected(
            decode_payload::<OpponentDisconnectedMsg>(data)?,
        )),
        MessageType::ErrorReport => Ok(ServerMessage::ErrorReport(decode_payload::<
            ErrorReportMsg,
        >(data)?)),
        MessageType::Ping => Ok(ServerMessage::Ping(decode_payload::<PingMsg>(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
