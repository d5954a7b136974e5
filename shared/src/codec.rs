//! Wire codec and stream framing.
//!
//! An encoded message is a fixed header followed by the variant's payload:
//!
//! ```text
//! +---------+-------------------+----------------------+
//! | tag: u8 | timestamp: u64 LE | bincode(payload)     |
//! +---------+-------------------+----------------------+
//! ```
//!
//! On TCP every encoded message travels inside a length-prefixed frame
//! (`u32` little-endian payload length, then the payload). UDP datagrams carry
//! one encoded message each, unframed.

use bincode::{deserialize, serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::CodecError;
use crate::messages::{MessageBody, MessageType, NetworkMessage};

const HEADER_LEN: usize = 1 + 8;

pub fn encode(message: &NetworkMessage) -> Result<Vec<u8>, CodecError> {
    let payload = match &message.body {
        MessageBody::Connection(m) => serialize(m)?,
        MessageBody::Disconnection(m) => serialize(m)?,
        MessageBody::PlayerState(m) => serialize(m)?,
        MessageBody::EnemyState(m) => serialize(m)?,
        MessageBody::GameState(m) => serialize(m)?,
        MessageBody::Input(m) => serialize(m)?,
        MessageBody::Spawn(m) => serialize(m)?,
        MessageBody::Damage(m) => serialize(m)?,
        MessageBody::Experience(m) => serialize(m)?,
        MessageBody::Chat(m) => serialize(m)?,
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.push(message.message_type().tag());
    bytes.extend_from_slice(&message.timestamp.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decodes one message. An unrecognized tag yields
/// [`CodecError::UnknownType`] without touching the payload.
pub fn decode(bytes: &[u8]) -> Result<NetworkMessage, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated { len: bytes.len() });
    }

    let tag = bytes[0];
    let message_type = MessageType::from_tag(tag).ok_or(CodecError::UnknownType(tag))?;

    let mut timestamp_bytes = [0u8; 8];
    timestamp_bytes.copy_from_slice(&bytes[1..HEADER_LEN]);
    let timestamp = u64::from_le_bytes(timestamp_bytes);

    let payload = &bytes[HEADER_LEN..];
    let body = match message_type {
        MessageType::Connection => MessageBody::Connection(deserialize(payload)?),
        MessageType::Disconnection => MessageBody::Disconnection(deserialize(payload)?),
        MessageType::PlayerState => MessageBody::PlayerState(deserialize(payload)?),
        MessageType::EnemyState => MessageBody::EnemyState(deserialize(payload)?),
        MessageType::GameState => MessageBody::GameState(deserialize(payload)?),
        MessageType::Input => MessageBody::Input(deserialize(payload)?),
        MessageType::Spawn => MessageBody::Spawn(deserialize(payload)?),
        MessageType::Damage => MessageBody::Damage(deserialize(payload)?),
        MessageType::Experience => MessageBody::Experience(deserialize(payload)?),
        MessageType::Chat => MessageBody::Chat(deserialize(payload)?),
    };

    Ok(NetworkMessage { timestamp, body })
}

/// Reads one length-prefixed frame and returns its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_payload_size: u32,
) -> Result<Vec<u8>, CodecError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::ConnectionClosed);
        }
        Err(e) => return Err(CodecError::Io(e)),
    }

    let payload_len = u32::from_le_bytes(len_buf);
    if payload_len > max_payload_size {
        return Err(CodecError::PayloadTooLarge {
            size: payload_len,
            max: max_payload_size,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CodecError::ConnectionClosed
            } else {
                CodecError::Io(e)
            }
        })?;
    }

    Ok(payload)
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_payload_size: u32,
) -> Result<(), CodecError> {
    let len = payload.len() as u32;
    if len > max_payload_size {
        return Err(CodecError::PayloadTooLarge {
            size: len,
            max: max_payload_size,
        });
    }

    writer.write_all(&len.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}
