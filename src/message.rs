//! Wire types: `Message`, `EncryptedData`, `MessageEnvelope`, `SyncRequest`,
//! `SyncResponse`, each with a hand-rolled protobuf encoder/decoder matching
//! the fixed field-number table.

use crate::errors::{Result, SyncError};
use crate::protobuf::{
    write_bytes_field, write_i64_field, write_string_field, Reader, WIRE_LENGTH_DELIMITED,
};

/// A single mutation: "set column = value on row of dataset".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub dataset: String,
    pub row: String,
    pub column: String,
    pub value: String,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_string_field(&mut buf, 1, &self.dataset);
        write_string_field(&mut buf, 2, &self.row);
        write_string_field(&mut buf, 3, &self.column);
        write_string_field(&mut buf, 4, &self.value);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut msg = Message::default();
        let mut reader = Reader::new(data);
        while let Some(field) = reader.read_field()? {
            match field.number {
                1 => msg.dataset = field.as_str()?.to_string(),
                2 => msg.row = field.as_str()?.to_string(),
                3 => msg.column = field.as_str()?.to_string(),
                4 => msg.value = field.as_str()?.to_string(),
                _ => {}
            }
        }
        Ok(msg)
    }
}

/// AES-GCM-256-encrypted payload: `{ iv, authTag, data }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptedData {
    pub iv: Vec<u8>,
    pub auth_tag: Vec<u8>,
    pub data: Vec<u8>,
}

impl EncryptedData {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_bytes_field(&mut buf, 1, &self.iv);
        write_bytes_field(&mut buf, 2, &self.auth_tag);
        write_bytes_field(&mut buf, 3, &self.data);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = EncryptedData::default();
        let mut reader = Reader::new(data);
        while let Some(field) = reader.read_field()? {
            match field.number {
                1 => out.iv = field.bytes.to_vec(),
                2 => out.auth_tag = field.bytes.to_vec(),
                3 => out.data = field.bytes.to_vec(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Framing around a `Message` carrying its HLC timestamp and encryption flag.
/// `content` is a protobuf-encoded `Message` when plaintext, or a
/// protobuf-encoded `EncryptedData` when `is_encrypted`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageEnvelope {
    pub timestamp: String,
    pub is_encrypted: bool,
    pub content: Vec<u8>,
}

impl MessageEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_string_field(&mut buf, 1, &self.timestamp);
        write_i64_field(&mut buf, 2, self.is_encrypted as i64);
        write_bytes_field(&mut buf, 3, &self.content);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = MessageEnvelope::default();
        let mut reader = Reader::new(data);
        while let Some(field) = reader.read_field()? {
            match field.number {
                1 => out.timestamp = field.as_str()?.to_string(),
                2 => out.is_encrypted = field.varint != 0,
                3 => out.content = field.bytes.to_vec(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// `SyncRequest { messages, fileId, groupId, keyId, since }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncRequest {
    pub messages: Vec<MessageEnvelope>,
    pub file_id: String,
    pub group_id: String,
    pub key_id: String,
    pub since: String,
}

impl SyncRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for envelope in &self.messages {
            write_bytes_field(&mut buf, 1, &envelope.encode());
        }
        write_string_field(&mut buf, 2, &self.file_id);
        write_string_field(&mut buf, 3, &self.group_id);
        write_string_field(&mut buf, 4, &self.key_id);
        write_string_field(&mut buf, 5, &self.since);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = SyncRequest::default();
        let mut reader = Reader::new(data);
        while let Some(field) = reader.read_field()? {
            match field.number {
                1 => {
                    if field.wire_type != WIRE_LENGTH_DELIMITED {
                        return Err(SyncError::ProtobufDecodeError(
                            "messages field must be length-delimited".to_string(),
                        ));
                    }
                    out.messages.push(MessageEnvelope::decode(field.bytes)?);
                }
                2 => out.file_id = field.as_str()?.to_string(),
                3 => out.group_id = field.as_str()?.to_string(),
                4 => out.key_id = field.as_str()?.to_string(),
                5 => out.since = field.as_str()?.to_string(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// `SyncResponse { messages, merkle }` — `merkle` is serialized trie JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncResponse {
    pub messages: Vec<MessageEnvelope>,
    pub merkle: String,
}

impl SyncResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for envelope in &self.messages {
            write_bytes_field(&mut buf, 1, &envelope.encode());
        }
        write_string_field(&mut buf, 2, &self.merkle);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = SyncResponse::default();
        let mut reader = Reader::new(data);
        while let Some(field) = reader.read_field()? {
            match field.number {
                1 => {
                    if field.wire_type != WIRE_LENGTH_DELIMITED {
                        return Err(SyncError::ProtobufDecodeError(
                            "messages field must be length-delimited".to_string(),
                        ));
                    }
                    out.messages.push(MessageEnvelope::decode(field.bytes)?);
                }
                2 => out.merkle = field.as_str()?.to_string(),
                _ => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips() {
        let msg = Message {
            dataset: "acct".to_string(),
            row: "r1".to_string(),
            column: "name".to_string(),
            value: "\"Cash\"".to_string(),
        };
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn encrypted_data_round_trips() {
        let ed = EncryptedData {
            iv: vec![1; 12],
            auth_tag: vec![2; 16],
            data: vec![3; 30],
        };
        let decoded = EncryptedData::decode(&ed.encode()).unwrap();
        assert_eq!(ed, decoded);
    }

    #[test]
    fn envelope_round_trips_plaintext_content() {
        let msg = Message {
            dataset: "d".to_string(),
            row: "r".to_string(),
            column: "c".to_string(),
            value: "1".to_string(),
        };
        let envelope = MessageEnvelope {
            timestamp: "2024-01-01T00:00:00.000Z-0001-0123456789abcdef".to_string(),
            is_encrypted: false,
            content: msg.encode(),
        };
        let decoded = MessageEnvelope::decode(&envelope.encode()).unwrap();
        assert_eq!(envelope, decoded);
        assert_eq!(Message::decode(&decoded.content).unwrap(), msg);
    }

    #[test]
    fn sync_request_round_trips_with_multiple_messages() {
        let req = SyncRequest {
            messages: vec![
                MessageEnvelope {
                    timestamp: "t1".to_string(),
                    is_encrypted: false,
                    content: vec![1, 2, 3],
                },
                MessageEnvelope {
                    timestamp: "t2".to_string(),
                    is_encrypted: true,
                    content: vec![4, 5, 6],
                },
            ],
            file_id: "file".to_string(),
            group_id: "group".to_string(),
            key_id: "".to_string(),
            since: "since".to_string(),
        };
        let decoded = SyncRequest::decode(&req.encode()).unwrap();
        assert_eq!(req, decoded);
    }

    #[test]
    fn sync_response_round_trips() {
        let resp = SyncResponse {
            messages: vec![MessageEnvelope {
                timestamp: "t1".to_string(),
                is_encrypted: false,
                content: vec![9, 9, 9],
            }],
            merkle: "{\"hash\":0}".to_string(),
        };
        let decoded = SyncResponse::decode(&resp.encode()).unwrap();
        assert_eq!(resp, decoded);
    }
}
