//! Hand-rolled protobuf wire codec.
//!
//! Only the two wire types this system's messages use: `VARINT` (0) and
//! `LENGTH_DELIMITED` (2). No `prost`/`prost-build`: the message shapes are
//! fixed and small enough that a direct reader/writer is clearer than a
//! generated one, and keeps the crate free of a build-time codegen step.

use crate::errors::{Result, SyncError};

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_LENGTH_DELIMITED: u8 = 2;

/// Appends a field tag (`field_number << 3 | wire_type`) as a varint.
pub fn write_tag(buf: &mut Vec<u8>, field_number: u32, wire_type: u8) {
    let tag = (field_number << 3) | wire_type as u32;
    write_varint(buf, tag as u64);
}

/// Appends an unsigned varint.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Appends a varint field (tag + value).
pub fn write_varint_field(buf: &mut Vec<u8>, field_number: u32, value: u64) {
    write_tag(buf, field_number, WIRE_VARINT);
    write_varint(buf, value);
}

/// Appends an i64 field using zig-zag-free two's complement varint encoding
/// (matches protobuf's plain `int64`, not `sint64`).
pub fn write_i64_field(buf: &mut Vec<u8>, field_number: u32, value: i64) {
    write_varint_field(buf, field_number, value as u64);
}

/// Appends a length-delimited field (tag + length + raw bytes).
pub fn write_bytes_field(buf: &mut Vec<u8>, field_number: u32, data: &[u8]) {
    write_tag(buf, field_number, WIRE_LENGTH_DELIMITED);
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Appends a length-delimited string field.
pub fn write_string_field(buf: &mut Vec<u8>, field_number: u32, s: &str) {
    write_bytes_field(buf, field_number, s.as_bytes());
}

/// A cursor over an encoded protobuf message, used to decode field by field.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

/// A decoded field: its number, wire type, and raw payload (the varint value
/// for `VARINT` fields, or the length-delimited bytes for `LENGTH_DELIMITED`).
pub struct Field<'a> {
    pub number: u32,
    pub wire_type: u8,
    pub varint: u64,
    pub bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_varint_raw(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0u32;
        loop {
            if self.pos >= self.data.len() {
                return Err(SyncError::ProtobufDecodeError(
                    "truncated varint".to_string(),
                ));
            }
            let byte = self.data[self.pos];
            self.pos += 1;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 64 {
                return Err(SyncError::ProtobufDecodeError(
                    "varint too long".to_string(),
                ));
            }
        }
        Ok(result)
    }

    /// Reads the next field tag and payload. Returns `Ok(None)` at end of buffer.
    pub fn read_field(&mut self) -> Result<Option<Field<'a>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let tag = self.read_varint_raw()?;
        let wire_type = (tag & 0x7) as u8;
        let number = (tag >> 3) as u32;

        match wire_type {
            WIRE_VARINT => {
                let value = self.read_varint_raw()?;
                Ok(Some(Field {
                    number,
                    wire_type,
                    varint: value,
                    bytes: &[],
                }))
            }
            WIRE_LENGTH_DELIMITED => {
                let len = self.read_varint_raw()? as usize;
                if self.pos + len > self.data.len() {
                    return Err(SyncError::ProtobufDecodeError(
                        "truncated length-delimited field".to_string(),
                    ));
                }
                let bytes = &self.data[self.pos..self.pos + len];
                self.pos += len;
                Ok(Some(Field {
                    number,
                    wire_type,
                    varint: 0,
                    bytes,
                }))
            }
            other => Err(SyncError::ProtobufDecodeError(format!(
                "unsupported wire type {other}"
            ))),
        }
    }
}

impl<'a> Field<'a> {
    pub fn as_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.bytes)
            .map_err(|e| SyncError::ProtobufDecodeError(format!("invalid utf8: {e}")))
    }

    pub fn as_i64(&self) -> i64 {
        self.varint as i64
    }

    pub fn as_u32(&self) -> Result<u32> {
        u32::try_from(self.varint)
            .map_err(|_| SyncError::ProtobufDecodeError("varint out of u32 range".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips_small_and_large_values() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let mut reader = Reader::new(&buf);
            let decoded = reader.read_varint_raw().unwrap();
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn string_field_round_trips() {
        let mut buf = Vec::new();
        write_string_field(&mut buf, 3, "hello world");
        let mut reader = Reader::new(&buf);
        let field = reader.read_field().unwrap().unwrap();
        assert_eq!(field.number, 3);
        assert_eq!(field.wire_type, WIRE_LENGTH_DELIMITED);
        assert_eq!(field.as_str().unwrap(), "hello world");
    }

    #[test]
    fn varint_field_round_trips() {
        let mut buf = Vec::new();
        write_i64_field(&mut buf, 1, -7);
        let mut reader = Reader::new(&buf);
        let field = reader.read_field().unwrap().unwrap();
        assert_eq!(field.number, 1);
        assert_eq!(field.as_i64(), -7);
    }

    #[test]
    fn truncated_buffer_errors_instead_of_panicking() {
        let mut reader = Reader::new(&[0x08]); // tag byte with no payload
        let err = reader.read_field().unwrap_err();
        assert!(matches!(err, SyncError::ProtobufDecodeError(_)));
    }

    #[test]
    fn truncated_length_delimited_payload_errors() {
        let mut buf = Vec::new();
        write_tag(&mut buf, 1, WIRE_LENGTH_DELIMITED);
        write_varint(&mut buf, 10); // claims 10 bytes but buffer ends here
        let mut reader = Reader::new(&buf);
        let err = reader.read_field().unwrap_err();
        assert!(matches!(err, SyncError::ProtobufDecodeError(_)));
    }

    #[test]
    fn multiple_fields_in_sequence() {
        let mut buf = Vec::new();
        write_string_field(&mut buf, 1, "a");
        write_i64_field(&mut buf, 2, 42);
        let mut reader = Reader::new(&buf);
        let f1 = reader.read_field().unwrap().unwrap();
        assert_eq!(f1.as_str().unwrap(), "a");
        let f2 = reader.read_field().unwrap().unwrap();
        assert_eq!(f2.as_i64(), 42);
        assert!(reader.read_field().unwrap().is_none());
    }
}
