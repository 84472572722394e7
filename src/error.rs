use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown packet type {tag}")]
    UnknownPacket { tag: u8 },

    #[error("Buffer underrun: requested {requested} bytes, {available} available")]
    BufferUnderrun { requested: usize, available: usize },

    #[error("Malformed string field (missing terminator)")]
    BadString,

    #[error("Malformed bit string: {bits} bits claimed, at most {max_bits} allowed")]
    BadBitString { bits: usize, max_bits: usize },

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Field mismatch in packet '{packet}': field '{field}' does not match its codec")]
    FieldMismatch {
        packet: &'static str,
        field: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, WireError>;
