use crate::bitvector::BitVector;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire identifier of a packet type. The type tag is the first byte of
/// every framed message.
pub type PacketTag = u8;

/// Sentinel index terminating a sparse array diff run. Implies a hard cap
/// of 254 addressable sparse-array indices.
pub const SPARSE_DIFF_SENTINEL: u8 = 255;

/// Fixed-point scale for time-like float fields (e.g. ping time).
pub const SCALE_TIME: u32 = 1_000_000;

/// Fixed-point scale for ratio-like float fields (e.g. success probability).
pub const SCALE_RATIO: u32 = 10_000;

/// Role of the local side of a connection, set once at connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

/// Which side is allowed to originate a packet type.
///
/// Violations are logged but never abort the operation: some packet types
/// are legitimately sent by either side during protocol version transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    Both,
}

impl Direction {
    pub fn allows_send(self, role: Role) -> bool {
        match self {
            Direction::ClientToServer => role == Role::Client,
            Direction::ServerToClient => role == Role::Server,
            Direction::Both => true,
        }
    }

    pub fn allows_receive(self, role: Role) -> bool {
        match self {
            Direction::ClientToServer => role == Role::Server,
            Direction::ServerToClient => role == Role::Client,
            Direction::Both => true,
        }
    }
}

/// A single field value of a packet record.
///
/// Values are dynamically typed against the packet's schema; the engine
/// validates the shape before encoding. Floats are stored as `f64` in
/// memory and travel fixed-point encoded on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Bits(BitVector),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Widens an unsigned scalar value. Used for key projection and for
    /// count fields of dense arrays.
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            FieldValue::U8(v) => Some(u32::from(*v)),
            FieldValue::U16(v) => Some(u32::from(*v)),
            FieldValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// An in-memory packet instance: one value per schema field, in declaration
/// order. Records always carry the full field list of their packet type;
/// a wire variant transmits a subset of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub tag: PacketTag,
    pub values: Vec<FieldValue>,
}

impl Record {
    pub fn new(tag: PacketTag, values: Vec<FieldValue>) -> Self {
        Self { tag, values }
    }

    pub fn value(&self, index: usize) -> &FieldValue {
        &self.values[index]
    }

    pub fn value_mut(&mut self, index: usize) -> &mut FieldValue {
        &mut self.values[index]
    }

    pub fn set_value(&mut self, index: usize, value: FieldValue) {
        self.values[index] = value;
    }
}

/// Identity of a record within the delta cache of its packet type.
///
/// Keyed packets project their key fields into an explicit, hashable key;
/// unkeyed ("singleton") packets share one well-known slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Singleton,
    Id(u32),
    Pair(u32, u32),
}

/// Outcome of a send: either a framed message ready for the byte stream,
/// or nothing because no field changed since the last transmission.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Sent(Bytes),
    Suppressed,
}

impl SendOutcome {
    pub fn bytes_written(&self) -> usize {
        match self {
            SendOutcome::Sent(data) => data.len(),
            SendOutcome::Suppressed => 0,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, SendOutcome::Suppressed)
    }
}
