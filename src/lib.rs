//! Delta-encoded packet layer for client/server game protocols.
//!
//! Packet types are described at runtime by [`PacketSchema`] descriptors
//! and collected in a [`Registry`]. Each [`Connection`] keeps a cache of
//! the last record exchanged per packet type and key; resends transmit
//! only the fields that changed, flagged by a presence bitvector, and a
//! resend with no changes at all is discarded before it reaches the wire.
//!
//! The layer is transport-agnostic: `send` produces a framed byte buffer
//! and `receive` consumes one, while connecting, framing and shipping the
//! bytes stays with the caller.
//!
//! ```no_run
//! use delta_link::{
//!     Connection, Direction, FieldCodec, FieldDef, FieldValue, PacketSchema,
//!     Record, Registry, Role, SendOutcome,
//! };
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     PacketSchema::new(31, "city_info", Direction::ServerToClient)
//!         .with_field(FieldDef::new("city_id", FieldCodec::UInt16).key())
//!         .with_field(FieldDef::new("size", FieldCodec::UInt8)),
//! )?;
//!
//! let mut conn = Connection::new(Role::Server).with_description("client #1");
//! conn.establish();
//!
//! let record = Record::new(31, vec![FieldValue::U16(7), FieldValue::U8(4)]);
//! if let SendOutcome::Sent(frame) = registry.send(&mut conn, &record)? {
//!     // hand `frame` to the transport
//!     let _ = frame;
//! }
//! # Ok::<(), delta_link::WireError>(())
//! ```

pub mod bitvector;
pub mod cache;
pub mod connection;
pub mod cursor;
pub mod debug;
pub mod decode;
pub mod encode;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod stats;
pub mod variant;

pub use bitvector::BitVector;
pub use cache::DeltaCache;
pub use connection::Connection;
pub use cursor::{PacketReader, PacketWriter};
pub use error::{Result, WireError};
pub use protocol::{
    CacheKey, Direction, FieldValue, PacketTag, Record, Role, SendOutcome, SCALE_RATIO,
    SCALE_TIME, SPARSE_DIFF_SENTINEL,
};
pub use registry::Registry;
pub use schema::{
    CapPredicate, DeltaPolicy, FieldCodec, FieldDef, PacketSchema, PacketVariant,
};
pub use stats::{LinkStats, PacketStats};
