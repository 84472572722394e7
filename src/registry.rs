use crate::connection::Connection;
use crate::cursor::PacketReader;
use crate::debug::log_error;
use crate::decode;
use crate::encode;
use crate::error::{Result, WireError};
use crate::protocol::{PacketTag, Record, SendOutcome};
use crate::schema::{CapPredicate, PacketSchema};
use ahash::AHashMap;

/// The packet schemas of one protocol, indexed by type tag.
///
/// A registry is built once at startup, validated as it is populated, and
/// shared read-only by every connection. All traffic flows through it:
/// `send` frames outgoing records, `receive` dispatches incoming frames by
/// their leading tag byte.
#[derive(Default)]
pub struct Registry {
    schemas: AHashMap<PacketTag, PacketSchema>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            schemas: AHashMap::new(),
        }
    }

    /// Validates and adds a schema. A schema declared without variants gets
    /// a single unconditional variant covering every field.
    pub fn register(&mut self, mut schema: PacketSchema) -> Result<()> {
        if schema.variants.is_empty() {
            let all_fields = (0..schema.fields.len()).collect();
            schema = schema.with_variant(CapPredicate::Always, all_fields);
        }
        schema.validate()?;
        if self.schemas.contains_key(&schema.tag) {
            return Err(WireError::SchemaViolation(format!(
                "packet tag {} registered twice ('{}' and '{}')",
                schema.tag, self.schemas[&schema.tag].name, schema.name
            )));
        }
        self.schemas.insert(schema.tag, schema);
        Ok(())
    }

    pub fn schema(&self, tag: PacketTag) -> Option<&PacketSchema> {
        self.schemas.get(&tag)
    }

    pub fn packet_count(&self) -> usize {
        self.schemas.len()
    }

    /// Name of a packet type, for diagnostics. Total: unknown tags map to
    /// a placeholder rather than an error.
    pub fn packet_name(&self, tag: PacketTag) -> &str {
        self.schemas
            .get(&tag)
            .map(|schema| schema.name)
            .unwrap_or("unknown")
    }

    /// Frames `record` for `conn`, delta-encoded against the connection's
    /// send cache.
    pub fn send(&self, conn: &mut Connection, record: &Record) -> Result<SendOutcome> {
        let schema = self
            .schemas
            .get(&record.tag)
            .ok_or(WireError::UnknownPacket { tag: record.tag })?;
        encode::send(schema, conn, record)
    }

    /// Decodes one complete frame received on `conn`. The first byte is
    /// the type tag; the rest is the body of that packet type.
    pub fn receive(&self, conn: &mut Connection, frame: &[u8]) -> Result<Record> {
        let mut reader = PacketReader::new(frame);
        let tag = reader.get_u8()?;
        let Some(schema) = self.schemas.get(&tag) else {
            log_error(&format!(
                "unknown packet tag {} from {}",
                tag,
                conn.description()
            ));
            return Err(WireError::UnknownPacket { tag });
        };
        let record = decode::receive(schema, conn, &mut reader)?;
        if reader.remaining() > 0 {
            log_error(&format!(
                "'{}' frame from {} has {} trailing bytes",
                schema.name,
                conn.description(),
                reader.remaining()
            ));
        }
        conn.stats.record_received(tag, frame.len());
        Ok(record)
    }

    /// Sends one record to every established connection in the list.
    /// Closed connections are skipped. Each connection diffs against its
    /// own cache, so the same record can frame differently per receiver.
    pub fn broadcast<'a, I>(&self, conns: I, record: &Record) -> Result<Vec<SendOutcome>>
    where
        I: IntoIterator<Item = &'a mut Connection>,
    {
        let mut outcomes = Vec::new();
        for conn in conns {
            if !conn.is_established() {
                continue;
            }
            outcomes.push(self.send(conn, record)?);
        }
        Ok(outcomes)
    }
}
