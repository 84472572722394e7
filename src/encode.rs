use crate::bitvector::BitVector;
use crate::connection::Connection;
use crate::cursor::PacketWriter;
use crate::debug::{log_error, log_record, trace_send, trace_suppressed};
use crate::error::{Result, WireError};
use crate::protocol::{FieldValue, Record, SendOutcome, SPARSE_DIFF_SENTINEL};
use crate::schema::{DeltaPolicy, FieldCodec, PacketSchema};
use crate::variant;

/// Whether an optional field changed relative to the cached copy. Dense
/// arrays compare only their live prefix; a changed element count alone is
/// a change, since the receiver must learn the new prefix.
fn field_differs(schema: &PacketSchema, index: usize, new: &Record, old: &Record) -> bool {
    match &schema.fields[index].codec {
        FieldCodec::Array {
            count_field: Some(_),
            ..
        } => {
            let new_count = schema.live_count(new, index);
            let old_count = schema.live_count(old, index);
            if new_count != old_count {
                return true;
            }
            let (FieldValue::Array(new_items), FieldValue::Array(old_items)) =
                (new.value(index), old.value(index))
            else {
                return true;
            };
            new_items[..new_count] != old_items[..new_count]
        }
        _ => new.value(index) != old.value(index),
    }
}

/// Writes one value with the given codec. `old` supplies the diff baseline
/// for sparse arrays and is ignored by every other codec.
fn write_value(
    writer: &mut PacketWriter,
    codec: &FieldCodec,
    value: &FieldValue,
    old: &FieldValue,
) -> Result<()> {
    match (codec, value) {
        (FieldCodec::Bool, FieldValue::Bool(v)) => writer.put_bool8(*v),
        (FieldCodec::UInt8, FieldValue::U8(v)) => writer.put_u8(*v),
        (FieldCodec::UInt16, FieldValue::U16(v)) => writer.put_u16(*v),
        (FieldCodec::UInt32, FieldValue::U32(v)) => writer.put_u32(*v),
        (FieldCodec::SInt8, FieldValue::I8(v)) => writer.put_i8(*v),
        (FieldCodec::SInt16, FieldValue::I16(v)) => writer.put_i16(*v),
        (FieldCodec::SInt32, FieldValue::I32(v)) => writer.put_i32(*v),
        (FieldCodec::UFloat { scale }, FieldValue::Float(v)) => writer.put_ufloat(*v, *scale),
        (FieldCodec::SFloat { scale }, FieldValue::Float(v)) => writer.put_sfloat(*v, *scale),
        (FieldCodec::Str { .. }, FieldValue::Str(v)) => writer.put_string(v),
        (FieldCodec::Bits { .. }, FieldValue::Bits(v)) => writer.put_bit_string(v),
        (FieldCodec::Memory { .. }, FieldValue::Bytes(v)) => writer.put_memory(v),
        (FieldCodec::Array { elem, .. }, FieldValue::Array(items)) => {
            for item in items {
                write_value(writer, elem, item, item)?;
            }
        }
        (FieldCodec::SparseArray { elem, capacity }, FieldValue::Array(items)) => {
            let FieldValue::Array(old_items) = old else {
                return Err(WireError::SchemaViolation(
                    "sparse array diffed against a non-array baseline".to_string(),
                ));
            };
            for i in 0..*capacity {
                if items[i] != old_items[i] {
                    writer.put_u8(i as u8);
                    write_value(writer, elem, &items[i], &items[i])?;
                }
            }
            writer.put_u8(SPARSE_DIFF_SENTINEL);
        }
        _ => {
            return Err(WireError::SchemaViolation(
                "field value does not match its codec".to_string(),
            ))
        }
    }
    Ok(())
}

/// Writes an optional field body. Dense arrays with a count field transmit
/// only the live prefix; the receiver reconstructs the length from the
/// already-decoded count field.
fn write_field(
    writer: &mut PacketWriter,
    schema: &PacketSchema,
    record: &Record,
    old: &Record,
    index: usize,
) -> Result<()> {
    let codec = &schema.fields[index].codec;
    if let FieldCodec::Array {
        elem,
        count_field: Some(_),
        ..
    } = codec
    {
        let count = schema.live_count(record, index);
        let FieldValue::Array(items) = record.value(index) else {
            return Err(WireError::FieldMismatch {
                packet: schema.name,
                field: schema.fields[index].name,
            });
        };
        for item in &items[..count] {
            write_value(writer, elem, item, item)?;
        }
        return Ok(());
    }
    write_value(writer, codec, record.value(index), old.value(index))
}

/// Encodes `record` for transmission over `conn`, diffing against the
/// cached copy of the last send under the same key.
///
/// Returns the framed message, or `Suppressed` when the packet type elides
/// unchanged resends and nothing differs. The cache is updated either way
/// a frame is produced; a suppressed send leaves it untouched.
pub fn send(schema: &PacketSchema, conn: &mut Connection, record: &Record) -> Result<SendOutcome> {
    if !conn.is_established() {
        log_error(&format!(
            "send of '{}' on closed connection {}",
            schema.name,
            conn.description()
        ));
        return Err(WireError::ConnectionClosed);
    }
    schema.check_record(record)?;

    if !schema.direction.allows_send(conn.role()) {
        log_error(&format!(
            "'{}' sent by the {:?} side against its declared direction",
            schema.name,
            conn.role()
        ));
    }

    let slot = variant::send_slot(conn, schema);
    let variant = &schema.variants[slot];

    let mut work = record.clone();
    if let Some(hook) = schema.pre_send {
        hook(conn, &mut work);
    }
    log_record("SEND", schema.name, &work);

    let key = schema.cache_key(&work)?;
    let (old, first) = match conn.sent.lookup(schema.tag, key) {
        Some(cached) => (cached.clone(), false),
        None => (schema.default_record(), true),
    };

    let optional = schema.optional_indices(variant);
    let mut presence = BitVector::new(optional.len());
    let mut different = 0usize;

    for (bit, index) in optional.iter().enumerate() {
        if schema.fields[*index].codec == FieldCodec::Bool {
            // Booleans fold into the presence bit: the bit carries the
            // value itself, not a change marker.
            let value = work.value(*index).as_bool().unwrap_or(false);
            presence.assign(bit, value);
            if work.value(*index) != old.value(*index) {
                different += 1;
            }
        } else if field_differs(schema, *index, &work, &old) {
            different += 1;
            presence.set(bit);
        }
    }

    if different == 0
        && !first
        && schema.policy == DeltaPolicy::SuppressUnchanged
        && !optional.is_empty()
    {
        conn.stats.record_suppressed(schema.tag);
        trace_suppressed(schema.name, key);
        return Ok(SendOutcome::Suppressed);
    }

    let mut writer = PacketWriter::new();
    writer.put_u8(schema.tag);
    writer.put_bitvector(&presence);
    for index in schema.key_indices() {
        write_value(
            &mut writer,
            &schema.fields[index].codec,
            work.value(index),
            old.value(index),
        )?;
    }
    for (bit, index) in optional.iter().enumerate() {
        if schema.fields[*index].codec == FieldCodec::Bool {
            continue;
        }
        if presence.is_set(bit) {
            write_field(&mut writer, schema, &work, &old, *index)?;
        }
    }

    conn.sent.insert(schema.tag, key, work.clone());
    for cancelled in &schema.cancels {
        conn.sent.remove(*cancelled, key);
    }

    let bytes = writer.into_bytes();
    conn.stats.record_sent(schema.tag, bytes.len());
    trace_send(schema.name, key, bytes.len(), first);

    if let Some(hook) = schema.post_send {
        hook(conn, &work);
    }

    Ok(SendOutcome::Sent(bytes))
}
