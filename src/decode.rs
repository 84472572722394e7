use crate::connection::Connection;
use crate::cursor::PacketReader;
use crate::debug::{log_error, log_record, trace_receive};
use crate::error::{Result, WireError};
use crate::protocol::{CacheKey, FieldValue, Record, SPARSE_DIFF_SENTINEL};
use crate::schema::{FieldCodec, PacketSchema};
use crate::variant;

/// Reads one self-contained value. Arrays are read at full capacity here;
/// counted and sparse arrays are handled by `read_field`, which has the
/// partially-reconstructed record to work against.
fn read_value(reader: &mut PacketReader, codec: &FieldCodec) -> Result<FieldValue> {
    Ok(match codec {
        FieldCodec::Bool => FieldValue::Bool(reader.get_bool8()?),
        FieldCodec::UInt8 => FieldValue::U8(reader.get_u8()?),
        FieldCodec::UInt16 => FieldValue::U16(reader.get_u16()?),
        FieldCodec::UInt32 => FieldValue::U32(reader.get_u32()?),
        FieldCodec::SInt8 => FieldValue::I8(reader.get_i8()?),
        FieldCodec::SInt16 => FieldValue::I16(reader.get_i16()?),
        FieldCodec::SInt32 => FieldValue::I32(reader.get_i32()?),
        FieldCodec::UFloat { scale } => FieldValue::Float(reader.get_ufloat(*scale)?),
        FieldCodec::SFloat { scale } => FieldValue::Float(reader.get_sfloat(*scale)?),
        FieldCodec::Str { max_len } => FieldValue::Str(reader.get_string(*max_len)?),
        FieldCodec::Bits { max_bits } => FieldValue::Bits(reader.get_bit_string(*max_bits)?),
        FieldCodec::Memory { len } => FieldValue::Bytes(reader.get_memory(*len)?),
        FieldCodec::Array { elem, capacity, .. } => {
            let mut items = Vec::with_capacity(*capacity);
            for _ in 0..*capacity {
                items.push(read_value(reader, elem)?);
            }
            FieldValue::Array(items)
        }
        FieldCodec::SparseArray { .. } => {
            return Err(WireError::SchemaViolation(
                "sparse array read without a baseline".to_string(),
            ))
        }
    })
}

/// Count-field value clamped to `capacity`, re-expressed in the count
/// field's own width.
fn clamped_count_value(codec: &FieldCodec, capacity: usize) -> FieldValue {
    match codec {
        FieldCodec::UInt8 => FieldValue::U8(capacity as u8),
        FieldCodec::UInt16 => FieldValue::U16(capacity as u16),
        _ => FieldValue::U32(capacity as u32),
    }
}

/// Decodes one optional field body into `record`, which still holds the
/// cached values for everything not yet overwritten.
fn read_field(
    reader: &mut PacketReader,
    schema: &PacketSchema,
    record: &mut Record,
    index: usize,
) -> Result<()> {
    match &schema.fields[index].codec {
        FieldCodec::Array {
            elem,
            capacity,
            count_field: Some(count),
        } => {
            let declared = record.value(*count).as_uint().unwrap_or(0) as usize;
            if declared > *capacity {
                // A peer claiming more elements than the schema allows is
                // either buggy or hostile. Clamp and record the clamped
                // count so later diffs stay consistent.
                log_error(&format!(
                    "'{}' field '{}': claimed {} elements, capacity {}, clamped",
                    schema.name, schema.fields[index].name, declared, capacity
                ));
                record.set_value(
                    *count,
                    clamped_count_value(&schema.fields[*count].codec, *capacity),
                );
            }
            let live = declared.min(*capacity);
            let FieldValue::Array(items) = record.value_mut(index) else {
                return Err(WireError::FieldMismatch {
                    packet: schema.name,
                    field: schema.fields[index].name,
                });
            };
            for slot in 0..live {
                items[slot] = read_value(reader, elem)?;
            }
            Ok(())
        }
        FieldCodec::SparseArray { elem, capacity } => {
            loop {
                let slot = reader.get_u8()?;
                if slot == SPARSE_DIFF_SENTINEL {
                    break;
                }
                let value = read_value(reader, elem)?;
                if usize::from(slot) < *capacity {
                    let FieldValue::Array(items) = record.value_mut(index) else {
                        return Err(WireError::FieldMismatch {
                            packet: schema.name,
                            field: schema.fields[index].name,
                        });
                    };
                    items[usize::from(slot)] = value;
                } else {
                    log_error(&format!(
                        "'{}' field '{}': sparse index {} out of range, discarded",
                        schema.name, schema.fields[index].name, slot
                    ));
                }
            }
            Ok(())
        }
        codec => {
            let value = read_value(reader, codec)?;
            record.set_value(index, value);
            Ok(())
        }
    }
}

/// Reconstructs a full record from a message body, merging the transmitted
/// fields over the cached copy of the previous receive under the same key.
///
/// `reader` is positioned just past the type tag. The reconstructed record
/// becomes the new cache baseline before the post-receive hook runs.
pub fn receive(
    schema: &PacketSchema,
    conn: &mut Connection,
    reader: &mut PacketReader,
) -> Result<Record> {
    if !conn.is_established() {
        log_error(&format!(
            "receive of '{}' on closed connection {}",
            schema.name,
            conn.description()
        ));
        return Err(WireError::ConnectionClosed);
    }

    if !schema.direction.allows_receive(conn.role()) {
        log_error(&format!(
            "'{}' received by the {:?} side against its declared direction",
            schema.name,
            conn.role()
        ));
    }

    let slot = variant::recv_slot(conn, schema);
    let variant = &schema.variants[slot];
    let optional = schema.optional_indices(variant);

    let presence = reader.get_bitvector(optional.len())?;

    let keys = schema.key_indices();
    let mut key_values = Vec::with_capacity(keys.len());
    let mut parts = [0u32; 2];
    for (part, index) in keys.iter().enumerate() {
        let value = read_value(reader, &schema.fields[*index].codec)?;
        parts[part] = value.as_uint().unwrap_or(0);
        key_values.push(value);
    }
    let key = match keys.len() {
        0 => CacheKey::Singleton,
        1 => CacheKey::Id(parts[0]),
        _ => CacheKey::Pair(parts[0], parts[1]),
    };

    let cached = conn.received.take(schema.tag, key);
    let fresh = cached.is_none();
    let mut record = cached.unwrap_or_else(|| schema.default_record());
    for (index, value) in keys.iter().zip(key_values) {
        record.set_value(*index, value);
    }

    for (bit, index) in optional.iter().enumerate() {
        if schema.fields[*index].codec == FieldCodec::Bool {
            // The presence bit is the value. Overwrite unconditionally.
            record.set_value(*index, FieldValue::Bool(presence.is_set(bit)));
        } else if presence.is_set(bit) {
            read_field(reader, schema, &mut record, *index)?;
        }
    }

    conn.received.insert(schema.tag, key, record.clone());
    for cancelled in &schema.cancels {
        conn.received.remove(*cancelled, key);
    }

    trace_receive(schema.name, key, fresh);
    log_record("RECV", schema.name, &record);

    if let Some(hook) = schema.post_receive {
        hook(conn, &mut record);
    }

    Ok(record)
}
