use crate::bitvector::BitVector;
use crate::connection::Connection;
use crate::error::{Result, WireError};
use crate::protocol::{CacheKey, Direction, FieldValue, PacketTag, Record, SPARSE_DIFF_SENTINEL};

/// Wire representation of a single field.
///
/// A codec describes both the byte layout and the comparison/diff rules for
/// a field. Array codecs nest an element codec; everything else is flat.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCodec {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    SInt8,
    SInt16,
    SInt32,
    /// Non-negative float, transmitted as `round(value * scale)` in a u32.
    UFloat { scale: u32 },
    /// Signed float, transmitted as `round(value * scale)` in an i32.
    SFloat { scale: u32 },
    /// NUL-terminated string with a fixed in-memory capacity.
    Str { max_len: usize },
    /// Bit string with a 16-bit length prefix.
    Bits { max_bits: usize },
    /// Fixed-length opaque byte block.
    Memory { len: usize },
    /// Dense array, retransmitted whole when any element changes. When
    /// `count_field` names an earlier unsigned scalar field, only that many
    /// leading elements are live; otherwise the full capacity is.
    Array {
        elem: Box<FieldCodec>,
        capacity: usize,
        count_field: Option<usize>,
    },
    /// Array diffed element-by-element as (index, value) pairs terminated
    /// by the index sentinel. Capacity is capped at 254 by the sentinel.
    SparseArray {
        elem: Box<FieldCodec>,
        capacity: usize,
    },
}

impl FieldCodec {
    /// The zero value of this codec, used to seed fresh cache entries so
    /// that first transmissions diff against a known baseline.
    pub fn default_value(&self) -> FieldValue {
        match self {
            FieldCodec::Bool => FieldValue::Bool(false),
            FieldCodec::UInt8 => FieldValue::U8(0),
            FieldCodec::UInt16 => FieldValue::U16(0),
            FieldCodec::UInt32 => FieldValue::U32(0),
            FieldCodec::SInt8 => FieldValue::I8(0),
            FieldCodec::SInt16 => FieldValue::I16(0),
            FieldCodec::SInt32 => FieldValue::I32(0),
            FieldCodec::UFloat { .. } | FieldCodec::SFloat { .. } => FieldValue::Float(0.0),
            FieldCodec::Str { .. } => FieldValue::Str(String::new()),
            FieldCodec::Bits { max_bits } => FieldValue::Bits(BitVector::new(*max_bits)),
            FieldCodec::Memory { len } => FieldValue::Bytes(vec![0u8; *len]),
            FieldCodec::Array { elem, capacity, .. }
            | FieldCodec::SparseArray { elem, capacity } => {
                FieldValue::Array(vec![elem.default_value(); *capacity])
            }
        }
    }

    /// Whether `value` has the in-memory shape this codec encodes.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldCodec::Bool, FieldValue::Bool(_)) => true,
            (FieldCodec::UInt8, FieldValue::U8(_)) => true,
            (FieldCodec::UInt16, FieldValue::U16(_)) => true,
            (FieldCodec::UInt32, FieldValue::U32(_)) => true,
            (FieldCodec::SInt8, FieldValue::I8(_)) => true,
            (FieldCodec::SInt16, FieldValue::I16(_)) => true,
            (FieldCodec::SInt32, FieldValue::I32(_)) => true,
            (FieldCodec::UFloat { .. }, FieldValue::Float(v)) => *v >= 0.0,
            (FieldCodec::SFloat { .. }, FieldValue::Float(_)) => true,
            (FieldCodec::Str { .. }, FieldValue::Str(_)) => true,
            (FieldCodec::Bits { max_bits }, FieldValue::Bits(bits)) => bits.width() <= *max_bits,
            (FieldCodec::Memory { len }, FieldValue::Bytes(data)) => data.len() == *len,
            (
                FieldCodec::Array { elem, capacity, .. }
                | FieldCodec::SparseArray { elem, capacity },
                FieldValue::Array(items),
            ) => items.len() == *capacity && items.iter().all(|item| elem.accepts(item)),
            _ => false,
        }
    }

    fn is_unsigned_scalar(&self) -> bool {
        matches!(
            self,
            FieldCodec::UInt8 | FieldCodec::UInt16 | FieldCodec::UInt32
        )
    }

    /// Whether this codec may appear as an array element. Sparse diffing
    /// and count fields only make sense at the top level of a record.
    fn valid_as_element(&self) -> bool {
        match self {
            FieldCodec::SparseArray { .. } => false,
            FieldCodec::Array {
                elem, count_field, ..
            } => count_field.is_none() && elem.valid_as_element(),
            _ => true,
        }
    }
}

/// One field of a packet type: a name for diagnostics, a codec, and a key
/// flag. Key fields identify the record in the delta cache and travel in
/// every transmission.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub codec: FieldCodec,
    pub is_key: bool,
}

impl FieldDef {
    pub fn new(name: &'static str, codec: FieldCodec) -> Self {
        Self {
            name,
            codec,
            is_key: false,
        }
    }

    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }
}

/// Predicate over the negotiated capability tokens of a connection.
///
/// A bare capability matches when both sides advertise the token. Variant
/// selection evaluates predicates in registration order and takes the first
/// match.
#[derive(Debug, Clone)]
pub enum CapPredicate {
    Always,
    Has(&'static str),
    Not(Box<CapPredicate>),
    All(Vec<CapPredicate>),
    Any(Vec<CapPredicate>),
}

impl CapPredicate {
    pub fn matches(&self, our_caps: &[String], peer_caps: &[String]) -> bool {
        match self {
            CapPredicate::Always => true,
            CapPredicate::Has(token) => {
                our_caps.iter().any(|c| c == token) && peer_caps.iter().any(|c| c == token)
            }
            CapPredicate::Not(inner) => !inner.matches(our_caps, peer_caps),
            CapPredicate::All(preds) => preds.iter().all(|p| p.matches(our_caps, peer_caps)),
            CapPredicate::Any(preds) => preds.iter().any(|p| p.matches(our_caps, peer_caps)),
        }
    }

    /// Short human-readable form for trace logs.
    pub fn describe(&self) -> String {
        match self {
            CapPredicate::Always => "always".to_string(),
            CapPredicate::Has(token) => (*token).to_string(),
            CapPredicate::Not(inner) => format!("!{}", inner.describe()),
            CapPredicate::All(preds) => preds
                .iter()
                .map(CapPredicate::describe)
                .collect::<Vec<_>>()
                .join("+"),
            CapPredicate::Any(preds) => preds
                .iter()
                .map(CapPredicate::describe)
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

/// One wire shape of a packet type: the subset of fields transmitted when
/// the variant's capability predicate holds for a connection.
#[derive(Debug, Clone)]
pub struct PacketVariant {
    /// Stable identifier used in trace output. Numbered from 100.
    pub id: u16,
    pub when: CapPredicate,
    /// Indices into the schema field list, ascending. Must include every
    /// key field.
    pub fields: Vec<usize>,
}

/// Whether an unchanged resend is discarded or transmitted anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaPolicy {
    /// Discard a send when no field differs from the cached copy. Used by
    /// state-mirroring packets where a duplicate carries no information.
    SuppressUnchanged,
    /// Always transmit, even with an all-zero presence bitvector. Used by
    /// packets whose arrival itself is the event.
    AlwaysSend,
}

/// Hook invoked on a working copy of the record before encoding.
pub type PreSendHook = fn(&Connection, &mut Record);
/// Hook invoked after a successful (non-suppressed) send.
pub type PostSendHook = fn(&Connection, &Record);
/// Hook invoked on the reconstructed record after decoding.
pub type PostReceiveHook = fn(&Connection, &mut Record);

/// Complete runtime description of one packet type. The encode and decode
/// engines are generic over this descriptor; adding a packet type to a
/// protocol means registering a schema, not writing codec code.
pub struct PacketSchema {
    pub tag: PacketTag,
    pub name: &'static str,
    pub direction: Direction,
    pub policy: DeltaPolicy,
    pub fields: Vec<FieldDef>,
    pub variants: Vec<PacketVariant>,
    /// Packet types whose cache entries under the same key are evicted
    /// whenever this packet is transmitted or received.
    pub cancels: Vec<PacketTag>,
    pub pre_send: Option<PreSendHook>,
    pub post_send: Option<PostSendHook>,
    pub post_receive: Option<PostReceiveHook>,
}

impl PacketSchema {
    pub fn new(tag: PacketTag, name: &'static str, direction: Direction) -> Self {
        Self {
            tag,
            name,
            direction,
            policy: DeltaPolicy::SuppressUnchanged,
            fields: Vec::new(),
            variants: Vec::new(),
            cancels: Vec::new(),
            pre_send: None,
            post_send: None,
            post_receive: None,
        }
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_policy(mut self, policy: DeltaPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends a capability variant. Variants are tried in the order added;
    /// ids are assigned from 100 in that order.
    pub fn with_variant(mut self, when: CapPredicate, fields: Vec<usize>) -> Self {
        let id = 100 + self.variants.len() as u16;
        self.variants.push(PacketVariant { id, when, fields });
        self
    }

    pub fn with_cancel(mut self, tag: PacketTag) -> Self {
        self.cancels.push(tag);
        self
    }

    pub fn with_pre_send(mut self, hook: PreSendHook) -> Self {
        self.pre_send = Some(hook);
        self
    }

    pub fn with_post_send(mut self, hook: PostSendHook) -> Self {
        self.post_send = Some(hook);
        self
    }

    pub fn with_post_receive(mut self, hook: PostReceiveHook) -> Self {
        self.post_receive = Some(hook);
        self
    }

    /// Field indices flagged as keys, in declaration order.
    pub fn key_indices(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_key)
            .map(|(i, _)| i)
            .collect()
    }

    /// The non-key fields of `variant`, in declaration order. The presence
    /// bitvector carries one bit per entry of this list, in this order.
    pub fn optional_indices(&self, variant: &PacketVariant) -> Vec<usize> {
        variant
            .fields
            .iter()
            .copied()
            .filter(|i| !self.fields[*i].is_key)
            .collect()
    }

    /// Live element count of a dense array field: the value of its count
    /// field clamped to the array capacity, or the full capacity when the
    /// array has no count field.
    pub fn live_count(&self, record: &Record, index: usize) -> usize {
        match &self.fields[index].codec {
            FieldCodec::Array {
                capacity,
                count_field: Some(count),
                ..
            } => {
                let declared = record.value(*count).as_uint().unwrap_or(0) as usize;
                declared.min(*capacity)
            }
            FieldCodec::Array { capacity, .. } => *capacity,
            _ => 0,
        }
    }

    /// A record with every field at its codec's zero value.
    pub fn default_record(&self) -> Record {
        Record::new(
            self.tag,
            self.fields.iter().map(|f| f.codec.default_value()).collect(),
        )
    }

    /// Projects the key fields of `record` into a cache key.
    pub fn cache_key(&self, record: &Record) -> Result<CacheKey> {
        let keys = self.key_indices();
        let mut parts = [0u32; 2];
        for (slot, index) in keys.iter().enumerate() {
            parts[slot] = record.value(*index).as_uint().ok_or_else(|| {
                WireError::FieldMismatch {
                    packet: self.name,
                    field: self.fields[*index].name,
                }
            })?;
        }
        Ok(match keys.len() {
            0 => CacheKey::Singleton,
            1 => CacheKey::Id(parts[0]),
            _ => CacheKey::Pair(parts[0], parts[1]),
        })
    }

    /// Verifies that `record` has one value per field and that every value
    /// matches its codec.
    pub fn check_record(&self, record: &Record) -> Result<()> {
        if record.values.len() != self.fields.len() {
            return Err(WireError::SchemaViolation(format!(
                "packet '{}' expects {} fields, record has {}",
                self.name,
                self.fields.len(),
                record.values.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(record.values.iter()) {
            if !field.codec.accepts(value) {
                return Err(WireError::FieldMismatch {
                    packet: self.name,
                    field: field.name,
                });
            }
        }
        Ok(())
    }

    /// Structural validation, run once at registration time.
    pub fn validate(&self) -> Result<()> {
        let violation = |msg: String| Err(WireError::SchemaViolation(msg));

        let keys = self.key_indices();
        if keys.len() > 2 {
            return violation(format!(
                "packet '{}' declares {} key fields, at most 2 supported",
                self.name,
                keys.len()
            ));
        }
        for index in &keys {
            if !self.fields[*index].codec.is_unsigned_scalar() {
                return violation(format!(
                    "packet '{}' key field '{}' must be an unsigned scalar",
                    self.name, self.fields[*index].name
                ));
            }
        }

        for (index, field) in self.fields.iter().enumerate() {
            match &field.codec {
                FieldCodec::Array {
                    elem, count_field, ..
                } => {
                    if !elem.valid_as_element() {
                        return violation(format!(
                            "packet '{}' field '{}': invalid array element codec",
                            self.name, field.name
                        ));
                    }
                    if let Some(count) = count_field {
                        if *count >= index {
                            return violation(format!(
                                "packet '{}' field '{}': count field must precede the array",
                                self.name, field.name
                            ));
                        }
                        if !self.fields[*count].codec.is_unsigned_scalar() {
                            return violation(format!(
                                "packet '{}' field '{}': count field '{}' must be an \
                                 unsigned scalar",
                                self.name, field.name, self.fields[*count].name
                            ));
                        }
                    }
                }
                FieldCodec::SparseArray { elem, capacity } => {
                    if !elem.valid_as_element() {
                        return violation(format!(
                            "packet '{}' field '{}': invalid array element codec",
                            self.name, field.name
                        ));
                    }
                    if *capacity > usize::from(SPARSE_DIFF_SENTINEL) - 1 {
                        return violation(format!(
                            "packet '{}' field '{}': sparse capacity {} exceeds the \
                             sentinel-imposed limit of 254",
                            self.name, field.name, capacity
                        ));
                    }
                }
                _ => {}
            }
        }

        for variant in &self.variants {
            for index in &variant.fields {
                if *index >= self.fields.len() {
                    return violation(format!(
                        "packet '{}' variant {}: field index {} out of range",
                        self.name, variant.id, index
                    ));
                }
            }
            for key in &keys {
                if !variant.fields.contains(key) {
                    return violation(format!(
                        "packet '{}' variant {}: key field '{}' missing",
                        self.name, variant.id, self.fields[*key].name
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_schema() -> PacketSchema {
        PacketSchema::new(31, "city_info", Direction::ServerToClient)
            .with_field(FieldDef::new("city_id", FieldCodec::UInt16).key())
            .with_field(FieldDef::new("size", FieldCodec::UInt8))
            .with_field(FieldDef::new("happy", FieldCodec::Bool))
    }

    #[test]
    fn test_key_projection() {
        let schema = keyed_schema();
        let mut record = schema.default_record();
        record.set_value(0, FieldValue::U16(42));

        assert_eq!(schema.cache_key(&record).unwrap(), CacheKey::Id(42));
    }

    #[test]
    fn test_singleton_key_without_key_fields() {
        let schema = PacketSchema::new(5, "chat", Direction::Both)
            .with_field(FieldDef::new("message", FieldCodec::Str { max_len: 256 }));

        let record = schema.default_record();
        assert_eq!(schema.cache_key(&record).unwrap(), CacheKey::Singleton);
    }

    #[test]
    fn test_default_record_matches_schema() {
        let schema = keyed_schema();
        let record = schema.default_record();

        assert_eq!(record.values.len(), 3);
        schema.check_record(&record).unwrap();
    }

    #[test]
    fn test_check_record_rejects_wrong_type() {
        let schema = keyed_schema();
        let mut record = schema.default_record();
        record.set_value(1, FieldValue::Str("oops".to_string()));

        assert!(matches!(
            schema.check_record(&record),
            Err(WireError::FieldMismatch { field: "size", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_signed_key() {
        let schema = PacketSchema::new(7, "bad", Direction::Both)
            .with_field(FieldDef::new("id", FieldCodec::SInt32).key());

        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_count_after_array() {
        let schema = PacketSchema::new(8, "bad_order", Direction::Both)
            .with_field(FieldDef::new(
                "values",
                FieldCodec::Array {
                    elem: Box::new(FieldCodec::UInt8),
                    capacity: 4,
                    count_field: Some(1),
                },
            ))
            .with_field(FieldDef::new("count", FieldCodec::UInt8));

        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_sparse_array() {
        let schema = PacketSchema::new(9, "too_wide", Direction::Both).with_field(FieldDef::new(
            "cells",
            FieldCodec::SparseArray {
                elem: Box::new(FieldCodec::UInt8),
                capacity: 255,
            },
        ));

        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_variant_must_carry_keys() {
        let schema = keyed_schema().with_variant(CapPredicate::Always, vec![1, 2]);
        assert!(schema.validate().is_err());

        let schema = keyed_schema().with_variant(CapPredicate::Always, vec![0, 1, 2]);
        schema.validate().unwrap();
    }

    #[test]
    fn test_cap_predicate_requires_both_sides() {
        let ours = vec!["extglobalinfo".to_string()];
        let theirs = vec!["extglobalinfo".to_string()];
        let nothing: Vec<String> = Vec::new();

        assert!(CapPredicate::Has("extglobalinfo").matches(&ours, &theirs));
        assert!(!CapPredicate::Has("extglobalinfo").matches(&ours, &nothing));
        assert!(CapPredicate::Not(Box::new(CapPredicate::Has("extglobalinfo")))
            .matches(&ours, &nothing));
        assert!(CapPredicate::Always.matches(&nothing, &nothing));
    }

    #[test]
    fn test_optional_indices_skip_keys() {
        let schema = keyed_schema().with_variant(CapPredicate::Always, vec![0, 1, 2]);
        let variant = &schema.variants[0];

        assert_eq!(schema.optional_indices(variant), vec![1, 2]);
    }

    #[test]
    fn test_accepts_checks_array_shape() {
        let codec = FieldCodec::Array {
            elem: Box::new(FieldCodec::UInt16),
            capacity: 3,
            count_field: None,
        };

        assert!(codec.accepts(&FieldValue::Array(vec![
            FieldValue::U16(1),
            FieldValue::U16(2),
            FieldValue::U16(3),
        ])));
        // Wrong length
        assert!(!codec.accepts(&FieldValue::Array(vec![FieldValue::U16(1)])));
        // Wrong element type
        assert!(!codec.accepts(&FieldValue::Array(vec![
            FieldValue::U8(1),
            FieldValue::U8(2),
            FieldValue::U8(3),
        ])));
    }
}
