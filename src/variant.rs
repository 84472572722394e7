use crate::connection::Connection;
use crate::debug::{log_error, trace_variant};
use crate::schema::PacketSchema;

/// Picks the first variant whose capability predicate holds for the
/// negotiated token sets. Declaration order is the tie-breaker, so schemas
/// list their most capability-demanding variant first and a catch-all last.
fn resolve(schema: &PacketSchema, our_caps: &[String], peer_caps: &[String]) -> Option<usize> {
    schema
        .variants
        .iter()
        .position(|variant| variant.when.matches(our_caps, peer_caps))
}

fn fatal_no_variant(schema: &PacketSchema, conn: &Connection) -> ! {
    log_error(&format!(
        "no variant of packet '{}' matches the negotiated capabilities of {} \
         (ours: {:?}, peer: {:?})",
        schema.name,
        conn.description(),
        conn.our_capabilities(),
        conn.peer_capabilities()
    ));
    // A connection that negotiated capabilities no variant covers cannot
    // exchange this packet type at all. There is no protocol-level recovery.
    panic!(
        "no variant of packet '{}' matches negotiated capabilities",
        schema.name
    );
}

/// Variant slot used when sending `schema` over `conn`. Resolved once per
/// packet type and remembered until the capability set changes.
pub fn send_slot(conn: &mut Connection, schema: &PacketSchema) -> usize {
    if let Some(slot) = conn.send_variants.get(&schema.tag) {
        return *slot;
    }
    match resolve(schema, conn.our_capabilities(), conn.peer_capabilities()) {
        Some(slot) => {
            let variant = &schema.variants[slot];
            trace_variant(schema.name, variant.id, &variant.when.describe());
            conn.send_variants.insert(schema.tag, slot);
            slot
        }
        None => fatal_no_variant(schema, conn),
    }
}

/// Variant slot used when decoding `schema` from `conn`'s peer. Kept
/// separately from the send choice: both sides must agree per direction,
/// and the caches they index are per-direction too.
pub fn recv_slot(conn: &mut Connection, schema: &PacketSchema) -> usize {
    if let Some(slot) = conn.recv_variants.get(&schema.tag) {
        return *slot;
    }
    match resolve(schema, conn.our_capabilities(), conn.peer_capabilities()) {
        Some(slot) => {
            let variant = &schema.variants[slot];
            trace_variant(schema.name, variant.id, &variant.when.describe());
            conn.recv_variants.insert(schema.tag, slot);
            slot
        }
        None => fatal_no_variant(schema, conn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Direction, Role};
    use crate::schema::{CapPredicate, FieldCodec, FieldDef};

    fn two_variant_schema() -> PacketSchema {
        PacketSchema::new(40, "ruleset_terrain", Direction::ServerToClient)
            .with_field(FieldDef::new("id", FieldCodec::UInt8).key())
            .with_field(FieldDef::new("movement_cost", FieldCodec::UInt8))
            .with_field(FieldDef::new("defense_bonus", FieldCodec::UInt16))
            .with_variant(CapPredicate::Has("terrain-bonus"), vec![0, 1, 2])
            .with_variant(CapPredicate::Always, vec![0, 1])
    }

    fn capable_connection() -> Connection {
        let mut conn = Connection::new(Role::Server).with_capability("terrain-bonus");
        conn.set_peer_capabilities(vec!["terrain-bonus".to_string()]);
        conn
    }

    #[test]
    fn test_first_match_wins() {
        let schema = two_variant_schema();

        let mut capable = capable_connection();
        assert_eq!(send_slot(&mut capable, &schema), 0);

        let mut plain = Connection::new(Role::Server);
        assert_eq!(send_slot(&mut plain, &schema), 1);
    }

    #[test]
    fn test_choice_is_cached() {
        let schema = two_variant_schema();
        let mut conn = capable_connection();

        assert_eq!(send_slot(&mut conn, &schema), 0);
        assert_eq!(conn.send_variants.get(&schema.tag), Some(&0));

        // A later capability change clears the cache and re-resolves.
        conn.set_peer_capabilities(Vec::new());
        assert_eq!(send_slot(&mut conn, &schema), 1);
    }

    #[test]
    fn test_send_and_recv_slots_are_independent() {
        let schema = two_variant_schema();
        let mut conn = capable_connection();

        send_slot(&mut conn, &schema);
        assert!(conn.recv_variants.is_empty());

        recv_slot(&mut conn, &schema);
        assert_eq!(conn.recv_variants.get(&schema.tag), Some(&0));
    }

    #[test]
    #[should_panic(expected = "no variant")]
    fn test_no_match_is_fatal() {
        let schema = PacketSchema::new(41, "strict", Direction::Both)
            .with_field(FieldDef::new("x", FieldCodec::UInt8))
            .with_variant(CapPredicate::Has("mandatory-cap"), vec![0]);

        let mut conn = Connection::new(Role::Client);
        send_slot(&mut conn, &schema);
    }
}
