use crate::cache::DeltaCache;
use crate::protocol::{PacketTag, Role};
use crate::stats::LinkStats;
use ahash::AHashMap;

/// Protocol state for one peer link.
///
/// A connection owns two independent delta caches, one per direction, the
/// negotiated capability tokens of both sides, and the variant choice made
/// for each packet type. It carries no transport: callers hand completed
/// frames to whatever byte stream they manage.
pub struct Connection {
    description: String,
    role: Role,
    established: bool,
    our_caps: Vec<String>,
    peer_caps: Vec<String>,
    pub(crate) sent: DeltaCache,
    pub(crate) received: DeltaCache,
    pub(crate) send_variants: AHashMap<PacketTag, usize>,
    pub(crate) recv_variants: AHashMap<PacketTag, usize>,
    pub(crate) stats: LinkStats,
}

impl Connection {
    pub fn new(role: Role) -> Self {
        Self {
            description: String::from("unnamed connection"),
            role,
            established: false,
            our_caps: Vec::new(),
            peer_caps: Vec::new(),
            sent: DeltaCache::new(),
            received: DeltaCache::new(),
            send_variants: AHashMap::new(),
            recv_variants: AHashMap::new(),
            stats: LinkStats::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capability(mut self, token: impl Into<String>) -> Self {
        self.our_caps.push(token.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Marks the link live. Until this is called every send and receive
    /// fails with `ConnectionClosed`.
    pub fn establish(&mut self) {
        self.established = true;
    }

    /// Marks the link dead and drops all delta state. A reestablished
    /// connection starts from empty caches on both sides, so the peers
    /// stay in sync.
    pub fn close(&mut self) {
        self.established = false;
        self.sent.clear();
        self.received.clear();
        self.send_variants.clear();
        self.recv_variants.clear();
    }

    pub fn our_capabilities(&self) -> &[String] {
        &self.our_caps
    }

    pub fn peer_capabilities(&self) -> &[String] {
        &self.peer_caps
    }

    /// Records the capability tokens the peer advertised during handshake.
    /// Invalidates any variant choices made under the old token set.
    pub fn set_peer_capabilities(&mut self, tokens: Vec<String>) {
        self.peer_caps = tokens;
        self.send_variants.clear();
        self.recv_variants.clear();
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn sent_cache_entries(&self) -> usize {
        self.sent.entry_count()
    }

    pub fn received_cache_entries(&self) -> usize {
        self.received.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CacheKey, FieldValue, Record};

    #[test]
    fn test_new_connection_is_closed() {
        let conn = Connection::new(Role::Client);
        assert!(!conn.is_established());
        assert_eq!(conn.description(), "unnamed connection");
    }

    #[test]
    fn test_builder() {
        let conn = Connection::new(Role::Server)
            .with_description("client #3 from 10.0.0.7")
            .with_capability("extglobalinfo");

        assert_eq!(conn.role(), Role::Server);
        assert_eq!(conn.description(), "client #3 from 10.0.0.7");
        assert_eq!(conn.our_capabilities(), ["extglobalinfo".to_string()]);
    }

    #[test]
    fn test_close_drops_delta_state() {
        let mut conn = Connection::new(Role::Client);
        conn.establish();
        conn.sent
            .insert(10, CacheKey::Id(1), Record::new(10, vec![FieldValue::U8(1)]));
        conn.send_variants.insert(10, 0);

        conn.close();

        assert!(!conn.is_established());
        assert_eq!(conn.sent_cache_entries(), 0);
        assert!(conn.send_variants.is_empty());
    }

    #[test]
    fn test_peer_caps_invalidate_variant_choices() {
        let mut conn = Connection::new(Role::Client);
        conn.send_variants.insert(10, 1);
        conn.recv_variants.insert(10, 1);

        conn.set_peer_capabilities(vec!["extglobalinfo".to_string()]);

        assert!(conn.send_variants.is_empty());
        assert!(conn.recv_variants.is_empty());
        assert_eq!(conn.peer_capabilities(), ["extglobalinfo".to_string()]);
    }
}
