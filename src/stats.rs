use crate::protocol::PacketTag;
use ahash::AHashMap;
use serde::Serialize;

/// Counters for one packet type on one connection.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PacketStats {
    pub sent: u64,
    pub suppressed: u64,
    pub received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Per-connection traffic statistics, broken down by packet type.
#[derive(Debug, Default)]
pub struct LinkStats {
    per_tag: AHashMap<PacketTag, PacketStats>,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            per_tag: AHashMap::new(),
        }
    }

    pub fn record_sent(&mut self, tag: PacketTag, bytes: usize) {
        let entry = self.per_tag.entry(tag).or_default();
        entry.sent += 1;
        entry.bytes_sent += bytes as u64;
    }

    pub fn record_suppressed(&mut self, tag: PacketTag) {
        self.per_tag.entry(tag).or_default().suppressed += 1;
    }

    pub fn record_received(&mut self, tag: PacketTag, bytes: usize) {
        let entry = self.per_tag.entry(tag).or_default();
        entry.received += 1;
        entry.bytes_received += bytes as u64;
    }

    pub fn for_tag(&self, tag: PacketTag) -> PacketStats {
        self.per_tag.get(&tag).copied().unwrap_or_default()
    }

    /// Aggregate counters across all packet types.
    pub fn totals(&self) -> PacketStats {
        let mut total = PacketStats::default();
        for stats in self.per_tag.values() {
            total.sent += stats.sent;
            total.suppressed += stats.suppressed;
            total.received += stats.received;
            total.bytes_sent += stats.bytes_sent;
            total.bytes_received += stats.bytes_received;
        }
        total
    }

    /// Fraction of attempted sends that were discarded as unchanged.
    pub fn suppression_ratio(&self) -> f64 {
        let totals = self.totals();
        let attempts = totals.sent + totals.suppressed;
        if attempts == 0 {
            return 0.0;
        }
        totals.suppressed as f64 / attempts as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let mut stats = LinkStats::new();
        stats.record_sent(10, 32);
        stats.record_sent(10, 8);
        stats.record_suppressed(10);
        stats.record_received(11, 16);

        let tag10 = stats.for_tag(10);
        assert_eq!(tag10.sent, 2);
        assert_eq!(tag10.suppressed, 1);
        assert_eq!(tag10.bytes_sent, 40);

        let tag11 = stats.for_tag(11);
        assert_eq!(tag11.received, 1);
        assert_eq!(tag11.bytes_received, 16);
    }

    #[test]
    fn test_totals_and_ratio() {
        let mut stats = LinkStats::new();
        stats.record_sent(1, 10);
        stats.record_suppressed(1);
        stats.record_suppressed(2);

        let totals = stats.totals();
        assert_eq!(totals.sent, 1);
        assert_eq!(totals.suppressed, 2);
        assert!((stats.suppression_ratio() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tag_is_zeroed() {
        let stats = LinkStats::new();
        assert_eq!(stats.for_tag(200).sent, 0);
        assert_eq!(stats.suppression_ratio(), 0.0);
    }
}
