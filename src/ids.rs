use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use rand::Rng;

/// Snowflake-style id generator: `(ms since 2024-01-01) << 12 | node << 7 | seq`.
/// Node is 5 random bits fixed per process, sequence is 7 bits and resets on
/// every new millisecond.
pub struct IdGenerator {
    epoch_ms: i64,
    node: i64,
    inner: Mutex<IdState>,
}

struct IdState {
    last_ms: i64,
    seq: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        let node = rand::thread_rng().gen_range(0..32);
        Self::with_node(node)
    }

    fn with_node(node: i64) -> Self {
        let epoch_ms = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap()
            .timestamp_millis();
        IdGenerator {
            epoch_ms,
            node: node & 0x1F,
            inner: Mutex::new(IdState { last_ms: 0, seq: 0 }),
        }
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut st = self.inner.lock().unwrap();
        if now == st.last_ms {
            st.seq = (st.seq + 1) & 0x7F;
        } else {
            st.seq = 0;
            st.last_ms = now;
        }
        ((now - self.epoch_ms) << 12) | (self.node << 7) | st.seq
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_monotonic_and_unique_within_the_sequence_window() {
        // 100 draws stay under the 7-bit per-millisecond sequence space.
        let gen = IdGenerator::with_node(7);
        let mut seen = HashSet::new();
        let mut prev = 0;
        for _ in 0..100 {
            let id = gen.next();
            assert!(id >= prev, "ids must not go backwards");
            assert!(seen.insert(id), "ids must be unique");
            prev = id;
        }
    }

    #[test]
    fn node_bits_are_embedded() {
        let gen = IdGenerator::with_node(21);
        let id = gen.next();
        assert_eq!((id >> 7) & 0x1F, 21);
    }

    #[test]
    fn sequence_increments_within_one_millisecond() {
        let gen = IdGenerator::with_node(0);
        let first = gen.next();
        let second = gen.next();
        // Either the clock advanced (sequence reset) or the sequence grew.
        if second >> 12 == first >> 12 {
            assert_eq!(second & 0x7F, (first & 0x7F) + 1);
        }
    }
}
