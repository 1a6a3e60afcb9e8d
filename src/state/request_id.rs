use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const REQUEST_ID_PREFIX: &str = "chatcmpl-";

pub(crate) struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate a `chatcmpl-<32 hex>` id. The low half is seed xor sequence,
    /// the high half is fresh randomness per call.
    #[must_use]
    pub(crate) fn next_request_id(&self) -> String {
        let seq = self.next_seq();
        let noise = u128::from(fastrand::u64(..)) << 64;
        let uuid = uuid::Uuid::from_u128(self.seed ^ noise ^ u128::from(seq));
        let mut out = String::with_capacity(REQUEST_ID_PREFIX.len() + 32);
        out.push_str(REQUEST_ID_PREFIX);
        out.push_str(&uuid.simple().to_string());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let generator = RequestIdGenerator::new();
        let id = generator.next_request_id();
        let hex = id.strip_prefix(REQUEST_ID_PREFIX).expect("prefix");
        assert_eq!(hex.len(), 32);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_request_ids_are_distinct() {
        let generator = RequestIdGenerator::new();
        let first = generator.next_request_id();
        let second = generator.next_request_id();
        assert_ne!(first, second);
    }
}
