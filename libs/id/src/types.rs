//! ID and position definitions.

use crate::{define_id, define_position};

define_id!(RunId, "run");

impl RunId {
    /// Derives a consumer-group name unique to this run.
    ///
    /// A group nobody has committed to starts from the transport's reset
    /// policy, so a history reader opened with it sees the whole backlog.
    #[must_use]
    pub fn consumer_group(&self, prefix: &str) -> String {
        format!("{prefix}-{self}")
    }
}

define_position!(
    /// A partition number within a topic.
    Partition,
    i32
);

define_position!(
    /// A record offset within a partition.
    Offset,
    i64
);

impl Offset {
    /// The first offset of any partition.
    pub const ZERO: Self = Self::new(0);

    /// Returns the offset following this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self::new(self.value() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_display() {
        let id = RunId::new();
        let s = id.to_string();
        assert!(s.starts_with("run_"));
        assert_eq!(s.len(), "run_".len() + 26);
    }

    #[test]
    fn test_consumer_group_is_unique_per_run() {
        let a = RunId::new().consumer_group("esv-orders-reload");
        let b = RunId::new().consumer_group("esv-orders-reload");
        assert!(a.starts_with("esv-orders-reload-run_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_offset_next_and_ordering() {
        let offset = Offset::ZERO;
        assert_eq!(offset.next().value(), 1);
        assert!(offset < offset.next());
    }

    #[test]
    fn test_positions_serialize_transparently() {
        assert_eq!(serde_json::to_string(&Partition::new(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Offset::new(42)).unwrap(), "42");
    }
}
