use std::collections::{BTreeSet, HashMap};

/// Commit positions for a consumer that handles several messages at once.
///
/// Kafka stores one position per partition, so committing a later message
/// also acknowledges every earlier one. The position handed out here never
/// moves past an offset that is still being handled, or whose handling failed.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<(String, i32), PartitionState>,
}

#[derive(Debug, Default)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    /// One past the highest offset handled so far.
    handled_through: Option<i64>,
    committed: Option<i64>,
}

impl OffsetTracker {
    /// Must be called in the order messages arrive from the consumer.
    pub fn begin(&mut self, topic: &str, partition: i32, offset: i64) {
        self.partitions
            .entry((topic.to_string(), partition))
            .or_default()
            .in_flight
            .insert(offset);
    }

    /// Marks `offset` handled. Returns the position to commit when it moved.
    pub fn finish(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partitions.get_mut(&(topic.to_string(), partition))?;
        if !state.in_flight.remove(&offset) {
            return None;
        }

        let next = offset + 1;
        state.handled_through = Some(state.handled_through.map_or(next, |h| h.max(next)));

        let position = match state.in_flight.first() {
            Some(&lowest) => lowest,
            None => state.handled_through?,
        };
        if state.committed.is_some_and(|c| position <= c) {
            return None;
        }
        state.committed = Some(position);
        Some(position)
    }

    pub fn pending(&self, topic: &str, partition: i32) -> usize {
        self.partitions
            .get(&(topic.to_string(), partition))
            .map_or(0, |state| state.in_flight.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "notification-commands";

    #[test]
    fn in_order_completion_commits_each_message() {
        let mut offsets = OffsetTracker::default();
        offsets.begin(TOPIC, 0, 10);
        offsets.begin(TOPIC, 0, 11);

        assert_eq!(offsets.finish(TOPIC, 0, 10), Some(11));
        assert_eq!(offsets.finish(TOPIC, 0, 11), Some(12));
        assert_eq!(offsets.pending(TOPIC, 0), 0);
    }

    #[test]
    fn later_message_does_not_acknowledge_one_still_retrying() {
        let mut offsets = OffsetTracker::default();
        offsets.begin(TOPIC, 0, 10);
        offsets.begin(TOPIC, 0, 11);
        offsets.begin(TOPIC, 0, 12);

        // 10 is waiting out its backoff while 11 and 12 finish.
        assert_eq!(offsets.finish(TOPIC, 0, 11), Some(10));
        assert_eq!(offsets.finish(TOPIC, 0, 12), None);

        assert_eq!(offsets.finish(TOPIC, 0, 10), Some(13));
    }

    #[test]
    fn unsettled_message_holds_its_partition_back() {
        let mut offsets = OffsetTracker::default();
        offsets.begin(TOPIC, 0, 10);
        offsets.begin(TOPIC, 0, 11);

        // 10 failed and is never finished.
        assert_eq!(offsets.finish(TOPIC, 0, 11), Some(10));
        offsets.begin(TOPIC, 0, 12);
        assert_eq!(offsets.finish(TOPIC, 0, 12), None);
        assert_eq!(offsets.pending(TOPIC, 0), 1);
    }

    #[test]
    fn partitions_are_tracked_separately() {
        let mut offsets = OffsetTracker::default();
        offsets.begin(TOPIC, 0, 5);
        offsets.begin(TOPIC, 1, 7);

        assert_eq!(offsets.finish(TOPIC, 1, 7), Some(8));
        assert_eq!(offsets.pending(TOPIC, 0), 1);
        assert_eq!(offsets.finish(TOPIC, 0, 5), Some(6));
    }

    #[test]
    fn unknown_offsets_are_ignored() {
        let mut offsets = OffsetTracker::default();
        assert_eq!(offsets.finish(TOPIC, 0, 3), None);
        offsets.begin(TOPIC, 0, 4);
        assert_eq!(offsets.finish(TOPIC, 0, 3), None);
    }
}
