//! Read pointer persistence and unread-count hydration.

use crate::domain::read_state::UnreadTracker;

const READ_TRACKING_FAILED: &str = "CHAT_READ_TRACKING_FAILED";
const UNREAD_HYDRATION_FAILED: &str = "CHAT_UNREAD_HYDRATION_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadTrackingSourceError {
    Unauthorized,
    Unavailable,
    RoomNotFound,
}

pub trait ReadTrackingSink {
    fn mark_read(&self, room_id: i64, last_read_message_id: i64)
        -> Result<(), ReadTrackingSourceError>;

    fn unread_count(&self, room_id: i64) -> Result<u32, ReadTrackingSourceError>;
}

impl<T> ReadTrackingSink for &T
where
    T: ReadTrackingSink + ?Sized,
{
    fn mark_read(
        &self,
        room_id: i64,
        last_read_message_id: i64,
    ) -> Result<(), ReadTrackingSourceError> {
        (*self).mark_read(room_id, last_read_message_id)
    }

    fn unread_count(&self, room_id: i64) -> Result<u32, ReadTrackingSourceError> {
        (*self).unread_count(room_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadError {
    Unauthorized,
    TemporarilyUnavailable,
    RoomNotFound,
}

/// Moves the read pointer to `through_message_id` and persists it.
///
/// The local count is zeroed before the request and stays zero when the
/// request fails; the failure is logged and returned for information only.
pub fn mark_read(
    sink: &dyn ReadTrackingSink,
    tracker: &mut UnreadTracker,
    room_id: i64,
    through_message_id: i64,
    now_ms: i64,
) -> Result<(), MarkReadError> {
    tracker.record_read(room_id, through_message_id, now_ms);

    sink.mark_read(room_id, through_message_id)
        .map_err(|error| {
            tracing::warn!(
                code = READ_TRACKING_FAILED,
                room_id,
                through_message_id,
                error = ?error,
                "read pointer was not persisted"
            );
            map_source_error(error)
        })
}

/// Seeds a room's unread estimate from the backend the first time it is seen.
/// Fails soft: an unavailable count is treated as zero.
pub fn hydrate_unread(sink: &dyn ReadTrackingSink, tracker: &mut UnreadTracker, room_id: i64) -> u32 {
    if tracker.is_observed(room_id) {
        return tracker.unread(room_id);
    }

    let count = sink.unread_count(room_id).unwrap_or_else(|error| {
        tracing::warn!(
            code = UNREAD_HYDRATION_FAILED,
            room_id,
            error = ?error,
            "unread count unavailable; assuming zero"
        );
        0
    });
    tracker.observe_room(room_id, count);
    tracker.unread(room_id)
}

fn map_source_error(error: ReadTrackingSourceError) -> MarkReadError {
    match error {
        ReadTrackingSourceError::Unauthorized => MarkReadError::Unauthorized,
        ReadTrackingSourceError::Unavailable => MarkReadError::TemporarilyUnavailable,
        ReadTrackingSourceError::RoomNotFound => MarkReadError::RoomNotFound,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct StubSink {
        mark_result: Result<(), ReadTrackingSourceError>,
        count_result: Result<u32, ReadTrackingSourceError>,
        marked: RefCell<Vec<(i64, i64)>>,
        count_requests: RefCell<usize>,
    }

    impl StubSink {
        fn new(
            mark_result: Result<(), ReadTrackingSourceError>,
            count_result: Result<u32, ReadTrackingSourceError>,
        ) -> Self {
            Self {
                mark_result,
                count_result,
                marked: RefCell::new(Vec::new()),
                count_requests: RefCell::new(0),
            }
        }
    }

    impl ReadTrackingSink for StubSink {
        fn mark_read(
            &self,
            room_id: i64,
            last_read_message_id: i64,
        ) -> Result<(), ReadTrackingSourceError> {
            self.marked.borrow_mut().push((room_id, last_read_message_id));
            self.mark_result.clone()
        }

        fn unread_count(&self, _room_id: i64) -> Result<u32, ReadTrackingSourceError> {
            *self.count_requests.borrow_mut() += 1;
            self.count_result.clone()
        }
    }

    #[test]
    fn total_drops_after_marking_busiest_room_read() {
        let sink = StubSink::new(Ok(()), Ok(0));
        let mut tracker = UnreadTracker::new();
        tracker.observe_room(1, 0);
        tracker.observe_room(2, 2);
        tracker.observe_room(3, 5);
        assert_eq!(tracker.total(), 7);

        mark_read(&sink, &mut tracker, 3, 120, 1_000).expect("mark read should succeed");

        assert_eq!(tracker.total(), 2);
        assert_eq!(*sink.marked.borrow(), vec![(3, 120)]);
        assert_eq!(
            tracker.read_state(3).and_then(|state| state.last_read_message_id),
            Some(120)
        );
    }

    #[test]
    fn failure_keeps_optimistic_zero() {
        let sink = StubSink::new(Err(ReadTrackingSourceError::Unavailable), Ok(0));
        let mut tracker = UnreadTracker::new();
        tracker.observe_room(3, 5);

        let error = mark_read(&sink, &mut tracker, 3, 120, 1_000).expect_err("must fail");

        assert_eq!(error, MarkReadError::TemporarilyUnavailable);
        assert_eq!(tracker.unread(3), 0);
    }

    #[test]
    fn hydration_fetches_once_and_fails_soft() {
        let sink = StubSink::new(Ok(()), Ok(4));
        let mut tracker = UnreadTracker::new();

        assert_eq!(hydrate_unread(&sink, &mut tracker, 1), 4);
        assert_eq!(hydrate_unread(&sink, &mut tracker, 1), 4);
        assert_eq!(*sink.count_requests.borrow(), 1);

        let failing = StubSink::new(Ok(()), Err(ReadTrackingSourceError::Unavailable));
        assert_eq!(hydrate_unread(&failing, &mut tracker, 2), 0);
        assert!(tracker.is_observed(2));
    }
}
