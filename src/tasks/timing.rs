//! Completion watermark for bulk task tracking.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Earliest known start and end times of a set of tracked tasks.
///
/// The end time is the watermark from which completed tasks are queried. Learning of a task
/// that started earlier than anything seen so far discards the end watermark, since that task
/// may have completed before it.
#[derive(Debug, Default)]
pub(crate) struct TaskTimingInfo {
    times: Mutex<Times>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Times {
    earliest_start: Option<DateTime<Utc>>,
    earliest_end: Option<DateTime<Utc>>,
}

impl TaskTimingInfo {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_start(&self, start: Option<DateTime<Utc>>) {
        let Some(start) = start else {
            return;
        };
        let mut times = self.times.lock();
        let earliest = match times.earliest_start {
            Some(current) if current <= start => current,
            _ => start,
        };
        times.earliest_start = Some(earliest);
        if earliest == start {
            times.earliest_end = None;
        }
    }

    /// Moves the end watermark, unless it was discarded and not yet re-derived.
    pub(crate) fn update_end(&self, end: Option<DateTime<Utc>>) {
        let mut times = self.times.lock();
        if times.earliest_end.is_some() {
            times.earliest_end = end;
        }
    }

    /// The end watermark, re-derived from the earliest start when unset.
    pub(crate) fn end(&self) -> Option<DateTime<Utc>> {
        let mut times = self.times.lock();
        if times.earliest_end.is_none() {
            times.earliest_end = times.earliest_start;
        }
        times.earliest_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap())
    }

    #[test]
    fn test_end_defaults_to_earliest_start() {
        let timing = TaskTimingInfo::new();
        assert_eq!(timing.end(), None);
        timing.update_start(at(10));
        timing.update_start(at(5));
        timing.update_start(at(20));
        assert_eq!(timing.end(), at(5));
    }

    #[test]
    fn test_end_advances_once_derived() {
        let timing = TaskTimingInfo::new();
        timing.update_start(at(5));
        timing.update_end(at(30));
        assert_eq!(timing.end(), at(5));
        timing.update_end(at(30));
        assert_eq!(timing.end(), at(30));
    }

    #[test]
    fn test_earlier_start_resets_end() {
        let timing = TaskTimingInfo::new();
        timing.update_start(at(10));
        assert_eq!(timing.end(), at(10));
        timing.update_end(at(40));
        assert_eq!(timing.end(), at(40));

        timing.update_start(at(30));
        assert_eq!(timing.end(), at(40));

        timing.update_start(at(2));
        assert_eq!(timing.end(), at(2));
    }

    #[test]
    fn test_missing_start_is_ignored() {
        let timing = TaskTimingInfo::new();
        timing.update_start(at(10));
        timing.update_start(None);
        assert_eq!(timing.end(), at(10));
    }
}
