//! Member-side clock offset estimation against the group master.
//!
//! One request/response round: `rtt = now - request_ts`,
//! `candidate = master_ts + rtt / 2 - now`. The first sample is taken as-is; later samples are
//! folded in with a 3:1 moving average to damp wireless RTT jitter.

use crate::membership::GroupInfo;
use crate::protocol::Message;
use crate::timer::Interval;

/// Offset implied by a single response. Timestamps come off the wire, so the result is
/// clamped to the `i64` range instead of overflowing.
pub fn candidate_offset(request_timestamp: u64, master_timestamp: u64, now_ms: u64) -> i64 {
    let rtt = now_ms.saturating_sub(request_timestamp) as i128;
    clamp_i64(master_timestamp as i128 + rtt / 2 - now_ms as i128)
}

/// Exponential moving average weighting the prior estimate 3:1.
pub fn smooth(previous: i64, candidate: i64) -> i64 {
    clamp_i64((previous as i128 * 3 + candidate as i128) / 4)
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// First sample since joining; `time_synced` flipped to true.
    FirstSync(i64),
    Updated(i64),
}

/// Request schedule plus the sample-folding rule. Offset state lives in `GroupInfo`.
pub struct TimeSyncEstimator {
    interval: Interval,
}

impl TimeSyncEstimator {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Interval::new(interval_ms),
        }
    }

    /// Build a request stamped with `now_ms` and restart the interval.
    pub fn request(&mut self, now_ms: u64) -> Message {
        self.interval.mark(now_ms);
        Message::TimeRequest {
            request_timestamp: now_ms,
        }
    }

    /// Periodic request if the interval has elapsed.
    pub fn poll_request(&mut self, now_ms: u64) -> Option<Message> {
        if self.interval.poll(now_ms) {
            Some(Message::TimeRequest {
                request_timestamp: now_ms,
            })
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.interval.reset();
    }

    /// Fold one response into the group's offset.
    pub fn on_response(
        &self,
        info: &mut GroupInfo,
        request_timestamp: u64,
        master_timestamp: u64,
        now_ms: u64,
    ) -> SampleOutcome {
        let candidate = candidate_offset(request_timestamp, master_timestamp, now_ms);
        if info.time_synced {
            info.time_offset_ms = smooth(info.time_offset_ms, candidate);
            SampleOutcome::Updated(info.time_offset_ms)
        } else {
            info.time_offset_ms = candidate;
            info.time_synced = true;
            SampleOutcome::FirstSync(candidate)
        }
    }
}

/// Local time shifted by the estimated offset; plain local time until synced.
pub fn synced_time(info: &GroupInfo, now_ms: u64) -> u64 {
    if info.is_master || !info.time_synced {
        return now_ms;
    }
    (now_ms as i64).saturating_add(info.time_offset_ms).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DeviceId, PeerAddress};
    use crate::membership::GroupMember;

    fn joined() -> GroupInfo {
        let mut info = GroupInfo::solo();
        info.become_member(
            1,
            DeviceId(9),
            GroupMember {
                device_id: DeviceId(1),
                address: PeerAddress([0, 0, 0, 0, 0, 1]),
            },
        );
        info
    }

    #[test]
    fn candidate_compensates_half_rtt() {
        // rtt 40, master stamped 1050, seen at 1040
        assert_eq!(candidate_offset(1000, 1050, 1040), 30);
        assert_eq!(candidate_offset(1000, 900, 1100), -150);
    }

    #[test]
    fn first_sample_then_smoothed() {
        let est = TimeSyncEstimator::new(10_000);
        let mut info = joined();
        assert_eq!(
            est.on_response(&mut info, 1000, 1050, 1040),
            SampleOutcome::FirstSync(30)
        );
        assert!(info.time_synced);
        assert_eq!(info.time_offset_ms, 30);
        // second candidate: 11_090 + 20 - 11_040 = 70
        assert_eq!(
            est.on_response(&mut info, 11_000, 11_090, 11_040),
            SampleOutcome::Updated((30 * 3 + 70) / 4)
        );
        assert_eq!(info.time_offset_ms, 40);
    }

    #[test]
    fn extreme_timestamps_saturate() {
        assert_eq!(candidate_offset(1000, 1 << 63, 1040), i64::MAX - 1019);
        assert_eq!(candidate_offset(0, u64::MAX, 0), i64::MAX);
        assert_eq!(candidate_offset(u64::MAX, 0, u64::MAX), i64::MIN);
        assert_eq!(smooth(i64::MAX, i64::MAX), i64::MAX);
        assert_eq!(smooth(i64::MIN, i64::MIN), i64::MIN);

        let est = TimeSyncEstimator::new(10_000);
        let mut info = joined();
        est.on_response(&mut info, 1000, u64::MAX, 1040);
        assert_eq!(
            est.on_response(&mut info, 2000, u64::MAX, 2040),
            SampleOutcome::Updated(i64::MAX)
        );
        assert_eq!(synced_time(&info, 5000), i64::MAX as u64);
    }

    #[test]
    fn synced_time_falls_back_to_local() {
        let mut info = joined();
        assert_eq!(synced_time(&info, 5000), 5000);
        info.time_synced = true;
        info.time_offset_ms = -200;
        assert_eq!(synced_time(&info, 5000), 4800);
        info.time_offset_ms = 25;
        assert_eq!(synced_time(&info, 5000), 5025);
    }

    #[test]
    fn request_schedule() {
        let mut est = TimeSyncEstimator::new(10_000);
        assert_eq!(
            est.request(100),
            Message::TimeRequest {
                request_timestamp: 100
            }
        );
        assert!(est.poll_request(5000).is_none());
        assert_eq!(
            est.poll_request(10_100),
            Some(Message::TimeRequest {
                request_timestamp: 10_100
            })
        );
        est.reset();
        assert!(est.poll_request(10_101).is_some());
    }
}
