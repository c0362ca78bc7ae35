//! Request/response correlation for the ring protocol.
//!
//! Responses arrive as unordered notifications carrying only their opcode,
//! so the correlator is what ties a frame back to the logical request that
//! caused it. Two request classes exist (battery, steps) and at most one
//! request per class is outstanding at a time.
//!
//! Protocol limitation: an activity response does not echo the requested
//! day offset. Attribution is only correct because step requests are
//! strictly serialized; the next day's frame is handed out only after the
//! previous one resolved or its deadline elapsed. A dropped response
//! therefore costs its day a deadline instead of silently shifting data
//! onto the wrong day.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use colmi_types::ActivitySample;

use crate::frame::{CommandFrame, Response};
use crate::history::ActivityHistory;

/// Logical request class, used for correlation and timeout reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Battery level query (opcode 0x03).
    Battery,
    /// Step/activity query (opcode 0x43).
    Steps,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Battery => write!(f, "battery"),
            RequestKind::Steps => write!(f, "steps"),
        }
    }
}

/// A confirmed update produced by resolving a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A battery response matched the pending battery request.
    Battery {
        /// Reported percentage.
        percent: u8,
    },
    /// An activity response matched the pending step request.
    Day {
        /// The sample, attributed to the requested day offset.
        sample: ActivitySample,
    },
}

/// An expired pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// The request class that timed out.
    pub kind: RequestKind,
    /// The day offset, for step-class requests.
    pub day_offset: Option<u8>,
}

#[derive(Debug)]
struct Pending {
    day_offset: Option<u8>,
    deadline: Instant,
}

/// Issues commands and matches incoming responses to pending requests.
///
/// Owns the pending-request set and the rolling activity history; the
/// driver event loop is the only caller, so no internal locking is needed.
#[derive(Debug)]
pub struct Correlator {
    request_timeout: Duration,
    pending_battery: Option<Pending>,
    pending_step: Option<Pending>,
    step_queue: VecDeque<u8>,
    history: ActivityHistory,
}

impl Correlator {
    /// Create a correlator with the given per-request deadline.
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            pending_battery: None,
            pending_step: None,
            step_queue: VecDeque::new(),
            history: ActivityHistory::new(),
        }
    }

    /// Issue a battery query.
    ///
    /// A new battery request supersedes any outstanding one: the stale
    /// pending entry is re-armed, so whichever response arrives resolves
    /// the latest request.
    pub fn issue_battery(&mut self) -> CommandFrame {
        if self.pending_battery.is_some() {
            debug!("superseding outstanding battery request");
        }
        self.pending_battery = Some(Pending {
            day_offset: None,
            deadline: Instant::now() + self.request_timeout,
        });
        CommandFrame::battery_request()
    }

    /// Issue a step query for one day, or queue it behind the outstanding one.
    ///
    /// Returns the frame to write when the request goes on the wire
    /// immediately; `None` means it was queued and will be handed out by
    /// [`resolve`](Self::resolve) or [`expire`](Self::expire) once the
    /// line is free.
    pub fn issue_day(&mut self, day_offset: u8) -> Option<CommandFrame> {
        if self.pending_step.is_some() {
            debug!(day_offset, "step request queued behind outstanding one");
            self.step_queue.push_back(day_offset);
            return None;
        }
        Some(self.arm_step(day_offset))
    }

    /// Begin a 7-day fetch: clear the history and queue day offsets 0..=6.
    ///
    /// Returns the first frame to write, unless a step request is already
    /// outstanding (in which case the whole batch is queued behind it).
    pub fn begin_week(&mut self) -> Option<CommandFrame> {
        self.history.clear();
        self.step_queue.clear();
        let mut first = None;
        for day_offset in 0..=6 {
            match self.issue_day(day_offset) {
                Some(frame) if first.is_none() => first = Some(frame),
                _ => {}
            }
        }
        first
    }

    /// Match a decoded response to its pending request.
    ///
    /// Returns the confirmed resolution (if any request matched) and the
    /// next queued step frame to write (if the step line just freed up).
    /// Responses that match no pending request are dropped.
    pub fn resolve(&mut self, response: Response) -> (Option<Resolution>, Option<CommandFrame>) {
        match response {
            Response::Battery { percent } => match self.pending_battery.take() {
                Some(_) => (Some(Resolution::Battery { percent }), None),
                None => {
                    debug!(percent, "dropping battery response with no pending request");
                    (None, None)
                }
            },
            Response::Activity {
                calories,
                steps,
                distance_meters,
            } => match self.pending_step.take() {
                Some(pending) => {
                    // day_offset is always present on step-class requests
                    let day_offset = pending.day_offset.unwrap_or(0);
                    let sample = ActivitySample::new(day_offset, steps, calories, distance_meters);
                    self.history.push(sample);
                    let next = self.advance_step_queue();
                    (Some(Resolution::Day { sample }), next)
                }
                None => {
                    debug!(steps, "dropping activity response with no pending request");
                    (None, None)
                }
            },
        }
    }

    /// Expire pending requests whose deadline has passed.
    ///
    /// Returns the expired requests and the next queued step frame to
    /// write; an expired day is skipped rather than aborting the batch.
    pub fn expire(&mut self, now: Instant) -> (Vec<Expiry>, Option<CommandFrame>) {
        let mut expired = Vec::new();

        if self
            .pending_battery
            .as_ref()
            .is_some_and(|p| p.deadline <= now)
        {
            self.pending_battery = None;
            expired.push(Expiry {
                kind: RequestKind::Battery,
                day_offset: None,
            });
        }

        let mut next = None;
        if self
            .pending_step
            .as_ref()
            .is_some_and(|p| p.deadline <= now)
        {
            let pending = self.pending_step.take();
            expired.push(Expiry {
                kind: RequestKind::Steps,
                day_offset: pending.and_then(|p| p.day_offset),
            });
            next = self.advance_step_queue();
        }

        (expired, next)
    }

    /// The earliest pending deadline, for the event loop's timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let battery = self.pending_battery.as_ref().map(|p| p.deadline);
        let step = self.pending_step.as_ref().map(|p| p.deadline);
        match (battery, step) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drop all pending requests and queued work without touching history.
    ///
    /// Called on disconnect so no timer fires for a dead session.
    pub fn clear_pending(&mut self) {
        self.pending_battery = None;
        self.pending_step = None;
        self.step_queue.clear();
    }

    /// Number of step-class requests currently on the wire (0 or 1).
    #[must_use]
    pub fn outstanding_steps(&self) -> usize {
        usize::from(self.pending_step.is_some())
    }

    /// Number of step-class requests waiting behind the outstanding one.
    #[must_use]
    pub fn queued_steps(&self) -> usize {
        self.step_queue.len()
    }

    /// The rolling activity history.
    #[must_use]
    pub fn history(&self) -> &ActivityHistory {
        &self.history
    }

    fn advance_step_queue(&mut self) -> Option<CommandFrame> {
        self.step_queue.pop_front().map(|o| self.arm_step(o))
    }

    fn arm_step(&mut self, day_offset: u8) -> CommandFrame {
        self.pending_step = Some(Pending {
            day_offset: Some(day_offset),
            deadline: Instant::now() + self.request_timeout,
        });
        CommandFrame::activity_request(day_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_response(steps: u16) -> Response {
        Response::Activity {
            calories: 120,
            steps,
            distance_meters: 3200,
        }
    }

    #[test]
    fn test_battery_resolution() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let frame = correlator.issue_battery();
        assert_eq!(frame.opcode(), 0x03);

        let (resolution, next) = correlator.resolve(Response::Battery { percent: 72 });
        assert_eq!(resolution, Some(Resolution::Battery { percent: 72 }));
        assert!(next.is_none());
        assert!(correlator.next_deadline().is_none());
    }

    #[test]
    fn test_unmatched_responses_dropped() {
        let mut correlator = Correlator::new(Duration::from_secs(4));

        let (resolution, _) = correlator.resolve(Response::Battery { percent: 50 });
        assert!(resolution.is_none());

        let (resolution, _) = correlator.resolve(activity_response(100));
        assert!(resolution.is_none());
        assert!(correlator.history().is_empty());
    }

    #[test]
    fn test_step_requests_serialize_one_at_a_time() {
        let mut correlator = Correlator::new(Duration::from_secs(4));

        let first = correlator.issue_day(0);
        assert!(first.is_some());
        assert_eq!(correlator.outstanding_steps(), 1);

        // Second request queues instead of going on the wire.
        assert!(correlator.issue_day(1).is_none());
        assert_eq!(correlator.outstanding_steps(), 1);
        assert_eq!(correlator.queued_steps(), 1);

        // Resolving the first hands out the second.
        let (resolution, next) = correlator.resolve(activity_response(4500));
        assert!(matches!(
            resolution,
            Some(Resolution::Day { sample }) if sample.day_offset == 0 && sample.steps == 4500
        ));
        let next = next.expect("queued request should be handed out");
        assert_eq!(next.as_bytes()[1], 1);
        assert_eq!(correlator.outstanding_steps(), 1);
        assert_eq!(correlator.queued_steps(), 0);
    }

    #[test]
    fn test_week_fetch_order_and_count() {
        let mut correlator = Correlator::new(Duration::from_secs(4));

        let mut frame = correlator.begin_week();
        let mut day = 0u16;
        while let Some(f) = frame {
            assert_eq!(f.as_bytes()[1], day as u8);
            assert_eq!(correlator.outstanding_steps(), 1);
            let (_, next) = correlator.resolve(activity_response(1000 + day));
            frame = next;
            day += 1;
        }

        assert_eq!(day, 7);
        let history = correlator.history().to_vec();
        assert_eq!(history.len(), 7);
        for (i, sample) in history.iter().enumerate() {
            assert_eq!(sample.day_offset as usize, i);
            assert_eq!(sample.steps as usize, 1000 + i);
        }
    }

    #[test]
    fn test_begin_week_clears_history() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let _ = correlator.issue_day(0);
        let _ = correlator.resolve(activity_response(1));
        assert_eq!(correlator.history().len(), 1);

        let _ = correlator.begin_week();
        assert!(correlator.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_skips_day_and_continues_batch() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let first = correlator.begin_week();
        assert_eq!(first.unwrap().as_bytes()[1], 0);

        // Let day 0's deadline elapse without a response.
        tokio::time::advance(Duration::from_secs(5)).await;
        let (expired, next) = correlator.expire(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, RequestKind::Steps);
        assert_eq!(expired[0].day_offset, Some(0));

        // The batch proceeds with day 1.
        let next = next.expect("batch should continue after a timeout");
        assert_eq!(next.as_bytes()[1], 1);
        assert!(correlator.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_before_deadline_is_noop() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let _ = correlator.issue_battery();

        tokio::time::advance(Duration::from_secs(1)).await;
        let (expired, next) = correlator.expire(Instant::now());
        assert!(expired.is_empty());
        assert!(next.is_none());
        assert!(correlator.next_deadline().is_some());
    }

    #[test]
    fn test_clear_pending_keeps_history() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let _ = correlator.issue_day(2);
        let _ = correlator.resolve(activity_response(2000));
        let _ = correlator.issue_day(3);
        let _ = correlator.issue_day(4);

        correlator.clear_pending();
        assert_eq!(correlator.outstanding_steps(), 0);
        assert_eq!(correlator.queued_steps(), 0);
        assert!(correlator.next_deadline().is_none());
        assert_eq!(correlator.history().len(), 1);
    }

    #[test]
    fn test_battery_supersede_rearms() {
        let mut correlator = Correlator::new(Duration::from_secs(4));
        let _ = correlator.issue_battery();
        let first_deadline = correlator.next_deadline().unwrap();
        let _ = correlator.issue_battery();
        assert!(correlator.next_deadline().unwrap() >= first_deadline);

        // Only one resolution comes out of the superseded pair.
        let (resolution, _) = correlator.resolve(Response::Battery { percent: 90 });
        assert!(resolution.is_some());
        let (resolution, _) = correlator.resolve(Response::Battery { percent: 91 });
        assert!(resolution.is_none());
    }
}
