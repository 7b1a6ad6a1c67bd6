//! Virtual time: live tailing, scrubbing and timed replay

use super::Speed;
use serde::Serialize;
use shared::Timestamp;
use std::time::Instant;

/// Earliest and latest timestamp of the trace, as known when a call is made.
pub type TimeSpan = (Timestamp, Timestamp);

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Virtual time follows the latest timestamp.
    Live,
    Paused,
    /// Paused because a replay reached the last timestamp. Play restarts from
    /// the first one.
    Finished,
    /// The position control is held.
    Scrubbing,
    Replaying,
}

impl PlaybackState {
    pub fn is_paused(self) -> bool {
        matches!(self, PlaybackState::Paused | PlaybackState::Finished)
    }
}

/// Identity of one replay run. Ticks carrying an older token are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplayToken(u64);

#[derive(Debug, Clone, Copy)]
struct ReplayRun {
    token: ReplayToken,
    started_at: Instant,
    started_from: f64,
}

impl ReplayRun {
    fn position(&self, now: Instant, speed: Speed) -> f64 {
        let elapsed_ms = now.saturating_duration_since(self.started_at).as_secs_f64() * 1000.0;
        self.started_from + elapsed_ms * speed.factor()
    }
}

/// Owns the virtual time and the (single) replay timer identity.
///
/// The controller never sleeps. Callers drive replay by calling [`tick`]
/// with the token returned from [`play`] and the current instant.
///
/// [`tick`]: PlaybackController::tick
/// [`play`]: PlaybackController::play
#[derive(Debug, Clone)]
pub struct PlaybackController {
    state: PlaybackState,
    virtual_time: f64,
    speed: Speed,
    live_enabled: bool,
    next_token: u64,
    replay: Option<ReplayRun>,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new(Speed::default())
    }
}

impl PlaybackController {
    pub fn new(speed: Speed) -> Self {
        PlaybackController {
            state: PlaybackState::Live,
            virtual_time: 0.0,
            speed,
            live_enabled: true,
            next_token: 0,
            replay: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Virtual time in milliseconds.
    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn is_live_enabled(&self) -> bool {
        self.live_enabled
    }

    pub fn replay_token(&self) -> Option<ReplayToken> {
        self.replay.map(|run| run.token)
    }

    /// Position of the virtual time within `span`, in `[0, 1]`.
    pub fn position_fraction(&self, span: Option<TimeSpan>) -> f64 {
        let Some((first, last)) = span else {
            return 0.0;
        };
        let width = last.as_f64() - first.as_f64();
        if width <= 0.0 {
            return 1.0;
        }
        ((self.virtual_time - first.as_f64()) / width).clamp(0.0, 1.0)
    }

    /// Freezes virtual time where it is. Returns whether the state changed.
    pub fn pause(&mut self, now: Instant) -> bool {
        match self.state {
            PlaybackState::Live => {
                self.state = PlaybackState::Paused;
                true
            }
            PlaybackState::Replaying => {
                if let Some(run) = self.replay {
                    self.virtual_time = run.position(now, self.speed);
                }
                self.cancel_replay();
                self.state = PlaybackState::Paused;
                true
            }
            PlaybackState::Paused | PlaybackState::Finished | PlaybackState::Scrubbing => false,
        }
    }

    /// Pauses at a message selected for detail.
    pub fn focus(&mut self, time: Timestamp) {
        self.cancel_replay();
        self.state = PlaybackState::Paused;
        self.virtual_time = time.as_f64();
    }

    /// Starts a replay toward the last timestamp. Returns the token the timer
    /// must present on every tick, or `None` when there is nothing to replay.
    pub fn play(&mut self, now: Instant, span: Option<TimeSpan>) -> Option<ReplayToken> {
        let (first, last) = span?;
        let started_from = match self.state {
            PlaybackState::Finished => first.as_f64(),
            PlaybackState::Paused if self.virtual_time >= last.as_f64() => first.as_f64(),
            PlaybackState::Paused => self.virtual_time.max(first.as_f64()),
            PlaybackState::Live | PlaybackState::Scrubbing | PlaybackState::Replaying => {
                return None;
            }
        };

        self.cancel_replay();
        let token = ReplayToken(self.next_token);
        self.next_token += 1;
        self.replay = Some(ReplayRun {
            token,
            started_at: now,
            started_from,
        });
        self.state = PlaybackState::Replaying;
        self.virtual_time = started_from;
        Some(token)
    }

    /// Advances a running replay. Stale tokens never move virtual time.
    pub fn tick(&mut self, token: ReplayToken, now: Instant, span: Option<TimeSpan>) -> Option<f64> {
        let run = self.replay.filter(|run| run.token == token)?;
        let position = run.position(now, self.speed);
        match span {
            Some((_, last)) if position < last.as_f64() => {
                self.virtual_time = position;
            }
            Some((_, last)) => {
                self.virtual_time = last.as_f64();
                self.cancel_replay();
                self.state = PlaybackState::Finished;
            }
            None => {
                self.cancel_replay();
                self.state = PlaybackState::Finished;
            }
        }
        Some(self.virtual_time)
    }

    /// Takes hold of the position control: `t0 + fraction * (tN - t0)`.
    pub fn grab(&mut self, fraction: f64, span: Option<TimeSpan>) {
        self.cancel_replay();
        self.state = PlaybackState::Scrubbing;
        self.scrub_to(fraction, span);
    }

    pub fn drag(&mut self, fraction: f64, span: Option<TimeSpan>) -> bool {
        if self.state != PlaybackState::Scrubbing {
            return false;
        }
        self.scrub_to(fraction, span);
        true
    }

    pub fn release(&mut self) -> bool {
        if self.state != PlaybackState::Scrubbing {
            return false;
        }
        self.state = PlaybackState::Paused;
        true
    }

    /// Snaps to the latest timestamp and tails new arrivals. Refused while
    /// live mode is disabled.
    pub fn go_live(&mut self, span: Option<TimeSpan>) -> bool {
        if !self.live_enabled {
            return false;
        }
        self.cancel_replay();
        self.state = PlaybackState::Live;
        if let Some((_, last)) = span {
            self.virtual_time = last.as_f64();
        }
        true
    }

    /// Called after the trace gained a timestamp. In live mode the virtual time
    /// follows the latest one; returns the new virtual time when it moved.
    pub fn on_time_observed(&mut self, span: Option<TimeSpan>) -> Option<f64> {
        if self.state != PlaybackState::Live {
            return None;
        }
        let (_, last) = span?;
        if last.as_f64() == self.virtual_time {
            return None;
        }
        self.virtual_time = last.as_f64();
        Some(self.virtual_time)
    }

    /// Changes speed; a running replay continues from where it is now.
    pub fn set_speed(&mut self, speed: Speed, now: Instant) {
        if let Some(run) = self.replay.as_mut() {
            run.started_from = run.position(now, self.speed);
            run.started_at = now;
        }
        self.speed = speed;
    }

    /// Cancels replay and leaves live mode until [`enable_live`] is called.
    ///
    /// [`enable_live`]: PlaybackController::enable_live
    pub fn disable_live(&mut self) {
        self.cancel_replay();
        self.live_enabled = false;
        if matches!(self.state, PlaybackState::Live | PlaybackState::Replaying) {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn enable_live(&mut self) {
        self.live_enabled = true;
    }

    /// Back to an empty timeline, live if allowed.
    pub fn reset(&mut self) {
        self.cancel_replay();
        self.virtual_time = 0.0;
        self.state = if self.live_enabled {
            PlaybackState::Live
        } else {
            PlaybackState::Paused
        };
    }

    fn scrub_to(&mut self, fraction: f64, span: Option<TimeSpan>) {
        let Some((first, last)) = span else {
            return;
        };
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        self.virtual_time = first.as_f64() + fraction * (last.as_f64() - first.as_f64());
    }

    fn cancel_replay(&mut self) {
        if let Some(run) = self.replay.take() {
            log::debug!("Replay {:?} cancelled", run.token);
        }
    }
}
