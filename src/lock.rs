//! Hysteresis + dwell-time lock over noisy per-frame match scores.

use log::info;
use serde::Serialize;

use crate::config::TrackingThresholds;
use crate::error::TrackResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
    /// Latched after a long enough continuous lock; score decay no longer unlocks.
    PermanentlyActive,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        !matches!(self, LockState::Unlocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Locked,
    Unlocked,
    PermanentlyActivated,
}

#[derive(Debug, Clone)]
pub struct LockStateMachine {
    th: TrackingThresholds,
    state: LockState,
    good_frames: u32,
    bad_frames: u32,
    locked_since_ms: Option<u64>,
}

impl LockStateMachine {
    pub fn new(th: TrackingThresholds) -> TrackResult<Self> {
        th.validate()?;
        Ok(Self {
            th,
            state: LockState::Unlocked,
            good_frames: 0,
            bad_frames: 0,
            locked_since_ms: None,
        })
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn good_frames(&self) -> u32 {
        self.good_frames
    }

    pub fn bad_frames(&self) -> u32 {
        self.bad_frames
    }

    pub fn thresholds(&self) -> &TrackingThresholds {
        &self.th
    }

    /// Rejects (and keeps the old values) unless `enter < exit` still holds.
    pub fn set_thresholds(&mut self, enter: Option<f64>, exit: Option<f64>) -> TrackResult<()> {
        let mut next = self.th;
        if let Some(e) = enter {
            next.threshold_enter = e;
        }
        if let Some(x) = exit {
            next.threshold_exit = x;
        }
        next.validate()?;
        self.th = next;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = LockState::Unlocked;
        self.good_frames = 0;
        self.bad_frames = 0;
        self.locked_since_ms = None;
    }

    /// Feed one frame's best score (`None` when no contour survived the filters).
    pub fn update(&mut self, score: Option<f64>, now_ms: u64) -> Option<Transition> {
        match self.state {
            LockState::Unlocked => {
                if score.is_some_and(|s| s < self.th.threshold_enter) {
                    self.good_frames += 1;
                    if self.good_frames >= self.th.enter_run_length {
                        self.state = LockState::Locked;
                        self.bad_frames = 0;
                        self.locked_since_ms = Some(now_ms);
                        info!("lock: acquired after {} good frames", self.good_frames);
                        return Some(Transition::Locked);
                    }
                } else {
                    self.good_frames = 0;
                }
                None
            }
            LockState::Locked => {
                if self.is_bad(score) {
                    self.bad_frames += 1;
                    if self.bad_frames >= self.th.exit_run_length {
                        self.state = LockState::Unlocked;
                        self.good_frames = 0;
                        self.bad_frames = 0;
                        self.locked_since_ms = None;
                        info!("lock: released after {} bad frames", self.th.exit_run_length);
                        return Some(Transition::Unlocked);
                    }
                } else {
                    self.bad_frames = 0;
                }

                let held_ms = self
                    .locked_since_ms
                    .map_or(0, |t0| now_ms.saturating_sub(t0));
                if held_ms as f64 >= self.th.permanent_activation_secs * 1000.0 {
                    self.state = LockState::PermanentlyActive;
                    info!("lock: permanently active after {held_ms} ms");
                    return Some(Transition::PermanentlyActivated);
                }
                None
            }
            LockState::PermanentlyActive => {
                if self.is_bad(score) {
                    self.bad_frames = self.bad_frames.saturating_add(1);
                } else {
                    self.bad_frames = 0;
                }
                None
            }
        }
    }

    fn is_bad(&self, score: Option<f64>) -> bool {
        score.is_none_or(|s| s > self.th.threshold_exit)
    }
}
