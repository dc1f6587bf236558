//! One client's tracking session: every piece of per-frame state, run in frame order.

use image::{Rgb, RgbImage, imageops};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collision::{TapDetector, check_collision};
use crate::compositor;
use crate::config::SessionSettings;
use crate::drag::{DragController, DragState};
use crate::error::TrackResult;
use crate::geometry::{Point2, Quad};
use crate::gestures::{GestureClassifier, GestureRecord};
use crate::lock::{LockState, LockStateMachine, Transition};
use crate::matcher::ShapeMatcher;
use crate::overlay::OverlaySource;
use crate::pose::{PoseSmoother, RawPose};
use crate::reference::ReferenceShape;
use crate::tracker::{HandFrame, HandLandmarks, HandTracker};

/// Silhouette-side output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub found: bool,
    pub lock_state: LockState,
    pub score: Option<f64>,
    pub center: Option<(f64, f64)>,
    pub angle: Option<f64>,
    pub scale: Option<f64>,
    pub frame_corners: Option<Quad>,
    pub drag_offset: (f32, f32),
    pub grabbed: bool,
    pub pushed_off_screen: bool,
}

#[derive(Debug, Clone)]
pub struct FrameResult {
    pub detection: DetectionRecord,
    pub hands: GestureRecord,
    /// Hand geometry in output pixels, for drawing.
    pub hand_frame: HandFrame,
    /// The analysed frame (already mirrored when mirror mode is on).
    pub frame: RgbImage,
}

/// Partial update of the session's display toggles.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DisplayUpdate {
    pub mirror: Option<bool>,
    pub white_background: Option<bool>,
    pub flip_overlay: Option<bool>,
    pub overlay_enabled: Option<bool>,
}

pub struct Session {
    reference: Arc<ReferenceShape>,
    settings: SessionSettings,
    matcher: ShapeMatcher,
    lock: LockStateMachine,
    pose: PoseSmoother,
    drag: DragController,
    hands: HandTracker,
    gestures: GestureClassifier,
    taps: TapDetector,
    last_valid: Option<DetectionRecord>,
    overlay: Option<OverlaySource>,
    frames: u64,
}

impl Session {
    pub fn new(reference: Arc<ReferenceShape>, settings: SessionSettings) -> TrackResult<Self> {
        settings.validate()?;
        Ok(Self {
            matcher: ShapeMatcher::new(reference.clone()),
            lock: LockStateMachine::new(settings.tracking)?,
            pose: PoseSmoother::new(&reference, settings.frame_margins, settings.smoothing),
            drag: DragController::new(settings.drag.smoothing),
            hands: HandTracker::new(settings.gestures),
            gestures: GestureClassifier::new(settings.gestures),
            taps: TapDetector::new(settings.gestures.tap_cooldown_frames),
            last_valid: None,
            overlay: None,
            frames: 0,
            reference,
            settings,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn set_overlay(&mut self, overlay: Option<OverlaySource>) {
        self.overlay = overlay;
    }

    pub fn lock(&self) -> &LockStateMachine {
        &self.lock
    }

    pub fn drag(&self) -> &DragState {
        self.drag.state()
    }

    /// Back to a brand-new session; settings and the overlay source are kept,
    /// the overlay is rewound.
    pub fn reset(&mut self) {
        self.lock.reset();
        self.pose.reset();
        self.drag.reset();
        self.gestures.reset();
        self.taps.reset();
        self.last_valid = None;
        if let Some(o) = self.overlay.as_mut() {
            o.rewind();
        }
        info!("session: reset after {} frames", self.frames);
        self.frames = 0;
    }

    pub fn set_adjustment(&mut self, brightness: Option<i64>, saturation: Option<i64>) {
        self.settings.display.set_adjustment(brightness, saturation);
    }

    pub fn set_thresholds(&mut self, enter: Option<f64>, exit: Option<f64>) -> TrackResult<()> {
        self.lock.set_thresholds(enter, exit)?;
        self.settings.tracking = *self.lock.thresholds();
        info!(
            "session: thresholds enter={} exit={}",
            self.settings.tracking.threshold_enter, self.settings.tracking.threshold_exit
        );
        Ok(())
    }

    pub fn set_display(&mut self, update: DisplayUpdate) {
        let d = &mut self.settings.display;
        if let Some(v) = update.mirror {
            d.mirror = v;
        }
        if let Some(v) = update.white_background {
            d.white_background = v;
        }
        if let Some(v) = update.flip_overlay {
            d.flip_overlay = v;
        }
        if let Some(v) = update.overlay_enabled {
            d.overlay_enabled = v;
        }
    }

    /// Runs one frame through matching, locking, smoothing, hand interaction and drag.
    ///
    /// `hands` are in the camera's own orientation; mirror mode flips both the
    /// frame and the landmarks. `now_ms` only drives the dwell-based permanent lock.
    pub fn process(&mut self, mut frame: RgbImage, hands: &[HandLandmarks], now_ms: u64) -> FrameResult {
        self.frames += 1;
        let mirror = self.settings.display.mirror;
        if mirror {
            imageops::flip_horizontal_in_place(&mut frame);
        }
        let screen = frame.dimensions();
        self.hands.set_frame_size(screen.0, screen.1);
        self.hands.set_mirror(mirror);
        let hand_frame = self.hands.observe(hands);

        let candidate = self.matcher.best_match(&frame, &self.settings.tracking);
        let score = candidate.as_ref().map(|c| c.score);
        if self.lock.update(score, now_ms) == Some(Transition::Unlocked) {
            self.last_valid = None;
        }
        let state = self.lock.state();

        let raw = candidate
            .as_ref()
            .filter(|_| state.is_locked())
            .and_then(|c| RawPose::from_moments(&c.moments, self.reference.area()));
        let fresh = raw.map(|r| self.pose.update(r));

        // hands interact with where the frame was before this frame's drag
        let (quad, object_center) = match (&fresh, &self.last_valid) {
            (Some(p), _) => (
                self.pose.corners(self.drag.offset()),
                Some(Point2::new(p.center.0 as f32, p.center.1 as f32)),
            ),
            (None, Some(cached)) if state == LockState::PermanentlyActive => (
                cached.frame_corners,
                cached.center.map(|(x, y)| Point2::new(x as f32, y as f32)),
            ),
            _ => (None, None),
        };

        let contact = check_collision(&hand_frame.palm_centers(), quad.as_ref(), object_center);
        let tap = self.taps.update(&hand_frame.index_tips(), quad.as_ref());
        let classification = self.gestures.classify(&hand_frame);
        let drag = *self.drag.update(&contact, screen);

        let detection = match fresh {
            Some(p) => {
                let record = DetectionRecord {
                    found: true,
                    lock_state: state,
                    score,
                    center: Some(p.center),
                    angle: Some(p.angle),
                    scale: Some(p.scale),
                    frame_corners: self.pose.corners(drag.offset),
                    drag_offset: drag.offset,
                    grabbed: drag.grabbed,
                    pushed_off_screen: drag.pushed_off_screen,
                };
                if state == LockState::PermanentlyActive {
                    self.last_valid = Some(record.clone());
                }
                record
            }
            None => match &self.last_valid {
                Some(cached) if state == LockState::PermanentlyActive => cached.clone(),
                _ => DetectionRecord {
                    found: false,
                    lock_state: state,
                    score,
                    center: None,
                    angle: None,
                    scale: None,
                    frame_corners: None,
                    drag_offset: drag.offset,
                    grabbed: drag.grabbed,
                    pushed_off_screen: drag.pushed_off_screen,
                },
            },
        };
        debug!(
            "session: frame {} {:?} found={} score={:?} hands={}",
            self.frames,
            state,
            detection.found,
            score,
            hand_frame.hands.len()
        );

        FrameResult {
            detection,
            hands: GestureRecord::new(&hand_frame, &classification, tap),
            hand_frame,
            frame,
        }
    }

    /// Output image for a processed frame: background, display adjustment,
    /// hand skeletons, then the overlay when the object is in view.
    pub fn render(&mut self, result: &FrameResult) -> TrackResult<RgbImage> {
        let display = self.settings.display;
        let mut out = if display.white_background {
            let (w, h) = result.frame.dimensions();
            RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
        } else {
            let mut img = result.frame.clone();
            compositor::adjust_display(&mut img, display.brightness, display.saturation);
            img
        };
        compositor::draw_hand_skeleton(&mut out, &result.hand_frame);

        let det = &result.detection;
        let corners = det
            .frame_corners
            .filter(|_| det.found && !det.pushed_off_screen && display.overlay_enabled);
        if let (Some(quad), Some(source)) = (corners, self.overlay.as_mut()) {
            source.set_flip(display.flip_overlay);
            if let Some(video) = source.next_frame()? {
                compositor::composite(&mut out, &video, &quad);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{draw_dark_rect, hand, reference_rect, white_frame};

    fn settings() -> SessionSettings {
        let mut s = SessionSettings::default();
        s.display.mirror = false;
        s
    }

    fn session() -> Session {
        Session::new(reference_rect(), settings()).unwrap()
    }

    fn object_frame(x: i32) -> RgbImage {
        let mut f = white_frame(640, 480);
        draw_dark_rect(&mut f, x, 200, 135, 75);
        f
    }

    /// Feeds `n` frames 33 ms apart starting at `*t`.
    fn run(s: &mut Session, frame: &RgbImage, hands: &[HandLandmarks], n: u32, t: &mut u64) -> FrameResult {
        let mut last = None;
        for _ in 0..n {
            last = Some(s.process(frame.clone(), hands, *t));
            *t += 33;
        }
        last.unwrap()
    }

    #[test]
    fn misordered_thresholds_reject_the_session() {
        let mut bad = settings();
        bad.tracking.threshold_enter = 0.6;
        assert!(Session::new(reference_rect(), bad).is_err());
    }

    #[test]
    fn detection_appears_once_the_lock_is_acquired() {
        let mut s = session();
        let mut t = 0;
        let frame = object_frame(250);
        let r = run(&mut s, &frame, &[], 11, &mut t);
        assert!(!r.detection.found);
        assert_eq!(r.detection.lock_state, LockState::Unlocked);
        assert!(r.detection.score.is_some());
        assert!(r.detection.frame_corners.is_none());

        let r = run(&mut s, &frame, &[], 1, &mut t);
        assert!(r.detection.found);
        assert_eq!(r.detection.lock_state, LockState::Locked);
        let (cx, cy) = r.detection.center.unwrap();
        assert!((cx - 317.0).abs() < 3.0 && (cy - 237.0).abs() < 3.0, "{cx},{cy}");
        assert!((r.detection.scale.unwrap() - 1.5).abs() < 0.1);
        assert!(r.detection.frame_corners.is_some());
    }

    #[test]
    fn lost_object_unlocks_before_permanence() {
        let mut s = session();
        let mut t = 0;
        run(&mut s, &object_frame(250), &[], 12, &mut t);
        let blank = white_frame(640, 480);
        let r = run(&mut s, &blank, &[], 7, &mut t);
        assert_eq!(r.detection.lock_state, LockState::Locked);
        assert!(!r.detection.found);
        let r = run(&mut s, &blank, &[], 1, &mut t);
        assert_eq!(r.detection.lock_state, LockState::Unlocked);
    }

    #[test]
    fn permanent_lock_replays_the_last_detection() {
        let mut s = session();
        let mut t = 0;
        let frame = object_frame(250);
        run(&mut s, &frame, &[], 12, &mut t);
        t += 3_000;
        let kept = run(&mut s, &frame, &[], 1, &mut t);
        assert_eq!(kept.detection.lock_state, LockState::PermanentlyActive);
        assert!(kept.detection.found);

        let blank = white_frame(640, 480);
        let r = run(&mut s, &blank, &[], 20, &mut t);
        assert_eq!(r.detection, kept.detection);

        s.reset();
        assert_eq!(s.lock_state(), LockState::Unlocked);
        let r = run(&mut s, &blank, &[], 1, &mut t);
        assert!(!r.detection.found);
    }

    #[test]
    fn palm_inside_the_frame_drags_it() {
        let mut s = session();
        let mut t = 0;
        let frame = object_frame(250);
        let before = run(&mut s, &frame, &[], 12, &mut t);
        let corners = before.detection.frame_corners.unwrap();

        let grab = run(&mut s, &frame, &[hand(0.5, 0.5, [true; 4], true)], 1, &mut t);
        assert!(grab.detection.grabbed);
        assert_eq!(grab.detection.drag_offset, (0.0, 0.0));
        assert!(grab.hands.palm_detected);

        // 0.05 of 640 px to the right, damped by the drag smoothing
        let moved = run(&mut s, &frame, &[hand(0.55, 0.5, [true; 4], true)], 1, &mut t);
        assert!((moved.detection.drag_offset.0 - 32.0 * 0.3).abs() < 1e-3);

        let released = run(&mut s, &frame, &[], 1, &mut t);
        assert!(!released.detection.grabbed);
        let after = released.detection.frame_corners.unwrap();
        assert!(after[0].x > corners[0].x + 5.0);
    }

    #[test]
    fn fingertip_entering_the_frame_taps_once() {
        let mut s = session();
        let mut t = 0;
        let frame = object_frame(250);
        run(&mut s, &frame, &[], 12, &mut t);

        let outside = hand(0.95, 0.9, [true, false, false, false], false);
        let inside = hand(0.45, 0.3, [true, false, false, false], false);
        let r = run(&mut s, &frame, &[outside], 1, &mut t);
        assert!(!r.hands.tap_detected);
        let r = run(&mut s, &frame, &[inside], 1, &mut t);
        assert!(r.hands.tap_detected);
        assert_eq!(r.hands.tap_position, Some(r.hands.index_tips[0]));
        let r = run(&mut s, &frame, &[inside], 5, &mut t);
        assert!(!r.hands.tap_detected);
    }

    #[test]
    fn mirror_mode_flips_frame_and_hands() {
        let mut mirrored = settings();
        mirrored.display.mirror = true;
        let mut s = Session::new(reference_rect(), mirrored).unwrap();
        let mut t = 0;
        let r = run(&mut s, &object_frame(100), &[hand(0.25, 0.5, [true; 4], true)], 12, &mut t);
        let (cx, _) = r.detection.center.unwrap();
        assert!((cx - (640.0 - 167.0)).abs() < 3.0, "{cx}");
        assert!(r.hands.hand_centers[0].x > 320.0);
    }

    #[test]
    fn thresholds_and_display_updates() {
        let mut s = session();
        assert!(s.set_thresholds(Some(0.7), None).is_err());
        s.set_thresholds(Some(0.1), Some(0.3)).unwrap();
        assert_eq!(s.settings().tracking.threshold_enter, 0.1);

        s.set_adjustment(Some(500), None);
        assert_eq!(s.settings().display.brightness, 100);

        s.set_display(DisplayUpdate {
            white_background: Some(true),
            ..DisplayUpdate::default()
        });
        assert!(s.settings().display.white_background);
        assert!(!s.settings().display.mirror);
    }

    #[test]
    fn render_composites_only_when_found() {
        let mut s = session();
        let gray = RgbImage::from_pixel(8, 8, Rgb([128, 128, 128]));
        s.set_overlay(Some(OverlaySource::from_frames(vec![gray])));
        let mut t = 0;
        let frame = object_frame(250);

        let r = run(&mut s, &frame, &[], 1, &mut t);
        let out = s.render(&r).unwrap();
        assert_eq!(out, frame);

        let r = run(&mut s, &frame, &[], 11, &mut t);
        let out = s.render(&r).unwrap();
        let quad = r.detection.frame_corners.unwrap();
        let c = crate::geometry::quad_center(&quad);
        // white base times mid-gray overlay
        let px = out.get_pixel(c.x as u32, c.y as u32);
        assert!(px.0.iter().all(|&v| (127..=129).contains(&v)), "{px:?}");

        s.set_display(DisplayUpdate {
            white_background: Some(true),
            overlay_enabled: Some(false),
            ..DisplayUpdate::default()
        });
        let out = s.render(&r).unwrap();
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255]));
    }
}
