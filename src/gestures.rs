use log::{debug, info};
use serde::Serialize;

use crate::config::GestureThresholds;
use crate::geometry::Point2;
use crate::tracker::HandFrame;

/// At most one of these per frame, in priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    None,
    Pinch { scale: f32, distance: f32 },
    PalmOpen { center: Point2 },
    IndexOnly { tip: Point2 },
}

impl Gesture {
    pub fn label(&self) -> &'static str {
        match self {
            Gesture::None => "none",
            Gesture::Pinch { .. } => "pinch",
            Gesture::PalmOpen { .. } => "palm",
            Gesture::IndexOnly { .. } => "index",
        }
    }
}

/// Linear map from thumb-index distance to a zoom factor.
pub fn pinch_scale(distance: f32, threshold: f32) -> f32 {
    (1.0 + (distance - threshold) / 100.0).clamp(0.3, 5.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub gesture: Gesture,
    /// Reported even on the frame a pinch ends; neutral otherwise.
    pub pinch_scale: f32,
    pub pinch_distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct PinchState {
    active: bool,
    start_distance: f32,
    scale: f32,
}

impl Default for PinchState {
    fn default() -> Self {
        Self {
            active: false,
            start_distance: 0.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct GestureClassifier {
    th: GestureThresholds,
    pinch: PinchState,
}

impl GestureClassifier {
    pub fn new(th: GestureThresholds) -> Self {
        Self {
            th,
            pinch: PinchState::default(),
        }
    }

    pub fn pinch_active(&self) -> bool {
        self.pinch.active
    }

    pub fn reset(&mut self) {
        self.pinch = PinchState::default();
    }

    pub fn classify(&mut self, frame: &HandFrame) -> Classification {
        let (pinch_scale, pinch_distance) = self.update_pinch(frame);
        if self.pinch.active {
            return Classification {
                gesture: Gesture::Pinch {
                    scale: pinch_scale,
                    distance: pinch_distance,
                },
                pinch_scale,
                pinch_distance,
            };
        }

        let gesture = if let Some(h) = frame.hands.iter().find(|h| h.fingers.extended_count() >= 4) {
            Gesture::PalmOpen {
                center: h.knuckle_center(),
            }
        } else if let Some(h) = frame.hands.iter().find(|h| {
            let f = &h.fingers;
            f.index && f.folded_aux() == 3 && f.thumb_folded
        }) {
            Gesture::IndexOnly { tip: h.index_tip }
        } else {
            Gesture::None
        };
        Classification {
            gesture,
            pinch_scale,
            pinch_distance,
        }
    }

    /// Pinch uses the first hand only. Returns (scale to report, distance).
    fn update_pinch(&mut self, frame: &HandFrame) -> (f32, f32) {
        let Some(hand) = frame.hands.first() else {
            return (self.end_pinch("no hands"), 0.0);
        };
        let distance = hand.pinch_distance();
        let folded = hand.fingers.folded_aux();

        if !self.pinch.active {
            if distance < self.th.pinch_threshold && folded >= 2 {
                self.pinch = PinchState {
                    active: true,
                    start_distance: distance,
                    scale: 1.0,
                };
                info!("pinch: start at {distance:.1}px, {folded} fingers folded");
            }
            return (1.0, distance);
        }

        self.pinch.scale = pinch_scale(distance, self.th.pinch_threshold);
        debug!(
            "pinch: {distance:.1}px (started {:.1}px) -> {:.2}x",
            self.pinch.start_distance, self.pinch.scale
        );
        if distance > self.th.pinch_release_distance {
            return (self.end_pinch("released"), distance);
        }
        if folded == 0 {
            return (self.end_pinch("hand opened"), distance);
        }
        (self.pinch.scale, distance)
    }

    fn end_pinch(&mut self, why: &str) -> f32 {
        if !self.pinch.active {
            return 1.0;
        }
        let last = self.pinch.scale;
        info!("pinch: end ({why}), final scale {last:.2}");
        self.pinch = PinchState::default();
        last
    }
}

/// Hand-side output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureRecord {
    pub hands_found: bool,
    pub hand_centers: Vec<Point2>,
    pub index_tips: Vec<Point2>,
    pub tap_detected: bool,
    pub tap_position: Option<Point2>,
    pub palm_detected: bool,
    pub palm_center: Option<Point2>,
    pub pinch_active: bool,
    pub pinch_scale: f32,
    pub pinch_distance: f32,
    pub index_only: bool,
    pub index_only_tip: Option<Point2>,
    pub gesture: &'static str,
}

impl GestureRecord {
    pub fn new(frame: &HandFrame, c: &Classification, tap: Option<Point2>) -> Self {
        let (palm_center, index_only_tip) = match c.gesture {
            Gesture::PalmOpen { center } => (Some(center), None),
            Gesture::IndexOnly { tip } => (None, Some(tip)),
            _ => (None, None),
        };
        Self {
            hands_found: !frame.hands.is_empty(),
            hand_centers: frame.palm_centers(),
            index_tips: frame.index_tips(),
            tap_detected: tap.is_some(),
            tap_position: tap,
            palm_detected: palm_center.is_some(),
            palm_center,
            pinch_active: matches!(c.gesture, Gesture::Pinch { .. }),
            pinch_scale: c.pinch_scale,
            pinch_distance: c.pinch_distance,
            index_only: index_only_tip.is_some(),
            index_only_tip,
            gesture: c.gesture.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::hand;
    use crate::tracker::{HandLandmarks, HandTracker, landmarks as lm};

    fn observe(hands: &[HandLandmarks]) -> HandFrame {
        HandTracker::new(GestureThresholds::default()).observe(hands)
    }

    /// A fist (or open hand) whose thumb and index tips are `d` pixels apart.
    fn pinching(d: f32, open: bool) -> HandFrame {
        let mut frame = observe(&[hand(0.5, 0.5, [open; 4], false)]);
        let obs = &mut frame.hands[0];
        let thumb = obs.pixels[lm::THUMB_TIP];
        obs.pixels[lm::INDEX_TIP] = Point2::new(thumb.x + d, thumb.y);
        frame
    }

    #[test]
    fn scale_formula_and_clamps() {
        assert!((pinch_scale(50.0, 50.0) - 1.0).abs() < 1e-6);
        assert!((pinch_scale(150.0, 50.0) - 2.0).abs() < 1e-6);
        assert_eq!(pinch_scale(450.0, 50.0), 5.0);
        assert_eq!(pinch_scale(-180.0, 50.0), 0.3);
    }

    #[test]
    fn pinch_scales_continuously_then_releases() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        let c = g.classify(&pinching(40.0, false));
        assert_eq!(c.gesture.label(), "pinch");
        assert_eq!(c.pinch_scale, 1.0);

        let c = g.classify(&pinching(150.0, false));
        assert!(matches!(c.gesture, Gesture::Pinch { scale, .. } if (scale - 2.0).abs() < 1e-4));

        // past the release distance: last scale reported once, then neutral
        let c = g.classify(&pinching(450.0, false));
        assert_eq!(c.gesture, Gesture::None);
        assert_eq!(c.pinch_scale, 5.0);
        assert!(!g.pinch_active());

        let c = g.classify(&pinching(450.0, false));
        assert_eq!(c.pinch_scale, 1.0);
    }

    #[test]
    fn pinch_keeps_scaling_once_fingers_unfold() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        g.classify(&pinching(40.0, false));
        assert!(g.pinch_active());

        // middle and ring straighten; only the pinky stays folded
        for d in [120.0, 200.0] {
            let mut frame = observe(&[hand(0.5, 0.5, [false, true, true, false], false)]);
            let obs = &mut frame.hands[0];
            assert_eq!(obs.fingers.folded_aux(), 1);
            let thumb = obs.pixels[lm::THUMB_TIP];
            obs.pixels[lm::INDEX_TIP] = Point2::new(thumb.x + d, thumb.y);

            let c = g.classify(&frame);
            let expected = 1.0 + (d - 50.0) / 100.0;
            assert!(
                matches!(c.gesture, Gesture::Pinch { scale, .. } if (scale - expected).abs() < 1e-4),
                "{:?}",
                c.gesture
            );
            assert!((c.pinch_scale - expected).abs() < 1e-4);
        }
        assert!(g.pinch_active());
    }

    #[test]
    fn opening_the_hand_ends_the_pinch_and_yields_palm() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        g.classify(&pinching(30.0, false));
        assert!(g.pinch_active());

        let mut frame = observe(&[hand(0.5, 0.5, [true; 4], true)]);
        let obs = &mut frame.hands[0];
        obs.pixels[lm::INDEX_TIP] = obs.pixels[lm::THUMB_TIP];
        let c = g.classify(&frame);
        assert!(!g.pinch_active());
        assert_eq!(c.gesture.label(), "palm");
    }

    #[test]
    fn open_fingers_never_start_a_pinch() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        let c = g.classify(&pinching(10.0, true));
        assert_ne!(c.gesture.label(), "pinch");
    }

    /// Index finger up with its tip well clear of the thumb.
    fn pointing(thumb_out: bool) -> HandFrame {
        let mut frame = observe(&[hand(0.5, 0.5, [true, false, false, false], thumb_out)]);
        let obs = &mut frame.hands[0];
        obs.pixels[lm::INDEX_TIP].y -= 60.0;
        obs.index_tip = obs.pixels[lm::INDEX_TIP];
        frame
    }

    #[test]
    fn index_only_needs_a_tucked_thumb() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        let frame = pointing(false);
        let c = g.classify(&frame);
        assert_eq!(c.gesture, Gesture::IndexOnly { tip: frame.hands[0].index_tip });

        assert_eq!(g.classify(&pointing(true)).gesture, Gesture::None);
    }

    #[test]
    fn record_carries_exactly_one_gesture() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        let frame = observe(&[
            hand(0.3, 0.5, [true; 4], true),
            hand(0.7, 0.5, [true, false, false, false], false),
        ]);
        let c = g.classify(&frame);
        let rec = GestureRecord::new(&frame, &c, None);
        assert!(rec.hands_found);
        assert_eq!(rec.hand_centers.len(), 2);
        assert!(rec.palm_detected);
        assert!(!rec.index_only && !rec.pinch_active && !rec.tap_detected);
        assert_eq!(rec.gesture, "palm");
    }

    #[test]
    fn losing_the_hand_ends_the_pinch() {
        let mut g = GestureClassifier::new(GestureThresholds::default());
        g.classify(&pinching(20.0, false));
        g.classify(&pinching(100.0, false));
        let c = g.classify(&HandFrame::default());
        assert!((c.pinch_scale - 1.5).abs() < 1e-4);
        assert_eq!(c.pinch_distance, 0.0);
        assert!(!g.pinch_active());
    }
}
