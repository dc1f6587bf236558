//! Hand-vs-frame hit tests: grab collisions and index-finger taps.

use log::info;

use crate::drag::Contact;
use crate::geometry::{Point2, Quad, quad_center};

fn segment_distance(p: Point2, a: Point2, b: Point2) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let len2 = abx * abx + aby * aby;
    if len2 <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0);
    p.distance(Point2::new(a.x + t * abx, a.y + t * aby))
}

/// Signed distance to the quadrilateral's border: positive inside, negative
/// outside, zero on an edge.
pub fn signed_distance(p: Point2, quad: &Quad) -> f32 {
    let mut inside = false;
    let mut nearest = f32::INFINITY;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        nearest = nearest.min(segment_distance(p, a, b));
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
    }
    if nearest <= 1e-4 {
        0.0
    } else if inside {
        nearest
    } else {
        -nearest
    }
}

/// On the border counts as inside.
pub fn is_inside(p: Point2, quad: &Quad) -> bool {
    signed_distance(p, quad) >= 0.0
}

/// First hand whose palm center lies in the frame.
pub fn check_collision(hands: &[Point2], quad: Option<&Quad>, center: Option<Point2>) -> Contact {
    let Some(quad) = quad else {
        return Contact {
            object_center: center,
            ..Contact::none()
        };
    };
    let object_center = Some(center.unwrap_or_else(|| quad_center(quad)));
    match hands.iter().find(|&&h| is_inside(h, quad)) {
        Some(&h) => Contact {
            touching: true,
            hand: Some(h),
            object_center,
        },
        None => Contact {
            touching: false,
            hand: None,
            object_center,
        },
    }
}

/// Fires once when a fingertip crosses into the frame, then stays quiet for
/// `cooldown_frames` frames.
#[derive(Debug, Clone)]
pub struct TapDetector {
    cooldown_frames: u32,
    cooldown: u32,
    last_inside: bool,
}

impl TapDetector {
    pub fn new(cooldown_frames: u32) -> Self {
        Self {
            cooldown_frames,
            cooldown: 0,
            last_inside: false,
        }
    }

    pub fn reset(&mut self) {
        self.cooldown = 0;
        self.last_inside = false;
    }

    /// Call exactly once per frame. Returns the tip that tapped, if any.
    pub fn update(&mut self, tips: &[Point2], quad: Option<&Quad>) -> Option<Point2> {
        self.cooldown = self.cooldown.saturating_sub(1);

        let Some(quad) = quad.filter(|_| !tips.is_empty()) else {
            self.last_inside = false;
            return None;
        };
        if self.cooldown > 0 {
            return None;
        }

        let hit = tips.iter().copied().find(|&t| is_inside(t, quad));
        let tapped = hit.filter(|_| !self.last_inside);
        self.last_inside = hit.is_some();

        if let Some(p) = tapped {
            self.cooldown = self.cooldown_frames;
            info!("tap at ({:.0}, {:.0})", p.x, p.y);
        }
        tapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Quad {
        [
            Point2::new(100.0, 100.0),
            Point2::new(300.0, 100.0),
            Point2::new(300.0, 200.0),
            Point2::new(100.0, 200.0),
        ]
    }

    const IN: Point2 = Point2::new(200.0, 150.0);
    const OUT: Point2 = Point2::new(20.0, 20.0);

    #[test]
    fn signed_distance_matches_geometry() {
        let q = quad();
        assert!((signed_distance(IN, &q) - 50.0).abs() < 1e-4);
        assert!((signed_distance(Point2::new(50.0, 150.0), &q) + 50.0).abs() < 1e-4);
        assert_eq!(signed_distance(Point2::new(300.0, 150.0), &q), 0.0);
        assert!(is_inside(Point2::new(100.0, 100.0), &q));
        assert!(!is_inside(OUT, &q));
    }

    #[test]
    fn rotated_quad_membership() {
        // diamond around (0, 0)
        let d = [
            Point2::new(0.0, -10.0),
            Point2::new(10.0, 0.0),
            Point2::new(0.0, 10.0),
            Point2::new(-10.0, 0.0),
        ];
        assert!(is_inside(Point2::new(0.0, 0.0), &d));
        assert!(!is_inside(Point2::new(8.0, 8.0), &d));
    }

    #[test]
    fn collision_reports_first_hand_inside() {
        let q = quad();
        let c = check_collision(&[OUT, IN], Some(&q), None);
        assert!(c.touching);
        assert_eq!(c.hand, Some(IN));
        assert_eq!(c.object_center, Some(Point2::new(200.0, 150.0)));

        let miss = check_collision(&[OUT], Some(&q), None);
        assert!(!miss.touching);
        assert!(!check_collision(&[IN], None, None).touching);
    }

    #[test]
    fn tap_fires_on_entry_then_cools_down() {
        let q = quad();
        let mut tap = TapDetector::new(15);
        assert_eq!(tap.update(&[OUT], Some(&q)), None);
        assert_eq!(tap.update(&[IN], Some(&q)), Some(IN));

        let fired = (0..30)
            .filter(|_| tap.update(&[IN], Some(&q)).is_some())
            .count();
        assert_eq!(fired, 0);

        assert_eq!(tap.update(&[OUT], Some(&q)), None);
        assert_eq!(tap.update(&[IN], Some(&q)), Some(IN));
    }

    #[test]
    fn re_entry_during_cooldown_is_ignored() {
        let q = quad();
        let mut tap = TapDetector::new(15);
        tap.update(&[OUT], Some(&q));
        assert!(tap.update(&[IN], Some(&q)).is_some());
        tap.update(&[OUT], Some(&q));
        assert_eq!(tap.update(&[IN], Some(&q)), None);
        assert!(tap.cooldown > 0);
    }

    #[test]
    fn losing_the_frame_clears_the_edge_state() {
        let q = quad();
        let mut tap = TapDetector::new(0);
        tap.update(&[IN], Some(&q));
        assert_eq!(tap.update(&[IN], None), None);
        assert_eq!(tap.update(&[IN], Some(&q)), Some(IN));
    }
}
