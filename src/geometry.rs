//! Plain 2D points and the ordered four-corner quadrilateral used for the AR frame.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point2) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Corners in top-left, top-right, bottom-right, bottom-left order.
pub type Quad = [Point2; 4];

pub fn quad_center(q: &Quad) -> Point2 {
    let sx: f32 = q.iter().map(|p| p.x).sum();
    let sy: f32 = q.iter().map(|p| p.y).sum();
    Point2::new(sx / 4.0, sy / 4.0)
}

pub fn quad_area(q: &Quad) -> f32 {
    let mut acc = 0.0f32;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        acc += a.x * b.y - b.x * a.y;
    }
    (acc * 0.5).abs()
}

/// True when any corners coincide or any three are collinear.
pub fn is_degenerate(q: &Quad, eps: f32) -> bool {
    for i in 0..4 {
        for j in (i + 1)..4 {
            if q[i].distance(q[j]) <= eps {
                return true;
            }
        }
    }
    for skip in 0..4 {
        let pts: Vec<Point2> = (0..4).filter(|&k| k != skip).map(|k| q[k]).collect();
        let cross = (pts[1].x - pts[0].x) * (pts[2].y - pts[0].y)
            - (pts[1].y - pts[0].y) * (pts[2].x - pts[0].x);
        if cross.abs() <= eps {
            return true;
        }
    }
    false
}
