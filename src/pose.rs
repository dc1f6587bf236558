//! Exponential smoothing of the matched silhouette's pose and the AR frame derived from it.

use serde::Serialize;

use crate::config::{FrameMargins, Smoothing};
use crate::contour::Moments;
use crate::geometry::{Point2, Quad};
use crate::reference::ReferenceShape;

/// Unsmoothed pose of one matched contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPose {
    pub center: (f64, f64),
    /// Principal-axis angle; only meaningful modulo 180 degrees.
    pub angle: f64,
    pub scale: f64,
}

impl RawPose {
    pub fn from_moments(m: &Moments, reference_area: f64) -> Option<Self> {
        let center = m.centroid()?;
        let scale = if reference_area > 0.0 {
            (m.m00.abs() / reference_area).sqrt()
        } else {
            1.0
        };
        Some(Self {
            center,
            angle: m.orientation_degrees(),
            scale,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackedPose {
    pub center: (f64, f64),
    pub angle: f64,
    pub scale: f64,
    /// Center the AR frame is drawn around; follows `center` with its own rate.
    pub frame_center: (f64, f64),
}

/// Wraps any angle difference into [-180, 180].
pub fn wrap_degrees(d: f64) -> f64 {
    let r = (d + 180.0).rem_euclid(360.0) - 180.0;
    if r == -180.0 && d > 0.0 { 180.0 } else { r }
}

fn blend(alpha: f64, raw: f64, prev: f64) -> f64 {
    alpha * raw + (1.0 - alpha) * prev
}

#[derive(Debug, Clone)]
pub struct PoseSmoother {
    smoothing: Smoothing,
    /// Frame corners around the reference centroid at scale 1, angle 0 (TL, TR, BR, BL).
    local_corners: [(f64, f64); 4],
    pose: Option<TrackedPose>,
}

impl PoseSmoother {
    pub fn new(reference: &ReferenceShape, margins: FrameMargins, smoothing: Smoothing) -> Self {
        let bb = reference.bounding_box();
        let (cx, cy) = reference.centroid();
        let left = bb.x as f64 - margins.left - cx;
        let right = (bb.x + bb.width) as f64 + margins.right - cx;
        let top = bb.y as f64 - margins.top - cy;
        let bottom = (bb.y + bb.height) as f64 + margins.bottom - cy;
        Self {
            smoothing,
            local_corners: [(left, top), (right, top), (right, bottom), (left, bottom)],
            pose: None,
        }
    }

    pub fn reset(&mut self) {
        self.pose = None;
    }

    /// First call seeds the state with `raw`; later calls only blend.
    pub fn update(&mut self, raw: RawPose) -> TrackedPose {
        let a = self.smoothing.alpha;
        let af = self.smoothing.alpha_frame;
        let next = match self.pose {
            None => TrackedPose {
                center: raw.center,
                angle: wrap_degrees(raw.angle),
                scale: raw.scale,
                frame_center: raw.center,
            },
            Some(prev) => {
                let center = (
                    blend(a, raw.center.0, prev.center.0),
                    blend(a, raw.center.1, prev.center.1),
                );
                let delta = wrap_degrees(raw.angle - prev.angle);
                TrackedPose {
                    center,
                    angle: wrap_degrees(prev.angle + a * delta),
                    scale: blend(a, raw.scale, prev.scale),
                    frame_center: (
                        blend(af, center.0, prev.frame_center.0),
                        blend(af, center.1, prev.frame_center.1),
                    ),
                }
            }
        };
        self.pose = Some(next);
        next
    }

    /// Corners of the AR frame for the current pose, shifted by the drag offset.
    pub fn corners(&self, drag: (f32, f32)) -> Option<Quad> {
        let p = self.pose?;
        let (sin, cos) = p.angle.to_radians().sin_cos();
        let mut out = [Point2::default(); 4];
        for (dst, &(lx, ly)) in out.iter_mut().zip(self.local_corners.iter()) {
            let (x, y) = (lx * p.scale, ly * p.scale);
            let rx = x * cos - y * sin;
            let ry = x * sin + y * cos;
            *dst = Point2::new(
                (p.frame_center.0 + rx) as f32 + drag.0,
                (p.frame_center.1 + ry) as f32 + drag.1,
            );
        }
        Some(out)
    }
}
