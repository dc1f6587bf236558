//! Per-hand landmark snapshots for one frame.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::GestureThresholds;
use crate::geometry::Point2;

/// Hand landmark indices (21-joint hand model).
pub mod landmarks {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;

    pub const COUNT: usize = 21;
}

use landmarks as lm;

/// How incoming landmark coordinates are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSpace {
    /// 0..1 relative to image width/height.
    #[default]
    Normalized,
    Pixels,
}

/// 21 joints of one hand, normalised to the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandLandmarks {
    pub points: [Point2; lm::COUNT],
}

impl HandLandmarks {
    pub fn new(points: [Point2; lm::COUNT]) -> Self {
        Self { points }
    }

    /// `None` unless exactly 21 joints are given.
    pub fn from_coords(
        coords: &[[f32; 2]],
        space: LandmarkSpace,
        frame: (u32, u32),
    ) -> Option<Self> {
        if coords.len() != lm::COUNT {
            return None;
        }
        let (sx, sy) = match space {
            LandmarkSpace::Normalized => (1.0, 1.0),
            LandmarkSpace::Pixels => (frame.0.max(1) as f32, frame.1.max(1) as f32),
        };
        let mut points = [Point2::default(); lm::COUNT];
        for (dst, c) in points.iter_mut().zip(coords) {
            *dst = Point2::new(c[0] / sx, c[1] / sy);
        }
        Some(Self { points })
    }

    pub fn mirrored(&self) -> Self {
        let mut points = self.points;
        for p in &mut points {
            p.x = 1.0 - p.x;
        }
        Self { points }
    }
}

/// Extension flags for each finger of one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FingerStates {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
    /// Thumb tucked toward the palm.
    pub thumb_folded: bool,
}

impl FingerStates {
    /// Tip above PIP means extended; the thumb uses horizontal spread instead,
    /// which only reads correctly for one handedness.
    pub fn from_landmarks(h: &HandLandmarks, th: &GestureThresholds) -> Self {
        let p = &h.points;
        let up = |tip: usize, pip: usize| p[tip].y < p[pip].y;
        let spread = (p[lm::THUMB_TIP].x - p[lm::THUMB_MCP].x).abs();
        Self {
            thumb: spread > th.thumb_extended_min,
            index: up(lm::INDEX_TIP, lm::INDEX_PIP),
            middle: up(lm::MIDDLE_TIP, lm::MIDDLE_PIP),
            ring: up(lm::RING_TIP, lm::RING_PIP),
            pinky: up(lm::PINKY_TIP, lm::PINKY_PIP),
            thumb_folded: spread < th.thumb_folded_max,
        }
    }

    pub fn extended_count(&self) -> usize {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|&&e| e)
            .count()
    }

    /// How many of middle/ring/pinky are folded.
    pub fn folded_aux(&self) -> usize {
        [self.middle, self.ring, self.pinky]
            .iter()
            .filter(|&&e| !e)
            .count()
    }
}

/// Ephemeral per-frame view of one hand, in pixels.
#[derive(Debug, Clone)]
pub struct HandObservation {
    pub pixels: [Point2; lm::COUNT],
    /// Midpoint of wrist and middle-finger MCP.
    pub palm_center: Point2,
    pub index_tip: Point2,
    pub fingers: FingerStates,
}

impl HandObservation {
    pub fn joint(&self, idx: usize) -> Point2 {
        self.pixels[idx]
    }

    /// Mean of the four finger MCP joints.
    pub fn knuckle_center(&self) -> Point2 {
        let ids = [lm::INDEX_MCP, lm::MIDDLE_MCP, lm::RING_MCP, lm::PINKY_MCP];
        let sx: f32 = ids.iter().map(|&i| self.pixels[i].x).sum();
        let sy: f32 = ids.iter().map(|&i| self.pixels[i].y).sum();
        Point2::new(sx / 4.0, sy / 4.0)
    }

    pub fn pinch_distance(&self) -> f32 {
        self.joint(lm::THUMB_TIP).distance(self.joint(lm::INDEX_TIP))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HandFrame {
    pub hands: Vec<HandObservation>,
}

impl HandFrame {
    pub fn palm_centers(&self) -> Vec<Point2> {
        self.hands.iter().map(|h| h.palm_center).collect()
    }

    pub fn index_tips(&self) -> Vec<Point2> {
        self.hands.iter().map(|h| h.index_tip).collect()
    }
}

/// Parse raw per-hand coordinate lists; malformed hands are dropped.
pub fn parse_hands(raw: &[Vec<[f32; 2]>], space: LandmarkSpace, frame: (u32, u32)) -> Vec<HandLandmarks> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, coords)| {
            let h = HandLandmarks::from_coords(coords, space, frame);
            if h.is_none() {
                warn!("hand {i}: expected 21 landmarks, got {}", coords.len());
            }
            h
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct HandTracker {
    width: u32,
    height: u32,
    mirror: bool,
    th: GestureThresholds,
}

impl HandTracker {
    pub fn new(th: GestureThresholds) -> Self {
        Self {
            width: 640,
            height: 480,
            mirror: false,
            th,
        }
    }

    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn observe(&self, hands: &[HandLandmarks]) -> HandFrame {
        let (w, h) = (self.width as f32, self.height as f32);
        let hands = hands
            .iter()
            .map(|raw| {
                let landmarks = if self.mirror { raw.mirrored() } else { *raw };
                let mut pixels = [Point2::default(); lm::COUNT];
                for (dst, p) in pixels.iter_mut().zip(landmarks.points.iter()) {
                    *dst = Point2::new(p.x * w, p.y * h);
                }
                let wrist = pixels[lm::WRIST];
                let mid = pixels[lm::MIDDLE_MCP];
                HandObservation {
                    palm_center: Point2::new((wrist.x + mid.x) / 2.0, (wrist.y + mid.y) / 2.0),
                    index_tip: pixels[lm::INDEX_TIP],
                    fingers: FingerStates::from_landmarks(&landmarks, &self.th),
                    pixels,
                }
            })
            .collect();
        HandFrame { hands }
    }
}
