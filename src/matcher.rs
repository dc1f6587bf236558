//! Per-frame contour extraction and scoring against the reference silhouette.

use image::RgbImage;
use log::debug;
use std::sync::Arc;

use crate::config::TrackingThresholds;
use crate::contour::{self, Contour, Moments};
use crate::reference::ReferenceShape;

const BLOCK_SIZE: u32 = 11;
const THRESHOLD_C: i16 = 2;
const BLUR_KERNEL: u32 = 3;

/// The best-scoring contour of one frame.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub contour: Contour,
    pub moments: Moments,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ShapeMatcher {
    reference: Arc<ReferenceShape>,
}

impl ShapeMatcher {
    pub fn new(reference: Arc<ReferenceShape>) -> Self {
        Self { reference }
    }

    /// grayscale -> blur -> adaptive threshold -> close(1) -> external contours -> best score.
    pub fn best_match(&self, frame: &RgbImage, filters: &TrackingThresholds) -> Option<Candidate> {
        let gray = contour::to_gray(frame);
        let gray = contour::gaussian_blur(&gray, BLUR_KERNEL);
        let binary = contour::adaptive_threshold_inv(&gray, BLOCK_SIZE, THRESHOLD_C);
        let binary = contour::close(&binary, 1);
        let contours = contour::external_contours(&binary);
        let frame_area = frame.width() as f64 * frame.height() as f64;
        self.best_of(contours, frame_area, filters)
    }

    pub fn best_of(
        &self,
        contours: Vec<Contour>,
        frame_area: f64,
        filters: &TrackingThresholds,
    ) -> Option<Candidate> {
        let max_area = frame_area * filters.max_area_fraction;
        let total = contours.len();
        let mut best: Option<Candidate> = None;

        for c in contours {
            let moments = c.moments();
            let area = moments.m00.abs();
            if area < filters.min_contour_area || area > max_area {
                continue;
            }
            let aspect = c.bounding_box().aspect_ratio();
            if aspect < filters.min_aspect || aspect > filters.max_aspect {
                continue;
            }
            let score = contour::shape_distance(self.reference.hu(), &moments.hu());
            if best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(Candidate {
                    contour: c,
                    moments,
                    score,
                });
            }
        }

        debug!(
            "matcher: {total} contours, best score {:?}",
            best.as_ref().map(|b| b.score)
        );
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{draw_dark_rect, reference_rect, white_frame};

    #[test]
    fn the_reference_shape_beats_a_square() {
        let matcher = ShapeMatcher::new(reference_rect());
        let mut frame = white_frame(480, 360);
        draw_dark_rect(&mut frame, 40, 60, 135, 75);
        draw_dark_rect(&mut frame, 300, 120, 100, 100);

        let best = matcher
            .best_match(&frame, &TrackingThresholds::default())
            .expect("a candidate");
        let bb = best.contour.bounding_box();
        assert!((bb.x - 40).abs() <= 1 && (bb.y - 60).abs() <= 1, "{bb:?}");
        assert!(best.score < 0.05, "score {}", best.score);
    }

    #[test]
    fn score_does_not_depend_on_position() {
        let matcher = ShapeMatcher::new(reference_rect());
        let score_at = |x: i32, y: i32| {
            let mut frame = white_frame(480, 360);
            draw_dark_rect(&mut frame, x, y, 135, 75);
            matcher
                .best_match(&frame, &TrackingThresholds::default())
                .map(|c| c.score)
                .expect("a candidate")
        };
        let near = score_at(20, 20);
        let far = score_at(300, 250);
        assert!(near < 0.05 && far < 0.05, "{near} {far}");
        assert!((near - far).abs() < 1e-3, "{near} {far}");
    }

    #[test]
    fn small_and_elongated_contours_are_filtered() {
        let matcher = ShapeMatcher::new(reference_rect());
        let mut frame = white_frame(400, 300);
        // under the area floor
        draw_dark_rect(&mut frame, 20, 20, 30, 30);
        // aspect 4.8
        draw_dark_rect(&mut frame, 100, 200, 240, 50);
        assert!(matcher.best_match(&frame, &TrackingThresholds::default()).is_none());
    }

    #[test]
    fn blank_frame_has_no_candidate() {
        let matcher = ShapeMatcher::new(reference_rect());
        let frame = white_frame(320, 240);
        assert!(matcher.best_match(&frame, &TrackingThresholds::default()).is_none());
    }
}
