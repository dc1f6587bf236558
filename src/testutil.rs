//! Synthetic fixtures shared by unit tests.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::sync::Arc;

use crate::geometry::Point2;
use crate::reference::ReferenceShape;
use crate::tracker::HandLandmarks;

pub fn white_frame(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
}

pub fn draw_dark_rect(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(w, h), Rgb([0, 0, 0]));
}

/// A 90x50 dark bar on white: bbox 90x50, centroid near (89.5, 74.5).
pub fn reference_rect() -> Arc<ReferenceShape> {
    let mut img = white_frame(200, 150);
    draw_dark_rect(&mut img, 45, 50, 90, 50);
    Arc::new(ReferenceShape::from_image(&img).expect("reference fixture"))
}

/// Normalised landmarks for a right hand held upright in a 640x480 frame.
/// Fingers listed in `extended` point up; the rest curl below their PIP joint.
pub fn hand(cx: f32, cy: f32, extended: [bool; 4], thumb_out: bool) -> HandLandmarks {
    let mut pts = [Point2::default(); 21];
    let u = 0.02;
    pts[0] = Point2::new(cx, cy + 6.0 * u);
    // thumb: cmc, mcp, ip, tip
    let thumb_dx = if thumb_out { 4.0 * u } else { 0.5 * u };
    pts[1] = Point2::new(cx - u, cy + 4.0 * u);
    pts[2] = Point2::new(cx - 1.5 * u, cy + 3.0 * u);
    pts[3] = Point2::new(cx - 1.5 * u - thumb_dx * 0.5, cy + 2.0 * u);
    pts[4] = Point2::new(cx - 1.5 * u - thumb_dx, cy + 1.5 * u);
    for (f, &up) in extended.iter().enumerate() {
        let x = cx + (f as f32 - 1.0) * u;
        let base = 5 + f * 4;
        pts[base] = Point2::new(x, cy);
        pts[base + 1] = Point2::new(x, cy - u);
        if up {
            pts[base + 2] = Point2::new(x, cy - 2.0 * u);
            pts[base + 3] = Point2::new(x, cy - 3.0 * u);
        } else {
            pts[base + 2] = Point2::new(x, cy - 0.5 * u);
            pts[base + 3] = Point2::new(x, cy + 0.5 * u);
        }
    }
    HandLandmarks::new(pts)
}
