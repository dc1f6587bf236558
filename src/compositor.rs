//! Output-image rendering: perspective overlay, display adjustment and hand skeletons.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use log::debug;

use crate::geometry::{Quad, is_degenerate, quad_area};
use crate::tracker::{HandFrame, landmarks as lm};

const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (lm::WRIST, lm::THUMB_CMC),
    (lm::THUMB_CMC, lm::THUMB_MCP),
    (lm::THUMB_MCP, lm::THUMB_IP),
    (lm::THUMB_IP, lm::THUMB_TIP),
    (lm::WRIST, lm::INDEX_MCP),
    (lm::INDEX_MCP, lm::INDEX_PIP),
    (lm::INDEX_PIP, lm::INDEX_DIP),
    (lm::INDEX_DIP, lm::INDEX_TIP),
    (lm::WRIST, lm::MIDDLE_MCP),
    (lm::MIDDLE_MCP, lm::MIDDLE_PIP),
    (lm::MIDDLE_PIP, lm::MIDDLE_DIP),
    (lm::MIDDLE_DIP, lm::MIDDLE_TIP),
    (lm::WRIST, lm::RING_MCP),
    (lm::RING_MCP, lm::RING_PIP),
    (lm::RING_PIP, lm::RING_DIP),
    (lm::RING_DIP, lm::RING_TIP),
    (lm::WRIST, lm::PINKY_MCP),
    (lm::PINKY_MCP, lm::PINKY_PIP),
    (lm::PINKY_PIP, lm::PINKY_DIP),
    (lm::PINKY_DIP, lm::PINKY_TIP),
    // palm cross-links
    (lm::INDEX_MCP, lm::MIDDLE_MCP),
    (lm::MIDDLE_MCP, lm::RING_MCP),
    (lm::RING_MCP, lm::PINKY_MCP),
];

const FINGER_TIPS: &[usize] = &[
    lm::THUMB_TIP,
    lm::INDEX_TIP,
    lm::MIDDLE_TIP,
    lm::RING_TIP,
    lm::PINKY_TIP,
];

const BONE_COLOR: Rgb<u8> = Rgb([220, 220, 220]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Warps `video` into `quad` and multiply-blends it over `base`.
///
/// Pixels the warped mask does not reach are left untouched. Returns `false`
/// (and leaves `base` as it was) when no perspective transform exists.
pub fn composite(base: &mut RgbImage, video: &RgbImage, quad: &Quad) -> bool {
    let (vw, vh) = video.dimensions();
    if vw < 2 || vh < 2 || is_degenerate(quad, 1e-3) || quad_area(quad) < 1.0 {
        debug!("compositor: degenerate input, skipping");
        return false;
    }
    let (w, h) = ((vw - 1) as f32, (vh - 1) as f32);
    let from = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let to = quad.map(|p| (p.x, p.y));
    let Some(projection) = Projection::from_control_points(from, to) else {
        debug!("compositor: no projection for {to:?}");
        return false;
    };

    let (bw, bh) = base.dimensions();
    let mut warped = RgbImage::new(bw, bh);
    warp_into(
        video,
        &projection,
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
        &mut warped,
    );
    let mut mask = GrayImage::new(bw, bh);
    warp_into(
        &GrayImage::from_pixel(vw, vh, Luma([255])),
        &projection,
        Interpolation::Bilinear,
        Luma([0]),
        &mut mask,
    );

    for (x, y, m) in mask.enumerate_pixels() {
        if m[0] == 0 {
            continue;
        }
        let m = m[0] as f32 / 255.0;
        let over = warped.get_pixel(x, y);
        let px = base.get_pixel_mut(x, y);
        for c in 0..3 {
            let b = px[c] as f32;
            let blended = b * (1.0 - m) + (b * over[c] as f32 / 255.0) * m;
            px[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    true
}

fn rgb_to_hsv(p: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = p.0.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    (h.rem_euclid(360.0), s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let s = s / 255.0;
    let c = v * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    Rgb([r, g, b].map(|ch| (ch + m).round().clamp(0.0, 255.0) as u8))
}

/// Scales HSV saturation by `1 + saturation/100` and shifts value by
/// `brightness`. Both arguments are expected in [-100, 100].
pub fn adjust_display(img: &mut RgbImage, brightness: i32, saturation: i32) {
    if brightness == 0 && saturation == 0 {
        return;
    }
    let sat_scale = 1.0 + saturation as f32 / 100.0;
    for px in img.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(px);
        let s = (s * sat_scale).clamp(0.0, 255.0);
        let v = (v + brightness as f32).clamp(0.0, 255.0);
        *px = hsv_to_rgb(h, s, v);
    }
}

pub fn draw_hand_skeleton(img: &mut RgbImage, hands: &HandFrame) {
    for hand in &hands.hands {
        let p = &hand.pixels;
        for &(a, b) in HAND_CONNECTIONS {
            draw_line_segment_mut(img, (p[a].x, p[a].y), (p[b].x, p[b].y), BONE_COLOR);
        }
        for (i, j) in p.iter().enumerate() {
            let radius = if FINGER_TIPS.contains(&i) { 3 } else { 2 };
            draw_filled_circle_mut(img, (j.x.round() as i32, j.y.round() as i32), radius, JOINT_COLOR);
        }
    }
}
