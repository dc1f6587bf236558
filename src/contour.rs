//! Binary-image and contour primitives shared by reference extraction and per-frame matching.
//!
//! Thresholding, blurring, morphology and border following come from `imageproc`.
//! Moments are computed over the contour polygon (Green's theorem), so a contour's
//! area and centroid do not depend on how densely its border was sampled.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{self, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::{filter, morphology};

/// Ordered border of one connected component, in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0 {
            self.width as f32 / self.height as f32
        } else {
            0.0
        }
    }
}

impl Contour {
    pub fn new(points: Vec<(i32, i32)>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn moments(&self) -> Moments {
        Moments::from_polygon(self.points.iter().map(|&(x, y)| (x as f64, y as f64)))
    }

    /// Enclosed area of the border polygon.
    pub fn area(&self) -> f64 {
        self.moments().m00.abs()
    }

    /// Inclusive pixel bounding box (a single pixel has width 1).
    pub fn bounding_box(&self) -> BoundingBox {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if self.points.is_empty() {
            return BoundingBox {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            };
        }
        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }
}

/// Spatial, central and scale-normalised moments up to third order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
    pub m30: f64,
    pub m21: f64,
    pub m12: f64,
    pub m03: f64,
    pub mu20: f64,
    pub mu11: f64,
    pub mu02: f64,
    pub mu30: f64,
    pub mu21: f64,
    pub mu12: f64,
    pub mu03: f64,
}

impl Moments {
    pub fn from_polygon<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let pts: Vec<(f64, f64)> = points.into_iter().collect();
        if pts.len() < 3 {
            return Self::default();
        }

        let (mut a00, mut a10, mut a01) = (0.0, 0.0, 0.0);
        let (mut a20, mut a11, mut a02) = (0.0, 0.0, 0.0);
        let (mut a30, mut a21, mut a12, mut a03) = (0.0, 0.0, 0.0, 0.0);

        let (mut xp, mut yp) = pts[pts.len() - 1];
        for &(x, y) in &pts {
            let dxy = xp * y - x * yp;
            let xs = xp + x;
            let ys = yp + y;

            a00 += dxy;
            a10 += dxy * xs;
            a01 += dxy * ys;
            a20 += dxy * (xp * xs + x * x);
            a11 += dxy * (xp * (ys + yp) + x * (ys + y));
            a02 += dxy * (yp * ys + y * y);
            a30 += dxy * xs * (xp * xp + x * x);
            a03 += dxy * ys * (yp * yp + y * y);
            a21 += dxy * (xp * xp * (3.0 * yp + y) + 2.0 * x * xp * ys + x * x * (yp + 3.0 * y));
            a12 += dxy * (yp * yp * (3.0 * xp + x) + 2.0 * y * yp * xs + y * y * (xp + 3.0 * x));

            xp = x;
            yp = y;
        }

        // orientation-independent: clockwise borders flip every sign
        if a00 < 0.0 {
            a00 = -a00;
            a10 = -a10;
            a01 = -a01;
            a20 = -a20;
            a11 = -a11;
            a02 = -a02;
            a30 = -a30;
            a21 = -a21;
            a12 = -a12;
            a03 = -a03;
        }

        let mut m = Self {
            m00: a00 / 2.0,
            m10: a10 / 6.0,
            m01: a01 / 6.0,
            m20: a20 / 12.0,
            m11: a11 / 24.0,
            m02: a02 / 12.0,
            m30: a30 / 20.0,
            m21: a21 / 60.0,
            m12: a12 / 60.0,
            m03: a03 / 20.0,
            ..Self::default()
        };

        if m.m00.abs() > f64::EPSILON {
            let cx = m.m10 / m.m00;
            let cy = m.m01 / m.m00;
            m.mu20 = m.m20 - m.m10 * cx;
            m.mu11 = m.m11 - m.m10 * cy;
            m.mu02 = m.m02 - m.m01 * cy;
            m.mu30 = m.m30 - cx * (3.0 * m.mu20 + cx * m.m10);
            m.mu21 = m.m21 - cx * (2.0 * m.mu11 + cx * m.m01) - cy * m.mu20;
            m.mu12 = m.m12 - cy * (2.0 * m.mu11 + cy * m.m10) - cx * m.mu02;
            m.mu03 = m.m03 - cy * (3.0 * m.mu02 + cy * m.m01);
        }
        m
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00.abs() <= f64::EPSILON {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// Principal-axis angle in degrees, in (-90, 90].
    ///
    /// Comes from the symmetric second-order tensor, so a shape and the same
    /// shape turned by 180° report the same angle.
    pub fn orientation_degrees(&self) -> f64 {
        (0.5 * (2.0 * self.mu11).atan2(self.mu20 - self.mu02)).to_degrees()
    }

    /// The seven Hu invariants (translation, scale and rotation invariant).
    pub fn hu(&self) -> [f64; 7] {
        if self.m00.abs() <= f64::EPSILON {
            return [0.0; 7];
        }
        let s2 = 1.0 / (self.m00 * self.m00);
        let s3 = s2 / self.m00.abs().sqrt();

        let n20 = self.mu20 * s2;
        let n11 = self.mu11 * s2;
        let n02 = self.mu02 * s2;
        let n30 = self.mu30 * s3;
        let n21 = self.mu21 * s3;
        let n12 = self.mu12 * s3;
        let n03 = self.mu03 * s3;

        let t0 = n30 + n12;
        let t1 = n21 + n03;
        let q0 = n20 - n02;
        let q1 = n30 - 3.0 * n12;
        let q2 = 3.0 * n21 - n03;

        [
            n20 + n02,
            q0 * q0 + 4.0 * n11 * n11,
            q1 * q1 + q2 * q2,
            t0 * t0 + t1 * t1,
            q1 * t0 * (t0 * t0 - 3.0 * t1 * t1) + q2 * t1 * (3.0 * t0 * t0 - t1 * t1),
            q0 * (t0 * t0 - t1 * t1) + 4.0 * n11 * t0 * t1,
            q2 * t0 * (t0 * t0 - 3.0 * t1 * t1) - q1 * t1 * (3.0 * t0 * t0 - t1 * t1),
        ]
    }
}

/// Hu-moment shape distance (max relative difference of log-scaled invariants).
/// Zero for identical shapes; lower is more similar.
pub fn shape_distance(reference: &[f64; 7], candidate: &[f64; 7]) -> f64 {
    const EPS: f64 = 1.0e-5;
    let mut worst = 0.0f64;
    for i in 0..7 {
        let a = reference[i].abs();
        let b = candidate[i].abs();
        if a > EPS && b > EPS {
            let la = reference[i].signum() * a.log10();
            let lb = candidate[i].signum() * b.log10();
            let d = ((la - lb) / la).abs();
            if d > worst {
                worst = d;
            }
        }
    }
    worst
}

pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

pub fn gaussian_blur(gray: &GrayImage, kernel_size: u32) -> GrayImage {
    filter::gaussian_blur_f32(gray, sigma_for_kernel(kernel_size))
}

/// Sigma implied by an odd kernel size when none is given explicitly.
fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Inverse binary threshold against a Gaussian-weighted local mean:
/// a pixel becomes 255 when it is not brighter than `mean - c`.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, c: i16) -> GrayImage {
    let local_mean = gaussian_blur(gray, block_size);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (x, y, px) in gray.enumerate_pixels() {
        let t = local_mean.get_pixel(x, y)[0] as i16 - c;
        let v = if px[0] as i16 > t { 0 } else { 255 };
        out.put_pixel(x, y, Luma([v]));
    }
    out
}

/// Morphological close with a 3x3 square kernel, `iterations` times.
pub fn close(binary: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return binary.clone();
    }
    morphology::close(binary, Norm::LInf, iterations)
}

/// Morphological open with a 3x3 square kernel, `iterations` times.
pub fn open(binary: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return binary.clone();
    }
    morphology::open(binary, Norm::LInf, iterations)
}

/// Outermost borders only; holes and anything nested inside them are skipped.
pub fn external_contours(binary: &GrayImage) -> Vec<Contour> {
    contours::find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points.into_iter().map(|p| (p.x, p.y)).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn rect_polygon(w: f64, h: f64, angle_deg: f64, scale: f64) -> Vec<(f64, f64)> {
        let (s, c) = angle_deg.to_radians().sin_cos();
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
            .iter()
            .map(|&(x, y)| {
                let (x, y) = (x * scale, y * scale);
                (x * c - y * s + 300.0, x * s + y * c + 200.0)
            })
            .collect()
    }

    fn l_shape() -> Vec<(f64, f64)> {
        vec![
            (0.0, 0.0),
            (40.0, 0.0),
            (40.0, 100.0),
            (90.0, 100.0),
            (90.0, 140.0),
            (0.0, 140.0),
        ]
    }

    #[test]
    fn rectangle_moments() {
        let m = Moments::from_polygon(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 4.0), (0.0, 4.0)]);
        assert!((m.m00 - 40.0).abs() < 1e-9);
        let (cx, cy) = m.centroid().unwrap();
        assert!((cx - 5.0).abs() < 1e-9);
        assert!((cy - 2.0).abs() < 1e-9);
        // wide rectangle -> principal axis horizontal
        assert!(m.orientation_degrees().abs() < 1e-6);
    }

    #[test]
    fn cross_moment_of_an_offset_rectangle() {
        let m = Moments::from_polygon(rect_polygon(10.0, 4.0, 0.0, 1.0));
        // 10x4 box at (300, 200): centroid (305, 202)
        assert!((m.m11 - 40.0 * 305.0 * 202.0).abs() < 1e-3, "m11 {}", m.m11);
        assert!(m.mu11.abs() < 1e-6, "mu11 {}", m.mu11);
        assert!(m.orientation_degrees().abs() < 1e-6);

        let tall = Moments::from_polygon(rect_polygon(4.0, 10.0, 0.0, 1.0));
        assert!((tall.orientation_degrees().abs() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn rotated_rectangle_has_the_same_invariants() {
        let flat = Moments::from_polygon(rect_polygon(100.0, 40.0, 0.0, 1.0)).hu();
        let turned = Moments::from_polygon(rect_polygon(100.0, 40.0, 60.0, 1.0)).hu();
        assert!(shape_distance(&flat, &turned) < 1e-6);
        assert!((flat[1] - turned[1]).abs() < 1e-9);
    }

    #[test]
    fn winding_direction_does_not_matter() {
        let ccw = Moments::from_polygon(l_shape());
        let mut rev = l_shape();
        rev.reverse();
        let cw = Moments::from_polygon(rev);
        assert!((ccw.m00 - cw.m00).abs() < 1e-9);
        assert!((ccw.mu11 - cw.mu11).abs() < 1e-6);
    }

    #[test]
    fn orientation_follows_rotation_modulo_180() {
        let m = Moments::from_polygon(rect_polygon(100.0, 20.0, 30.0, 1.0));
        assert!((m.orientation_degrees() - 30.0).abs() < 1e-3);

        let flipped = Moments::from_polygon(rect_polygon(100.0, 20.0, 210.0, 1.0));
        assert!((flipped.orientation_degrees() - 30.0).abs() < 1e-3);
    }

    #[test]
    fn hu_distance_is_rotation_and_scale_invariant() {
        let base = Moments::from_polygon(l_shape()).hu();
        let turned: Vec<(f64, f64)> = l_shape()
            .into_iter()
            .map(|(x, y)| {
                let (s, c) = 40f64.to_radians().sin_cos();
                let (x, y) = (x * 2.5, y * 2.5);
                (x * c - y * s, x * s + y * c)
            })
            .collect();
        let other = Moments::from_polygon(turned).hu();
        assert!(shape_distance(&base, &other) < 1e-6);

        let square = Moments::from_polygon(rect_polygon(50.0, 50.0, 0.0, 1.0)).hu();
        assert!(shape_distance(&base, &square) > 0.05);
    }

    #[test]
    fn filled_rectangle_yields_one_external_contour() {
        let mut img = GrayImage::new(60, 60);
        draw_filled_rect_mut(&mut img, Rect::at(10, 15).of_size(30, 20), Luma([255]));
        // a hole punched in the middle must not show up as its own contour
        draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(5, 5), Luma([0]));

        let found = external_contours(&img);
        assert_eq!(found.len(), 1);
        let bb = found[0].bounding_box();
        assert_eq!((bb.x, bb.y, bb.width, bb.height), (10, 15, 30, 20));
        assert!((bb.aspect_ratio() - 1.5).abs() < 1e-6);
        // border polygon runs through pixel centres
        assert!((found[0].area() - 29.0 * 19.0).abs() < 1.0);
    }

    #[test]
    fn adaptive_threshold_marks_dark_shapes() {
        let mut img = GrayImage::from_pixel(80, 80, Luma([220]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(40, 40), Luma([20]));
        let bin = adaptive_threshold_inv(&img, 11, 2);
        // dark edge pixels are foreground, the bright flat background is not
        assert_eq!(bin.get_pixel(20, 40)[0], 255);
        assert_eq!(bin.get_pixel(2, 2)[0], 0);
    }
}
