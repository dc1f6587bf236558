//! One-time extraction of the reference silhouette from a still image.

use image::RgbImage;
use log::info;
use std::path::Path;

use crate::contour::{self, BoundingBox, Contour};
use crate::error::{TrackError, TrackResult};

const BLOCK_SIZE: u32 = 11;
const THRESHOLD_C: i16 = 2;

/// Immutable after construction; shared read-only between sessions.
#[derive(Debug, Clone)]
pub struct ReferenceShape {
    contour: Contour,
    area: f64,
    bbox: BoundingBox,
    centroid: (f64, f64),
    hu: [f64; 7],
}

impl ReferenceShape {
    pub fn load(path: &Path) -> TrackResult<Self> {
        let img = image::open(path)
            .map_err(|e| TrackError::reference_unavailable(path, e))?
            .to_rgb8();
        let shape = Self::from_image(&img).map_err(|e| match e {
            TrackError::ReferenceUnavailable(reason) => {
                TrackError::reference_unavailable(path, reason)
            }
            other => other,
        })?;
        info!(
            "reference: {} border points, area {:.0}, bbox {}x{} from {}",
            shape.contour.points.len(),
            shape.area,
            shape.bbox.width,
            shape.bbox.height,
            path.display()
        );
        Ok(shape)
    }

    /// grayscale -> adaptive threshold -> close(2) -> open(1) -> largest external contour.
    pub fn from_image(img: &RgbImage) -> TrackResult<Self> {
        let gray = contour::to_gray(img);
        let binary = contour::adaptive_threshold_inv(&gray, BLOCK_SIZE, THRESHOLD_C);
        let binary = contour::close(&binary, 2);
        let binary = contour::open(&binary, 1);

        let best = contour::external_contours(&binary)
            .into_iter()
            .map(|c| {
                let a = c.area();
                (c, a)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| TrackError::ReferenceUnavailable("no contour found".into()))?;

        Self::from_contour(best.0)
    }

    pub fn from_contour(contour: Contour) -> TrackResult<Self> {
        if contour.is_empty() {
            return Err(TrackError::ReferenceUnavailable("empty contour".into()));
        }
        let moments = contour.moments();
        let area = moments.m00.abs();
        let centroid = moments
            .centroid()
            .filter(|_| area > 0.0)
            .ok_or_else(|| TrackError::ReferenceUnavailable("contour encloses no area".into()))?;
        Ok(Self {
            bbox: contour.bounding_box(),
            hu: moments.hu(),
            contour,
            area,
            centroid,
        })
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    pub fn hu(&self) -> &[f64; 7] {
        &self.hu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn picks_the_largest_silhouette() {
        let mut img = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        draw_filled_rect_mut(&mut img, Rect::at(20, 20).of_size(20, 20), Rgb([0, 0, 0]));
        draw_filled_rect_mut(&mut img, Rect::at(80, 60).of_size(90, 110), Rgb([0, 0, 0]));

        let r = ReferenceShape::from_image(&img).unwrap();
        let bb = r.bounding_box();
        assert!(bb.width >= 90 && bb.width <= 94, "width {}", bb.width);
        assert!(bb.height >= 110 && bb.height <= 114, "height {}", bb.height);
        assert!(r.area() > 80.0 * 100.0);
    }

    #[test]
    fn blank_image_has_no_reference() {
        let img = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        assert!(matches!(
            ReferenceShape::from_image(&img),
            Err(TrackError::ReferenceUnavailable(_))
        ));
    }

    #[test]
    fn missing_file_is_reference_unavailable() {
        let err = ReferenceShape::load(Path::new("/nonexistent/reference.png")).unwrap_err();
        assert!(matches!(err, TrackError::ReferenceUnavailable(_)));
    }
}
