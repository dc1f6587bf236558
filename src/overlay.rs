//! Looping sequence of overlay frames fed to the compositor.

use image::{RgbImage, imageops};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{TrackError, TrackResult};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Image files directly inside `dir`, sorted by name.
pub fn frame_files(dir: &Path) -> TrackResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone)]
enum Frames {
    Files(Vec<PathBuf>),
    Memory(Vec<RgbImage>),
}

#[derive(Debug, Clone)]
pub struct OverlaySource {
    frames: Frames,
    next: usize,
    flip: bool,
}

impl OverlaySource {
    /// Every png/jpeg in `dir`, in file-name order. Frames are decoded on demand.
    pub fn open(dir: &Path) -> TrackResult<Self> {
        let files = frame_files(dir)?;
        if files.is_empty() {
            return Err(TrackError::invalid_config(format!(
                "no overlay frames in {}",
                dir.display()
            )));
        }
        info!("overlay: {} frames from {}", files.len(), dir.display());
        Ok(Self {
            frames: Frames::Files(files),
            next: 0,
            flip: false,
        })
    }

    /// Single image, or a directory of frames.
    pub fn open_path(path: &Path) -> TrackResult<Self> {
        if path.is_dir() {
            return Self::open(path);
        }
        let img = image::open(path)?.to_rgb8();
        Ok(Self::from_frames(vec![img]))
    }

    pub fn from_frames(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: Frames::Memory(frames),
            next: 0,
            flip: false,
        }
    }

    pub fn len(&self) -> usize {
        match &self.frames {
            Frames::Files(f) => f.len(),
            Frames::Memory(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }

    /// Current frame; advances and wraps to the first frame after the last.
    pub fn next_frame(&mut self) -> TrackResult<Option<RgbImage>> {
        if self.is_empty() {
            return Ok(None);
        }
        let idx = self.next;
        self.next = (self.next + 1) % self.len();
        let frame = match &self.frames {
            Frames::Files(files) => {
                debug!("overlay: frame {idx} {}", files[idx].display());
                image::open(&files[idx])?.to_rgb8()
            }
            Frames::Memory(frames) => frames[idx].clone(),
        };
        Ok(Some(if self.flip {
            imageops::flip_horizontal(&frame)
        } else {
            frame
        }))
    }
}
