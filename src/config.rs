use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{TrackError, TrackResult};
use crate::overlay::OverlaySource;
use crate::reference::ReferenceShape;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Assets {
    pub reference_image: PathBuf,
    #[serde(default)]
    pub overlay_frames: Option<PathBuf>,
}

/// Contour filters and the lock hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingThresholds {
    pub threshold_enter: f64,
    pub threshold_exit: f64,
    pub enter_run_length: u32,
    pub exit_run_length: u32,
    pub permanent_activation_secs: f64,
    pub min_contour_area: f64,
    pub max_area_fraction: f64,
    pub min_aspect: f32,
    pub max_aspect: f32,
}

impl Default for TrackingThresholds {
    fn default() -> Self {
        Self {
            threshold_enter: 0.25,
            threshold_exit: 0.50,
            enter_run_length: 12,
            exit_run_length: 8,
            permanent_activation_secs: 3.0,
            min_contour_area: 2000.0,
            max_area_fraction: 0.5,
            min_aspect: 0.5,
            max_aspect: 2.0,
        }
    }
}

impl TrackingThresholds {
    pub fn validate(&self) -> TrackResult<()> {
        if !(self.threshold_enter > 0.0 && self.threshold_exit > 0.0) {
            return Err(TrackError::invalid_config(
                "tracking thresholds must be positive",
            ));
        }
        if self.threshold_enter >= self.threshold_exit {
            return Err(TrackError::invalid_config(format!(
                "threshold_enter ({}) must be smaller than threshold_exit ({})",
                self.threshold_enter, self.threshold_exit
            )));
        }
        if self.enter_run_length == 0 || self.exit_run_length == 0 {
            return Err(TrackError::invalid_config("run lengths must be at least 1"));
        }
        if self.permanent_activation_secs < 0.0 {
            return Err(TrackError::invalid_config(
                "permanent_activation_secs must not be negative",
            ));
        }
        if !(self.max_area_fraction > 0.0 && self.max_area_fraction <= 1.0) {
            return Err(TrackError::invalid_config(
                "max_area_fraction must be in (0,1]",
            ));
        }
        if self.min_contour_area < 0.0 {
            return Err(TrackError::invalid_config("min_contour_area must not be negative"));
        }
        if !(self.min_aspect > 0.0 && self.min_aspect <= self.max_aspect) {
            return Err(TrackError::invalid_config(
                "aspect bounds must satisfy 0 < min_aspect <= max_aspect",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Smoothing {
    pub alpha: f64,
    pub alpha_frame: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            alpha_frame: 0.5,
        }
    }
}

/// Margins around the reference silhouette's bounding box, in reference pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameMargins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for FrameMargins {
    fn default() -> Self {
        Self {
            top: 100.0,
            bottom: 38.0,
            left: 207.0,
            right: 200.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DragSettings {
    pub smoothing: f32,
}

impl Default for DragSettings {
    fn default() -> Self {
        Self { smoothing: 0.3 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GestureThresholds {
    /// Thumb-index pixel distance below which a pinch can start.
    pub pinch_threshold: f32,
    /// Thumb-index pixel distance above which an active pinch ends.
    pub pinch_release_distance: f32,
    pub tap_cooldown_frames: u32,
    /// Normalised |tip.x - mcp.x| above which the thumb counts as extended.
    pub thumb_extended_min: f32,
    /// Normalised |tip.x - mcp.x| below which the thumb counts as folded.
    pub thumb_folded_max: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            pinch_threshold: 50.0,
            pinch_release_distance: 300.0,
            tap_cooldown_frames: 15,
            thumb_extended_min: 0.05,
            thumb_folded_max: 0.08,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Display {
    pub brightness: i32,
    pub saturation: i32,
    pub mirror: bool,
    pub white_background: bool,
    pub flip_overlay: bool,
    pub overlay_enabled: bool,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            brightness: 0,
            saturation: 0,
            mirror: true,
            white_background: false,
            flip_overlay: false,
            overlay_enabled: true,
        }
    }
}

impl Display {
    pub fn set_adjustment(&mut self, brightness: Option<i64>, saturation: Option<i64>) {
        if let Some(b) = brightness {
            self.brightness = b.clamp(-100, 100) as i32;
        }
        if let Some(s) = saturation {
            self.saturation = s.clamp(-100, 100) as i32;
        }
    }
}

/// Everything one session needs, copied out of the active profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct SessionSettings {
    pub tracking: TrackingThresholds,
    pub smoothing: Smoothing,
    pub frame_margins: FrameMargins,
    pub drag: DragSettings,
    pub gestures: GestureThresholds,
    pub display: Display,
}

impl SessionSettings {
    pub fn validate(&self) -> TrackResult<()> {
        self.tracking.validate()?;
        let unit = |v: f64| v > 0.0 && v <= 1.0;
        if !unit(self.smoothing.alpha) || !unit(self.smoothing.alpha_frame) {
            return Err(TrackError::invalid_config("smoothing alphas must be in (0,1]"));
        }
        if !unit(self.drag.smoothing as f64) {
            return Err(TrackError::invalid_config("drag.smoothing must be in (0,1]"));
        }
        let m = &self.frame_margins;
        if m.top < 0.0 || m.bottom < 0.0 || m.left < 0.0 || m.right < 0.0 {
            return Err(TrackError::invalid_config("frame margins must not be negative"));
        }
        let g = &self.gestures;
        if g.pinch_threshold <= 0.0 || g.pinch_release_distance <= g.pinch_threshold {
            return Err(TrackError::invalid_config(
                "gestures: need 0 < pinch_threshold < pinch_release_distance",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    pub meta: Meta,
    pub assets: Assets,
    #[serde(default)]
    pub tracking: TrackingThresholds,
    #[serde(default)]
    pub smoothing: Smoothing,
    #[serde(default)]
    pub frame_margins: FrameMargins,
    #[serde(default)]
    pub drag: DragSettings,
    #[serde(default)]
    pub gestures: GestureThresholds,
    #[serde(default)]
    pub display: Display,
}

impl Profile {
    pub fn settings(&self) -> SessionSettings {
        SessionSettings {
            tracking: self.tracking,
            smoothing: self.smoothing,
            frame_margins: self.frame_margins,
            drag: self.drag,
            gestures: self.gestures,
            display: self.display,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("puppetctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_or_install_in(config_dir()?)
    }

    pub fn load_or_install_in(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.active_path())?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    /// Relative asset paths are taken from the config directory.
    pub fn resolve_asset(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    pub fn reference_path(&self) -> PathBuf {
        self.resolve_asset(&self.profile.assets.reference_image)
    }

    pub fn overlay_dir(&self) -> Option<PathBuf> {
        self.profile
            .assets
            .overlay_frames
            .as_deref()
            .map(|p| self.resolve_asset(p))
    }

    pub fn load_reference(&self) -> Result<ReferenceShape> {
        Ok(ReferenceShape::load(&self.reference_path())?)
    }

    pub fn doctor_report(&self, socket: &Path) -> serde_json::Value {
        let reference = self.reference_path();
        let reference_status = match ReferenceShape::load(&reference) {
            Ok(r) => serde_json::json!({"ok": true, "area": r.area()}),
            Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
        };
        let overlay_frames = self
            .overlay_dir()
            .and_then(|d| OverlaySource::open(&d).ok())
            .map(|src| src.len());
        serde_json::json!({
            "user": whoami::username(),
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "socket": socket,
            "reference_image": reference,
            "reference": reference_status,
            "overlay_frames": overlay_frames,
            "hints": {
                "reference": "set [assets].reference_image to a high-contrast silhouette on a plain background",
                "overlay": "set [assets].overlay_frames to a directory of numbered frame images"
            }
        })
    }
}

pub fn load_profile(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut profile: Profile =
        toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    validate_profile(&mut profile)
        .with_context(|| format!("invalid profile {}", path.display()))?;
    Ok(profile)
}

fn validate_profile(p: &mut Profile) -> Result<()> {
    if p.assets.reference_image.as_os_str().is_empty() {
        return Err(anyhow!("assets.reference_image must be set"));
    }
    // out-of-range display values are clamped, not rejected
    let (b, s) = (p.display.brightness as i64, p.display.saturation as i64);
    p.display.set_adjustment(Some(b), Some(s));
    p.settings().validate()?;
    Ok(())
}
