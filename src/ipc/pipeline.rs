use anyhow::{Context, Result};
use image::RgbImage;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use crate::config::DaemonConfigState;
use crate::overlay::{self, OverlaySource};
use crate::reference::ReferenceShape;
use crate::session::{FrameResult, Session};
use crate::tracker::{self, HandLandmarks, LandmarkSpace};

/// Raw hand landmarks as delivered by the landmark extractor.
#[derive(Debug, Default, Deserialize)]
pub struct HandsInput {
    #[serde(default)]
    pub hands: Vec<Vec<[f32; 2]>>,
    #[serde(default)]
    pub space: LandmarkSpace,
}

impl HandsInput {
    pub fn landmarks(&self, frame: (u32, u32)) -> Vec<HandLandmarks> {
        tracker::parse_hands(&self.hands, self.space, frame)
    }
}

/// Body of a `frame` request.
#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub image: PathBuf,
    #[serde(flatten)]
    pub hands: HandsInput,
    /// Defaults to time since the session started.
    pub elapsed_ms: Option<u64>,
    pub overlay: Option<PathBuf>,
    pub out: Option<PathBuf>,
}

pub fn new_session(cfg: &DaemonConfigState, reference: Arc<ReferenceShape>) -> Result<Session> {
    let mut session = Session::new(reference, cfg.profile.settings())?;
    if let Some(dir) = cfg.overlay_dir() {
        match OverlaySource::open(&dir) {
            Ok(src) => session.set_overlay(Some(src)),
            Err(e) => warn!("overlay unavailable: {e}"),
        }
    }
    Ok(session)
}

pub fn load_frame(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("cannot read frame {}", path.display()))?
        .to_rgb8())
}

fn frame_json(result: &FrameResult, out: Option<&Path>) -> Value {
    json!({
        "detection": result.detection,
        "hands": result.hands,
        "out": out,
    })
}

/// A session plus the clock and overlay bookkeeping of one client.
pub struct FramePipeline {
    session: Session,
    started: Instant,
    overlay_path: Option<PathBuf>,
}

impl FramePipeline {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            started: Instant::now(),
            overlay_path: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Restarts the dwell clock along with the session state.
    pub fn reset(&mut self) {
        self.session.reset();
        self.started = Instant::now();
    }

    pub fn replace_session(&mut self, session: Session) {
        self.session = session;
        self.overlay_path = None;
        self.started = Instant::now();
    }

    pub fn handle_frame(&mut self, req: &FrameRequest) -> Result<Value> {
        let frame = load_frame(&req.image)?;
        if let Some(p) = req.overlay.as_ref().filter(|p| self.overlay_path.as_ref() != Some(*p)) {
            let src = OverlaySource::open_path(p)
                .with_context(|| format!("cannot open overlay {}", p.display()))?;
            self.session.set_overlay(Some(src));
            self.overlay_path = Some(p.clone());
        }
        let hands = req.hands.landmarks(frame.dimensions());
        let now_ms = req
            .elapsed_ms
            .unwrap_or_else(|| self.started.elapsed().as_millis() as u64);
        self.run(frame, &hands, now_ms, req.out.as_deref())
    }

    fn run(
        &mut self,
        frame: RgbImage,
        hands: &[HandLandmarks],
        now_ms: u64,
        out: Option<&Path>,
    ) -> Result<Value> {
        let result = self.session.process(frame, hands, now_ms);
        if let Some(out) = out {
            let img = self.session.render(&result)?;
            img.save(out)
                .with_context(|| format!("cannot write {}", out.display()))?;
        }
        Ok(frame_json(&result, out))
    }
}

fn read_hands(path: &Path) -> Result<HandsInput> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("cannot read hands {}", path.display()))?;
    serde_json::from_str(&txt).with_context(|| format!("bad hands file {}", path.display()))
}

/// One line per frame; blank lines mean no hands for that frame.
fn read_hands_lines(path: &Path) -> Result<Vec<HandsInput>> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("cannot read hands {}", path.display()))?;
    txt.lines()
        .enumerate()
        .map(|(i, line)| {
            if line.trim().is_empty() {
                Ok(HandsInput::default())
            } else {
                serde_json::from_str(line)
                    .with_context(|| format!("{}:{}: bad hands line", path.display(), i + 1))
            }
        })
        .collect()
}

fn offline_pipeline(cfg: &DaemonConfigState, overlay: Option<&Path>) -> Result<FramePipeline> {
    let reference = Arc::new(cfg.load_reference()?);
    let mut session = new_session(cfg, reference)?;
    if let Some(p) = overlay {
        session.set_overlay(Some(OverlaySource::open_path(p)?));
    }
    Ok(FramePipeline::new(session))
}

/// Runs a single frame through a fresh session.
pub fn process_once(
    cfg: &DaemonConfigState,
    frame: &Path,
    hands: Option<&Path>,
    overlay: Option<&Path>,
    out: Option<&Path>,
) -> Result<Value> {
    let mut pipeline = offline_pipeline(cfg, overlay)?;
    let img = load_frame(frame)?;
    let hands = match hands {
        Some(p) => read_hands(p)?.landmarks(img.dimensions()),
        None => Vec::new(),
    };
    pipeline.run(img, &hands, 0, out)
}

/// Runs every frame in `dir` through one session, timestamped at `fps`.
pub fn replay(
    cfg: &DaemonConfigState,
    dir: &Path,
    hands: Option<&Path>,
    fps: f64,
    out_dir: Option<&Path>,
    mut emit: impl FnMut(&Value),
) -> Result<usize> {
    let frames = overlay::frame_files(dir)?;
    let hands = match hands {
        Some(p) => read_hands_lines(p)?,
        None => Vec::new(),
    };
    if let Some(d) = out_dir {
        fs::create_dir_all(d)?;
    }
    let mut pipeline = offline_pipeline(cfg, None)?;
    let frame_ms = 1000.0 / fps.max(1e-3);

    for (i, path) in frames.iter().enumerate() {
        let img = load_frame(path)?;
        let landmarks = hands
            .get(i)
            .map(|h| h.landmarks(img.dimensions()))
            .unwrap_or_default();
        let out = out_dir.map(|d| d.join(format!("{i:05}.png")));
        let now_ms = (i as f64 * frame_ms).round() as u64;
        let v = pipeline.run(img, &landmarks, now_ms, out.as_deref())?;
        emit(&v);
    }
    info!("replay: {} frames from {}", frames.len(), dir.display());
    Ok(frames.len())
}
