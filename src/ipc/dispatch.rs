use anyhow::{Context, Result, anyhow, bail};
use log::info;
use serde_json::{Value, json};
use std::sync::mpsc;
use std::time::Duration;

use super::pipeline::{FramePipeline, FrameRequest, new_session};
use super::runtime::socket_path;
use super::server::{IpcMsg, Reply, SharedState, read_shared, write_shared};
use crate::session::DisplayUpdate;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection request handler. Owns the connection's session, created on
/// the first session op from whatever profile is active at that moment.
pub struct ClientHandler {
    shared: SharedState,
    tx: mpsc::Sender<IpcMsg>,
    pipeline: Option<FramePipeline>,
}

fn opt_i64(req: &Value, key: &str) -> Option<i64> {
    req.get(key).and_then(Value::as_i64)
}

fn opt_f64(req: &Value, key: &str) -> Option<f64> {
    req.get(key).and_then(Value::as_f64)
}

impl ClientHandler {
    pub fn new(shared: SharedState, tx: mpsc::Sender<IpcMsg>) -> Self {
        Self {
            shared,
            tx,
            pipeline: None,
        }
    }

    /// Returns the response and whether the connection should close.
    pub fn handle_line(&mut self, line: &str) -> (Value, bool) {
        let req: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return (json!({"ok": false, "error": format!("bad request: {e}")}), false),
        };
        let op = req.get("op").and_then(Value::as_str).unwrap_or("");
        match self.handle(op, &req) {
            Ok(data) => (json!({"ok": true, "data": data}), op == "shutdown"),
            Err(e) => (json!({"ok": false, "error": format!("{e:#}")}), false),
        }
    }

    fn handle(&mut self, op: &str, req: &Value) -> Result<Value> {
        match op {
            "status" => Ok(self.status()),
            "reload" => self.ask(IpcMsg::Reload),
            "use" => {
                let name = req
                    .get("profile")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("use: missing 'profile'"))?
                    .to_string();
                self.ask(|reply| IpcMsg::UseProfile(name, reply))
            }
            "list" => {
                let s = read_shared(&self.shared);
                Ok(json!({"profiles": s.cfg.list_profiles(), "active": s.cfg.active_name}))
            }
            "doctor" => Ok(read_shared(&self.shared).cfg.doctor_report(&socket_path()?)),
            "shutdown" => {
                let _ = self.tx.send(IpcMsg::Shutdown);
                Ok(json!("shutting down"))
            }

            "frame" => {
                let req: FrameRequest =
                    serde_json::from_value(req.clone()).context("frame: bad request")?;
                self.pipeline()?.handle_frame(&req)
            }
            "reset" => {
                let p = self.pipeline()?;
                p.reset();
                Ok(json!({"lock_state": p.session().lock_state()}))
            }
            "set_adjustment" => {
                let s = self.pipeline()?.session_mut();
                s.set_adjustment(opt_i64(req, "brightness"), opt_i64(req, "saturation"));
                let d = s.settings().display;
                Ok(json!({"brightness": d.brightness, "saturation": d.saturation}))
            }
            "set_thresholds" => {
                let s = self.pipeline()?.session_mut();
                s.set_thresholds(opt_f64(req, "threshold_enter"), opt_f64(req, "threshold_exit"))?;
                let t = s.settings().tracking;
                Ok(json!({"threshold_enter": t.threshold_enter, "threshold_exit": t.threshold_exit}))
            }
            "set_display" => {
                let update: DisplayUpdate =
                    serde_json::from_value(req.clone()).context("set_display: bad request")?;
                let s = self.pipeline()?.session_mut();
                s.set_display(update);
                Ok(serde_json::to_value(s.settings().display)?)
            }
            "reset_config" => {
                let session = {
                    let s = read_shared(&self.shared);
                    new_session(&s.cfg, s.reference.clone())?
                };
                let p = self.pipeline()?;
                p.replace_session(session);
                Ok(serde_json::to_value(p.session().settings())?)
            }
            "" => bail!("missing 'op'"),
            other => bail!("unknown op: {other}"),
        }
    }

    fn status(&self) -> Value {
        let s = read_shared(&self.shared);
        let session = self.pipeline.as_ref().map(|p| {
            let s = p.session();
            json!({
                "lock_state": s.lock_state(),
                "good_frames": s.lock().good_frames(),
                "bad_frames": s.lock().bad_frames(),
                "grabbed": s.drag().grabbed,
                "frames": s.frames_processed(),
            })
        });
        json!({
            "active_profile": s.cfg.active_name,
            "socket": socket_path().ok(),
            "sessions": s.sessions,
            "reference_area": s.reference.area(),
            "session": session,
        })
    }

    /// Round-trips a profile change through the daemon's main loop.
    fn ask(&self, make: impl FnOnce(Reply) -> IpcMsg) -> Result<Value> {
        let (reply, rx) = mpsc::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| anyhow!("daemon is shutting down"))?;
        let name = rx
            .recv_timeout(REPLY_TIMEOUT)
            .context("no reply from daemon")?
            .map_err(|e| anyhow!(e))?;
        Ok(json!({"active_profile": name}))
    }

    fn pipeline(&mut self) -> Result<&mut FramePipeline> {
        if self.pipeline.is_none() {
            let session = {
                let s = read_shared(&self.shared);
                new_session(&s.cfg, s.reference.clone())?
            };
            let mut s = write_shared(&self.shared);
            s.sessions += 1;
            info!("session opened ({} live)", s.sessions);
            self.pipeline = Some(FramePipeline::new(session));
        }
        self.pipeline
            .as_mut()
            .ok_or_else(|| anyhow!("session unavailable"))
    }
}

impl Drop for ClientHandler {
    fn drop(&mut self) {
        if let Some(p) = &self.pipeline {
            let mut s = write_shared(&self.shared);
            s.sessions = s.sessions.saturating_sub(1);
            info!(
                "session closed after {} frames ({} live)",
                p.session().frames_processed(),
                s.sessions
            );
        }
    }
}
