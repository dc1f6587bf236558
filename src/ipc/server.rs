use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    fs,
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, mpsc},
    thread,
    time::Duration,
};

use super::dispatch::ClientHandler;
use super::runtime::socket_path;
use crate::config::DaemonConfigState;
use crate::reference::ReferenceShape;

/// Daemon-wide state. Sessions copy what they need when they are created.
pub struct Shared {
    pub cfg: DaemonConfigState,
    pub reference: Arc<ReferenceShape>,
    pub sessions: usize,
}

pub type SharedState = Arc<RwLock<Shared>>;

pub fn read_shared(s: &SharedState) -> RwLockReadGuard<'_, Shared> {
    s.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write_shared(s: &SharedState) -> RwLockWriteGuard<'_, Shared> {
    s.write().unwrap_or_else(|e| e.into_inner())
}

pub type Reply = mpsc::Sender<Result<String, String>>;

pub enum IpcMsg {
    Reload(Reply),
    UseProfile(String, Reply),
    ProfileChanged(PathBuf),
    Shutdown,
}

pub fn run_daemon() -> Result<()> {
    let sock = socket_path()?;
    if sock.exists() {
        let _ = fs::remove_file(&sock);
    }

    let cfg = DaemonConfigState::load_or_install_default()?;
    let reference = Arc::new(
        cfg.load_reference()
            .context("cannot start without a reference silhouette")?,
    );
    info!("daemon: active profile '{}'", cfg.active_name);

    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    spawn_signal_thread(tx_req.clone())?;
    let _watcher = match watch_profiles(&cfg.profiles_dir, tx_req.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile watch disabled: {e}");
            None
        }
    };

    let shared: SharedState = Arc::new(RwLock::new(Shared {
        cfg,
        reference,
        sessions: 0,
    }));

    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let shared = shared.clone();
                let tx = tx_req.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, shared, tx) {
                        error!("ipc client error: {e:#}");
                    }
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }

        let mut watched_change = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let _ = reply.send(swap_profile(&shared, None).map_err(|e| format!("{e:#}")));
                }
                IpcMsg::UseProfile(name, reply) => {
                    let r = swap_profile(&shared, Some(&name)).map_err(|e| format!("{e:#}"));
                    let _ = reply.send(r);
                }
                IpcMsg::ProfileChanged(path) => {
                    watched_change |= path == read_shared(&shared).cfg.active_path();
                }
                IpcMsg::Shutdown => {
                    let _ = fs::remove_file(&sock);
                    info!("daemon: stopped");
                    return Ok(());
                }
            }
        }
        if watched_change {
            if let Err(e) = swap_profile(&shared, None) {
                error!("auto reload failed, keeping last good profile: {e:#}");
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

/// Reloads (or switches) the profile and its reference. Nothing changes on error.
fn swap_profile(shared: &SharedState, name: Option<&str>) -> Result<String> {
    let mut next = read_shared(shared).cfg.clone();
    match name {
        Some(n) => next.set_active(n)?,
        None => next.reload()?,
    }
    let reference = Arc::new(next.load_reference()?);
    let mut s = write_shared(shared);
    s.cfg = next;
    s.reference = reference;
    info!("profile '{}' loaded", s.cfg.active_name);
    Ok(s.cfg.active_name.clone())
}

fn spawn_signal_thread(tx: mpsc::Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: signal {sig}, shutting down");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

fn watch_profiles(dir: &Path, tx: mpsc::Sender<IpcMsg>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                for p in ev.paths {
                    let _ = tx.send(IpcMsg::ProfileChanged(p));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("profile watch: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("watching {}", dir.display());
    Ok(watcher)
}

fn handle_client(stream: UnixStream, shared: SharedState, tx: mpsc::Sender<IpcMsg>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut handler = ClientHandler::new(shared, tx);

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        let (resp, close) = handler.handle_line(&line);
        writeln!(writer, "{resp}")?;
        if close {
            return Ok(());
        }
    }
}

/// One request, one response line.
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "puppetctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(&sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    Ok(serde_json::from_str(&resp)?)
}
