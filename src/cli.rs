use anyhow::{Result, anyhow};
use pico_args::Arguments;
use serde_json::{Value, json};
use std::{env, path::PathBuf, process::Command};

use crate::config::DaemonConfigState;
use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // `start` re-executes the binary with this flag
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }
    let wants_help = pargs.contains("-h") || pargs.contains("--help");
    let subcmd: Option<String> = pargs.free_from_str().ok();
    if wants_help || env::args().len() == 1 {
        match subcmd.as_deref() {
            Some(cmd) => print_subcmd_help(cmd),
            None => print_help(),
        }
        return Ok(());
    }

    match subcmd.as_deref() {
        Some("help") => {
            match pargs.free_from_str::<String>().ok() {
                Some(topic) => print_subcmd_help(&topic),
                None => print_help(),
            }
            Ok(())
        }

        Some("start") => {
            let child = Command::new(env::current_exe()?).arg("--daemon").spawn()?;
            println!("puppetctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(cmd @ ("stop" | "status" | "reload" | "list" | "doctor")) => {
            let op = if cmd == "stop" { "shutdown" } else { cmd };
            daemon_request(json!({ "op": op }))
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: puppetctl use <profile_name>"))?;
            daemon_request(json!({ "op": "use", "profile": name }))
        }

        Some("process") => {
            let hands: Option<PathBuf> = pargs.opt_value_from_str("--hands")?;
            let overlay: Option<PathBuf> = pargs.opt_value_from_str("--overlay")?;
            let out: Option<PathBuf> = pargs.opt_value_from_str("--out")?;
            let frame: PathBuf = pargs.free_from_str().map_err(|_| {
                anyhow!("usage: puppetctl process <frame.png> [--hands f.json] [--overlay img] [--out o.png]")
            })?;
            let cfg = DaemonConfigState::load_or_install_default()?;
            let r = ipc::process_once(
                &cfg,
                &frame,
                hands.as_deref(),
                overlay.as_deref(),
                out.as_deref(),
            )?;
            print_response(&r);
            Ok(())
        }

        Some("replay") => {
            let hands: Option<PathBuf> = pargs.opt_value_from_str("--hands")?;
            let fps: f64 = pargs.opt_value_from_str("--fps")?.unwrap_or(30.0);
            let out: Option<PathBuf> = pargs.opt_value_from_str("--out")?;
            let dir: PathBuf = pargs.free_from_str().map_err(|_| {
                anyhow!("usage: puppetctl replay <frames_dir> [--hands f.jsonl] [--fps n] [--out dir]")
            })?;
            if fps.is_nan() || fps <= 0.0 {
                return Err(anyhow!("--fps must be positive"));
            }
            let cfg = DaemonConfigState::load_or_install_default()?;
            let n = ipc::replay(&cfg, &dir, hands.as_deref(), fps, out.as_deref(), |v| {
                println!("{v}");
            })?;
            eprintln!("puppetctl: replayed {n} frames");
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!(
        r#"puppetctl - silhouette tracker and AR compositor

USAGE:
  puppetctl help [command]                Show general or command-specific help
  puppetctl start                         Start the daemon
  puppetctl stop                          Stop the daemon
  puppetctl status                        Show daemon state
  puppetctl reload                        Reload active profile
  puppetctl use <name>                    Switch active profile
  puppetctl list                          List profiles
  puppetctl doctor                        Check reference image, overlay frames, paths
  puppetctl process <frame> [options]     Run one frame offline, print the result
  puppetctl replay <dir> [options]        Run a frame sequence through one session

TIPS:
  - Profiles: ~/.config/puppetctl/profiles
  - Active profile pointer: ~/.config/puppetctl/active
  - Socket: ~/.local/run/puppetctl.sock (one tracking session per connection)
  - Log level: PUPPETCTL_LOG or RUST_LOG (default info)
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: puppetctl start\nStarts the background daemon."),
        "stop" => println!("usage: puppetctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: puppetctl status\nShows active profile, socket, live sessions and reference area."
        ),
        "reload" => println!(
            "usage: puppetctl reload\nReloads the current profile and reference; keeps last good on error."
        ),
        "use" => {
            println!("usage: puppetctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: puppetctl list\nLists available profiles and the active one."),
        "doctor" => println!(
            "usage: puppetctl doctor\nValidates the reference silhouette, counts overlay frames, shows paths."
        ),
        "process" => println!(
            "usage: puppetctl process <frame.png> [--hands <file.json>] [--overlay <img|dir>] [--out <png>]\n\
             Runs one frame through a fresh session and prints detection and hand records."
        ),
        "replay" => println!(
            "usage: puppetctl replay <frames_dir> [--hands <file.jsonl>] [--fps <n>] [--out <dir>]\n\
             Runs every frame through one session (timestamps from --fps, default 30),\n\
             printing one JSON line per frame; --out writes composited frames."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn daemon_request(req: Value) -> Result<()> {
    let resp = ipc::client_request(req)?;
    print_response(&resp);
    if resp["ok"] == false {
        return Err(anyhow!("daemon: {}", resp["error"].as_str().unwrap_or("request failed")));
    }
    Ok(())
}

fn print_response(v: &Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
