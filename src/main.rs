mod cli;
mod collision;
mod compositor;
mod config;
mod contour;
mod drag;
mod error;
mod geometry;
mod gestures;
mod ipc;
mod lock;
mod logging;
mod matcher;
mod overlay;
mod pose;
mod reference;
mod session;
mod tracker;

#[cfg(test)]
mod testutil;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
