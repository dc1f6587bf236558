//! Unix-socket daemon: one thread and one tracking session per connection.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use pipeline::{process_once, replay};
pub use runtime::socket_path;
pub use server::{client_request, run_daemon};
