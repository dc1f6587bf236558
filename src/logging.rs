use env_logger::{Builder, Env};

/// `PUPPETCTL_LOG` wins over `RUST_LOG`; both default to `info`.
pub fn init() {
    let env = if std::env::var_os("PUPPETCTL_LOG").is_some() {
        Env::new().filter("PUPPETCTL_LOG")
    } else {
        Env::default()
    };
    Builder::from_env(env.default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
