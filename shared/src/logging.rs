use time::macros::format_description;
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

/// `RUST_LOG` when it is set and parses, `default_directives` otherwise.
pub fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

pub fn init_logging(default_directives: &str) {
    let timer = UtcTime::new(format_description!("[day]-[month]-[year] [hour]:[minute]:[second]"));
    tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter(default_directives))
        .with_timer(timer)
        .init();
}
