use herald_shared::logging::env_filter;
use tracing::Level;

fn subscriber(default_directives: &str) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directives))
        .with_writer(std::io::sink)
        .finish()
}

// Both cases share one test because they change the process environment.
#[test]
fn test_default_directives_and_rust_log_override() {
    std::env::remove_var("RUST_LOG");
    tracing::subscriber::with_default(subscriber("herald=info,sqlx=warn"), || {
        assert!(tracing::enabled!(target: "herald_botserver::main", Level::INFO));
        assert!(tracing::enabled!(target: "herald::discord", Level::INFO));
        assert!(!tracing::enabled!(target: "herald_relayclient::client_socket", Level::DEBUG));
        assert!(!tracing::enabled!(target: "sqlx::query", Level::INFO));
        assert!(tracing::enabled!(target: "sqlx::pool", Level::WARN));
    });

    std::env::set_var("RUST_LOG", "herald=debug");
    tracing::subscriber::with_default(subscriber("herald=info,sqlx=warn"), || {
        assert!(tracing::enabled!(target: "herald_botserver::session", Level::DEBUG));
        assert!(!tracing::enabled!(target: "herald_botserver::session", Level::TRACE));
    });
    std::env::remove_var("RUST_LOG");
}
