/// Initializes the tracing/logging infrastructure for the application.
///
/// This sets up structured logging using the `tracing` crate with
/// environment-based filtering, so kernel scheduling decisions (macrosteps,
/// microsteps, action execution, dead letters) can be inspected without
/// recompiling.
///
/// # Environment Variables
///
/// Set `RUST_LOG` to control log verbosity:
/// - `RUST_LOG=info` - Actor lifecycle events (started, disposed)
/// - `RUST_LOG=debug` - Event processing, spawns, dead letters
/// - `RUST_LOG=trace` - Every microstep and action execution (very verbose)
/// - `RUST_LOG=actor_core=debug` - Debug only for this crate
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing() {
    // Initialize the tracing subscriber with environment-based filtering
    // This allows users to control log levels via the RUST_LOG env var
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
