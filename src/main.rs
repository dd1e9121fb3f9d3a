//! Attendify - course attendance with face verification
//!
//! Students check in with a photo; lecturers manage the roster and schedule.

use attendify::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Rustls 0.23+ needs a process-wide crypto provider for HTTPS.
    // An error only means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Initialize logging (WARN level by default, use RUST_LOG=info for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into())
        )
        .init();

    cli::run().await
}
