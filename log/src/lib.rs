use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber for a lark binary.
///
/// Logs go to stderr through a non blocking writer so a slow terminal
/// or pipe never stalls call handling. The level defaults to INFO and
/// can be changed with `RUST_LOG`.
pub fn init() {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    // the writer thread has to live for the whole process
    std::mem::forget(guard);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking)
                .compact(),
        )
        .init();
}
