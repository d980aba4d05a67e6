use std::io;

use chrono::Local;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing with a timestamp-named log file under `~/.keybridge`.
///
/// The filter comes from `RUST_LOG`; setting `KEYBRIDGE_TRACE` enables
/// debug-level output when `RUST_LOG` is unset. Credential output on stdout
/// is never mixed with log output.
pub fn init_tracing() -> io::Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if std::env::var_os("KEYBRIDGE_TRACE").is_some() {
        EnvFilter::new("keybridge=debug,keybridge_core=debug")
    } else {
        EnvFilter::new("warn")
    };

    if let Some(home_dir) = dirs::home_dir() {
        let log_dir = home_dir.join(".keybridge");
        std::fs::create_dir_all(&log_dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let file_appender =
            tracing_appender::rolling::never(log_dir.clone(), format!("{timestamp}.log"));

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter);

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("tracing already initialized");
        }
    } else {
        // No home directory; log to stderr so stdout stays protocol-clean.
        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_ansi(false))
            .with(filter);

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            tracing::debug!("tracing already initialized");
        }
    }

    Ok(())
}
