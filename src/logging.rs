use std::fs;

use time::UtcOffset;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOGGING_ENV_FILE: &str = "logging.env";

/// Keeps the background log writer alive; logs stop being written once this is dropped.
pub struct LoggingHandle {
    _non_blocking_guard: WorkerGuard,
}

/// Sends both `log` records and `tracing` events to stdout, filtered by the first line of
/// `logging.env` (or `RUST_LOG` / debug when that file is missing or invalid).
pub fn init_logging() -> Result<LoggingHandle, String> {
    tracing_log::LogTracer::init()
        .map_err(|err| format!("failed to route log records into tracing: {}", err))?;

    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or_else(|err| {
            eprintln!("Failed to get timezone: {}", err);
            UtcOffset::UTC
        }),
        time::macros::format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second] +[offset_hour]"
        ),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let env_filter = read_env_filter(LOGGING_ENV_FILE).unwrap_or_else(|err| {
        eprintln!(
            "Failed to read env filter, using environment variable or default: {}",
            err
        );
        EnvFilter::builder()
            .with_default_directive(Level::DEBUG.into())
            .from_env_lossy()
    });

    println!("Env Filter: {}", env_filter);

    let subscriber = tracing_subscriber::fmt()
        .with_timer(timer)
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| format!("failed to initialize logger: {}", err))?;

    Ok(LoggingHandle {
        _non_blocking_guard: guard,
    })
}

fn read_env_filter(file: &str) -> Result<EnvFilter, String> {
    let s = fs::read_to_string(file)
        .map_err(|err| format!("Failed to read file {} file: {}", file, err))?;
    let first_line = s.lines().next()
        .ok_or_else(|| format!("{} is empty", file))?;
    EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .parse(first_line)
        .map_err(|err| format!("Failed to parse env filter: {}", err))
}
