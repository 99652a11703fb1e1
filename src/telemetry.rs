//! Tracing subscriber setup: env filter, pretty or JSON output, optional rolling file.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "stockroom=info,tower=warn";

/// Installs the global subscriber. Keep the returned guard alive for the
/// lifetime of the process, otherwise buffered file output is dropped.
pub fn init(format: LogFormat, log_dir: Option<&str>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match log_dir {
        Some(dir) => {
            let (file, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "stockroom.log"));
            let writer = std::io::stdout.and(file);
            match format {
                LogFormat::Json => builder.json().with_writer(writer).init(),
                LogFormat::Pretty => builder.with_ansi(false).with_writer(writer).init(),
            }
            Some(guard)
        }
        None => {
            match format {
                LogFormat::Json => builder.json().init(),
                LogFormat::Pretty => builder.init(),
            }
            None
        }
    }
}
