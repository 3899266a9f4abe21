use clap::ValueEnum;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogLevel {
    No,
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::No => None,
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Warning => Some(Level::WARN),
            LogLevel::Error => Some(Level::ERROR),
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(LevelFilter::from_level(level).into())
}

/// Installs the global subscriber.
///
/// An empty `log_file` logs to stdout. Otherwise lines go to a daily rolling
/// file and the returned guard must outlive the program, or buffered lines
/// are lost on exit.
pub fn init_logger(
    log_level: LogLevel,
    log_file: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = log_level.to_tracing_level()?;
    let env_filter = build_filter(level);

    if !log_file.is_empty() {
        let path = Path::new(log_file);
        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().unwrap_or(path.as_os_str());

        let file_appender = rolling::daily(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(env_filter)
            .with_file(false)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Couldn't install file log subscriber");

        //We need to keep the worker guard alive
        Some(guard)
    } else {
        let subscriber = fmt()
            .with_writer(io::stdout)
            .with_env_filter(env_filter)
            .with_file(false)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Couldn't install stdout log subscriber");
        None
    }
}
