use super::GlobalConfig;
use super::planning::PlanningLogLevel;
use core::fmt::Display;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Configuration for logging in tileflow, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Routes planning messages to every output enabled in the global configuration.
#[derive(Debug)]
pub struct Logger {
    loggers: Vec<LoggerKind>,
    config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new `Logger` instance based on the global configuration.
    ///
    /// Note that creating a logger opens the log file, if one is configured.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Creates a logger from an explicit configuration, bypassing the global one.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut loggers = Vec::new();
        let logger = &config.planning.logger;

        if logger.level != PlanningLogLevel::Disabled {
            if let Some(path) = &logger.file {
                match FileLogger::new(path, logger.append) {
                    Ok(file) => loggers.push(LoggerKind::File(file)),
                    Err(err) => log::warn!("Unable to open log file {}: {err}", path.display()),
                }
            }
            if logger.stdout {
                loggers.push(LoggerKind::Stdout);
            }
            if logger.stderr {
                loggers.push(LoggerKind::Stderr);
            }
            if let Some(level) = logger.log {
                loggers.push(LoggerKind::Log(level));
            }
        }

        Self { loggers, config }
    }

    /// Logs a message for planning, directing it to all configured planning loggers.
    pub fn log_planning<S: Display>(&mut self, msg: &S) {
        if self.loggers.len() > 1 {
            let msg = msg.to_string();
            for logger in self.loggers.iter_mut() {
                logger.log(&msg);
            }
        } else if let Some(logger) = self.loggers.first_mut() {
            logger.log(msg);
        }
    }

    /// Returns the current planning log level from the configuration.
    pub fn log_level_planning(&self) -> PlanningLogLevel {
        self.config.planning.logger.level
    }

    /// Whether at least one output would receive planning messages.
    pub fn is_enabled(&self) -> bool {
        !self.loggers.is_empty()
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    File(FileLogger),

    /// Logs to standard output.
    Stdout,

    /// Logs to standard error.
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            LoggerKind::File(file_logger) => file_logger.log(msg),
            LoggerKind::Stdout => println!("{msg}"),
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    fn new(path: &PathBuf, append: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    // Flushed per message.
    fn log<S: Display>(&mut self, msg: &S) {
        if let Err(err) = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush()) {
            log::warn!("Unable to write planning log: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::planning::PlanningConfig;

    fn config_with(logger: LoggerConfig<PlanningLogLevel>) -> Arc<GlobalConfig> {
        Arc::new(GlobalConfig {
            planning: PlanningConfig {
                logger,
                ..Default::default()
            },
        })
    }

    #[test]
    fn disabled_level_registers_nothing() {
        let logger = Logger::from_config(config_with(LoggerConfig {
            stdout: true,
            ..Default::default()
        }));

        assert!(!logger.is_enabled());
    }

    #[test]
    fn file_logger_writes_messages() {
        let path = std::env::temp_dir().join(format!("tileflow-logger-{}.log", std::process::id()));
        let mut logger = Logger::from_config(config_with(LoggerConfig {
            file: Some(path.clone()),
            append: false,
            stderr: true,
            level: PlanningLogLevel::Basic,
            ..Default::default()
        }));

        logger.log_planning(&"planned 3 descriptors");
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(content, "planned 3 descriptors\n");
    }
}
