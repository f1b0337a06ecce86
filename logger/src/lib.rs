use chrono::Utc;
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
    White,
}

impl Color {
    fn to_ansi_code(self) -> &'static str {
        match self {
            Color::Red => "\x1b[31m",
            Color::Green => "\x1b[32m",
            Color::Blue => "\x1b[34m",
            Color::Yellow => "\x1b[33m",
            Color::Cyan => "\x1b[36m",
            Color::Magenta => "\x1b[35m",
            Color::White => "\x1b[37m",
        }
    }
}

/// A `tracing` layer that appends `[LEVEL] [timestamp]: message` lines to a
/// per-peer log file and optionally echoes them to the console.
#[derive(Debug, Clone)]
pub struct Logger {
    log_file: PathBuf,
    max_level: Level,
    console: Option<Color>,
}

impl Logger {
    /// Creates the log file `fs4_{peer}.log` inside `log_dir`, truncating any
    /// previous one.
    ///
    /// # Parameters
    /// - `log_dir`: An existing directory.
    /// - `peer`: Address of the peer whose traffic is logged.
    pub fn new(log_dir: &Path, peer: &str) -> Result<Self, LoggerError> {
        if !log_dir.is_dir() {
            return Err(LoggerError::InvalidPath(format!(
                "{} is not a directory",
                log_dir.display()
            )));
        }

        let sanitized_peer = peer.replace(':', "_");
        let log_file = log_dir.join(format!("fs4_{}.log", sanitized_peer));

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_file)?;

        Ok(Logger {
            log_file,
            max_level: Level::INFO,
            console: None,
        })
    }

    /// Also records events up to `level` (`DEBUG` includes every packet).
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    /// Echoes every line to stdout; info and below use `color`.
    pub fn with_console(mut self, color: Color) -> Self {
        self.console = Some(color);
        self
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    fn log(&self, level: &Level, message: &str) -> Result<(), LoggerError> {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let log_message = format!("[{}] [{}]: {}\n", level, timestamp, message);

        if let Some(color) = self.console {
            let colored_message = match *level {
                Level::ERROR => format!("\x1b[91m{}\x1b[0m", log_message),
                Level::WARN => format!("\x1b[93m{}\x1b[0m", log_message),
                _ => format!("{}{}\x1b[0m", color.to_ansi_code(), log_message),
            };
            print!("{}", colored_message);
            io::stdout().flush()?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        file.write_all(log_message.as_bytes())?;
        file.flush()?;

        Ok(())
    }
}

impl<S: Subscriber> Layer<S> for Logger {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if *level > self.max_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        // A layer has nowhere to report its own failures.
        let _ = self.log(level, &visitor.finish());
    }
}

/// Flattens an event into `message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("I/O Error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid Path: {0}")]
    InvalidPath(String),
}
