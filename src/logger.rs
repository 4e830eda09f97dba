use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::Mutex;

/// Logger with the traditional devtools console style: green arrows for
/// progress messages, yellow/red arrows for warnings and errors, indented
/// arrows for everything more verbose.
pub struct BuildLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl BuildLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        Box::leak(Box::new(Self {
            level: Mutex::new(level),
            output: Mutex::new(Box::new(io::stderr())),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *self.level.lock().expect("Failed to lock level") = level;
    }
}

impl Log for BuildLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= *self.level.lock().expect("Failed to lock level")
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = match record.level() {
            Level::Error => format!(
                "{}{}",
                "==> ERROR: ".red().bold(),
                record.args().to_string().bold()
            ),
            Level::Warn => format!(
                "{}{}",
                "==> WARNING: ".yellow().bold(),
                record.args().to_string().bold()
            ),
            Level::Info => format!(
                "{}{}",
                "==> ".green().bold(),
                record.args().to_string().bold()
            ),
            Level::Debug => {
                format!("{}{}", "  -> ".blue().bold(), record.args())
            }
            Level::Trace => {
                format!("  -> {}: {}", record.target(), record.args())
                    .bright_black()
                    .to_string()
            }
        };

        let mut output = self.output.lock().expect("Failed to lock output");
        let _ = writeln!(output, "{}", line);
    }

    fn flush(&self) {
        let _ = self.output.lock().expect("Failed to lock output").flush();
    }
}
