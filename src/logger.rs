//! Colored stderr logger behind the `log` facade. The `Error: `,
//! `Warning: ` and `Info: ` prefixes are part of the output contract and
//! stay intact when colors are disabled.

use std::io::{self, Write};

use colored::Colorize;
use log::{Level, LevelFilter, Metadata, Record};

pub struct StderrLogger {
    max_level: LevelFilter,
}

impl StderrLogger {
    pub fn new(quiet: bool) -> Self {
        let max_level = if quiet {
            LevelFilter::Warn
        } else {
            LevelFilter::Info
        };
        Self { max_level }
    }

    pub fn init(self) {
        let max_level = self.max_level;
        log::set_boxed_logger(Box::new(self)).expect("failed to initialize logger");
        log::set_max_level(max_level);
    }
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match record.level() {
                Level::Error => eprintln!(
                    "{} {}",
                    "Error:".red().bold(),
                    format!("{}", record.args()).red().bold()
                ),
                Level::Warn => eprintln!(
                    "{} {}",
                    "Warning:".yellow().bold(),
                    format!("{}", record.args()).yellow()
                ),
                _ => eprintln!("{} {}", "Info:".blue(), record.args()),
            }
        }
        self.flush();
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
