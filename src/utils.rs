use anyhow::Result;
use std::io::Write;
use log::{LevelFilter, Record};
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use chrono::{DateTime, Local};

// File logger for the binary; without a file, logging goes through env_logger on stderr.

pub struct FileLogger {
    log_file: Mutex<File>,
}

impl FileLogger {
    pub fn new(log_file_path: &str) -> Result<Self> {
        let log_file = OpenOptions::new().create(true).append(true).open(log_file_path)?;
        Ok(FileLogger { log_file: Mutex::new(log_file) })
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now: DateTime<Local> = Local::now();
            let log_message = format!(
                "[{}] {} [{}:{}] {}\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            );

            if let Ok(mut file) = self.log_file.lock() {
                let _ = file.write_all(log_message.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.log_file.lock() {
            let _ = file.flush();
        }
    }
}

pub fn setup_logging(log_file: Option<&str>, level: LevelFilter) -> Result<()> {
    match log_file {
        Some(path) => {
            let logger = FileLogger::new(path)?;
            log::set_boxed_logger(Box::new(logger))
                .map(|()| log::set_max_level(level))?;
        }
        None => {
            env_logger::Builder::new().filter_level(level).try_init()?;
        }
    }

    log::info!("Logging initialized at level: {}", level);
    log::info!("{} version {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Ok(())
}
