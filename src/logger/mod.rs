//! Channel-based file logger.
//!
//! Grounded in the teacher's `logger::logger_receiver::Logger` /
//! `logger::logger_sender::LoggerSender`: every worker thread gets a cloned
//! `LoggerSender`, all of them feeding one `mpsc::Sender<String>` drained by
//! a single dedicated thread that timestamps and appends lines to a per-run
//! log file.

mod error;
mod sender;

pub use error::LoggerError;
pub use sender::LoggerSender;

use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

const LOGGER_THREAD_NAME: &str = "logger";

#[derive(Debug)]
pub struct Logger {
    sender: LoggerSender,
}

impl Logger {
    /// Creates a new log file under `dir_path` and starts the receiver
    /// thread that drains it.
    pub fn new(dir_path: &Path) -> Result<Self, LoggerError> {
        let (sender, receiver): (Sender<String>, Receiver<String>) = channel();

        let file = Self::create_log_file(dir_path)?;
        Self::spawn_log_receiver(receiver, file)?;

        Ok(Self {
            sender: LoggerSender::new(sender),
        })
    }

    pub fn new_sender(&self) -> LoggerSender {
        self.sender.clone()
    }

    fn spawn_log_receiver(receiver: Receiver<String>, mut file: File) -> Result<(), LoggerError> {
        let builder = thread::Builder::new().name(LOGGER_THREAD_NAME.to_string());
        builder
            .spawn(move || {
                while let Ok(line) = receiver.recv() {
                    let timestamp = Local::now().format("[%Y/%m/%d %H:%M:%S]");
                    let formatted = format!("{} {}\n", timestamp, line);
                    if let Err(err) = file.write_all(formatted.as_bytes()) {
                        eprintln!("error writing to log file: {err}");
                    }
                }
            })
            .map_err(|_| LoggerError::SpawnThreadError)?;
        Ok(())
    }

    fn create_log_file(dir_path: &Path) -> Result<File, LoggerError> {
        fs::create_dir_all(dir_path)
            .map_err(|_| LoggerError::BadLogPath(dir_path.display().to_string()))?;
        let name = format!("{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(true)
            .open(dir_path.join(name))
            .map_err(|_| LoggerError::BadLogPath(dir_path.display().to_string()))
    }
}
