use super::error::LoggerError;
use std::sync::mpsc::Sender;

/// A cloneable handle onto a `Logger`'s channel. Every peer session and the
/// swarm driver hold one.
#[derive(Debug, Clone)]
pub struct LoggerSender {
    sender: Sender<String>,
}

impl LoggerSender {
    pub fn new(sender: Sender<String>) -> Self {
        Self { sender }
    }

    pub fn info(&self, message: &str) -> Result<(), LoggerError> {
        self.send(&format!("[INFO] {}", message))
    }

    pub fn warn(&self, message: &str) -> Result<(), LoggerError> {
        self.send(&format!("[WARN] {}", message))
    }

    pub fn error(&self, message: &str) -> Result<(), LoggerError> {
        self.send(&format!("[ERROR] {}", message))
    }

    fn send(&self, line: &str) -> Result<(), LoggerError> {
        self.sender
            .send(line.to_string())
            .map_err(|_| LoggerError::SendError(line.to_string()))
    }
}
