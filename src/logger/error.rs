#[derive(Debug)]
pub enum LoggerError {
    SpawnThreadError,
    SendError(String),
    BadLogPath(String),
}
