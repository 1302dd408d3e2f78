use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid measurement: {0}")]
    InvalidInput(String),

    #[error("update produced an empty run set for stream {0}")]
    EmptyRunSet(String),

    #[error("event group spans multiple streams: {0}")]
    MultiStreamGroup(String),

    #[error("non-finite probability mass in run set for stream {0}")]
    ArithmeticSaturation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
