use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid address: {0}")]
    Resolve(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Publisher error: {0}")]
    Publisher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
