#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("store at {host}:{port} unavailable while running '{command}': {source}")]
    Transport {
        host: String,
        port: u16,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The store answered with an error or with a reply of the wrong shape.
    /// Holds the store's reply text verbatim.
    #[error("{0}")]
    Store(String),

    #[error("{0}")]
    BadRequest(String),
}

impl GatewayError {
    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Transport { .. } => 503,
            GatewayError::Store(_) | GatewayError::BadRequest(_) => 400,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
