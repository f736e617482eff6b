use shared::{RemoteError, ValidationError};

/// Failures seen by the client
///
/// `Io`, `Codec` and `Timeout` are transport failures: the client keeps its
/// last confirmed board and tries again on the next poll. `Remote` is a typed
/// refusal from the server and is shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("no reply from server within {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("client is not seated in a game")]
    NotSeated,
}

impl From<ValidationError> for ClientError {
    fn from(error: ValidationError) -> Self {
        ClientError::Remote(error.into())
    }
}

impl ClientError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::Codec(_) | ClientError::Timeout(_)
        )
    }
}
