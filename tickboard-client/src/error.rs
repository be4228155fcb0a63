use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("push connection failed: {0}")]
    Transport(String),

    #[error("malformed push message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("gave up reconnecting after {attempts} attempts")]
    Exhausted { attempts: u32 },
}
