use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("no enabled webhook trigger matches path {0:?}")]
    NoMatch(String),
    #[error("missing signature header {0:?}")]
    MissingSignature(String),
    #[error("signature verification failed")]
    BadSignature,
    #[error("webhook secret {0:?} is not configured")]
    UnknownSecret(String),
    #[error("input mapping failed: {0}")]
    InputMapping(String),
}
