use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("session id or token empty")]
    MissingCredentials,
    #[error("connection to session already created")]
    AlreadyConnected,
    #[error("no session: {0}")]
    NotConnected(String),
    #[error("cannot publish: session not connected or publisher already present")]
    CannotPublish,
    #[error("no publisher to unpublish")]
    NoPublisher,
    #[error("session error: {0}")]
    Session(String),
    #[error("publisher error: {0}")]
    Publisher(String),
    #[error("config error: {0}")]
    Config(String),
}
