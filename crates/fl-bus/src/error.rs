/// Error type for the message bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Background channel closed")]
    ChannelClosed,
    #[error("Connection dropped")]
    Disconnected,
    #[error("Unknown message type: {0}")]
    UnknownMessage(String),
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Unexpected response")]
    UnexpectedResponse,
    #[error("Rule store failed: {0}")]
    RuleStore(String),
}
