use std::path::PathBuf;

use crate::types::RecipientId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why the transport refused a packet. Never fatal to the limiter.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient {0} is no longer connected")]
    Disconnected(RecipientId),
    #[error("transport rejected packet for {recipient}: {reason}")]
    Transport { recipient: RecipientId, reason: String },
}
