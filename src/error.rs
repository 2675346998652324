use thiserror::Error;

/// Errors surfaced by the link layer.
///
/// Constructor errors ([`LinkError::InvalidUri`], [`LinkError::DeviceNotPresent`])
/// are fatal to the connection being built. Everything else that happens on
/// the wire (USB transport hiccups, missing acks) is absorbed by the
/// [`crate::dongle_worker::DongleWorker`] and only surfaces once it gives up
/// on the dongle.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("device {0} not present")]
    DeviceNotPresent(usize),

    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("device lost")]
    DeviceLost,

    #[error("payload too large: {0} bytes (max 30)")]
    PayloadTooLarge(usize),

    #[error("send queue bound exceeded (limit {limit})")]
    QueueBoundExceeded { limit: usize },

    #[error("no dongle available")]
    NoDongleAvailable,
}

pub type Result<T> = std::result::Result<T, LinkError>;
