use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no recipients resolved for notification")]
    NoRecipients,

    #[error("invalid email address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
