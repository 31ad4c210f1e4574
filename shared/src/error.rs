use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("message body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("message body does not carry a product identifier")]
    EmptyProductId,

    #[error("consumer stream closed by the broker")]
    StreamClosed,
}
