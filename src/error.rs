use thiserror::Error;

/// Errors raised inside the extraction pipeline.
///
/// Only `Parse` ever leaves `extract_record`; the other variants are
/// recovered where they occur and exist so the recovery is explicit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The named header is absent from the message.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// Bytes could not be decoded cleanly under the named charset.
    #[error("could not decode bytes as {charset}")]
    DecodeFailure { charset: String },

    /// The input is not an RFC 5322 message at all.
    #[error("unparseable message: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
