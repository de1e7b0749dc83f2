use feedlens_core::Analysis;
use thiserror::Error;

/// Outcome of asking a classifier about a piece of text.
///
/// Matched exhaustively at the call site: `Scored` is final, `Unavailable`
/// means "use the fallback".
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Scored(Analysis),
    Unavailable(UnavailableReason),
}

impl Classification {
    pub fn is_scored(&self) -> bool {
        matches!(self, Classification::Scored(_))
    }
}

/// Why the external classifier could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnavailableReason {
    #[error("classifier disabled")]
    Disabled,

    #[error("classifier request timed out")]
    Timeout,

    #[error("classifier rejected credentials")]
    Unauthorized,

    #[error("classifier returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

/// Construction-time failures (the only errors this crate returns).
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to build http client: {0}")]
    Client(String),
}
