use thiserror::Error;

/// Failures surfaced by the fetching, ledger and scrobbling layers.
///
/// Nothing in this crate retries on any of these. Re-running an overlapping
/// window later is safe because the ledger skips plays that were already
/// submitted.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to parse time '{0}'")]
    MalformedTime(String),

    #[error("failed to identify buildId for {0}")]
    BuildIdNotFound(String),

    #[error("failed to decode page: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Fetch(String),

    #[error("failed to scrobble {0}")]
    Submit(String),

    #[error("ledger I/O failed: {0}")]
    Ledger(#[from] std::io::Error),

    #[error("--from must be before --until")]
    InvalidWindow,

    #[error("invalid station '{0}'")]
    UnknownStation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
