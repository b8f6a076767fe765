//! Unified error type.

/// Failure returned by a handler. Anything a handler propagates with `?`
/// ends up here and is turned into a generic `500` at the dispatch boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by perch's fallible operations.
///
/// Application-level errors (404, 409, etc.) are expressed as
/// [`Envelope`](crate::Envelope) values, not as `Error`s. This type surfaces
/// infrastructure failures: a bad bind address, an unreadable config file,
/// or a socket that will not bind.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}
