use std::{io, path::PathBuf};

use thiserror::Error;

use crate::response::Status;

/// Failures while reading a request off the wire.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("request head exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("request carries more than {0} headers")]
    TooManyHeaders(usize),

    #[error("unsupported protocol version {0:?}")]
    UnsupportedVersion(String),

    #[error("invalid Content-Length {0:?}")]
    InvalidContentLength(String),

    #[error("invalid chunk size line {0:?}")]
    InvalidChunk(String),

    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("connection closed in the middle of a request")]
    UnexpectedEof,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ParseError {
    /// Status sent back to the client before the connection is dropped.
    pub fn status(&self) -> Status {
        match self {
            ParseError::LineTooLong(_) => Status::REQUEST_URI_TOO_LARGE,
            ParseError::BodyTooLarge(_) => Status::REQUEST_ENTITY_TOO_LARGE,
            ParseError::UnsupportedVersion(_) => Status::HTTP_VERSION_NOT_SUPPORTED,
            _ => Status::BAD_REQUEST,
        }
    }

    /// True when the peer went away or idled out, in which case there is
    /// nobody to send an error page to.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ParseError::UnexpectedEof => true,
            ParseError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no handler module named {0:?}")]
    UnknownModule(String),

    #[error("invalid regex {pattern:?} in url rule: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("url rule of type {rule_type:?} is missing its {key:?} key")]
    MissingRuleKey { rule_type: String, key: &'static str },

    #[error("invalid value {value:?} for option {key:?}")]
    InvalidOption { key: String, value: String },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
