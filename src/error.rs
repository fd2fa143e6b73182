use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IbeError {
    #[error("unknown mission: {0}")]
    #[diagnostic(help("known missions: wise, twomass, ptf, ztf, atlas"))]
    UnknownMission(String),

    #[error("unknown {mission} data product: {key}")]
    UnknownProduct { mission: String, key: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidField { field: String, value: String },

    #[error("invalid world point: {0}")]
    InvalidWorldPt(String),

    #[error("query needs a position, a reference key or a where clause")]
    InvalidQuery,

    #[error("file path is required to build a data url")]
    MissingFilePath,

    #[error("multiple position queries need a file uploader and none is registered")]
    UploaderUnavailable,

    #[error("IBE request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("IBE response from {url} was cut short")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("IBE returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl IbeError {
    pub(crate) fn invalid(field: &str, value: &str) -> Self {
        IbeError::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn unknown_product(mission: &str, key: &str) -> Self {
        IbeError::UnknownProduct {
            mission: mission.to_string(),
            key: key.to_string(),
        }
    }
}
