use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagSyncError {
    #[error("{0} is not installed")]
    CommandMissing(String),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{url} answered {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("tag {0} has no English name")]
    MissingEnglishName(String),

    #[error("filter file root is not an array")]
    NotAnArray,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
