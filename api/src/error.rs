use std::{fmt, io, num::ParseIntError, str::Utf8Error};

use http::header::ToStrError;

/// Failures surfaced by a [`PeopleRepository`](crate::repositories::PeopleRepository).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Cast to identifier failed for value \"{0}\"")]
    MalformedId(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request")]
    InvalidFormat,
    #[error("unsupported http version")]
    UnsupportedVersion,
    #[error("body of {0} bytes exceeds the allowed size")]
    BodyTooLarge(usize),
    #[error("request is not valid utf-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] ToStrError),
    #[error("invalid content length: {0}")]
    ContentLength(#[from] ParseIntError),
    #[error(transparent)]
    HttpError(#[from] http::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("failed to format response: {0}")]
    Format(#[from] fmt::Error),
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] ToStrError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
