//! Error types shared by every parser in the crate.
//!
//! Only `Error::Stream` is fatal. Everything in `ParsingError` is absorbed
//! where it happens: the offending line, address or encoding is skipped or
//! passed through, and the error is kept on the message as a defect.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to read message: {0}")]
    Stream(#[from] io::Error),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("no blank line separates the headers from the body")]
    MalformedMessage,
    #[error("not a header line: {0:?}")]
    InvalidHeader(String),
    #[error("invalid mailbox: {0:?}")]
    InvalidAddress(String),
    #[error("unsupported transfer encoding: {0:?}")]
    UnsupportedEncoding(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

pub type ParsingResult<T> = Result<T, ParsingError>;
