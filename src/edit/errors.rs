use crate::edit::CompileError;
use crate::{finder, jvm};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Pattern names something that is neither an instruction mnemonic nor an alias
    UnknownInstructionName(String),

    /// Pattern is not a valid regular expression once names are translated
    InvalidPattern(regex::Error),

    /// The method body could not be decoded into instructions
    MalformedInstructionStream(jvm::Error),

    /// A search was asked to resume at an offset that isn't an instruction boundary
    OffsetNotFound(usize),

    /// The replacement statement was rejected by the statement compiler
    ReplacementCompileError(CompileError),

    /// The replacement could not be spliced in, or the resulting method body was rejected when
    /// rebuilding its verification metadata
    MalformedReplacementBytecode(jvm::Error),

    /// Match has no instruction at this index
    NoSuchInstruction(usize),

    /// A second structural edit was requested while handling the match at this offset
    MultipleEdits { position: usize },
}

impl From<finder::Error> for Error {
    fn from(err: finder::Error) -> Error {
        match err {
            finder::Error::UnknownInstructionName(name) => Error::UnknownInstructionName(name),
            finder::Error::InvalidPattern(err) => Error::InvalidPattern(err),
            finder::Error::OffsetNotFound(offset) => Error::OffsetNotFound(offset),
            finder::Error::Stream(err) => Error::MalformedInstructionStream(err),
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::MalformedInstructionStream(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Error {
        Error::ReplacementCompileError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownInstructionName(name) => write!(f, "instruction unknown: {}", name),
            Error::InvalidPattern(err) => write!(f, "invalid pattern: {}", err),
            Error::MalformedInstructionStream(err) => {
                write!(f, "malformed instruction stream: {}", err)
            }
            Error::OffsetNotFound(offset) => {
                write!(f, "cannot find instruction starting at offset {}", offset)
            }
            Error::ReplacementCompileError(err) => write!(f, "cannot compile replacement: {}", err),
            Error::MalformedReplacementBytecode(err) => {
                write!(f, "malformed replacement bytecode: {}", err)
            }
            Error::NoSuchInstruction(idx) => write!(f, "no instruction at index {}", idx),
            Error::MultipleEdits { position } => {
                write!(f, "match at {} was already replaced", position)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidPattern(err) => Some(err),
            Error::ReplacementCompileError(err) => Some(err),
            Error::MalformedInstructionStream(err) | Error::MalformedReplacementBytecode(err) => {
                Some(err)
            }
            _ => None,
        }
    }
}
