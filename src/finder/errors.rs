use crate::jvm;

#[derive(Debug)]
pub enum Error {
    /// Pattern names something that is neither an instruction mnemonic nor an alias
    UnknownInstructionName(String),

    /// Pattern translated into an invalid regular expression (eg. unbalanced parentheses)
    InvalidPattern(regex::Error),

    /// A search was started from a byte offset that isn't the start of an instruction
    OffsetNotFound(usize),

    /// The code being searched could not be decoded
    Stream(jvm::Error),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Stream(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Error {
        Error::InvalidPattern(err)
    }
}
