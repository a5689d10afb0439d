use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The instruction starting at this offset could not be decoded (unknown opcode, truncated
    /// operands, or a switch with a negative size)
    MalformedInstructionStream { offset: usize },

    /// A splice was requested over a range that doesn't start or end on an instruction boundary
    SpliceNotOnBoundary { offset: usize },

    /// Spliced bytes would put a `tableswitch` or `lookupswitch` at this offset, where its padding
    /// is wrong
    MisalignedSwitch { offset: usize },

    /// After a splice, the jump at this offset no longer fits in its 16-bit operand
    BranchOffsetOverflow { offset: usize, jump: isize },

    /// The method code has grown past the 65535 byte limit
    MethodCodeOverflow(usize),

    /// A branch at this offset targets something that is not the start of an instruction
    InvalidBranchTarget { offset: usize, target: isize },

    /// Exception handler (by position in the exception table) covers an invalid range
    InvalidExceptionHandler(usize),

    /// Method code must contain at least one instruction
    EmptyCode,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInstructionStream { offset } => {
                write!(f, "malformed instruction at offset {}", offset)
            }
            Error::SpliceNotOnBoundary { offset } => {
                write!(f, "offset {} is not an instruction boundary", offset)
            }
            Error::MisalignedSwitch { offset } => {
                write!(f, "switch spliced in at misaligned offset {}", offset)
            }
            Error::BranchOffsetOverflow { offset, jump } => write!(
                f,
                "jump of {} at offset {} does not fit in 16 bits",
                jump, offset
            ),
            Error::MethodCodeOverflow(length) => {
                write!(f, "method code is {} bytes long (limit is 65535)", length)
            }
            Error::InvalidBranchTarget { offset, target } => write!(
                f,
                "branch at offset {} targets {}, which is not an instruction",
                offset, target
            ),
            Error::InvalidExceptionHandler(index) => {
                write!(f, "exception handler {} covers an invalid range", index)
            }
            Error::EmptyCode => f.write_str("method code is empty"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_names_offsets() {
        assert_eq!(
            Error::SpliceNotOnBoundary { offset: 3 }.to_string(),
            "offset 3 is not an instruction boundary"
        );
        assert_eq!(
            Error::MisalignedSwitch { offset: 5 }.to_string(),
            "switch spliced in at misaligned offset 5"
        );
        assert_eq!(Error::EmptyCode.to_string(), "method code is empty");
    }
}
