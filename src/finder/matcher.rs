use crate::finder::{alphabet, CompiledPattern, InstructionHandle};
use crate::jvm::Opcode;
use byteorder::{BigEndian, ByteOrder};

/// Contiguous run of instructions matching a pattern
#[derive(Copy, Clone, Debug)]
pub struct Match<'a> {
    handles: &'a [InstructionHandle],
    code: &'a [u8],
    index: usize,
}

impl<'a> Match<'a> {
    pub fn new(handles: &'a [InstructionHandle], code: &'a [u8], index: usize) -> Match<'a> {
        Match {
            handles,
            code,
            index,
        }
    }

    pub fn handles(&self) -> &'a [InstructionHandle] {
        self.handles
    }

    /// Number of matched instructions
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Index of the first matched instruction among all instructions of the method
    pub fn index(&self) -> usize {
        self.index
    }

    /// Byte offset of the first matched instruction
    pub fn start(&self) -> usize {
        self.handles.first().map_or(0, |handle| handle.start())
    }

    /// Byte offset right after the last matched instruction
    pub fn end(&self) -> usize {
        self.handles.last().map_or(0, |handle| handle.end())
    }

    /// Total length in bytes of the matched instructions
    pub fn byte_length(&self) -> usize {
        self.handles.iter().map(InstructionHandle::length).sum()
    }

    pub fn instruction(&self, idx: usize) -> Option<&'a InstructionHandle> {
        self.handles.get(idx)
    }

    pub fn opcodes(&self) -> impl Iterator<Item = Opcode> + 'a {
        self.handles.iter().map(InstructionHandle::opcode)
    }

    /// Raw bytes (opcode and operands) of one matched instruction
    pub fn bytes(&self, idx: usize) -> Option<&'a [u8]> {
        let handle = self.handles.get(idx)?;
        self.code.get(handle.start()..handle.end())
    }

    /// First two operand bytes of one matched instruction
    ///
    /// For field, method, and class instructions, this is the constant pool index.
    pub fn operand_u16(&self, idx: usize) -> Option<u16> {
        self.bytes(idx)?.get(1..3).map(BigEndian::read_u16)
    }
}

/// Extra check on a match, for conditions that can't be expressed in the pattern
pub trait Constraint {
    /// Should this candidate be accepted?
    fn check(&self, candidate: &Match<'_>) -> bool;
}

impl<F> Constraint for F
where
    F: Fn(&Match<'_>) -> bool,
{
    fn check(&self, candidate: &Match<'_>) -> bool {
        self(candidate)
    }
}

/// Lazy sequence of non-overlapping matches, from left to right
///
/// A candidate rejected by the constraint is skipped, and the search resumes right after it.
pub struct Matches<'a> {
    handles: &'a [InstructionHandle],
    encoded: &'a str,
    code: &'a [u8],
    pattern: &'a CompiledPattern,
    constraint: Option<&'a dyn Constraint>,

    /// Instruction index where the next search starts
    next_start: usize,
}

impl<'a> Matches<'a> {
    pub(crate) fn new(
        handles: &'a [InstructionHandle],
        encoded: &'a str,
        code: &'a [u8],
        pattern: &'a CompiledPattern,
        constraint: Option<&'a dyn Constraint>,
        start: usize,
    ) -> Matches<'a> {
        Matches {
            handles,
            encoded,
            code,
            pattern,
            constraint,
            next_start: start,
        }
    }
}

impl<'a> Iterator for Matches<'a> {
    type Item = Match<'a>;

    fn next(&mut self) -> Option<Match<'a>> {
        while self.next_start < self.handles.len() {
            let found = self
                .pattern
                .regex()
                .find_at(self.encoded, alphabet::byte_position(self.next_start))?;
            let from = alphabet::instruction_position(found.start());
            let to = alphabet::instruction_position(found.end());

            // Empty matches select no instructions
            if from == to {
                self.next_start = from + 1;
                continue;
            }
            self.next_start = to;

            let candidate = Match::new(&self.handles[from..to], self.code, from);
            let accepted = self
                .constraint
                .map_or(true, |constraint| constraint.check(&candidate));
            log::trace!(
                "Candidate match at {} ({} instructions) {}",
                candidate.start(),
                candidate.len(),
                if accepted { "accepted" } else { "rejected" }
            );
            if accepted {
                return Some(candidate);
            }
        }
        None
    }
}
