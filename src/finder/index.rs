use crate::finder::alphabet;
use crate::jvm::code::decode_instructions;
use crate::jvm::{self, Opcode};

/// Position of one instruction in a code array
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstructionHandle {
    start: usize,
    end: usize,
    opcode: Opcode,
}

impl InstructionHandle {
    pub fn new(start: usize, end: usize, opcode: Opcode) -> InstructionHandle {
        InstructionHandle { start, end, opcode }
    }

    /// Byte offset of the opcode
    pub fn start(&self) -> usize {
        self.start
    }

    /// Byte offset right after the last operand (exclusive)
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn length(&self) -> usize {
        self.end - self.start
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }
}

/// Snapshot of the instruction boundaries of a code array, along with the encoding of the
/// instructions as a string (one alphabet character per instruction)
///
/// Nothing here tracks changes to the code: after splicing, build a fresh index.
#[derive(Clone, Debug, Default)]
pub struct InstructionIndex {
    handles: Vec<InstructionHandle>,
    encoded: String,
}

impl InstructionIndex {
    pub fn build(code: &[u8]) -> Result<InstructionIndex, jvm::Error> {
        let instructions = decode_instructions(code)?;
        let mut handles = Vec::with_capacity(instructions.len());
        let mut encoded = String::with_capacity(instructions.len() * alphabet::ENCODED_WIDTH);
        for (offset, _, insn) in instructions.iter() {
            handles.push(InstructionHandle::new(
                offset.0,
                offset.0 + insn.length,
                insn.opcode,
            ));
            encoded.push(alphabet::encode(insn.opcode));
        }
        Ok(InstructionIndex { handles, encoded })
    }

    pub fn handles(&self) -> &[InstructionHandle] {
        &self.handles
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Index of the instruction starting exactly at a byte offset
    pub fn position_of(&self, offset: usize) -> Option<usize> {
        self.handles
            .binary_search_by_key(&offset, |handle| handle.start)
            .ok()
    }
}
