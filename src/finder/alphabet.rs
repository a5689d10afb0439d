//! Encoding of opcodes as characters
//!
//! Each opcode is mapped to a character in the Unicode private use area, starting at `U+E000`.
//! Those characters never appear in regex syntax, so an encoded opcode can be dropped into a
//! pattern verbatim and always matches itself literally. Every character in the range takes
//! exactly [`ENCODED_WIDTH`] bytes in UTF-8, which makes mapping between byte positions in the
//! encoded string and instruction indices a division.

use crate::jvm::Opcode;

/// First character of the alphabet (the encoding of opcode `0x00`)
const ALPHABET_START: u32 = 0xE000;

/// Number of UTF-8 bytes used by any character of the alphabet
pub const ENCODED_WIDTH: usize = 3;

static ALPHABET: [char; 256] = build_alphabet();

const fn build_alphabet() -> [char; 256] {
    let mut alphabet = ['\0'; 256];
    let mut opcode = 0;
    while opcode < 256 {
        alphabet[opcode] = match char::from_u32(ALPHABET_START + opcode as u32) {
            Some(encoded) => encoded,
            None => panic!("alphabet leaves the valid character range"),
        };
        opcode += 1;
    }
    alphabet
}

/// Character representing an opcode
pub fn encode(opcode: Opcode) -> char {
    ALPHABET[opcode.0 as usize]
}

/// Opcode represented by a character, if it is part of the alphabet
pub fn decode(encoded: char) -> Option<Opcode> {
    let code_point = encoded as u32;
    if (ALPHABET_START..ALPHABET_START + 256).contains(&code_point) {
        Some(Opcode((code_point - ALPHABET_START) as u8))
    } else {
        None
    }
}

/// Instruction index corresponding to a byte position in an encoded string
pub fn instruction_position(byte_position: usize) -> usize {
    byte_position / ENCODED_WIDTH
}

/// Byte position in an encoded string corresponding to an instruction index
pub fn byte_position(instruction_position: usize) -> usize {
    instruction_position * ENCODED_WIDTH
}
