use crate::jvm::code::{CodeAttribute, ExceptionHandler};
use crate::jvm::{Error, Opcode, OperandLayout};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{BigEndian, ByteOrder};

/// Maximum length of a method's code array
pub const MAX_CODE_LENGTH: usize = 65535;

/// One decoded instruction: its opcode and its length in bytes (operands included)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Insn {
    pub opcode: Opcode,
    pub length: usize,
}

impl Width for Insn {
    fn width(&self) -> usize {
        self.length
    }
}

/// Start of the 4-byte aligned operands of a switch instruction at `pos`
fn switch_operands_start(pos: usize) -> usize {
    (pos + 4) & !3
}

fn read_s32(code: &[u8], at: usize) -> Option<i32> {
    code.get(at..at + 4).map(BigEndian::read_i32)
}

/// Byte length of the instruction starting at `pos`
///
/// Fails if the opcode is undefined or the operands run past the end of the code.
pub fn instruction_length(code: &[u8], pos: usize) -> Result<usize, Error> {
    let malformed = || Error::MalformedInstructionStream { offset: pos };
    let opcode = Opcode(*code.get(pos).ok_or_else(malformed)?);
    let layout = opcode.layout().ok_or_else(malformed)?;

    let length = match layout {
        OperandLayout::TableSwitch => {
            let base = switch_operands_start(pos);
            let low = read_s32(code, base + 4).ok_or_else(malformed)?;
            let high = read_s32(code, base + 8).ok_or_else(malformed)?;
            if high < low {
                return Err(malformed());
            }
            let entries = (high as i64 - low as i64 + 1) as usize;
            base + 12 + 4 * entries - pos
        }
        OperandLayout::LookupSwitch => {
            let base = switch_operands_start(pos);
            let pairs = read_s32(code, base + 4).ok_or_else(malformed)?;
            if pairs < 0 {
                return Err(malformed());
            }
            base + 8 + 8 * pairs as usize - pos
        }
        OperandLayout::Wide => match code.get(pos + 1).map(|op| Opcode(*op)) {
            Some(Opcode::IINC) => 6,
            Some(modified) if is_widenable(modified) => 4,
            _ => return Err(malformed()),
        },
        fixed => fixed.fixed_length().ok_or_else(malformed)?,
    };

    if pos + length > code.len() {
        return Err(malformed());
    }
    Ok(length)
}

/// Can this instruction follow a `wide` prefix (`iinc` aside)?
fn is_widenable(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::ILOAD
            | Opcode::LLOAD
            | Opcode::FLOAD
            | Opcode::DLOAD
            | Opcode::ALOAD
            | Opcode::ISTORE
            | Opcode::LSTORE
            | Opcode::FSTORE
            | Opcode::DSTORE
            | Opcode::ASTORE
            | Opcode::RET
    )
}

/// Decode every instruction in a code array, keyed by byte offset
pub fn decode_instructions(code: &[u8]) -> Result<OffsetVec<Insn>, Error> {
    let mut instructions = OffsetVec::new();
    while instructions.offset_len().0 < code.len() {
        let pos = instructions.offset_len().0;
        let length = instruction_length(code, pos)?;
        instructions.push(Insn {
            opcode: Opcode(code[pos]),
            length,
        });
    }
    Ok(instructions)
}

/// Jump operand stored inside an instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BranchOperand {
    /// Offset of the operand bytes in the code
    pub at: usize,

    /// Is the operand 4 bytes (`goto_w`, `jsr_w`, switches) instead of 2?
    pub wide: bool,

    /// Absolute offset jumped to
    pub target: isize,
}

/// Jump operands of the (already length-checked) instruction at `pos`
pub fn branch_operands(code: &[u8], pos: usize) -> Result<Vec<BranchOperand>, Error> {
    let malformed = || Error::MalformedInstructionStream { offset: pos };
    let read_jump = |at: usize, wide: bool| -> Result<BranchOperand, Error> {
        let jump = if wide {
            read_s32(code, at).ok_or_else(malformed)? as isize
        } else {
            let bytes = code.get(at..at + 2).ok_or_else(malformed)?;
            BigEndian::read_i16(bytes) as isize
        };
        Ok(BranchOperand {
            at,
            wide,
            target: pos as isize + jump,
        })
    };

    let opcode = Opcode(*code.get(pos).ok_or_else(malformed)?);
    match opcode.layout() {
        Some(OperandLayout::Branch16) => Ok(vec![read_jump(pos + 1, false)?]),
        Some(OperandLayout::Branch32) => Ok(vec![read_jump(pos + 1, true)?]),
        Some(OperandLayout::TableSwitch) => {
            let base = switch_operands_start(pos);
            let low = read_s32(code, base + 4).ok_or_else(malformed)?;
            let high = read_s32(code, base + 8).ok_or_else(malformed)?;
            let entries = (high as i64 - low as i64 + 1).max(0) as usize;
            let mut operands = vec![read_jump(base, true)?];
            for entry in 0..entries {
                operands.push(read_jump(base + 12 + 4 * entry, true)?);
            }
            Ok(operands)
        }
        Some(OperandLayout::LookupSwitch) => {
            let base = switch_operands_start(pos);
            let pairs = read_s32(code, base + 4).ok_or_else(malformed)?.max(0) as usize;
            let mut operands = vec![read_jump(base, true)?];
            for pair in 0..pairs {
                operands.push(read_jump(base + 8 + 8 * pair + 4, true)?);
            }
            Ok(operands)
        }
        Some(_) => Ok(vec![]),
        None => Err(malformed()),
    }
}

/// Cursor over the instructions of a code attribute, with support for splicing
///
/// The cursor is always a byte offset. `next` only ever lands on instruction starts, but
/// `move_to` trusts its caller.
pub struct CodeIterator<'a> {
    attribute: &'a mut CodeAttribute,
    current: usize,
}

impl<'a> CodeIterator<'a> {
    pub fn new(attribute: &'a mut CodeAttribute) -> CodeIterator<'a> {
        CodeIterator {
            attribute,
            current: 0,
        }
    }

    /// Move back to the first instruction
    pub fn begin(&mut self) {
        self.current = 0;
    }

    pub fn has_next(&self) -> bool {
        self.current < self.attribute.code.len()
    }

    /// Return the offset of the current instruction and advance past it
    pub fn next(&mut self) -> Result<Option<usize>, Error> {
        if !self.has_next() {
            return Ok(None);
        }
        let pos = self.current;
        self.current += instruction_length(&self.attribute.code, pos)?;
        Ok(Some(pos))
    }

    /// Offset that the next call to `next` will return (without advancing)
    pub fn look_ahead(&self) -> usize {
        self.current
    }

    pub fn move_to(&mut self, pos: usize) {
        self.current = pos;
    }

    pub fn code_length(&self) -> usize {
        self.attribute.code.len()
    }

    pub fn code(&self) -> &[u8] {
        &self.attribute.code
    }

    pub fn attribute(&self) -> &CodeAttribute {
        &*self.attribute
    }

    pub fn byte_at(&self, pos: usize) -> Result<u8, Error> {
        self.attribute
            .code
            .get(pos)
            .copied()
            .ok_or(Error::MalformedInstructionStream { offset: pos })
    }

    pub fn u16_at(&self, pos: usize) -> Result<u16, Error> {
        self.attribute
            .code
            .get(pos..pos + 2)
            .map(BigEndian::read_u16)
            .ok_or(Error::MalformedInstructionStream { offset: pos })
    }

    pub fn s16_at(&self, pos: usize) -> Result<i16, Error> {
        self.attribute
            .code
            .get(pos..pos + 2)
            .map(BigEndian::read_i16)
            .ok_or(Error::MalformedInstructionStream { offset: pos })
    }

    pub fn s32_at(&self, pos: usize) -> Result<i32, Error> {
        read_s32(&self.attribute.code, pos).ok_or(Error::MalformedInstructionStream { offset: pos })
    }

    /// Replace the `len` bytes at `start` with `bytes`
    ///
    /// Both ends of the replaced range must be instruction boundaries, and `bytes` must decode into
    /// whole instructions laid out as if they started at offset 0. A switch in `bytes` is
    /// therefore only accepted when `start` is a multiple of 4.
    ///
    /// Branches and exception ranges outside the replaced range keep pointing at the same
    /// instructions, while anything pointing into the replaced range ends up pointing at the start
    /// of the replacement. An empty range inserts `bytes` in front of the instruction at `start`,
    /// and jumps to `start` land on the inserted code. If a switch follows the splice, the
    /// replacement is padded with `nop` so that the switch keeps its alignment.
    ///
    /// On success the cursor is left right after the replacement and the change in code length
    /// is returned. On failure nothing is modified.
    pub fn replace(&mut self, start: usize, len: usize, bytes: &[u8]) -> Result<isize, Error> {
        let code = &self.attribute.code;
        let end = start + len;
        let instructions = decode_instructions(code)?;
        let on_boundary = |offset: usize| {
            offset == code.len() || instructions.get_offset(Offset(offset)).index().is_some()
        };
        if !on_boundary(start) {
            return Err(Error::SpliceNotOnBoundary { offset: start });
        }
        if end > code.len() || !on_boundary(end) {
            return Err(Error::SpliceNotOnBoundary { offset: end });
        }

        // Switch padding in `bytes` is laid out for offset 0
        let inserted = decode_instructions(bytes).map_err(|err| match err {
            Error::MalformedInstructionStream { offset } => Error::MalformedInstructionStream {
                offset: start + offset,
            },
            other => other,
        })?;
        if start % 4 != 0 {
            let switch = inserted
                .iter()
                .find(|(_, _, insn)| insn.opcode.is_switch());
            if let Some((offset, _, _)) = switch {
                return Err(Error::MisalignedSwitch {
                    offset: start + offset.0,
                });
            }
        }

        // Pad to keep following switches aligned
        let mut replacement = bytes.to_vec();
        let switch_follows = instructions
            .iter()
            .any(|(off, _, insn)| off.0 >= end && insn.opcode.is_switch());
        if switch_follows {
            while (replacement.len() as isize - len as isize).rem_euclid(4) != 0 {
                replacement.push(Opcode::NOP.0);
            }
        }
        let delta = replacement.len() as isize - len as isize;

        let new_length = code.len() - len + replacement.len();
        if new_length > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow(new_length));
        }

        let relocate = |target: usize| -> usize {
            if target <= start {
                target
            } else if target < end {
                start
            } else {
                (target as isize + delta) as usize
            }
        };
        let relocate_end = |target: usize| -> usize {
            if target <= start {
                target
            } else if target <= end {
                start + replacement.len()
            } else {
                (target as isize + delta) as usize
            }
        };

        let mut new_code = Vec::with_capacity(new_length);
        new_code.extend_from_slice(&code[..start]);
        new_code.extend_from_slice(&replacement);
        new_code.extend_from_slice(&code[end..]);

        // Patch jumps in the instructions that survive
        for (offset, _, _) in instructions.iter() {
            let old_pos = offset.0;
            if old_pos >= start && old_pos < end {
                continue;
            }
            let new_pos = if old_pos >= end {
                (old_pos as isize + delta) as usize
            } else {
                old_pos
            };
            for operand in branch_operands(code, old_pos)? {
                if operand.target < 0 {
                    return Err(Error::InvalidBranchTarget {
                        offset: old_pos,
                        target: operand.target,
                    });
                }
                let new_target = relocate(operand.target as usize);
                if new_target == operand.target as usize && new_pos == old_pos {
                    continue;
                }
                let jump = new_target as isize - new_pos as isize;
                let at = (operand.at as isize + (new_pos as isize - old_pos as isize)) as usize;
                if operand.wide {
                    BigEndian::write_i32(&mut new_code[at..at + 4], jump as i32);
                } else {
                    let jump = i16::try_from(jump).map_err(|_| Error::BranchOffsetOverflow {
                        offset: new_pos,
                        jump,
                    })?;
                    BigEndian::write_i16(&mut new_code[at..at + 2], jump);
                }
            }
        }

        let exception_table = self
            .attribute
            .exception_table
            .iter()
            .map(|handler| ExceptionHandler {
                start_pc: relocate(handler.start_pc as usize) as u16,
                end_pc: relocate_end(handler.end_pc as usize) as u16,
                handler_pc: relocate(handler.handler_pc as usize) as u16,
                catch_type: handler.catch_type,
            })
            .collect();

        log::debug!(
            "Spliced {} bytes at {} over {} bytes (delta {})",
            replacement.len(),
            start,
            len,
            delta
        );
        self.attribute.code = new_code;
        self.attribute.exception_table = exception_table;
        self.current = start + replacement.len();
        Ok(delta)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tableswitch_at_one() -> Vec<u8> {
        vec![
            0x03, // iconst_0
            0xaa, 0, 0, // tableswitch + padding
            0, 0, 0, 19, // default -> 20
            0, 0, 0, 0, // low
            0, 0, 0, 0, // high
            0, 0, 0, 19, // 0 -> 20
            0xb1, // return
        ]
    }

    #[test]
    fn fixed_lengths() {
        let code = vec![0x10, 5, 0x11, 0, 1, 0xa7, 0, 0, 0xb9, 0, 1, 1, 0, 0xb1];
        assert_eq!(instruction_length(&code, 0).unwrap(), 2);
        assert_eq!(instruction_length(&code, 2).unwrap(), 3);
        assert_eq!(instruction_length(&code, 5).unwrap(), 3);
        assert_eq!(instruction_length(&code, 8).unwrap(), 5);
        assert_eq!(instruction_length(&code, 13).unwrap(), 1);
    }

    #[test]
    fn switch_and_wide_lengths() {
        let code = tableswitch_at_one();
        assert_eq!(instruction_length(&code, 1).unwrap(), 19);

        let lookup = vec![0xab, 0, 0, 0, 0, 0, 0, 9, 0, 0, 0, 0];
        assert_eq!(instruction_length(&lookup, 0).unwrap(), 12);

        assert_eq!(instruction_length(&[0xc4, 0x15, 1, 0], 0).unwrap(), 4);
        assert_eq!(instruction_length(&[0xc4, 0x84, 1, 0, 0, 5], 0).unwrap(), 6);
        assert!(instruction_length(&[0xc4, 0x60, 1, 0], 0).is_err());
    }

    #[test]
    fn malformed_streams() {
        assert!(matches!(
            instruction_length(&[0x11, 0], 0),
            Err(Error::MalformedInstructionStream { offset: 0 })
        ));
        assert!(matches!(
            instruction_length(&[0x00, 0xcb], 1),
            Err(Error::MalformedInstructionStream { offset: 1 })
        ));
        assert!(decode_instructions(&[0x00, 0xb4, 0]).is_err());
    }

    #[test]
    fn decode_covers_code() {
        let code = tableswitch_at_one();
        let instructions = decode_instructions(&code).unwrap();
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions.offset_len().0, code.len());
        let opcodes: Vec<Opcode> = instructions.iter().map(|(_, _, i)| i.opcode).collect();
        assert_eq!(
            opcodes,
            vec![Opcode::ICONST_0, Opcode::TABLESWITCH, Opcode::RETURN]
        );
    }

    #[test]
    fn iterate_and_read() {
        let mut attribute = CodeAttribute::new(1, 0, vec![0x11, 0xff, 0xfe, 0x57, 0xb1]);
        let mut iterator = attribute.iterator();
        assert_eq!(iterator.s16_at(1).unwrap(), -2);
        assert_eq!(iterator.u16_at(1).unwrap(), 0xfffe);
        assert!(iterator.s32_at(3).is_err());
        assert_eq!(iterator.next().unwrap(), Some(0));
        assert_eq!(iterator.look_ahead(), 3);
        assert_eq!(iterator.next().unwrap(), Some(3));
        assert_eq!(iterator.next().unwrap(), Some(4));
        assert_eq!(iterator.next().unwrap(), None);
        iterator.begin();
        assert!(iterator.has_next());
    }

    #[test]
    fn replace_relocates_branches() {
        // 0: goto 6, 3: nop, 4: nop, 5: nop, 6: goto 0
        let mut attribute = CodeAttribute::new(
            0,
            0,
            vec![0xa7, 0, 6, 0x00, 0x00, 0x00, 0xa7, 0xff, 0xfa],
        );
        let mut iterator = attribute.iterator();
        assert_eq!(iterator.replace(3, 2, &[]).unwrap(), -2);
        assert_eq!(iterator.look_ahead(), 3);
        assert_eq!(
            iterator.code(),
            &[0xa7, 0, 4, 0x00, 0xa7, 0xff, 0xfc][..]
        );
    }

    #[test]
    fn replace_maps_targets_inside_region_to_start() {
        // 0: goto 4, 3: nop, 4: nop, 5: return
        let mut attribute = CodeAttribute::new(0, 0, vec![0xa7, 0, 4, 0x00, 0x00, 0xb1]);
        let mut iterator = attribute.iterator();
        assert_eq!(iterator.replace(3, 2, &[0x01, 0x57, 0x00]).unwrap(), 1);
        assert_eq!(iterator.code(), &[0xa7, 0, 3, 0x01, 0x57, 0x00, 0xb1][..]);
        assert_eq!(iterator.look_ahead(), 6);
    }

    #[test]
    fn replace_relocates_exception_table() {
        let mut attribute = CodeAttribute::new(0, 0, vec![0x00, 0x00, 0x00, 0x00, 0xb1]);
        attribute.exception_table.push(ExceptionHandler {
            start_pc: 1,
            end_pc: 3,
            handler_pc: 4,
            catch_type: 0,
        });
        let mut iterator = attribute.iterator();
        iterator.replace(2, 1, &[0x00, 0x00, 0x00]).unwrap();
        assert_eq!(
            attribute.exception_table,
            vec![ExceptionHandler {
                start_pc: 1,
                end_pc: 5,
                handler_pc: 6,
                catch_type: 0,
            }]
        );
    }

    #[test]
    fn replace_pads_before_switch() {
        // 0..3: nop, 3: iconst_0, 4: tableswitch (no padding), 24: return
        let mut code = vec![0x00, 0x00, 0x00, 0x03, 0xaa, 0, 0, 0];
        code.extend_from_slice(&[0, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 20]);
        code.push(0xb1);
        let mut attribute = CodeAttribute::new(1, 0, code);
        let mut iterator = attribute.iterator();

        // Removing one nop would misalign the switch, so a nop is put back
        assert_eq!(iterator.replace(0, 1, &[]).unwrap(), 0);
        assert_eq!(iterator.look_ahead(), 1);
        assert_eq!(iterator.code_length(), 25);

        // Growing by one byte gets rounded up to a full 4 bytes
        assert_eq!(iterator.replace(0, 1, &[0x00, 0x00]).unwrap(), 4);
        assert_eq!(iterator.code_length(), 29);
        let instructions = decode_instructions(iterator.code()).unwrap();
        assert_eq!(instructions.len(), 10);
        assert_eq!(
            branch_operands(iterator.code(), 8).unwrap()[0].target,
            28
        );
    }

    #[test]
    fn insert_before_backward_jump() {
        // 0: nop, 1: goto 0
        let mut attribute = CodeAttribute::new(0, 0, vec![0x00, 0xa7, 0xff, 0xff]);
        let mut iterator = attribute.iterator();
        assert_eq!(iterator.replace(1, 0, &[0x00, 0x00]).unwrap(), 2);
        assert_eq!(iterator.look_ahead(), 3);
        assert_eq!(iterator.code(), &[0x00, 0x00, 0x00, 0xa7, 0xff, 0xfd][..]);
        assert_eq!(branch_operands(iterator.code(), 3).unwrap()[0].target, 0);
    }

    #[test]
    fn insert_before_jump_target() {
        // 0: goto 3, 3: return
        let mut attribute = CodeAttribute::new(0, 0, vec![0xa7, 0, 3, 0xb1]);
        let mut iterator = attribute.iterator();
        assert_eq!(iterator.replace(3, 0, &[0x00]).unwrap(), 1);
        assert_eq!(iterator.code(), &[0xa7, 0, 3, 0x00, 0xb1][..]);
    }

    #[test]
    fn replace_rejects_switch_off_alignment() {
        // tableswitch laid out for offset 0: { 0: +20, default: +20 }
        let mut switch = vec![0xaa, 0, 0, 0];
        switch.extend_from_slice(&[0, 0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 20]);
        let code = vec![0x00, 0x57, 0x57, 0xb1];
        let mut attribute = CodeAttribute::new(1, 0, code.clone());
        let mut iterator = attribute.iterator();

        assert!(matches!(
            iterator.replace(1, 2, &switch),
            Err(Error::MisalignedSwitch { offset: 1 })
        ));
        assert!(matches!(
            iterator.replace(1, 2, &[0x03, 0xaa, 0]),
            Err(Error::MalformedInstructionStream { offset: 2 })
        ));
        assert_eq!(iterator.code(), &code[..]);
        assert_eq!(iterator.look_ahead(), 0);

        // At an aligned offset the same bytes are fine
        let mut aligned = CodeAttribute::new(1, 0, vec![0x00, 0x00, 0x00, 0x00, 0x57, 0xb1]);
        let mut iterator = aligned.iterator();
        assert_eq!(iterator.replace(4, 1, &switch).unwrap(), 19);
        assert_eq!(decode_instructions(iterator.code()).unwrap().len(), 6);
    }

    #[test]
    fn replace_rejects_misaligned_ranges() {
        let mut attribute = CodeAttribute::new(0, 0, vec![0x10, 1, 0x57, 0xb1]);
        let mut iterator = attribute.iterator();
        assert!(matches!(
            iterator.replace(1, 1, &[]),
            Err(Error::SpliceNotOnBoundary { offset: 1 })
        ));
        assert!(matches!(
            iterator.replace(0, 1, &[]),
            Err(Error::SpliceNotOnBoundary { offset: 1 })
        ));
        assert_eq!(iterator.code(), &[0x10, 1, 0x57, 0xb1][..]);
    }

    #[test]
    fn replace_detects_branch_overflow() {
        // goto over a large block of nops, which then grows past the 16-bit range
        let mut code = vec![0xa7, 0x7f, 0xf0];
        code.resize(0x7ff0, 0x00);
        code.push(0xb1);
        let mut attribute = CodeAttribute::new(0, 0, code);
        let mut iterator = attribute.iterator();
        assert!(matches!(
            iterator.replace(3, 1, &[0x00; 64]),
            Err(Error::BranchOffsetOverflow { offset: 0, .. })
        ));
        assert!(matches!(
            iterator.replace(3, 0, &vec![0x00; MAX_CODE_LENGTH]),
            Err(Error::MethodCodeOverflow(_))
        ));
    }
}
