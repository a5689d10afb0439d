//! Hook for regenerating verification metadata after a method body changes shape
//!
//! Splicing bytes into a method invalidates anything keyed by bytecode offset: most importantly
//! the stack map table that modern class files must carry for every jump target. Regenerating
//! that table requires type information from the class hierarchy, which is out of reach here,
//! so it is abstracted behind [`FrameRebuilder`]. The rebuilder runs once per rewritten method,
//! and only if at least one splice actually happened.
//!
//! [`StructuralVerifier`] is the default: it cannot compute frames, but it rejects the shapes
//! that no frame could fix (undecodable instructions, jumps into the middle of an instruction,
//! exception ranges that don't line up with instructions).

use crate::jvm::code::{branch_operands, decode_instructions};
use crate::jvm::model::MethodInfo;
use crate::jvm::Error;
use crate::util::Offset;

/// Regenerates (or just validates) verification metadata for a method
pub trait FrameRebuilder {
    fn rebuild(&mut self, method: &MethodInfo) -> Result<(), Error>;
}

/// Checks that every instruction decodes and that every jump and exception range lands on an
/// instruction boundary
#[derive(Copy, Clone, Debug, Default)]
pub struct StructuralVerifier;

impl FrameRebuilder for StructuralVerifier {
    fn rebuild(&mut self, method: &MethodInfo) -> Result<(), Error> {
        let attribute = match &method.code {
            Some(attribute) => attribute,
            None => return Ok(()),
        };
        let code = &attribute.code;
        if code.is_empty() {
            return Err(Error::EmptyCode);
        }

        let instructions = decode_instructions(code)?;
        let is_boundary = |offset: usize| instructions.get_offset(Offset(offset)).index().is_some();

        for (offset, _, _) in instructions.iter() {
            for operand in branch_operands(code, offset.0)? {
                if operand.target < 0 || !is_boundary(operand.target as usize) {
                    return Err(Error::InvalidBranchTarget {
                        offset: offset.0,
                        target: operand.target,
                    });
                }
            }
        }

        for (idx, handler) in attribute.exception_table.iter().enumerate() {
            let start_pc = handler.start_pc as usize;
            let end_pc = handler.end_pc as usize;
            let valid = start_pc < end_pc
                && is_boundary(start_pc)
                && (end_pc == code.len() || is_boundary(end_pc))
                && is_boundary(handler.handler_pc as usize);
            if !valid {
                return Err(Error::InvalidExceptionHandler(idx));
            }
        }

        Ok(())
    }
}

/// Accepts everything (for callers that regenerate frames themselves, after the fact)
#[derive(Copy, Clone, Debug, Default)]
pub struct NoRebuild;

impl FrameRebuilder for NoRebuild {
    fn rebuild(&mut self, _method: &MethodInfo) -> Result<(), Error> {
        Ok(())
    }
}
