use crate::edit::{profile_code, CompiledStatement, Error, MethodContext, StatementCompiler};
use crate::finder::{InstructionHandle, Match};
use crate::jvm::code::{decode_instructions, CodeIterator};
use crate::jvm::{self, MethodAccessFlags, Opcode};

/// Structural edit made through a [`SequenceExpr`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EditRecord {
    /// Change in code length (in bytes)
    pub delta: isize,

    /// Locals needed by the method after the edit
    pub locals: u16,

    /// Extra stack depth needed by the replacement
    pub stack: u16,
}

/// Handle on one matched instruction sequence, passed to the edit callback
///
/// The match can be inspected and then replaced at most once, either by a statement (compiled
/// with the configured [`StatementCompiler`]) or by raw bytecode. Replacement code is padded so
/// that the net stack effect of the region stays what it was:
///
///   - if the match popped more than the replacement does, the replacement is preceded by
///     `pop`/`pop2`
///   - if the match pushed more than the replacement does, the replacement is followed by
///     `iconst_0`
///
/// Stack effects are measured in words, and instructions whose effect depends on the constant
/// pool (invocations, field accesses) count as popping one word and pushing one word.
pub struct SequenceExpr<'a, 'c> {
    iterator: &'a mut CodeIterator<'c>,
    handles: Vec<InstructionHandle>,
    index: usize,
    method_name: &'a str,
    access_flags: MethodAccessFlags,
    compiler: &'a mut dyn StatementCompiler,
    max_locals: u16,
    edit: Option<EditRecord>,
}

impl<'a, 'c> SequenceExpr<'a, 'c> {
    pub(crate) fn new(
        iterator: &'a mut CodeIterator<'c>,
        handles: Vec<InstructionHandle>,
        index: usize,
        method_name: &'a str,
        access_flags: MethodAccessFlags,
        compiler: &'a mut dyn StatementCompiler,
        max_locals: u16,
    ) -> SequenceExpr<'a, 'c> {
        SequenceExpr {
            iterator,
            handles,
            index,
            method_name,
            access_flags,
            compiler,
            max_locals,
            edit: None,
        }
    }

    /// Matched instructions, until the match is replaced
    pub fn matched(&self) -> Option<Match<'_>> {
        if self.edit.is_some() {
            return None;
        }
        Some(Match::new(&self.handles, self.iterator.code(), self.index))
    }

    /// One of the matched instructions (as they were before any replacement)
    pub fn instruction(&self, idx: usize) -> Result<InstructionHandle, Error> {
        self.handles
            .get(idx)
            .copied()
            .ok_or(Error::NoSuchInstruction(idx))
    }

    /// Byte offset of the start of the match
    pub fn position(&self) -> usize {
        self.handles.first().map_or(0, |handle| handle.start())
    }

    pub fn method_name(&self) -> &str {
        self.method_name
    }

    pub fn within_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Has the match been replaced?
    pub fn edited(&self) -> bool {
        self.edit.is_some()
    }

    /// Locals needed by the method (accounting for the replacement, if any)
    pub fn locals(&self) -> u16 {
        self.edit.map_or(self.max_locals, |edit| edit.locals)
    }

    /// Extra stack depth needed by the replacement (0 if there is none)
    pub fn stack(&self) -> u16 {
        self.edit.map_or(0, |edit| edit.stack)
    }

    pub fn edit_record(&self) -> Option<EditRecord> {
        self.edit
    }

    /// Replace the matched instructions with a compiled statement
    pub fn replace(&mut self, statement: &str) -> Result<(), Error> {
        self.ensure_unedited()?;
        let context = MethodContext {
            method_name: self.method_name,
            is_static: self.within_static(),
            max_locals: self.max_locals,
            position: self.position(),
        };
        let compiled = self.compiler.compile(&context, statement)?;
        self.splice_compiled(compiled)
    }

    /// Replace the matched instructions with raw bytecode
    ///
    /// The bytes must decode into whole instructions and must not contain a `tableswitch` or
    /// `lookupswitch`, whose padding depends on where the bytes end up. Their stack effect and
    /// locals are measured the same way as for compiled statements.
    pub fn splice(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.ensure_unedited()?;
        let profile =
            profile_code(bytes, self.max_locals).map_err(Error::MalformedReplacementBytecode)?;
        let instructions =
            decode_instructions(bytes).map_err(Error::MalformedReplacementBytecode)?;
        let switch = instructions
            .iter()
            .find(|(_, _, insn)| insn.opcode.is_switch());
        if let Some((offset, _, _)) = switch {
            return Err(Error::MalformedReplacementBytecode(
                jvm::Error::MisalignedSwitch {
                    offset: self.position() + offset.0,
                },
            ));
        }
        self.splice_compiled(CompiledStatement {
            code: bytes.to_vec(),
            stack_effect: profile.stack_effect,
            max_stack: profile.max_stack,
            max_locals: profile.max_locals,
        })
    }

    fn ensure_unedited(&self) -> Result<(), Error> {
        if self.edit.is_some() {
            return Err(Error::MultipleEdits {
                position: self.position(),
            });
        }
        Ok(())
    }

    /// Net stack effect of the matched instructions
    fn matched_stack_effect(&self) -> i32 {
        self.handles
            .iter()
            .map(|handle| handle.opcode().stack_effect())
            .sum()
    }

    fn splice_compiled(&mut self, compiled: CompiledStatement) -> Result<(), Error> {
        let adjustment = self.matched_stack_effect() - compiled.stack_effect;
        let replacement = balance_stack(&compiled.code, adjustment);

        let start = self.position();
        let length: usize = self.handles.iter().map(InstructionHandle::length).sum();
        log::debug!(
            "Replacing matched bytecode at {} ({} bytes) in {} with {} bytes",
            start,
            length,
            self.method_name,
            replacement.len()
        );
        let delta = self
            .iterator
            .replace(start, length, &replacement)
            .map_err(Error::MalformedReplacementBytecode)?;

        let padding_stack = u16::try_from(adjustment.max(0)).unwrap_or(u16::MAX);
        self.edit = Some(EditRecord {
            delta,
            locals: compiled.max_locals.max(self.max_locals),
            stack: compiled.max_stack.saturating_add(padding_stack),
        });
        Ok(())
    }
}

/// Pad code so that its net stack effect grows by `adjustment` words
///
/// A negative adjustment prepends discards, a positive one appends `iconst_0`s. Stack slot types
/// are not tracked, so discards are counted in words: an odd word goes first as a `pop`, then the
/// rest as `pop2`s. A `pop2` spanning two unrelated single-word values, or a `pop` landing on
/// half of a `long`/`double`, is left for the verifier to reject.
pub fn balance_stack(code: &[u8], adjustment: i32) -> Vec<u8> {
    let mut balanced = Vec::with_capacity(code.len() + adjustment.unsigned_abs() as usize);
    if adjustment < 0 {
        let words = adjustment.unsigned_abs();
        balanced.extend(std::iter::repeat(Opcode::POP.0).take((words % 2) as usize));
        balanced.extend(std::iter::repeat(Opcode::POP2.0).take((words / 2) as usize));
    }
    balanced.extend_from_slice(code);
    if adjustment > 0 {
        balanced.extend(std::iter::repeat(Opcode::ICONST_0.0).take(adjustment as usize));
    }
    balanced
}
