use crate::edit::{
    AssemblyCompiler, CompileErrorPolicy, Error, SequenceExpr, Settings, StatementCompiler,
};
use crate::finder::{compile_pattern, CompiledPattern, Constraint, InstructionFinder};
use crate::jvm::code::CodeIterator;
use crate::jvm::model::MethodInfo;
use crate::jvm::verifier::{FrameRebuilder, StructuralVerifier};
use crate::jvm::MethodAccessFlags;

/// Callback invoked on every accepted match
pub trait Edit {
    fn edit(&mut self, expr: &mut SequenceExpr<'_, '_>) -> Result<(), Error>;
}

/// Adapter to use a closure as an [`Edit`]
struct EditFn<F>(F);

impl<F> Edit for EditFn<F>
where
    F: FnMut(&mut SequenceExpr<'_, '_>) -> Result<(), Error>,
{
    fn edit(&mut self, expr: &mut SequenceExpr<'_, '_>) -> Result<(), Error> {
        (self.0)(expr)
    }
}

/// External collaborators used while rewriting
pub struct Toolchain {
    /// Compiles statements passed to [`SequenceExpr::replace`]
    pub compiler: Box<dyn StatementCompiler>,

    /// Runs on every method that got edited
    pub rebuilder: Box<dyn FrameRebuilder>,
}

impl Toolchain {
    pub fn new(
        compiler: impl StatementCompiler + 'static,
        rebuilder: impl FrameRebuilder + 'static,
    ) -> Toolchain {
        Toolchain {
            compiler: Box::new(compiler),
            rebuilder: Box::new(rebuilder),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Toolchain {
        Toolchain::new(AssemblyCompiler, StructuralVerifier)
    }
}

/// Running maxima over all of the edits in one scan
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoopContext {
    pub max_locals: u16,

    /// Extra stack depth needed by the replacements
    pub max_stack: u16,
}

impl LoopContext {
    pub fn new(max_locals: u16) -> LoopContext {
        LoopContext {
            max_locals,
            max_stack: 0,
        }
    }

    pub fn update_max(&mut self, locals: u16, stack: u16) {
        self.max_locals = self.max_locals.max(locals);
        self.max_stack = self.max_stack.max(stack);
    }
}

/// Method being scanned, as seen by edit callbacks
#[derive(Copy, Clone, Debug)]
pub struct MethodScope<'a> {
    pub name: &'a str,
    pub access_flags: MethodAccessFlags,
}

/// Rewrites method bodies wherever an instruction pattern matches
///
/// The scan goes from the first instruction to the last. Whenever the next match is found, the
/// edit callback gets a [`SequenceExpr`] for it. If the callback doesn't replace the match, the
/// scan resumes after the match. If it does, the scan resumes right after the replacement code
/// (so the replacement itself is never matched).
pub struct SequenceEditor {
    pattern: CompiledPattern,
    constraint: Option<Box<dyn Constraint>>,
    settings: Settings,
}

impl SequenceEditor {
    pub fn new(pattern: &str) -> Result<SequenceEditor, Error> {
        Ok(SequenceEditor {
            pattern: compile_pattern(pattern)?,
            constraint: None,
            settings: Settings::default(),
        })
    }

    /// Editor which only considers matches accepted by `constraint`
    pub fn with_constraint(
        pattern: &str,
        constraint: impl Constraint + 'static,
    ) -> Result<SequenceEditor, Error> {
        let mut editor = SequenceEditor::new(pattern)?;
        editor.constraint = Some(Box::new(constraint));
        Ok(editor)
    }

    pub fn with_settings(mut self, settings: Settings) -> SequenceEditor {
        self.settings = settings;
        self
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Scan a method, calling `callback` on every match
    ///
    /// Returns whether the method was edited.
    pub fn instrument<F>(
        &self,
        method: &mut MethodInfo,
        toolchain: &mut Toolchain,
        callback: F,
    ) -> Result<bool, Error>
    where
        F: FnMut(&mut SequenceExpr<'_, '_>) -> Result<(), Error>,
    {
        self.instrument_with(method, toolchain, &mut EditFn(callback))
    }

    /// Scan a method, calling `editor` on every match
    ///
    /// Once the scan is done, the `max_locals` and `max_stack` of the method are raised to
    /// accomodate the replacements and, if anything was replaced, the frame rebuilder runs.
    /// Methods without code are left alone. If an error occurs part way through, edits that
    /// already happened are not undone.
    pub fn instrument_with(
        &self,
        method: &mut MethodInfo,
        toolchain: &mut Toolchain,
        editor: &mut dyn Edit,
    ) -> Result<bool, Error> {
        let name = method.name.clone();
        let scope = MethodScope {
            name: &name,
            access_flags: method.access_flags,
        };
        let attribute = match method.code.as_mut() {
            Some(attribute) => attribute,
            None => return Ok(false),
        };
        log::debug!("Processing {}", name);

        let mut context = LoopContext::new(attribute.max_locals);
        let mut iterator = attribute.iterator();
        let edited = self.scan(
            scope,
            &mut iterator,
            &mut context,
            None,
            toolchain.compiler.as_mut(),
            editor,
        )?;

        // Code may have been modified by other parties, so only ever raise `max_locals`
        if attribute.max_locals < context.max_locals {
            attribute.max_locals = context.max_locals;
        }
        attribute.max_stack = attribute.max_stack.saturating_add(context.max_stack);

        if edited && self.settings.rebuild_frames {
            toolchain
                .rebuilder
                .rebuild(method)
                .map_err(Error::MalformedReplacementBytecode)?;
        }
        Ok(edited)
    }

    /// Scan from the current position of `iterator` up to (but excluding) byte offset `end`
    ///
    /// `end` tracks the edits: it moves by however much each replacement grows or shrinks the
    /// code. Matches starting at or after `end` are ignored. Unlike [`Self::instrument_with`],
    /// this leaves reconciling `context` with the method and rebuilding frames to the caller.
    pub fn instrument_range(
        &self,
        scope: MethodScope<'_>,
        iterator: &mut CodeIterator<'_>,
        context: &mut LoopContext,
        end: usize,
        compiler: &mut dyn StatementCompiler,
        editor: &mut dyn Edit,
    ) -> Result<bool, Error> {
        log::debug!("Processing {} up to {}", scope.name, end);
        self.scan(scope, iterator, context, Some(end), compiler, editor)
    }

    fn scan(
        &self,
        scope: MethodScope<'_>,
        iterator: &mut CodeIterator<'_>,
        context: &mut LoopContext,
        mut end: Option<usize>,
        compiler: &mut dyn StatementCompiler,
        editor: &mut dyn Edit,
    ) -> Result<bool, Error> {
        let mut finder = InstructionFinder::new(iterator.code())?;
        let mut edits: usize = 0;

        loop {
            if let Some(max_edits) = self.settings.max_edits {
                if edits >= max_edits {
                    log::warn!(
                        "Stopping scan of {} after {} edits at offset {}",
                        scope.name,
                        edits,
                        iterator.look_ahead()
                    );
                    break;
                }
            }

            let pos = match iterator.next()? {
                Some(pos) => pos,
                None => break,
            };
            if end.map_or(false, |end| pos >= end) {
                break;
            }

            let found = finder.search_next(&self.pattern, pos, self.constraint.as_deref())?;
            let (handles, index) = match found {
                Some(found) if end.map_or(true, |end| found.start() < end) => {
                    (found.handles().to_vec(), found.index())
                }
                _ => break,
            };
            let match_start = handles[0].start();
            let match_end = handles[handles.len() - 1].end();
            log::trace!(
                "Found {} in {} at {}..{}",
                self.pattern.source(),
                scope.name,
                match_start,
                match_end
            );

            iterator.move_to(match_start);
            let mut expr = SequenceExpr::new(
                &mut *iterator,
                handles,
                index,
                scope.name,
                scope.access_flags,
                &mut *compiler,
                context.max_locals,
            );
            match editor.edit(&mut expr) {
                Ok(()) => (),
                Err(Error::ReplacementCompileError(err))
                    if self.settings.on_compile_error == CompileErrorPolicy::SkipMatch
                        && !expr.edited() =>
                {
                    log::warn!(
                        "Skipping match at {} in {}: {}",
                        match_start, scope.name, err
                    );
                }
                Err(err) => return Err(err),
            }

            match expr.edit_record() {
                Some(edit) => {
                    finder.reread(iterator.code())?;
                    context.update_max(edit.locals, edit.stack);
                    if let Some(end) = end.as_mut() {
                        *end = (*end as isize + edit.delta).max(0) as usize;
                    }
                    edits += 1;
                }
                None => iterator.move_to(match_end),
            }
        }

        Ok(edits > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::edit::CompileError;
    use crate::jvm::code::CodeAttribute;
    use crate::jvm::verifier::NoRebuild;

    fn method(code: Vec<u8>) -> MethodInfo {
        MethodInfo::new("run", MethodAccessFlags::STATIC, CodeAttribute::new(2, 1, code))
    }

    fn leave_alone(_: &mut SequenceExpr<'_, '_>) -> Result<(), Error> {
        Ok(())
    }

    fn fails_to_compile(expr: &mut SequenceExpr<'_, '_>) -> Result<(), Error> {
        expr.replace("frob")
    }

    fn delete(expr: &mut SequenceExpr<'_, '_>) -> Result<(), Error> {
        expr.splice(&[])
    }

    #[test]
    fn loop_context_only_raises() {
        let mut context = LoopContext::new(3);
        context.update_max(2, 4);
        context.update_max(5, 1);
        assert_eq!(
            context,
            LoopContext {
                max_locals: 5,
                max_stack: 4
            }
        );
    }

    #[test]
    fn method_without_code() {
        let editor = SequenceEditor::new("nop").unwrap();
        let mut abstract_method = MethodInfo::without_code("run", MethodAccessFlags::ABSTRACT);
        let edited = editor
            .instrument(&mut abstract_method, &mut Toolchain::default(), leave_alone)
            .unwrap();
        assert!(!edited);
    }

    #[test]
    fn bad_patterns() {
        assert!(matches!(
            SequenceEditor::new("nop frob"),
            Err(Error::UnknownInstructionName(name)) if name == "frob"
        ));
        assert!(matches!(
            SequenceEditor::new("nop)"),
            Err(Error::InvalidPattern(_))
        ));
    }

    #[test]
    fn replacement_is_not_rescanned() {
        // Every `nop` becomes two `nop`s, which would loop forever if rescanned
        let editor = SequenceEditor::new("nop").unwrap();
        let mut method = method(vec![0x00, 0x57, 0x00, 0xb1]);
        let mut seen = vec![];
        let edited = editor
            .instrument(&mut method, &mut Toolchain::default(), |expr| {
                seen.push(expr.position());
                expr.replace("nop; nop")
            })
            .unwrap();
        assert!(edited);
        assert_eq!(seen, vec![0, 3]);
        assert_eq!(
            method.code.unwrap().code,
            vec![0x00, 0x00, 0x57, 0x00, 0x00, 0xb1]
        );
    }

    #[test]
    fn compile_error_policy() {
        let code = vec![0x00, 0x00, 0xb1];

        let abort = SequenceEditor::new("nop").unwrap();
        assert!(matches!(
            abort.instrument(
                &mut method(code.clone()),
                &mut Toolchain::default(),
                fails_to_compile
            ),
            Err(Error::ReplacementCompileError(CompileError::UnknownMnemonic { .. }))
        ));

        let skip = SequenceEditor::new("nop").unwrap().with_settings(Settings {
            on_compile_error: CompileErrorPolicy::SkipMatch,
            ..Settings::default()
        });
        let mut calls = 0;
        let mut skipped_method = method(code.clone());
        let edited = skip
            .instrument(&mut skipped_method, &mut Toolchain::default(), |expr| {
                calls += 1;
                expr.replace("frob")
            })
            .unwrap();
        assert!(!edited);
        assert_eq!(calls, 2);
        assert_eq!(skipped_method.code.unwrap().code, code);
    }

    #[test]
    fn edit_budget() {
        let editor = SequenceEditor::new("nop").unwrap().with_settings(Settings {
            max_edits: Some(1),
            ..Settings::default()
        });
        let mut method = method(vec![0x00, 0x00, 0xb1]);
        editor
            .instrument(&mut method, &mut Toolchain::default(), |expr| {
                expr.replace("")
            })
            .unwrap();
        assert_eq!(method.code.unwrap().code, vec![0x00, 0xb1]);
    }

    #[test]
    fn rebuilder_failure_is_reported() {
        // Deleting the `return` that a jump targets leaves the jump dangling
        let editor = SequenceEditor::new("return").unwrap();
        let code = vec![0xa7, 0, 3, 0xb1];

        assert!(matches!(
            editor.instrument(&mut method(code.clone()), &mut Toolchain::default(), delete),
            Err(Error::MalformedReplacementBytecode(_))
        ));

        let mut toolchain = Toolchain::new(AssemblyCompiler, NoRebuild);
        let mut unchecked = method(code);
        assert!(editor.instrument(&mut unchecked, &mut toolchain, delete).unwrap());
        assert_eq!(unchecked.code.unwrap().code, vec![0xa7, 0, 3]);
    }
}
