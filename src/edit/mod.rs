//! Rewrite matched instruction sequences in method bodies
//!
//! [`SequenceEditor`] drives a scan over a method: it looks for the next match of its pattern,
//! hands the match to an edit callback through a [`SequenceExpr`], and carries on after the
//! match (or after whatever replaced it). Replacements are either statements compiled by a
//! [`StatementCompiler`] or raw bytecode, and are padded to leave the operand stack as the
//! original sequence would have.
//!
//! Once a method has been scanned, its `max_locals` and `max_stack` are raised to cover the
//! replacements and a [`FrameRebuilder`](crate::jvm::verifier::FrameRebuilder) gets a chance to
//! recompute (or reject) the edited body.

mod compiler;
mod editor;
mod errors;
mod expr;
mod settings;

pub use compiler::*;
pub use editor::*;
pub use errors::*;
pub use expr::*;
pub use settings::*;
