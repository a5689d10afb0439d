//! Find and rewrite instruction sequences in JVM method bodies
//!
//! Sequences are described with regular expressions over instruction names, so
//! `iconst_0 iadd` matches an addition of zero and `(aload getfield)+` matches a chain of field
//! reads. Every match goes to an edit callback, which can inspect the matched instructions and
//! replace them with other code.
//!
//! ```
//! use insnseq::edit::{SequenceEditor, Toolchain};
//! use insnseq::jvm::code::CodeAttribute;
//! use insnseq::jvm::model::MethodInfo;
//! use insnseq::jvm::MethodAccessFlags;
//!
//! # fn main() -> Result<(), insnseq::edit::Error> {
//! // static int identity(int x) { return x + 0; }
//! let code = CodeAttribute::new(2, 1, vec![0x1a, 0x03, 0x60, 0xac]);
//! let mut method = MethodInfo::new("identity", MethodAccessFlags::STATIC, code);
//!
//! // Drop additions of zero
//! let editor = SequenceEditor::new("iconst_0 iadd")?;
//! let edited = editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
//!     expr.replace("")
//! })?;
//!
//! assert!(edited);
//! assert_eq!(method.code.unwrap().code, vec![0x1a, 0xac]);
//! # Ok(())
//! # }
//! ```
//!
//! The crate is split into
//!
//!   - [`jvm`]: opcode table, method bodies, and splicing bytes into them
//!   - [`finder`]: translating patterns into regexes and searching method bodies
//!   - [`edit`]: the scan that hands matches to edit callbacks and applies replacements

pub mod edit;
pub mod finder;
pub mod jvm;
pub mod util;
