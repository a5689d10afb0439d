//! Model of JVM method bytecode, as far as searching and rewriting it requires
//!
//! Unlike a full class file model, nothing here knows about the constant pool: instructions are
//! only ever inspected through their opcode, their byte length, and their operand layout. That
//! is enough to
//!
//!   - walk a method body instruction by instruction ([`code::CodeIterator`])
//!   - splice a range of bytes while keeping branch offsets and exception ranges pointing at the
//!     same instructions ([`code::CodeIterator::replace`])
//!   - estimate the operand stack effect of a run of instructions ([`Opcode::produces`] and
//!     [`Opcode::consumes`])
//!
//! The instruction set itself is described in [chapter 6][0] of the JVM specification.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html

mod access_flags;
mod binary_format;
pub mod code;
mod errors;
pub mod model;
mod opcodes;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use errors::*;
pub use opcodes::*;
