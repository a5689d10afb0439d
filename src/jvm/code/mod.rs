//! Raw method bytecode
//!
//! Where a code generator would work with a CFG of basic blocks, rewriting compiled code means
//! working directly on the byte array of the `Code` attribute. There are two parts to this:
//!
//!   - [`CodeAttribute`] owns the bytes, the exception table, and the recorded `max_stack` and
//!     `max_locals`
//!   - [`CodeIterator`] walks the bytes instruction by instruction and can splice a byte range
//!     while relocating every branch offset and exception range that crosses it
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3

mod attribute;
mod iterator;

pub use attribute::*;
pub use iterator::*;
