use crate::jvm::code::CodeIterator;
use crate::jvm::Serialize;
use byteorder::{BigEndian, WriteBytesExt};

/// Contents of a method's `Code` attribute
///
/// Nested attributes (line numbers, local variable tables, stack map tables) are not modelled:
/// they are invalidated by splicing anyway, and regenerating them is up to the
/// [`crate::jvm::verifier::FrameRebuilder`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> CodeAttribute {
        CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table: vec![],
        }
    }

    /// Iterator positioned at the first instruction
    pub fn iterator(&mut self) -> CodeIterator<'_> {
        CodeIterator::new(self)
    }
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;

        // Code length is 4 bytes
        writer.write_u32::<BigEndian>(self.code.len() as u32)?;
        writer.write_all(&self.code)?;

        (self.exception_table.len() as u16).serialize(writer)?;
        for handler in &self.exception_table {
            handler.serialize(writer)?;
        }

        // No nested attributes
        0u16.serialize(writer)?;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of exception handler code
    pub handler_pc: u16,

    /// Constant pool index of the caught class (or 0 to catch everything)
    pub catch_type: u16,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}
