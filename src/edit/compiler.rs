use crate::jvm::code::decode_instructions;
use crate::jvm::{self, Opcode, OperandLayout, Serialize};
use std::fmt;

/// What the statement compiler knows about the method being edited
#[derive(Copy, Clone, Debug)]
pub struct MethodContext<'a> {
    pub method_name: &'a str,

    /// Static methods have no `this` in local 0
    pub is_static: bool,

    /// Locals already in use by the method
    pub max_locals: u16,

    /// Byte offset where the compiled statement will be spliced
    pub position: usize,
}

/// Bytecode for a replacement statement, along with its requirements
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledStatement {
    pub code: Vec<u8>,

    /// Net change in stack depth (in words) from running `code`
    pub stack_effect: i32,

    /// Stack depth (in words) needed by `code`, above whatever was on the stack before it
    pub max_stack: u16,

    /// Locals needed by the method once `code` is in it
    pub max_locals: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    UnknownMnemonic {
        line: usize,
        mnemonic: String,
    },
    OperandCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    InvalidOperand {
        line: usize,
        operand: String,
    },

    /// Instruction exists, but can't be written in a replacement (switches and `wide`)
    Unsupported {
        line: usize,
        mnemonic: String,
    },

    /// Error from some other statement compiler
    Other(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownMnemonic { line, mnemonic } => {
                write!(f, "line {}: unknown instruction {}", line, mnemonic)
            }
            CompileError::OperandCount {
                line,
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "line {}: {} takes {} operands but got {}",
                line, mnemonic, expected, found
            ),
            CompileError::InvalidOperand { line, operand } => {
                write!(f, "line {}: invalid operand {}", line, operand)
            }
            CompileError::Unsupported { line, mnemonic } => {
                write!(f, "line {}: {} is not supported in replacements", line, mnemonic)
            }
            CompileError::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Turns a source statement into replacement bytecode
pub trait StatementCompiler {
    fn compile(
        &mut self,
        context: &MethodContext<'_>,
        statement: &str,
    ) -> Result<CompiledStatement, CompileError>;
}

/// Compiles statements written as instructions, one per line or separated by `;`
///
/// ```text
/// aload_0; getfield 12; iconst_1; iadd; pop
/// ```
///
/// Operands are decimal or `0x`-prefixed hexadecimal numbers, taken as is: constant pool indices
/// must already refer to the right constants, and jumps are relative to their instruction.
#[derive(Copy, Clone, Debug, Default)]
pub struct AssemblyCompiler;

impl StatementCompiler for AssemblyCompiler {
    fn compile(
        &mut self,
        context: &MethodContext<'_>,
        statement: &str,
    ) -> Result<CompiledStatement, CompileError> {
        let mut code = vec![];
        for (idx, line) in statement.split(|c: char| c == ';' || c == '\n').enumerate() {
            let line = line.trim();
            if !line.is_empty() {
                assemble_line(line, idx + 1, &mut code)?;
            }
        }

        let profile = profile_code(&code, context.max_locals)
            .map_err(|err| CompileError::Other(format!("assembled invalid code: {}", err)))?;
        Ok(CompiledStatement {
            code,
            stack_effect: profile.stack_effect,
            max_stack: profile.max_stack,
            max_locals: profile.max_locals,
        })
    }
}

fn assemble_line(line: &str, line_no: usize, code: &mut Vec<u8>) -> Result<(), CompileError> {
    let mut tokens = line.split_whitespace();
    let mnemonic = tokens.next().unwrap_or_default().to_ascii_lowercase();
    let operands: Vec<&str> = tokens.collect();

    let (opcode, layout) = match Opcode::from_mnemonic(&mnemonic)
        .and_then(|opcode| opcode.layout().map(|layout| (opcode, layout)))
    {
        Some(found) => found,
        None => {
            return Err(CompileError::UnknownMnemonic {
                line: line_no,
                mnemonic,
            })
        }
    };

    let expected = match layout {
        OperandLayout::None => 0,
        OperandLayout::Byte
        | OperandLayout::Index8
        | OperandLayout::Short
        | OperandLayout::Index16
        | OperandLayout::Branch16
        | OperandLayout::Branch32
        | OperandLayout::InvokeDynamic => 1,
        OperandLayout::Iinc | OperandLayout::InvokeInterface | OperandLayout::MultiANewArray => 2,
        OperandLayout::TableSwitch | OperandLayout::LookupSwitch | OperandLayout::Wide => {
            return Err(CompileError::Unsupported {
                line: line_no,
                mnemonic,
            })
        }
    };
    if operands.len() != expected {
        return Err(CompileError::OperandCount {
            line: line_no,
            mnemonic,
            expected,
            found: operands.len(),
        });
    }

    let operand = |idx: usize, min: i64, max: i64| parse_operand(operands[idx], min, max, line_no);
    let u8_operand = |idx: usize| operand(idx, 0, u8::MAX as i64).map(|value| value as u8);
    let u16_operand = |idx: usize| operand(idx, 0, u16::MAX as i64).map(|value| value as u16);

    emit(code, opcode.0)?;
    match layout {
        OperandLayout::None => (),
        OperandLayout::Byte => emit(code, operand(0, i8::MIN as i64, i8::MAX as i64)? as i8)?,
        OperandLayout::Index8 => emit(code, u8_operand(0)?)?,
        OperandLayout::Short | OperandLayout::Branch16 => {
            emit(code, operand(0, i16::MIN as i64, i16::MAX as i64)? as i16)?
        }
        OperandLayout::Index16 => emit(code, u16_operand(0)?)?,
        OperandLayout::Branch32 => {
            emit(code, operand(0, i32::MIN as i64, i32::MAX as i64)? as i32)?
        }
        OperandLayout::Iinc => {
            emit(code, u8_operand(0)?)?;
            emit(code, operand(1, i8::MIN as i64, i8::MAX as i64)? as i8)?;
        }
        OperandLayout::InvokeInterface => {
            emit(code, u16_operand(0)?)?;
            emit(code, u8_operand(1)?)?;
            emit(code, 0u8)?;
        }
        OperandLayout::InvokeDynamic => {
            emit(code, u16_operand(0)?)?;
            emit(code, 0u16)?;
        }
        OperandLayout::MultiANewArray => {
            emit(code, u16_operand(0)?)?;
            emit(code, u8_operand(1)?)?;
        }
        OperandLayout::TableSwitch | OperandLayout::LookupSwitch | OperandLayout::Wide => (),
    }
    Ok(())
}

fn emit<T: Serialize>(code: &mut Vec<u8>, value: T) -> Result<(), CompileError> {
    value
        .serialize(code)
        .map_err(|err| CompileError::Other(err.to_string()))
}

/// Parse a decimal or `0x` hexadecimal integer, optionally negative, within bounds
fn parse_operand(token: &str, min: i64, max: i64, line: usize) -> Result<i64, CompileError> {
    let invalid = || CompileError::InvalidOperand {
        line,
        operand: token.to_owned(),
    };
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let (radix, body) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    // Only one leading `-` is allowed
    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    let magnitude = i64::from_str_radix(body, radix).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    if value < min || value > max {
        return Err(invalid());
    }
    Ok(value)
}

/// Stack and locals requirements of a run of bytecode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StackProfile {
    pub stack_effect: i32,
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Walk straight-line code and measure its stack depth and local variable use
///
/// Instructions with an unpredictable stack effect count as popping one word and pushing one
/// word. Jumps are ignored, so loops and skipped code are measured as if run once in order.
pub fn profile_code(code: &[u8], max_locals: u16) -> Result<StackProfile, jvm::Error> {
    let mut depth: i32 = 0;
    let mut peak: i32 = 0;
    let mut locals = max_locals;

    for (offset, _, insn) in decode_instructions(code)?.iter() {
        depth -= insn.opcode.consumes().or_conservative() as i32;
        depth += insn.opcode.produces().or_conservative() as i32;
        peak = peak.max(depth);
        locals = locals.max(locals_needed(code, offset.0, insn.opcode));
    }

    Ok(StackProfile {
        stack_effect: depth,
        max_stack: u16::try_from(peak).unwrap_or(u16::MAX),
        max_locals: locals,
    })
}

/// Width of a local variable from the kind of a load or store (`i`, `l`, `f`, `d`, `a`)
fn kind_width(kind: u8) -> u32 {
    match kind {
        1 | 3 => 2,
        _ => 1,
    }
}

/// Number of locals an instruction needs to exist (0 if it doesn't touch locals)
fn locals_needed(code: &[u8], pos: usize, opcode: Opcode) -> u16 {
    let op = opcode.0;
    let explicit_loads = Opcode::ILOAD.0..=Opcode::ALOAD.0;
    let explicit_stores = Opcode::ISTORE.0..=Opcode::ASTORE.0;
    let implicit_loads = Opcode::ILOAD_0.0..=Opcode::ALOAD_3.0;
    let implicit_stores = Opcode::ISTORE_0.0..=Opcode::ASTORE_3.0;

    let needed: u32 = if explicit_loads.contains(&op) {
        code[pos + 1] as u32 + kind_width(op - Opcode::ILOAD.0)
    } else if explicit_stores.contains(&op) {
        code[pos + 1] as u32 + kind_width(op - Opcode::ISTORE.0)
    } else if implicit_loads.contains(&op) {
        let relative = op - Opcode::ILOAD_0.0;
        (relative % 4) as u32 + kind_width(relative / 4)
    } else if implicit_stores.contains(&op) {
        let relative = op - Opcode::ISTORE_0.0;
        (relative % 4) as u32 + kind_width(relative / 4)
    } else if opcode == Opcode::IINC || opcode == Opcode::RET {
        code[pos + 1] as u32 + 1
    } else if opcode == Opcode::WIDE {
        let modified = code[pos + 1];
        let index = u16::from_be_bytes([code[pos + 2], code[pos + 3]]) as u32;
        if explicit_loads.contains(&modified) {
            index + kind_width(modified - Opcode::ILOAD.0)
        } else if explicit_stores.contains(&modified) {
            index + kind_width(modified - Opcode::ISTORE.0)
        } else {
            index + 1
        }
    } else {
        0
    };

    u16::try_from(needed).unwrap_or(u16::MAX)
}
