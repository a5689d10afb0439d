use crate::finder::{alphabet, Error};
use crate::jvm::Opcode;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Pattern over instruction sequences, compiled into a regular expression over the opcode
/// alphabet
///
/// Patterns are written as whitespace-separated instruction names and aliases, interspersed with
/// the usual regex operators:
///
/// ```text
/// aload_0 dup getfield (iconst | bipush) iadd putfield
/// ifinstruction iconst_0 goto iconst_1 nop (ifeq|ifne)
/// branchinstruction nop ((ifinstruction|goto)+ istore instruction)*
/// ```
///
/// Case is ignored. Repetition counts like `{2,3}` are kept as is.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
}

impl CompiledPattern {
    /// Pattern as written by the caller
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Regex over the encoded instruction stream
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// Renders the compiled regex with opcodes written back as mnemonics
impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut needs_space = false;
        for ch in self.regex.as_str().chars() {
            match alphabet::decode(ch) {
                Some(opcode) => {
                    if needs_space {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", opcode)?;
                    needs_space = true;
                }
                None => {
                    write!(f, "{}", ch)?;
                    needs_space = false;
                }
            }
        }
        Ok(())
    }
}

/// Compile a symbolic pattern
pub fn compile_pattern(pattern: &str) -> Result<CompiledPattern, Error> {
    let translated = translate_pattern(pattern)?;
    let regex = Regex::new(&translated)?;
    let compiled = CompiledPattern {
        source: pattern.to_owned(),
        regex,
    };
    log::trace!("Compiled pattern {:?} into {}", pattern, compiled);
    Ok(compiled)
}

/// Replace instruction names and aliases with their encodings and drop whitespace
///
/// Runs of alphanumeric characters and `_` are names. Everything else passes through untouched,
/// as do digits and commas between `{` and `}`.
pub fn translate_pattern(pattern: &str) -> Result<String, Error> {
    let lower = pattern.to_ascii_lowercase();
    let mut translated = String::with_capacity(lower.len() * alphabet::ENCODED_WIDTH);
    let mut chars = lower.chars().peekable();
    let mut in_repetition = false;

    while let Some(ch) = chars.next() {
        if ch.is_whitespace() {
            continue;
        }
        if in_repetition {
            in_repetition = ch != '}';
            translated.push(ch);
        } else if ch.is_alphanumeric() {
            let mut name = String::from(ch);
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            translated.push_str(&resolve_name(&name)?);
        } else {
            in_repetition = ch == '{';
            translated.push(ch);
        }
    }

    Ok(translated)
}

/// Encoding of a single name: aliases take priority over mnemonics
fn resolve_name(name: &str) -> Result<String, Error> {
    if let Some(alias) = ALIASES.get(name) {
        return Ok(alias.clone());
    }
    match Opcode::from_mnemonic(name) {
        Some(opcode) => Ok(alphabet::encode(opcode).to_string()),
        None => Err(Error::UnknownInstructionName(name.to_owned())),
    }
}

/// Non-capturing alternation of encoded opcodes
fn alternation(opcodes: impl IntoIterator<Item = Opcode>) -> String {
    let mut pattern = String::from("(?:");
    for (idx, opcode) in opcodes.into_iter().enumerate() {
        if idx > 0 {
            pattern.push('|');
        }
        pattern.push(alphabet::encode(opcode));
    }
    pattern.push(')');
    pattern
}

/// Opcodes with an inline operand (`from` through `to`) followed by the general indexed form
const RANGE_ALIASES: &[(&str, Opcode, Opcode, Option<Opcode>)] = &[
    ("iconst", Opcode::ICONST_0, Opcode::ICONST_5, Some(Opcode::ICONST_M1)),
    ("lconst", Opcode::LCONST_0, Opcode::LCONST_1, None),
    ("fconst", Opcode::FCONST_0, Opcode::FCONST_2, None),
    ("dconst", Opcode::DCONST_0, Opcode::DCONST_1, None),
    ("iload", Opcode::ILOAD_0, Opcode::ILOAD_3, Some(Opcode::ILOAD)),
    ("lload", Opcode::LLOAD_0, Opcode::LLOAD_3, Some(Opcode::LLOAD)),
    ("fload", Opcode::FLOAD_0, Opcode::FLOAD_3, Some(Opcode::FLOAD)),
    ("dload", Opcode::DLOAD_0, Opcode::DLOAD_3, Some(Opcode::DLOAD)),
    ("aload", Opcode::ALOAD_0, Opcode::ALOAD_3, Some(Opcode::ALOAD)),
    ("istore", Opcode::ISTORE_0, Opcode::ISTORE_3, Some(Opcode::ISTORE)),
    ("lstore", Opcode::LSTORE_0, Opcode::LSTORE_3, Some(Opcode::LSTORE)),
    ("fstore", Opcode::FSTORE_0, Opcode::FSTORE_3, Some(Opcode::FSTORE)),
    ("dstore", Opcode::DSTORE_0, Opcode::DSTORE_3, Some(Opcode::DSTORE)),
    ("astore", Opcode::ASTORE_0, Opcode::ASTORE_3, Some(Opcode::ASTORE)),
];

/// Instruction categories, as alternations of mnemonics and range aliases
const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("arithmeticinstruction", "irem|lrem|iand|ior|ineg|isub|lneg|fneg|fmul|ldiv|fadd|lxor|frem|idiv|land|ixor|ishr|fsub|lshl|fdiv|iadd|lor|dmul|lsub|ishl|imul|lmul|lushr|dneg|iushr|lshr|ddiv|drem|dadd|ladd|dsub"),
    ("invokeinstruction", "invokevirtual|invokeinterface|invokestatic|invokespecial|invokedynamic"),
    ("arrayinstruction", "baload|aastore|saload|caload|fastore|lastore|iaload|castore|iastore|aaload|bastore|sastore|faload|laload|daload|dastore"),
    ("gotoinstruction", "goto|goto_w"),
    ("conversioninstruction", "d2l|l2d|i2s|d2i|l2i|i2b|l2f|d2f|f2i|i2d|i2l|f2d|i2c|f2l|i2f"),
    ("localvariableinstruction", "fstore|iinc|lload|dstore|dload|iload|aload|astore|istore|fload|lstore"),
    ("loadinstruction", "fload|dload|lload|iload|aload"),
    ("fieldinstruction", "getfield|putstatic|getstatic|putfield"),
    ("cpinstruction", "ldc2_w|invokeinterface|invokedynamic|multianewarray|putstatic|instanceof|getstatic|checkcast|getfield|invokespecial|ldc_w|invokestatic|invokevirtual|putfield|ldc|new|anewarray"),
    ("stackinstruction", "dup2|swap|dup2_x2|pop|pop2|dup|dup2_x1|dup_x2|dup_x1"),
    ("branchinstruction", "ifle|if_acmpne|if_icmpeq|if_acmpeq|ifnonnull|goto_w|iflt|ifnull|if_icmpne|tableswitch|if_icmple|ifeq|if_icmplt|jsr_w|if_icmpgt|ifgt|jsr|goto|ifne|ifge|lookupswitch|if_icmpge"),
    ("returninstruction", "lreturn|ireturn|freturn|dreturn|areturn|return"),
    ("storeinstruction", "istore|fstore|dstore|astore|lstore"),
    ("select", "tableswitch|lookupswitch"),
    ("ifinstruction", "ifeq|ifgt|if_icmpne|if_icmpeq|ifge|ifnull|ifne|if_icmple|if_icmpge|if_acmpeq|if_icmplt|if_acmpne|ifnonnull|iflt|if_icmpgt|ifle"),
    ("jsrinstruction", "jsr|jsr_w"),
    ("variablelengthinstruction", "tableswitch|jsr|goto|lookupswitch"),
    ("unconditionalbranch", "goto|jsr|jsr_w|athrow|goto_w"),
    ("constantpushinstruction", "dconst|bipush|sipush|fconst|iconst|lconst"),
    ("typedinstruction", "imul|lsub|aload|fload|lor|new|aaload|fcmpg|iand|iaload|lrem|idiv|d2l|isub|dcmpg|dastore|ret|f2d|f2i|drem|iinc|i2c|checkcast|frem|lreturn|astore|lushr|daload|dneg|fastore|istore|lshl|ldiv|lstore|areturn|ishr|ldc_w|invokeinterface|aastore|lxor|ishl|l2d|i2f|return|faload|sipush|iushr|caload|instanceof|invokespecial|putfield|fmul|ireturn|laload|d2f|lneg|ixor|i2l|fdiv|lastore|multianewarray|i2b|getstatic|i2d|putstatic|fcmpl|saload|ladd|irem|dload|jsr_w|dconst|dcmpl|fsub|freturn|ldc|aconst_null|castore|lmul|ldc2_w|dadd|iconst|f2l|ddiv|dstore|land|jsr|anewarray|dmul|bipush|dsub|sastore|d2i|i2s|lshr|iadd|l2i|lload|bastore|fstore|fneg|iload|fadd|baload|fconst|ior|ineg|dreturn|l2f|lconst|getfield|invokevirtual|invokestatic|iastore"),
    ("popinstruction", "fstore|dstore|pop|pop2|astore|putstatic|istore|lstore"),
    ("allocationinstruction", "multianewarray|new|anewarray|newarray"),
    ("indexedinstruction", "lload|lstore|fload|ldc2_w|invokeinterface|multianewarray|astore|dload|putstatic|instanceof|getstatic|checkcast|getfield|invokespecial|dstore|istore|iinc|ldc_w|ret|fstore|invokestatic|iload|putfield|invokevirtual|ldc|new|aload|anewarray"),
    ("pushinstruction", "dup|lload|dup2|bipush|fload|ldc2_w|sipush|lconst|fconst|dload|getstatic|ldc_w|aconst_null|dconst|iload|ldc|iconst|aload"),
    ("stackproducer", "imul|lsub|aload|fload|lor|new|aaload|fcmpg|iand|iaload|lrem|idiv|d2l|isub|dcmpg|dup|f2d|f2i|drem|i2c|checkcast|frem|lushr|daload|dneg|lshl|ldiv|ishr|ldc_w|invokeinterface|lxor|ishl|l2d|i2f|faload|sipush|iushr|caload|instanceof|invokespecial|fmul|laload|d2f|lneg|ixor|i2l|fdiv|getstatic|i2b|swap|i2d|dup2|fcmpl|saload|ladd|irem|dload|jsr_w|dconst|dcmpl|fsub|ldc|arraylength|aconst_null|tableswitch|lmul|ldc2_w|iconst|dadd|f2l|ddiv|land|jsr|anewarray|dmul|bipush|dsub|d2i|newarray|i2s|lshr|iadd|lload|l2i|fneg|iload|fadd|baload|fconst|lookupswitch|ior|ineg|lconst|l2f|getfield|invokevirtual|invokestatic"),
    ("stackconsumer", "imul|lsub|lor|iflt|fcmpg|if_icmpgt|iand|ifeq|if_icmplt|lrem|ifnonnull|idiv|d2l|isub|dcmpg|dastore|if_icmpeq|f2d|f2i|drem|i2c|checkcast|frem|lreturn|astore|lushr|pop2|monitorexit|dneg|fastore|istore|lshl|ldiv|lstore|areturn|if_icmpge|ishr|monitorenter|invokeinterface|aastore|lxor|ishl|l2d|i2f|return|iushr|instanceof|invokespecial|fmul|ireturn|d2f|lneg|ixor|pop|i2l|ifnull|fdiv|lastore|i2b|if_acmpeq|ifge|swap|i2d|putstatic|fcmpl|ladd|irem|dcmpl|fsub|freturn|ifgt|castore|lmul|dadd|f2l|ddiv|dstore|land|if_icmpne|if_acmpne|dmul|dsub|sastore|ifle|d2i|i2s|lshr|iadd|l2i|bastore|fstore|fneg|fadd|ior|ineg|ifne|dreturn|l2f|if_icmple|getfield|invokevirtual|invokestatic|iastore"),
    ("exceptionthrower", "irem|lrem|laload|putstatic|baload|dastore|areturn|getstatic|ldiv|anewarray|iastore|castore|idiv|saload|lastore|fastore|putfield|lreturn|caload|getfield|return|aastore|freturn|newarray|instanceof|multianewarray|athrow|faload|iaload|aaload|dreturn|monitorenter|checkcast|bastore|arraylength|new|invokevirtual|sastore|ldc_w|ireturn|invokespecial|monitorexit|invokeinterface|ldc|invokestatic|daload"),
    ("loadclass", "multianewarray|invokeinterface|instanceof|invokespecial|putfield|checkcast|putstatic|invokevirtual|new|getstatic|invokestatic|getfield|anewarray"),
    ("instructiontargeter", "ifle|if_acmpne|if_icmpeq|if_acmpeq|ifnonnull|goto_w|iflt|ifnull|if_icmpne|tableswitch|if_icmple|ifeq|if_icmplt|jsr_w|if_icmpgt|ifgt|jsr|goto|ifne|ifge|lookupswitch|if_icmpge"),
    ("if_icmp", "if_icmpne|if_icmpeq|if_icmple|if_icmpge|if_icmplt|if_icmpgt"),
    ("if_acmp", "if_acmpeq|if_acmpne"),
    ("if", "ifeq|ifne|iflt|ifge|ifgt|ifle"),
];

/// Every alias, already encoded into the opcode alphabet
static ALIASES: LazyLock<HashMap<&'static str, String>> = LazyLock::new(|| {
    let mut aliases: HashMap<&'static str, String> = HashMap::new();

    let mut ranges: HashMap<&'static str, Vec<Opcode>> = HashMap::new();
    for (name, from, to, extra) in RANGE_ALIASES {
        let opcodes: Vec<Opcode> = (from.0..=to.0).map(Opcode).chain(*extra).collect();
        aliases.insert(*name, alternation(opcodes.iter().copied()));
        ranges.insert(*name, opcodes);
    }

    for (name, members) in CATEGORY_ALIASES {
        let mut opcodes: Vec<Opcode> = vec![];
        for member in members.split('|') {
            match ranges.get(member) {
                Some(range) => opcodes.extend(range.iter().copied()),
                None => opcodes.push(
                    Opcode::from_mnemonic(member)
                        .unwrap_or_else(|| panic!("alias {} has unknown member {}", name, member)),
                ),
            }
        }
        aliases.insert(*name, alternation(opcodes));
    }

    aliases.insert("instruction", alternation(Opcode::all()));
    aliases
});
