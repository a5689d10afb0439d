//! Static description of every JVM opcode
//!
//! For each opcode this records its mnemonic, the layout of the operands following it, and how
//! many words of operand stack it pops and pushes. Stack counts are in words, so `long` and
//! `double` values count for 2 (this matches how `max_stack` is measured).

use std::fmt;

/// Single-byte JVM opcode
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Opcode(pub u8);

/// How many stack words an instruction pops or pushes
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum StackCount {
    /// Statically known number of words
    Words(u8),

    /// Depends on something outside the instruction stream (eg. the descriptor of the field or
    /// method referenced through the constant pool)
    Unpredictable,
}

impl StackCount {
    /// Estimate used in place of an unpredictable count
    ///
    /// This is deliberately crude: a method call is treated as popping one word and pushing one
    /// word, whatever its descriptor says.
    pub const CONSERVATIVE_ESTIMATE: u8 = 1;

    /// Number of words, falling back to [`StackCount::CONSERVATIVE_ESTIMATE`]
    pub fn or_conservative(self) -> u8 {
        match self {
            StackCount::Words(words) => words,
            StackCount::Unpredictable => StackCount::CONSERVATIVE_ESTIMATE,
        }
    }
}

/// Shape of the operands that follow an opcode byte
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OperandLayout {
    /// No operands
    None,

    /// Signed byte (`bipush`)
    Byte,

    /// Unsigned byte index (local variable, `ldc` constant, `newarray` type)
    Index8,

    /// Signed short (`sipush`)
    Short,

    /// Unsigned short constant pool index
    Index16,

    /// Signed 16-bit jump, relative to the opcode
    Branch16,

    /// Signed 32-bit jump, relative to the opcode
    Branch32,

    /// Local variable index and signed increment
    Iinc,

    /// Constant pool index, argument count, and a zero byte
    InvokeInterface,

    /// Constant pool index and two zero bytes
    InvokeDynamic,

    /// Constant pool index and dimension count
    MultiANewArray,

    /// Padding to a 4-byte boundary, then default, low, high, and jump table
    TableSwitch,

    /// Padding to a 4-byte boundary, then default, pair count, and match/jump pairs
    LookupSwitch,

    /// Modifies the next instruction to take a 16-bit local index (and increment, for `iinc`)
    Wide,
}

impl OperandLayout {
    /// Byte length of an instruction with this layout (opcode included), if it doesn't depend on
    /// the position or contents of the instruction
    pub fn fixed_length(self) -> Option<usize> {
        match self {
            OperandLayout::None => Some(1),
            OperandLayout::Byte | OperandLayout::Index8 => Some(2),
            OperandLayout::Short
            | OperandLayout::Index16
            | OperandLayout::Branch16
            | OperandLayout::Iinc => Some(3),
            OperandLayout::MultiANewArray => Some(4),
            OperandLayout::Branch32
            | OperandLayout::InvokeInterface
            | OperandLayout::InvokeDynamic => Some(5),
            OperandLayout::TableSwitch | OperandLayout::LookupSwitch | OperandLayout::Wide => {
                None
            }
        }
    }
}

/// Everything statically known about one opcode
#[derive(Debug)]
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub layout: OperandLayout,
    pub consumes: StackCount,
    pub produces: StackCount,
}

const U: StackCount = StackCount::Unpredictable;

const fn w(words: u8) -> StackCount {
    StackCount::Words(words)
}

macro_rules! instruction_set {
    ($( $name:ident = $code:literal, $mnemonic:literal, $layout:ident, $consumes:expr, $produces:expr; )*) => {
        impl Opcode {
            $( pub const $name: Opcode = Opcode($code); )*
        }

        /// Indexed by opcode
        static INSTRUCTION_SET: &[OpcodeInfo] = &[
            $(
                OpcodeInfo {
                    opcode: Opcode($code),
                    mnemonic: $mnemonic,
                    layout: OperandLayout::$layout,
                    consumes: $consumes,
                    produces: $produces,
                },
            )*
        ];
    };
}

instruction_set! {
    NOP = 0x00, "nop", None, w(0), w(0);
    ACONST_NULL = 0x01, "aconst_null", None, w(0), w(1);
    ICONST_M1 = 0x02, "iconst_m1", None, w(0), w(1);
    ICONST_0 = 0x03, "iconst_0", None, w(0), w(1);
    ICONST_1 = 0x04, "iconst_1", None, w(0), w(1);
    ICONST_2 = 0x05, "iconst_2", None, w(0), w(1);
    ICONST_3 = 0x06, "iconst_3", None, w(0), w(1);
    ICONST_4 = 0x07, "iconst_4", None, w(0), w(1);
    ICONST_5 = 0x08, "iconst_5", None, w(0), w(1);
    LCONST_0 = 0x09, "lconst_0", None, w(0), w(2);
    LCONST_1 = 0x0a, "lconst_1", None, w(0), w(2);
    FCONST_0 = 0x0b, "fconst_0", None, w(0), w(1);
    FCONST_1 = 0x0c, "fconst_1", None, w(0), w(1);
    FCONST_2 = 0x0d, "fconst_2", None, w(0), w(1);
    DCONST_0 = 0x0e, "dconst_0", None, w(0), w(2);
    DCONST_1 = 0x0f, "dconst_1", None, w(0), w(2);
    BIPUSH = 0x10, "bipush", Byte, w(0), w(1);
    SIPUSH = 0x11, "sipush", Short, w(0), w(1);
    LDC = 0x12, "ldc", Index8, w(0), w(1);
    LDC_W = 0x13, "ldc_w", Index16, w(0), w(1);
    LDC2_W = 0x14, "ldc2_w", Index16, w(0), w(2);
    ILOAD = 0x15, "iload", Index8, w(0), w(1);
    LLOAD = 0x16, "lload", Index8, w(0), w(2);
    FLOAD = 0x17, "fload", Index8, w(0), w(1);
    DLOAD = 0x18, "dload", Index8, w(0), w(2);
    ALOAD = 0x19, "aload", Index8, w(0), w(1);
    ILOAD_0 = 0x1a, "iload_0", None, w(0), w(1);
    ILOAD_1 = 0x1b, "iload_1", None, w(0), w(1);
    ILOAD_2 = 0x1c, "iload_2", None, w(0), w(1);
    ILOAD_3 = 0x1d, "iload_3", None, w(0), w(1);
    LLOAD_0 = 0x1e, "lload_0", None, w(0), w(2);
    LLOAD_1 = 0x1f, "lload_1", None, w(0), w(2);
    LLOAD_2 = 0x20, "lload_2", None, w(0), w(2);
    LLOAD_3 = 0x21, "lload_3", None, w(0), w(2);
    FLOAD_0 = 0x22, "fload_0", None, w(0), w(1);
    FLOAD_1 = 0x23, "fload_1", None, w(0), w(1);
    FLOAD_2 = 0x24, "fload_2", None, w(0), w(1);
    FLOAD_3 = 0x25, "fload_3", None, w(0), w(1);
    DLOAD_0 = 0x26, "dload_0", None, w(0), w(2);
    DLOAD_1 = 0x27, "dload_1", None, w(0), w(2);
    DLOAD_2 = 0x28, "dload_2", None, w(0), w(2);
    DLOAD_3 = 0x29, "dload_3", None, w(0), w(2);
    ALOAD_0 = 0x2a, "aload_0", None, w(0), w(1);
    ALOAD_1 = 0x2b, "aload_1", None, w(0), w(1);
    ALOAD_2 = 0x2c, "aload_2", None, w(0), w(1);
    ALOAD_3 = 0x2d, "aload_3", None, w(0), w(1);
    IALOAD = 0x2e, "iaload", None, w(2), w(1);
    LALOAD = 0x2f, "laload", None, w(2), w(2);
    FALOAD = 0x30, "faload", None, w(2), w(1);
    DALOAD = 0x31, "daload", None, w(2), w(2);
    AALOAD = 0x32, "aaload", None, w(2), w(1);
    BALOAD = 0x33, "baload", None, w(2), w(1);
    CALOAD = 0x34, "caload", None, w(2), w(1);
    SALOAD = 0x35, "saload", None, w(2), w(1);
    ISTORE = 0x36, "istore", Index8, w(1), w(0);
    LSTORE = 0x37, "lstore", Index8, w(2), w(0);
    FSTORE = 0x38, "fstore", Index8, w(1), w(0);
    DSTORE = 0x39, "dstore", Index8, w(2), w(0);
    ASTORE = 0x3a, "astore", Index8, w(1), w(0);
    ISTORE_0 = 0x3b, "istore_0", None, w(1), w(0);
    ISTORE_1 = 0x3c, "istore_1", None, w(1), w(0);
    ISTORE_2 = 0x3d, "istore_2", None, w(1), w(0);
    ISTORE_3 = 0x3e, "istore_3", None, w(1), w(0);
    LSTORE_0 = 0x3f, "lstore_0", None, w(2), w(0);
    LSTORE_1 = 0x40, "lstore_1", None, w(2), w(0);
    LSTORE_2 = 0x41, "lstore_2", None, w(2), w(0);
    LSTORE_3 = 0x42, "lstore_3", None, w(2), w(0);
    FSTORE_0 = 0x43, "fstore_0", None, w(1), w(0);
    FSTORE_1 = 0x44, "fstore_1", None, w(1), w(0);
    FSTORE_2 = 0x45, "fstore_2", None, w(1), w(0);
    FSTORE_3 = 0x46, "fstore_3", None, w(1), w(0);
    DSTORE_0 = 0x47, "dstore_0", None, w(2), w(0);
    DSTORE_1 = 0x48, "dstore_1", None, w(2), w(0);
    DSTORE_2 = 0x49, "dstore_2", None, w(2), w(0);
    DSTORE_3 = 0x4a, "dstore_3", None, w(2), w(0);
    ASTORE_0 = 0x4b, "astore_0", None, w(1), w(0);
    ASTORE_1 = 0x4c, "astore_1", None, w(1), w(0);
    ASTORE_2 = 0x4d, "astore_2", None, w(1), w(0);
    ASTORE_3 = 0x4e, "astore_3", None, w(1), w(0);
    IASTORE = 0x4f, "iastore", None, w(3), w(0);
    LASTORE = 0x50, "lastore", None, w(4), w(0);
    FASTORE = 0x51, "fastore", None, w(3), w(0);
    DASTORE = 0x52, "dastore", None, w(4), w(0);
    AASTORE = 0x53, "aastore", None, w(3), w(0);
    BASTORE = 0x54, "bastore", None, w(3), w(0);
    CASTORE = 0x55, "castore", None, w(3), w(0);
    SASTORE = 0x56, "sastore", None, w(3), w(0);
    POP = 0x57, "pop", None, w(1), w(0);
    POP2 = 0x58, "pop2", None, w(2), w(0);
    DUP = 0x59, "dup", None, w(1), w(2);
    DUP_X1 = 0x5a, "dup_x1", None, w(2), w(3);
    DUP_X2 = 0x5b, "dup_x2", None, w(3), w(4);
    DUP2 = 0x5c, "dup2", None, w(2), w(4);
    DUP2_X1 = 0x5d, "dup2_x1", None, w(3), w(5);
    DUP2_X2 = 0x5e, "dup2_x2", None, w(4), w(6);
    SWAP = 0x5f, "swap", None, w(2), w(2);
    IADD = 0x60, "iadd", None, w(2), w(1);
    LADD = 0x61, "ladd", None, w(4), w(2);
    FADD = 0x62, "fadd", None, w(2), w(1);
    DADD = 0x63, "dadd", None, w(4), w(2);
    ISUB = 0x64, "isub", None, w(2), w(1);
    LSUB = 0x65, "lsub", None, w(4), w(2);
    FSUB = 0x66, "fsub", None, w(2), w(1);
    DSUB = 0x67, "dsub", None, w(4), w(2);
    IMUL = 0x68, "imul", None, w(2), w(1);
    LMUL = 0x69, "lmul", None, w(4), w(2);
    FMUL = 0x6a, "fmul", None, w(2), w(1);
    DMUL = 0x6b, "dmul", None, w(4), w(2);
    IDIV = 0x6c, "idiv", None, w(2), w(1);
    LDIV = 0x6d, "ldiv", None, w(4), w(2);
    FDIV = 0x6e, "fdiv", None, w(2), w(1);
    DDIV = 0x6f, "ddiv", None, w(4), w(2);
    IREM = 0x70, "irem", None, w(2), w(1);
    LREM = 0x71, "lrem", None, w(4), w(2);
    FREM = 0x72, "frem", None, w(2), w(1);
    DREM = 0x73, "drem", None, w(4), w(2);
    INEG = 0x74, "ineg", None, w(1), w(1);
    LNEG = 0x75, "lneg", None, w(2), w(2);
    FNEG = 0x76, "fneg", None, w(1), w(1);
    DNEG = 0x77, "dneg", None, w(2), w(2);
    ISHL = 0x78, "ishl", None, w(2), w(1);
    LSHL = 0x79, "lshl", None, w(3), w(2);
    ISHR = 0x7a, "ishr", None, w(2), w(1);
    LSHR = 0x7b, "lshr", None, w(3), w(2);
    IUSHR = 0x7c, "iushr", None, w(2), w(1);
    LUSHR = 0x7d, "lushr", None, w(3), w(2);
    IAND = 0x7e, "iand", None, w(2), w(1);
    LAND = 0x7f, "land", None, w(4), w(2);
    IOR = 0x80, "ior", None, w(2), w(1);
    LOR = 0x81, "lor", None, w(4), w(2);
    IXOR = 0x82, "ixor", None, w(2), w(1);
    LXOR = 0x83, "lxor", None, w(4), w(2);
    IINC = 0x84, "iinc", Iinc, w(0), w(0);
    I2L = 0x85, "i2l", None, w(1), w(2);
    I2F = 0x86, "i2f", None, w(1), w(1);
    I2D = 0x87, "i2d", None, w(1), w(2);
    L2I = 0x88, "l2i", None, w(2), w(1);
    L2F = 0x89, "l2f", None, w(2), w(1);
    L2D = 0x8a, "l2d", None, w(2), w(2);
    F2I = 0x8b, "f2i", None, w(1), w(1);
    F2L = 0x8c, "f2l", None, w(1), w(2);
    F2D = 0x8d, "f2d", None, w(1), w(2);
    D2I = 0x8e, "d2i", None, w(2), w(1);
    D2L = 0x8f, "d2l", None, w(2), w(2);
    D2F = 0x90, "d2f", None, w(2), w(1);
    I2B = 0x91, "i2b", None, w(1), w(1);
    I2C = 0x92, "i2c", None, w(1), w(1);
    I2S = 0x93, "i2s", None, w(1), w(1);
    LCMP = 0x94, "lcmp", None, w(4), w(1);
    FCMPL = 0x95, "fcmpl", None, w(2), w(1);
    FCMPG = 0x96, "fcmpg", None, w(2), w(1);
    DCMPL = 0x97, "dcmpl", None, w(4), w(1);
    DCMPG = 0x98, "dcmpg", None, w(4), w(1);
    IFEQ = 0x99, "ifeq", Branch16, w(1), w(0);
    IFNE = 0x9a, "ifne", Branch16, w(1), w(0);
    IFLT = 0x9b, "iflt", Branch16, w(1), w(0);
    IFGE = 0x9c, "ifge", Branch16, w(1), w(0);
    IFGT = 0x9d, "ifgt", Branch16, w(1), w(0);
    IFLE = 0x9e, "ifle", Branch16, w(1), w(0);
    IF_ICMPEQ = 0x9f, "if_icmpeq", Branch16, w(2), w(0);
    IF_ICMPNE = 0xa0, "if_icmpne", Branch16, w(2), w(0);
    IF_ICMPLT = 0xa1, "if_icmplt", Branch16, w(2), w(0);
    IF_ICMPGE = 0xa2, "if_icmpge", Branch16, w(2), w(0);
    IF_ICMPGT = 0xa3, "if_icmpgt", Branch16, w(2), w(0);
    IF_ICMPLE = 0xa4, "if_icmple", Branch16, w(2), w(0);
    IF_ACMPEQ = 0xa5, "if_acmpeq", Branch16, w(2), w(0);
    IF_ACMPNE = 0xa6, "if_acmpne", Branch16, w(2), w(0);
    GOTO = 0xa7, "goto", Branch16, w(0), w(0);
    JSR = 0xa8, "jsr", Branch16, w(0), w(1);
    RET = 0xa9, "ret", Index8, w(0), w(0);
    TABLESWITCH = 0xaa, "tableswitch", TableSwitch, w(1), w(0);
    LOOKUPSWITCH = 0xab, "lookupswitch", LookupSwitch, w(1), w(0);
    IRETURN = 0xac, "ireturn", None, w(1), w(0);
    LRETURN = 0xad, "lreturn", None, w(2), w(0);
    FRETURN = 0xae, "freturn", None, w(1), w(0);
    DRETURN = 0xaf, "dreturn", None, w(2), w(0);
    ARETURN = 0xb0, "areturn", None, w(1), w(0);
    RETURN = 0xb1, "return", None, w(0), w(0);
    GETSTATIC = 0xb2, "getstatic", Index16, w(0), U;
    PUTSTATIC = 0xb3, "putstatic", Index16, U, w(0);
    GETFIELD = 0xb4, "getfield", Index16, w(1), U;
    PUTFIELD = 0xb5, "putfield", Index16, U, w(0);
    INVOKEVIRTUAL = 0xb6, "invokevirtual", Index16, U, U;
    INVOKESPECIAL = 0xb7, "invokespecial", Index16, U, U;
    INVOKESTATIC = 0xb8, "invokestatic", Index16, U, U;
    INVOKEINTERFACE = 0xb9, "invokeinterface", InvokeInterface, U, U;
    INVOKEDYNAMIC = 0xba, "invokedynamic", InvokeDynamic, U, U;
    NEW = 0xbb, "new", Index16, w(0), w(1);
    NEWARRAY = 0xbc, "newarray", Index8, w(1), w(1);
    ANEWARRAY = 0xbd, "anewarray", Index16, w(1), w(1);
    ARRAYLENGTH = 0xbe, "arraylength", None, w(1), w(1);
    ATHROW = 0xbf, "athrow", None, w(1), w(1);
    CHECKCAST = 0xc0, "checkcast", Index16, w(1), w(1);
    INSTANCEOF = 0xc1, "instanceof", Index16, w(1), w(1);
    MONITORENTER = 0xc2, "monitorenter", None, w(1), w(0);
    MONITOREXIT = 0xc3, "monitorexit", None, w(1), w(0);
    WIDE = 0xc4, "wide", Wide, U, U;
    MULTIANEWARRAY = 0xc5, "multianewarray", MultiANewArray, U, w(1);
    IFNULL = 0xc6, "ifnull", Branch16, w(1), w(0);
    IFNONNULL = 0xc7, "ifnonnull", Branch16, w(1), w(0);
    GOTO_W = 0xc8, "goto_w", Branch32, w(0), w(0);
    JSR_W = 0xc9, "jsr_w", Branch32, w(0), w(1);
}

impl Opcode {
    /// Every defined opcode, in increasing order
    pub fn all() -> impl Iterator<Item = Opcode> {
        INSTRUCTION_SET.iter().map(|info| info.opcode)
    }

    /// Look up an opcode from its (lower case) mnemonic
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        INSTRUCTION_SET
            .iter()
            .find(|info| info.mnemonic == mnemonic)
            .map(|info| info.opcode)
    }

    /// Static description of the opcode (`None` for reserved or unassigned opcodes)
    pub fn info(self) -> Option<&'static OpcodeInfo> {
        INSTRUCTION_SET.get(self.0 as usize)
    }

    pub fn is_defined(self) -> bool {
        self.info().is_some()
    }

    pub fn mnemonic(self) -> Option<&'static str> {
        self.info().map(|info| info.mnemonic)
    }

    pub fn layout(self) -> Option<OperandLayout> {
        self.info().map(|info| info.layout)
    }

    /// Stack words pushed by the instruction
    ///
    /// Undefined opcodes are reported as unpredictable.
    pub fn produces(self) -> StackCount {
        self.info().map_or(StackCount::Unpredictable, |info| info.produces)
    }

    /// Stack words popped by the instruction
    ///
    /// Undefined opcodes are reported as unpredictable.
    pub fn consumes(self) -> StackCount {
        self.info().map_or(StackCount::Unpredictable, |info| info.consumes)
    }

    /// Net change in stack depth, using the conservative estimate for unpredictable counts
    pub fn stack_effect(self) -> i32 {
        self.produces().or_conservative() as i32 - self.consumes().or_conservative() as i32
    }

    /// Is this one of the two variable-length switch instructions?
    pub fn is_switch(self) -> bool {
        self == Opcode::TABLESWITCH || self == Opcode::LOOKUPSWITCH
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mnemonic() {
            Some(mnemonic) => f.write_str(mnemonic),
            None => write!(f, "<0x{:02x}>", self.0),
        }
    }
}
