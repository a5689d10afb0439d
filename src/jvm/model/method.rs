use crate::jvm::code::CodeAttribute;
use crate::jvm::MethodAccessFlags;

/// Method whose body is searched and rewritten
#[derive(Clone, Debug)]
pub struct MethodInfo {
    /// Method name (eg. `<init>` or `toString`)
    pub name: String,

    pub access_flags: MethodAccessFlags,

    /// Method code implementation
    ///
    /// Abstract and native methods have no code.
    pub code: Option<CodeAttribute>,
}

impl MethodInfo {
    /// Create a new method with a body
    pub fn new(
        name: impl Into<String>,
        access_flags: MethodAccessFlags,
        code: CodeAttribute,
    ) -> MethodInfo {
        MethodInfo {
            name: name.into(),
            access_flags,
            code: Some(code),
        }
    }

    /// Create a new method without a body
    pub fn without_code(name: impl Into<String>, access_flags: MethodAccessFlags) -> MethodInfo {
        MethodInfo {
            name: name.into(),
            access_flags,
            code: None,
        }
    }

    /// Static methods have no `this` in local 0
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }
}
