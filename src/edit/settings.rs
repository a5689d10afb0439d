/// What to do when a replacement statement fails to compile
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompileErrorPolicy {
    /// Stop the whole scan and return the error
    Abort,

    /// Leave the match untouched and keep scanning after it
    SkipMatch,
}

#[derive(Clone, Debug)]
pub struct Settings {
    /// How to handle statements that fail to compile
    pub on_compile_error: CompileErrorPolicy,

    /// Maximum number of structural edits in a single scan of a method
    ///
    /// A pattern that also matches its own replacement can otherwise keep editing the same spot
    /// forever. Reaching the limit ends the scan normally (with a warning).
    pub max_edits: Option<usize>,

    /// Run the frame rebuilder on methods that were edited
    pub rebuild_frames: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            on_compile_error: CompileErrorPolicy::Abort,
            max_edits: None,
            rebuild_frames: true,
        }
    }
}
