/// Lightweight error enum - only 1 byte!
/// The message and the raised value are kept in the state (`error_msg`,
/// `error_object`) so `LuaResult` stays small on hot paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuaError {
    /// Runtime error raised by a script or a host function
    RuntimeError,
    /// Source failed to parse
    CompileError,
    /// Script file could not be read
    FileError,
    /// Call depth or value stack limit exceeded
    StackOverflow,
}

impl LuaError {
    /// Failures of the load step, as opposed to errors raised while running
    pub fn is_load_error(self) -> bool {
        matches!(self, LuaError::CompileError | LuaError::FileError)
    }
}

impl std::fmt::Display for LuaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LuaError::RuntimeError => write!(f, "Runtime Error"),
            LuaError::CompileError => write!(f, "Compile Error"),
            LuaError::FileError => write!(f, "File Error"),
            LuaError::StackOverflow => write!(f, "Stack Overflow"),
        }
    }
}

/// Owned error handed to the host: the kind plus the raised message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct LuaFullError {
    pub kind: LuaError,
    pub message: String,
}

impl LuaFullError {
    pub fn new(kind: LuaError, message: impl Into<String>) -> Self {
        LuaFullError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> LuaError {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_load_error(&self) -> bool {
        self.kind.is_load_error()
    }
}
