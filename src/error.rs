//! Provides [InterpretationError], the error that most things return.
use thiserror::Error;

/// Any error that can occur during interpretation.
#[derive(Debug, Error)]
pub enum InterpretationError {
    /// A compile-time error: a lexical, syntactic, or resolution error. The compiler has
    /// already printed the offending line(s) to stderr by the time this is returned; this
    /// variant just tells the caller which exit code to use.
    #[error("compile-time error")]
    CompileError,
    /// A runtime error, such as a type error or an undefined variable. The VM has already
    /// printed the error and the offending line to stderr by the time this is returned.
    #[error("runtime error")]
    RuntimeError,
}
