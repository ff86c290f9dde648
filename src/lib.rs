//! A bytecode interpreter for Blue, a small dynamic scripting language.
//!
//! The crate is split into the same pieces a `clox`-style implementation
//! would have: a [scanner] that lazily tokenizes source text, a
//! [compiler] that is also the parser (there is no intermediate AST —
//! tokens are turned directly into bytecode via Pratt precedence
//! climbing), a [chunk] that holds the resulting bytecode plus its
//! constant pool and line table, and a [vm] that executes chunks.

pub mod chunk;
pub mod compiler;
pub mod debug;
pub mod error;
pub mod extension_traits;
pub mod gc;
pub mod globals;
pub mod scanner;
pub mod value;
pub mod vm;

mod with_try_from_u8;

/// The type returned by various functions that parse, compile, and run Blue code.
/// This is the standard [std::result::Result], but the error is always
/// [error::InterpretationError]. This type alias is generic for the return type, however.
///
/// ```
/// fn compile() -> blue::Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, error::InterpretationError>;

/// Re-exports common items.
///
/// Since the system this is modeled on is usually written in C, which lacks explicit features
/// for scoping across modules, many items are assumed to be globally-visible. Therefore, we
/// export the most common "global" items here:
pub mod prelude {
    pub use crate::chunk::{Chunk, OpCode};
    pub use crate::error::InterpretationError;
    pub use crate::scanner::{Lexeme, Scanner, Token};
    pub use crate::value::{Obj, Value};
    pub use crate::vm::VM;
}
