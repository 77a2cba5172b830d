//! Embeddable execution core for a Starlark-dialect scripting language.
//!
//! A host builds an [`Environment`] of predeclared bindings (constants and
//! native [`Builtin`]s), runs a program in a [`Session`], and gets back the
//! program's [`Globals`] or an [`EvalError`] carrying a backtrace.
//! Host functions bind their arguments through [`Signature`].

pub mod ast;
pub mod backtrace;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod print;
pub mod runtime;
pub mod session;
mod stack;
pub mod stdlib;
pub mod unpack;
pub mod value;

pub use diagnostics::{
    Diagnostic, DiagnosticKind, ErrorKind, EvalError, EvalResult, Frame, Location, LotusError,
    Result, SourceSpan,
};
pub use environment::{Environment, Globals, Registry};
pub use print::{CapturedOutput, PrintHandler};
pub use runtime::ExecutionContext;
pub use session::{CancelToken, Session, SessionOptions, SessionState};
pub use unpack::{Arguments, BoundArgs, ParamSpec, Signature, UnpackArgs};
pub use value::{Builtin, Callable, FromValue, Kind, Mismatch, UserFunction, Value, ValueKind};
