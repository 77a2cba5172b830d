use std::{fmt, sync::Arc};

use thiserror::Error;

/// Represents a byte span within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn to(self, other: SourceSpan) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

/// A resolved, human-facing position: source name plus 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub source: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// Maps byte offsets of one program text to [`Location`]s.
#[derive(Debug, Clone)]
pub struct LineIndex {
    source: Arc<str>,
    text: Arc<str>,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        line_starts.extend(
            text.char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(idx, _)| idx + 1),
        );
        Self {
            source: source.into(),
            text,
            line_starts,
        }
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(offset - line_start, |prefix| prefix.chars().count());
        Location {
            source: Arc::clone(&self.source),
            line: line as u32 + 1,
            column: column as u32 + 1,
        }
    }
}

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub location: Location,
    pub description: String,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: in {}", self.location, self.description)
    }
}

/// Front-end stage that rejected the program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
}

/// A scanning or parsing error, positioned by byte span only.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: SourceSpan,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    /// Resolves the span against the program text; the single frame is the top level.
    pub fn into_eval_error(self, lines: &LineIndex) -> EvalError {
        EvalError::syntax(self.message).with_frames(vec![Frame {
            location: lines.location(self.span.start),
            description: TOPLEVEL.to_string(),
        }])
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} ({}..{})",
            self.kind, self.message, self.span.start, self.span.end
        )
    }
}

impl std::error::Error for Diagnostic {}

/// Frame description of module-level code.
pub const TOPLEVEL: &str = "<toplevel>";

/// Classification of a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The program text does not parse; nothing was evaluated.
    Syntax,
    /// Raised while evaluating (undefined name, bad operand, division by zero).
    Eval,
    /// Returned by a host builtin.
    Host,
    /// A call's arguments did not fit the callee's declared parameters.
    ArgumentBinding,
}

impl ErrorKind {
    /// Argument binding failures are a specialization of evaluation errors.
    pub fn is_eval(self) -> bool {
        matches!(self, ErrorKind::Eval | ErrorKind::ArgumentBinding)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Eval => "evaluation error",
            ErrorKind::Host => "host error",
            ErrorKind::ArgumentBinding => "argument binding error",
        };
        f.write_str(name)
    }
}

/// A structured execution failure with the call stack captured when it was raised.
///
/// Frames are ordered outermost first; the innermost frame is last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    kind: ErrorKind,
    message: String,
    frames: Vec<Frame>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eval, message)
    }

    /// Builds the error a host builtin returns for its own failure reasons.
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Host, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentBinding, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn innermost(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    #[must_use]
    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = frames;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Renders the full traceback, innermost frame last and the message last.
    pub fn backtrace(&self) -> String {
        crate::backtrace::format(self)
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.innermost() {
            Some(frame) => write!(f, "{}: {}", frame.location, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for EvalError {}

/// Unified error type for the lotus embedding API.
#[derive(Debug, Error)]
pub enum LotusError {
    #[error("{0}")]
    Eval(#[from] EvalError),
    #[error("duplicate predeclared name `{0}`")]
    DuplicateName(String),
}

pub type Result<T> = std::result::Result<T, LotusError>;

/// Result of anything that evaluates script code or binds arguments.
pub type EvalResult<T> = std::result::Result<T, EvalError>;
