//! One execution of one program against a predeclared environment.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;

use crate::{
    diagnostics::{EvalError, LineIndex},
    environment::{Environment, Globals},
    parser,
    print::PrintHandler,
    runtime::Interpreter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Running,
    Completed,
    Failed,
}

/// Limits and dialect switches for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub allow_recursion: bool,
    pub max_call_depth: usize,
    pub max_steps: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            allow_recursion: false,
            max_call_depth: 1000,
            max_steps: None,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn allow_recursion(mut self, allow: bool) -> Self {
        self.allow_recursion = allow;
        self
    }

    #[must_use]
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    #[must_use]
    pub fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

/// Shared flag a host sets to stop a running session.
///
/// The interpreter polls it before each statement and loop iteration.
#[derive(Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The first reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.state.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.state.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// The cancellation reason, once cancelled.
    pub fn reason(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        self.state.reason.lock().clone()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Runs one program and keeps its outcome.
///
/// ```
/// use lotus::{Environment, PrintHandler, Session};
///
/// let env = Environment::empty();
/// let (print, output) = PrintHandler::buffer();
/// let mut session = Session::new("hello.star", print);
/// let globals = session.run(&env, "x = 2 * 21\nprint(x)\n").unwrap();
/// assert_eq!(globals.get("x").and_then(|v| v.as_int()), Some(42));
/// assert_eq!(output.lines(), vec!["42".to_string()]);
/// ```
#[derive(Debug)]
pub struct Session {
    name: String,
    print: PrintHandler,
    options: SessionOptions,
    cancel: Option<CancelToken>,
    state: SessionState,
    outcome: Option<Result<Globals, EvalError>>,
}

impl Session {
    pub fn new(name: impl Into<String>, print: PrintHandler) -> Self {
        Self {
            name: name.into(),
            print,
            options: SessionOptions::default(),
            cancel: None,
            state: SessionState::Created,
            outcome: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Top-level bindings of a completed run; `None` before the run and after a failure.
    pub fn globals(&self) -> Option<&Globals> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().ok())
    }

    pub fn error(&self) -> Option<&EvalError> {
        self.outcome.as_ref().and_then(|outcome| outcome.as_ref().err())
    }

    /// Parses and executes `program`, returning its top-level bindings.
    ///
    /// A session runs at most once. On failure no bindings are kept, even
    /// those assigned before the failing statement.
    #[tracing::instrument(level = "debug", skip_all, fields(source = %self.name))]
    pub fn run(&mut self, env: &Environment, program: &str) -> Result<Globals, EvalError> {
        if self.state != SessionState::Created {
            return Err(EvalError::eval(format!(
                "session \"{}\" has already run",
                self.name
            )));
        }
        self.state = SessionState::Running;

        let result = self.execute(env, program);
        match &result {
            Ok(globals) => {
                tracing::debug!(globals = globals.len(), "session completed");
                self.state = SessionState::Completed;
            }
            Err(err) => {
                tracing::debug!(kind = %err.kind(), error = %err, "session failed");
                self.state = SessionState::Failed;
            }
        }
        self.outcome = Some(result.clone());
        result
    }

    fn execute(&mut self, env: &Environment, program: &str) -> Result<Globals, EvalError> {
        let lines = LineIndex::new(self.name.as_str(), program);
        let module = parser::parse_module(program).map_err(|diag| diag.into_eval_error(&lines))?;

        if let Some(reason) = self.cancel.as_ref().and_then(CancelToken::reason) {
            return Err(EvalError::eval(format!("execution cancelled: {reason}")));
        }

        let interpreter = Interpreter::new(
            lines,
            env,
            &mut self.print,
            &self.options,
            self.cancel.as_ref(),
        );
        interpreter.run(&module).map(Globals::from_bindings)
    }
}
