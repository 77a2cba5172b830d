//! Destinations for the script's `print` output.
//!
//! - Stdout: one line per print (default)
//! - Buffer: captured lines for hosts and tests
//! - Silent: discards everything
//! - Callback: any host closure, called once per print

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

/// Lines captured by a [`PrintHandler::Buffer`], shared with the host.
#[derive(Clone, Default)]
pub struct CapturedOutput {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }

    /// Snapshot of every line printed so far, in print order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl fmt::Debug for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.lines.lock().iter()).finish()
    }
}

/// The print sink a session hands to the interpreter.
#[derive(Default)]
pub enum PrintHandler {
    #[default]
    Stdout,
    Buffer(CapturedOutput),
    Silent,
    Callback(Box<dyn FnMut(&str)>),
}

impl PrintHandler {
    /// A buffering handler plus the host's handle on the captured lines.
    pub fn buffer() -> (Self, CapturedOutput) {
        let output = CapturedOutput::new();
        (Self::Buffer(output.clone()), output)
    }

    pub fn callback(sink: impl FnMut(&str) + 'static) -> Self {
        Self::Callback(Box::new(sink))
    }

    pub fn print(&mut self, msg: &str) {
        match self {
            Self::Stdout => println!("{msg}"),
            Self::Buffer(output) => output.push(msg),
            Self::Silent => {}
            Self::Callback(sink) => sink(msg),
        }
    }
}

impl fmt::Debug for PrintHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Buffer(output) => f.debug_tuple("Buffer").field(output).finish(),
            Self::Silent => f.write_str("Silent"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}
