//! Human-readable rendering of evaluation failures.
//!
//! The layout is fixed so hosts and tests can compare it verbatim:
//!
//! ```text
//! Traceback (most recent call last):
//!   demo.star:1:6: in <toplevel>
//!   demo.star:3:9: in helper
//! Error: floating-point division by zero
//! ```

use crate::diagnostics::{EvalError, Frame};

pub const HEADER: &str = "Traceback (most recent call last):";

/// Formats every frame (innermost last) followed by the error message.
pub fn format(error: &EvalError) -> String {
    let mut out = String::new();
    if error.has_frames() {
        out.push_str(HEADER);
        out.push('\n');
        for frame in error.frames() {
            out.push_str(&format_frame(frame));
            out.push('\n');
        }
    }
    out.push_str("Error: ");
    out.push_str(error.message());
    out
}

pub fn format_frame(frame: &Frame) -> String {
    format!("  {frame}")
}
