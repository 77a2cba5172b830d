use lotus::{
    backtrace, Environment, EvalError, Frame, Location, PrintHandler, Session,
};
use pretty_assertions::assert_eq;

fn frame(line: u32, column: u32, description: &str) -> Frame {
    Frame {
        location: Location {
            source: "trace.star".into(),
            line,
            column,
        },
        description: description.to_string(),
    }
}

fn run_error(source: &str) -> EvalError {
    let mut session = Session::new("test.star", PrintHandler::Silent);
    session
        .run(&Environment::empty(), source)
        .expect_err("program should fail")
}

#[test]
fn error_without_frames_is_message_only() {
    let err = EvalError::eval("boom");
    assert_eq!(backtrace::format(&err), "Error: boom");
    assert_eq!(err.to_string(), "boom");
}

#[test]
fn frames_render_outermost_first() {
    let err = EvalError::eval("boom").with_frames(vec![
        frame(7, 1, "<toplevel>"),
        frame(3, 12, "helper"),
    ]);
    assert_eq!(
        err.backtrace(),
        "Traceback (most recent call last):\n  trace.star:7:1: in <toplevel>\n  trace.star:3:12: in helper\nError: boom"
    );
    assert_eq!(err.to_string(), "trace.star:3:12: boom");
    assert_eq!(backtrace::format_frame(&err.frames()[0]), "  trace.star:7:1: in <toplevel>");
}

#[test]
fn nested_calls_are_captured_in_order() {
    let err = run_error(
        r#"def inner():
    return 1 // 0

def outer():
    return inner()

outer()
"#,
    );
    assert_eq!(
        err.backtrace(),
        [
            "Traceback (most recent call last):",
            "  test.star:7:6: in <toplevel>",
            "  test.star:5:17: in outer",
            "  test.star:2:14: in inner",
            "Error: integer division by zero",
        ]
        .join("\n")
    );
    assert_eq!(err.to_string(), "test.star:2:14: integer division by zero");
}

#[test]
fn syntax_error_has_single_toplevel_frame() {
    let err = run_error("x = (1 +\n");
    assert_eq!(err.frames().len(), 1);
    assert!(err.backtrace().starts_with("Traceback (most recent call last):\n  test.star:"));
    assert!(err.backtrace().ends_with(&format!("Error: {}", err.message())));
}
