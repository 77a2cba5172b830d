//! Runs a small program against a host environment and lists its globals.
//!
//! `RUST_LOG=lotus=trace cargo run --example exec_file` shows the builtin calls.

use std::process::ExitCode;

use lotus::{EvalError, PrintHandler, Registry, Session, Signature, Value};
use tracing_subscriber::EnvFilter;

const PROGRAM: &str = r#"
print(greeting + ", world")
print(repeat("one"))
print(repeat("mur", 2))
squares = [x * x for x in range(10)]
"#;

fn repeat(args: &lotus::Arguments) -> Result<Value, EvalError> {
    let (s, n): (String, i64) = Signature::parse("repeat", &["s", "n?"])
        .with_default("n", 1)
        .unpack(args)?;
    let count =
        usize::try_from(n).map_err(|_| EvalError::host(format!("repeat: negative count {n}")))?;
    Ok(Value::from(s.repeat(count)))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut registry = Registry::new();
    let registered = registry
        .register("greeting", "hello")
        .and_then(|()| registry.register_builtin("repeat", |_ctx, args| repeat(args)));
    if let Err(err) = registered {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    let env = registry.build();

    let mut session = Session::new("apparent/filename.star", PrintHandler::Stdout);
    match session.run(&env, PROGRAM) {
        Ok(globals) => {
            println!("\nGlobals:");
            for (name, value) in globals.iter() {
                println!("{name} ({}) = {value}", value.type_name());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err.backtrace());
            ExitCode::FAILURE
        }
    }
}
