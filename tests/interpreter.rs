use lotus::{
    parser::parse_module, Environment, ErrorKind, EvalError, Globals, PrintHandler, Session,
    Value, ValueKind,
};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Globals {
    let mut session = Session::new("test.star", PrintHandler::Silent);
    session
        .run(&Environment::empty(), source)
        .expect("program should succeed")
}

fn run_error(source: &str) -> EvalError {
    let mut session = Session::new("test.star", PrintHandler::Silent);
    match session.run(&Environment::empty(), source) {
        Ok(globals) => panic!("expected error, received globals {:?}", globals.keys()),
        Err(err) => err,
    }
}

fn global(globals: &Globals, name: &str) -> Value {
    globals
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("missing global {name}"))
}

fn shown(globals: &Globals, name: &str) -> String {
    global(globals, name).display_string()
}

fn expect_int(value: &Value) -> i64 {
    match value.0.as_ref() {
        ValueKind::Int(n) => *n,
        _ => panic!("expected int, found {}", value.type_name()),
    }
}

fn expect_bool(value: &Value) -> bool {
    match value.0.as_ref() {
        ValueKind::Bool(b) => *b,
        _ => panic!("expected bool, found {}", value.type_name()),
    }
}

#[test]
fn evaluates_basic_arithmetic() {
    let globals = run("x = 2 + 3 * 4\ny = (2 + 3) * 4\n");
    assert_eq!(expect_int(&global(&globals, "x")), 14);
    assert_eq!(expect_int(&global(&globals, "y")), 20);
}

#[test]
fn division_floors_toward_negative_infinity() {
    let globals = run("a = 7 / 2\nb = 7 // 2\nc = -7 // 2\nd = -7 % 3\ne = 7 % -3\n");
    assert_eq!(shown(&globals, "a"), "3.5");
    assert_eq!(expect_int(&global(&globals, "b")), 3);
    assert_eq!(expect_int(&global(&globals, "c")), -4);
    assert_eq!(expect_int(&global(&globals, "d")), 2);
    assert_eq!(expect_int(&global(&globals, "e")), -2);
}

#[test]
fn concatenates_and_repeats_sequences() {
    let globals = run("s = \"ab\" + \"cd\"\nr = \"ab\" * 3\nl = [1, 2] + [3]\nm = [0] * 3\n");
    assert_eq!(shown(&globals, "s"), "abcd");
    assert_eq!(shown(&globals, "r"), "ababab");
    assert_eq!(shown(&globals, "l"), "[1, 2, 3]");
    assert_eq!(shown(&globals, "m"), "[0, 0, 0]");
}

#[test]
fn for_loop_accumulates_sum() {
    let globals = run(
        r#"
total = 0
for item in [1, 2, 3, 4]:
    total += item
"#,
    );
    assert_eq!(expect_int(&global(&globals, "total")), 10);
}

#[test]
fn functions_accept_defaults_and_keywords() {
    let globals = run(
        r#"
def greet(name, punctuation = "!"):
    return "hello, " + name + punctuation

a = greet("world")
b = greet(punctuation = "?", name = "you")
"#,
    );
    assert_eq!(shown(&globals, "a"), "hello, world!");
    assert_eq!(shown(&globals, "b"), "hello, you?");
}

#[test]
fn nested_function_sees_enclosing_locals() {
    let globals = run(
        r#"
def make_adder(n):
    def add(x):
        return x + n
    return add

add2 = make_adder(2)
result = add2(40)
"#,
    );
    assert_eq!(expect_int(&global(&globals, "result")), 42);
}

#[test]
fn sorted_accepts_key_and_reverse() {
    let globals = run(
        r#"
words = ["banana", "kiwi", "apple"]
by_length = sorted(words, key = lambda w: len(w))
by_name = sorted(words, reverse = True)
"#,
    );
    assert_eq!(shown(&globals, "by_length"), r#"["kiwi", "apple", "banana"]"#);
    assert_eq!(shown(&globals, "by_name"), r#"["kiwi", "banana", "apple"]"#);
}

#[test]
fn comprehensions_build_lists_and_dicts() {
    let globals = run(
        r#"
squares = [x * x for x in range(10)]
evens = [x for x in range(10) if x % 2 == 0]
lengths = {name: len(name) for name in ["a", "bb"]}
pairs = [(i, j) for i in range(2) for j in range(2)]
"#,
    );
    assert_eq!(shown(&globals, "squares"), "[0, 1, 4, 9, 16, 25, 36, 49, 64, 81]");
    assert_eq!(shown(&globals, "evens"), "[0, 2, 4, 6, 8]");
    assert_eq!(shown(&globals, "lengths"), r#"{"a": 1, "bb": 2}"#);
    assert_eq!(shown(&globals, "pairs"), "[[0, 0], [0, 1], [1, 0], [1, 1]]");
    assert!(!globals.contains("x"), "comprehension variables stay local");
}

#[test]
fn tuple_assignment_unpacks_sequences() {
    let globals = run(
        r#"
a, b = 1, 2
a, b = b, a
total = 0
for i, value in enumerate(["x", "y"]):
    total += i
"#,
    );
    assert_eq!(expect_int(&global(&globals, "a")), 2);
    assert_eq!(expect_int(&global(&globals, "b")), 1);
    assert_eq!(expect_int(&global(&globals, "total")), 1);
}

#[test]
fn while_loop_honours_break_and_continue() {
    let globals = run(
        r#"
n = 0
hits = []
while True:
    n += 1
    if n > 6:
        break
    if n % 2 == 0:
        continue
    hits = hits + [n]
"#,
    );
    assert_eq!(shown(&globals, "hits"), "[1, 3, 5]");
}

#[test]
fn elif_chains_pick_first_match() {
    let globals = run(
        r#"
def classify(n):
    if n < 0:
        return "negative"
    elif n == 0:
        return "zero"
    else:
        return "positive"

labels = [classify(n) for n in [-3, 0, 8]]
"#,
    );
    assert_eq!(shown(&globals, "labels"), r#"["negative", "zero", "positive"]"#);
}

#[test]
fn index_assignment_rebuilds_container() {
    let globals = run(
        r#"
numbers = [1, 2, 3]
alias = numbers
numbers[1] = 20
scores = {"a": 1}
scores["b"] = 2
scores["a"] += 10
"#,
    );
    assert_eq!(shown(&globals, "numbers"), "[1, 20, 3]");
    assert_eq!(shown(&globals, "alias"), "[1, 2, 3]");
    assert_eq!(shown(&globals, "scores"), r#"{"a": 11, "b": 2}"#);
}

#[test]
fn slices_and_negative_indices() {
    let globals = run(
        r#"
s = "hello"[1:4]
r = [1, 2, 3, 4, 5][::-1]
t = [1, 2, 3, 4, 5][1::2]
last = "hello"[-1]
"#,
    );
    assert_eq!(shown(&globals, "s"), "ell");
    assert_eq!(shown(&globals, "r"), "[5, 4, 3, 2, 1]");
    assert_eq!(shown(&globals, "t"), "[2, 4]");
    assert_eq!(shown(&globals, "last"), "o");
}

#[test]
fn string_methods() {
    let globals = run(
        r#"
upper = "abc".upper()
parts = "a,b,c".split(",")
joined = "-".join(["x", "y"])
formatted = "{} + {} = {total}".format(1, 2, total = 3)
found = "hello".find("ll")
stripped = "  pad  ".strip()
"#,
    );
    assert_eq!(shown(&globals, "upper"), "ABC");
    assert_eq!(shown(&globals, "parts"), r#"["a", "b", "c"]"#);
    assert_eq!(shown(&globals, "joined"), "x-y");
    assert_eq!(shown(&globals, "formatted"), "1 + 2 = 3");
    assert_eq!(expect_int(&global(&globals, "found")), 2);
    assert_eq!(shown(&globals, "stripped"), "pad");
}

#[test]
fn dict_methods() {
    let globals = run(
        r#"
d = {"a": 1, "b": 2}
ks = d.keys()
vs = d.values()
items = d.items()
missing = d.get("z", 0)
present = d.get("a")
"#,
    );
    assert_eq!(shown(&globals, "ks"), r#"["a", "b"]"#);
    assert_eq!(shown(&globals, "vs"), "[1, 2]");
    assert_eq!(shown(&globals, "items"), r#"[["a", 1], ["b", 2]]"#);
    assert_eq!(expect_int(&global(&globals, "missing")), 0);
    assert_eq!(expect_int(&global(&globals, "present")), 1);
}

#[test]
fn logic_returns_operands() {
    let globals = run(
        r#"
x = "yes" if 1 < 2 else "no"
y = 0 or "fallback"
z = 1 and 2
w = not []
"#,
    );
    assert_eq!(shown(&globals, "x"), "yes");
    assert_eq!(shown(&globals, "y"), "fallback");
    assert_eq!(expect_int(&global(&globals, "z")), 2);
    assert!(expect_bool(&global(&globals, "w")));
}

#[test]
fn membership_tests() {
    let globals = run("a = 2 in [1, 2]\nb = \"k\" not in {\"k\": 1}\nc = \"ell\" in \"hello\"\n");
    assert!(expect_bool(&global(&globals, "a")));
    assert!(!expect_bool(&global(&globals, "b")));
    assert!(expect_bool(&global(&globals, "c")));
}

#[test]
fn universe_builtins() {
    let globals = run(
        r#"
a = len("héllo")
b = str(1.0)
c = int("42")
d = float(3)
e = type({})
f = min([3, 1, 2])
g = max(3, 9, 4)
h = list(reversed([1, 2, 3]))
i = zip([1, 2], ["a", "b", "c"])
j = any([0, "", 1])
k = all([1, True])
l = abs(-5)
m = repr("q")
n = hasattr("s", "upper")
o = getattr({}, "missing", "default")
"#,
    );
    assert_eq!(expect_int(&global(&globals, "a")), 5);
    assert_eq!(shown(&globals, "b"), "1.0");
    assert_eq!(expect_int(&global(&globals, "c")), 42);
    assert_eq!(shown(&globals, "d"), "3.0");
    assert_eq!(shown(&globals, "e"), "dict");
    assert_eq!(expect_int(&global(&globals, "f")), 1);
    assert_eq!(expect_int(&global(&globals, "g")), 9);
    assert_eq!(shown(&globals, "h"), "[3, 2, 1]");
    assert_eq!(shown(&globals, "i"), r#"[[1, "a"], [2, "b"]]"#);
    assert!(expect_bool(&global(&globals, "j")));
    assert!(expect_bool(&global(&globals, "k")));
    assert_eq!(expect_int(&global(&globals, "l")), 5);
    assert_eq!(shown(&globals, "m"), r#""q""#);
    assert!(expect_bool(&global(&globals, "n")));
    assert_eq!(shown(&globals, "o"), "default");
}

#[test]
fn dict_keys_unify_int_and_float() {
    let globals = run("d = {1: \"int\"}\nv = d[1.0]\n");
    assert_eq!(shown(&globals, "v"), "int");
}

#[test]
fn reports_undefined_names() {
    let err = run_error("x = y + 1\n");
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.message(), "undefined: y");
    assert_eq!(err.to_string(), "test.star:1:5: undefined: y");
}

#[test]
fn integer_arithmetic_fails_on_overflow() {
    assert_eq!(run_error("x = 9223372036854775807 + 1\n").message(), "integer overflow");
    assert_eq!(run_error("x = -(-9223372036854775807 - 1)\n").message(), "integer overflow");
}

#[test]
fn division_by_zero_messages() {
    assert_eq!(run_error("x = 1 / 0\n").message(), "floating-point division by zero");
    assert_eq!(run_error("x = 1 // 0\n").message(), "integer division by zero");
    assert_eq!(run_error("x = 1 % 0\n").message(), "integer modulo by zero");
}

#[test]
fn runtime_type_errors() {
    assert_eq!(
        run_error("x = 1\nx()\n").message(),
        "invalid call of non-function (int)"
    );
    assert_eq!(run_error("d = {[1]: 2}\n").message(), "unhashable type: list");
    assert_eq!(
        run_error("d = {\"a\": 1, \"a\": 2}\n").message(),
        r#"duplicate key: "a""#
    );
    assert_eq!(run_error("x = [1][5]\n").message(), "index 5 out of range [0:1]");
    assert_eq!(
        run_error("x = 1 < \"a\"\n").message(),
        "unsupported comparison: int < string"
    );
    assert_eq!(
        run_error("x = \"a\" - 1\n").message(),
        "unknown binary op: string - int"
    );
    assert_eq!(
        run_error("for c in \"abc\":\n    pass\n").message(),
        "string value is not iterable"
    );
    assert_eq!(
        run_error("x = [].missing\n").message(),
        "list has no .missing field or method"
    );
}

#[test]
fn fail_builtin_raises_message() {
    let err = run_error("fail(\"boom\", 42)\n");
    assert_eq!(err.message(), "fail: boom 42");
    assert_eq!(err.innermost().map(|f| f.description.as_str()), Some("fail"));
}

#[test]
fn unpacking_reports_count_mismatch() {
    assert_eq!(
        run_error("a, b = [1, 2, 3]\n").message(),
        "too many values to unpack (got 3, want 2)"
    );
}

#[test]
fn syntax_errors_carry_location() {
    let err = run_error("x = 1\ny = = 2\n");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.frames().len(), 1);
    assert_eq!(err.to_string(), "test.star:2:5: unexpected token in expression, found `=`");
}

#[test]
fn parser_rejects_misplaced_control_flow() {
    let message = |source: &str| parse_module(source).map(|_| ()).unwrap_err().message;
    assert_eq!(message("break\n"), "break not in a loop");
    assert_eq!(message("continue\n"), "continue not in a loop");
    assert_eq!(message("return 1\n"), "return statement not within a function");
    assert_eq!(message("import os\n"), "keyword `import` is reserved");
    assert_eq!(message("x.y = 1\n"), "cannot assign to field");
    assert_eq!(
        message("def f(a = 1, b):\n    pass\n"),
        "required parameter may not follow optional"
    );
    assert_eq!(
        message("f(a = 1, 2)\n"),
        "positional argument may not follow named, found `2`"
    );
    assert_eq!(
        message("if True:\n        x = 1\n    y = 2\n"),
        "unindent does not match any outer indentation level"
    );
}

#[test]
fn parses_multi_statement_lines_and_inline_suites() {
    let module = parse_module("a = 1; b = 2\nif a: c = 3\n").expect("program should parse");
    assert_eq!(module.items.len(), 3);
    let globals = run("a = 1; b = 2\nif a: c = 3\n");
    assert_eq!(globals.keys(), vec!["a", "b", "c"]);
}

#[test]
fn deeply_nested_expressions_evaluate() {
    let depth = 2000;
    let nested = format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
    let parens = format!("{}2{}", "(".repeat(depth), ")".repeat(depth));
    let negations = format!("{}3", "-".repeat(depth + 1));
    let source = format!(
        "outer = len({nested})\nshown = str({nested})\nparens = {parens}\nnegated = {negations}\n"
    );
    let globals = run(&source);
    assert_eq!(expect_int(&global(&globals, "outer")), 1);
    assert_eq!(shown(&globals, "shown").len(), 2 * depth + 1);
    assert_eq!(expect_int(&global(&globals, "parens")), 2);
    assert_eq!(expect_int(&global(&globals, "negated")), -3);
}

#[test]
fn deeply_nested_blocks_execute() {
    let depth = 200;
    let mut source = String::new();
    for level in 0..depth {
        source.push_str(&format!("{}if True:\n", "    ".repeat(level)));
    }
    source.push_str(&format!("{}reached = 1\n", "    ".repeat(depth)));
    let globals = run(&source);
    assert_eq!(expect_int(&global(&globals, "reached")), 1);
}

#[test]
fn slices_with_extreme_steps_stop_at_the_end() {
    let globals = run(
        "s = \"abcde\"[1::9223372036854775807]\n\
         t = [1, 2, 3, 4, 5][4::9223372036854775807]\n\
         u = [1, 2, 3][::-9223372036854775807 - 1]\n\
         v = \"abc\"[0:-9223372036854775807 - 1:-9223372036854775807]\n",
    );
    assert_eq!(shown(&globals, "s"), "b");
    assert_eq!(shown(&globals, "t"), "[5]");
    assert_eq!(shown(&globals, "u"), "[3]");
    assert_eq!(shown(&globals, "v"), "a");
}

#[test]
fn huge_repeats_are_rejected() {
    assert_eq!(
        run_error("x = [1] * 4611686018427387903\n").message(),
        "excessive repeat (1 * 4611686018427387903 elements)"
    );
    assert_eq!(
        run_error("x = 4611686018427387904 * \"ab\"\n").message(),
        "excessive repeat (2 * 4611686018427387904 elements)"
    );
    let globals = run("e = [] * 9223372036854775807\nz = \"ab\" * -5\n");
    assert_eq!(shown(&globals, "e"), "[]");
    assert_eq!(shown(&globals, "z"), "");
}

#[test]
fn sorting_incomparable_values_fails_cleanly() {
    let err = run_error("x = sorted([1, \"a\"] * 20)\n");
    assert_eq!(err.kind(), ErrorKind::Eval);
    assert_eq!(err.message(), "sorted: unsupported comparison: string vs int");

    let err = run_error("x = sorted([1.0, float(\"nan\"), 2.0])\n");
    assert_eq!(err.message(), "sorted: unsupported comparison: float vs float");

    let err = run_error("x = sorted([[1], [\"a\"], [2]] * 10, reverse = True)\n");
    assert!(err.message().starts_with("sorted: unsupported comparison"));
}

#[test]
fn sorting_is_stable_in_both_directions() {
    let globals = run(
        "pairs = [(2, \"a\"), (1, \"b\"), (2, \"c\"), (1, \"d\")]\n\
         up = sorted(pairs, key = lambda p: p[0])\n\
         down = sorted(pairs, key = lambda p: p[0], reverse = True)\n",
    );
    assert_eq!(
        shown(&globals, "up"),
        r#"[[1, "b"], [1, "d"], [2, "a"], [2, "c"]]"#
    );
    assert_eq!(
        shown(&globals, "down"),
        r#"[[2, "a"], [2, "c"], [1, "b"], [1, "d"]]"#
    );
}

#[test]
fn modulo_by_minus_one_is_zero() {
    let globals = run("m = (-9223372036854775807 - 1) % -1\nn = 7 % -1\n");
    assert_eq!(expect_int(&global(&globals, "m")), 0);
    assert_eq!(expect_int(&global(&globals, "n")), 0);
    assert_eq!(
        run_error("q = (-9223372036854775807 - 1) // -1\n").message(),
        "integer overflow"
    );
}

#[test]
fn int_float_comparison_is_exact() {
    let globals = run(
        "a = 9007199254740993 == 9007199254740992.0\n\
         b = 9007199254740993 > 9007199254740992.0\n\
         c = 9007199254740992 == 9007199254740992.0\n\
         d = 9223372036854775807 < 9223372036854775808.0\n\
         e = -2.5 < -2\n\
         keys = len({9007199254740993: 1, 9007199254740992.0: 2})\n",
    );
    assert!(!expect_bool(&global(&globals, "a")));
    assert!(expect_bool(&global(&globals, "b")));
    assert!(expect_bool(&global(&globals, "c")));
    assert!(expect_bool(&global(&globals, "d")));
    assert!(expect_bool(&global(&globals, "e")));
    assert_eq!(expect_int(&global(&globals, "keys")), 2);
}
