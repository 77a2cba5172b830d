use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    ast::{
        Clause, ComprehensionBody, Expr, ExprKind, FunctionDef, Literal, LogicalOp, Module, Stmt,
        StmtKind,
    },
    diagnostics::{EvalError, EvalResult, Frame, LineIndex, TOPLEVEL},
    environment::Environment,
    operators,
    print::PrintHandler,
    session::{CancelToken, SessionOptions},
    stack::ensure_sufficient_stack,
    stdlib,
    unpack::{Arguments, ParamSpec, Signature},
    value::{Builtin, Callable, UserFunction, Value, ValueKind},
};

/// What a builtin can ask of the running interpreter.
///
/// Handed to every host function as `&mut dyn ExecutionContext`, so builtins
/// may print through the session's sink and call back into script callables.
pub trait ExecutionContext {
    /// Sends one line to the session's print sink.
    fn print(&mut self, msg: &str);

    /// Name of the program being executed, as it appears in locations.
    fn source_name(&self) -> &str;

    /// Invokes a script function or builtin with the given arguments.
    fn call(&mut self, callee: &Value, args: Arguments) -> EvalResult<Value>;

    /// Number of active frames, the top level included.
    fn call_depth(&self) -> usize;
}

/// Tree-walking evaluator for one program run.
pub(crate) struct Interpreter<'a> {
    lines: LineIndex,
    predeclared: &'a Environment,
    globals: IndexMap<String, Value>,
    frames: Vec<ActiveFrame>,
    print: &'a mut PrintHandler,
    options: &'a SessionOptions,
    cancel: Option<&'a CancelToken>,
    steps: u64,
}

struct ActiveFrame {
    description: String,
    /// Byte offset of the statement or call currently executing in this frame.
    offset: usize,
    /// Function locals first, then one scope per active comprehension.
    scopes: Vec<IndexMap<String, Value>>,
    function: Option<Arc<FunctionDef>>,
    captured: Option<Arc<IndexMap<String, Value>>>,
}

impl ActiveFrame {
    fn toplevel() -> Self {
        Self {
            description: TOPLEVEL.to_string(),
            offset: 0,
            scopes: Vec::new(),
            function: None,
            captured: None,
        }
    }

    fn builtin(builtin: &Builtin, offset: usize) -> Self {
        Self {
            description: builtin.name().to_string(),
            offset,
            scopes: Vec::new(),
            function: None,
            captured: None,
        }
    }

    fn function(function: &UserFunction, locals: IndexMap<String, Value>) -> Self {
        Self {
            description: function.name().to_string(),
            offset: function.def.span.start,
            scopes: vec![locals],
            function: Some(Arc::clone(&function.def)),
            captured: Some(Arc::clone(&function.captured)),
        }
    }

    fn is_running(&self, def: &Arc<FunctionDef>) -> bool {
        self.function
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, def))
    }
}

enum Flow {
    Next,
    Return(Value),
    Break,
    Continue,
}

/// Where a plain name target is bound.
#[derive(Clone, Copy)]
enum Binding {
    /// Function locals, or globals at the top level.
    Statement,
    /// The innermost comprehension scope.
    Comprehension,
}

enum Collected {
    List(Vec<Value>),
    Dict(IndexMap<Value, Value>),
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        lines: LineIndex,
        predeclared: &'a Environment,
        print: &'a mut PrintHandler,
        options: &'a SessionOptions,
        cancel: Option<&'a CancelToken>,
    ) -> Self {
        Self {
            lines,
            predeclared,
            globals: IndexMap::new(),
            frames: Vec::new(),
            print,
            options,
            cancel,
            steps: 0,
        }
    }

    /// Executes the module and returns its top-level bindings in assignment order.
    pub(crate) fn run(mut self, module: &Module) -> EvalResult<IndexMap<String, Value>> {
        self.frames.push(ActiveFrame::toplevel());
        match self.execute_block(&module.items)? {
            Flow::Next => Ok(self.globals),
            // The parser rejects `return`, `break` and `continue` at the top level.
            Flow::Return(_) | Flow::Break | Flow::Continue => Err(self.fail(
                EvalError::eval("control flow escaped the top level"),
                0,
            )),
        }
    }

    fn execute_block(&mut self, statements: &[Stmt]) -> EvalResult<Flow> {
        for stmt in statements {
            match self.execute_statement(stmt)? {
                Flow::Next => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Next)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        ensure_sufficient_stack(|| self.execute_kind(stmt))
    }

    fn execute_kind(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        self.tick(stmt.span.start)?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Next)
            }
            StmtKind::Assign { target, value } => {
                let value = self.evaluate(value)?;
                self.assign(target, value, Binding::Statement)?;
                Ok(Flow::Next)
            }
            StmtKind::AugAssign {
                target,
                op,
                value,
                op_span,
            } => {
                match &target.kind {
                    ExprKind::Variable(name) => {
                        let current = self.lookup(name, target.span.start)?;
                        let rhs = self.evaluate(value)?;
                        let updated = operators::binary(*op, &current, &rhs);
                        let updated = self.located(updated, op_span.start)?;
                        self.rebind(name, updated);
                    }
                    ExprKind::Index {
                        target: owner,
                        index,
                    } => {
                        let container = self.evaluate(owner)?;
                        let key = self.evaluate(index)?;
                        let current = operators::index(&container, &key);
                        let current = self.located(current, owner.span.end)?;
                        let rhs = self.evaluate(value)?;
                        let updated = operators::binary(*op, &current, &rhs);
                        let updated = self.located(updated, op_span.start)?;
                        let container = operators::set_index(&container, &key, updated);
                        let container = self.located(container, owner.span.end)?;
                        self.write_back(owner, container)?;
                    }
                    _ => {
                        return Err(self.fail(
                            EvalError::eval("invalid target for augmented assignment"),
                            target.span.start,
                        ))
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Def(def) => {
                let function = self.make_function(def)?;
                self.bind_name(&def.name, function, Binding::Statement);
                Ok(Flow::Next)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_block(then_branch)
                } else if let Some(branch) = else_branch {
                    self.execute_block(branch)
                } else {
                    Ok(Flow::Next)
                }
            }
            StmtKind::For {
                target,
                iterable,
                body,
            } => {
                let sequence = self.evaluate(iterable)?;
                let items = operators::iterate(&sequence);
                for item in self.located(items, iterable.span.start)? {
                    self.tick(stmt.span.start)?;
                    self.assign(target, item, Binding::Statement)?;
                    match self.execute_block(body)? {
                        Flow::Next | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::While { condition, body } => {
                loop {
                    self.tick(stmt.span.start)?;
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }
                    match self.execute_block(body)? {
                        Flow::Next | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::none(),
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Pass => Ok(Flow::Next),
        }
    }

    /// Nested expressions and script calls both recurse through here.
    fn evaluate(&mut self, expr: &Expr) -> EvalResult<Value> {
        ensure_sufficient_stack(|| self.evaluate_kind(expr))
    }

    fn evaluate_kind(&mut self, expr: &Expr) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Variable(name) => self.lookup(name, expr.span.start),
            ExprKind::Binary {
                op,
                left,
                right,
                op_span,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                let result = operators::binary(*op, &left, &right);
                self.located(result, op_span.start)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.evaluate(left)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.evaluate(operand)?;
                let result = operators::unary(*op, &value);
                self.located(result, expr.span.start)
            }
            ExprKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_value)
                } else {
                    self.evaluate(else_value)
                }
            }
            ExprKind::Call {
                callee,
                args,
                paren,
            } => {
                let callee = self.evaluate(callee)?;
                let mut arguments = Arguments::default();
                for arg in args {
                    let value = self.evaluate(&arg.value)?;
                    match &arg.name {
                        Some(name) => arguments.named.push((name.clone(), value)),
                        None => arguments.positional.push(value),
                    }
                }
                self.call_value(&callee, &arguments, paren.start)
            }
            ExprKind::ListLiteral(items) | ExprKind::TupleLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.evaluate(item)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::DictLiteral(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key_expr, value_expr) in entries {
                    let key = self.evaluate(key_expr)?;
                    let hashable = key.check_hashable();
                    self.located(hashable, key_expr.span.start)?;
                    if map.contains_key(&key) {
                        return Err(self.fail(
                            EvalError::eval(format!("duplicate key: {}", key.repr())),
                            key_expr.span.start,
                        ));
                    }
                    let value = self.evaluate(value_expr)?;
                    map.insert(key, value);
                }
                Value::dict(map)
            }
            ExprKind::Comprehension { body, clauses } => self.comprehension(body, clauses),
            ExprKind::Index { target, index } => {
                let container = self.evaluate(target)?;
                let key = self.evaluate(index)?;
                let result = operators::index(&container, &key);
                self.located(result, target.span.end)
            }
            ExprKind::Slice {
                target,
                start,
                end,
                step,
            } => {
                let container = self.evaluate(target)?;
                let start = self.evaluate_optional(start.as_deref())?;
                let end = self.evaluate_optional(end.as_deref())?;
                let step = self.evaluate_optional(step.as_deref())?;
                let result =
                    operators::slice(&container, start.as_ref(), end.as_ref(), step.as_ref());
                self.located(result, target.span.end)
            }
            ExprKind::Field { target, field } => {
                let value = self.evaluate(target)?;
                match stdlib::attribute(&value, field) {
                    Some(attr) => Ok(attr),
                    None => Err(self.fail(
                        EvalError::eval(format!(
                            "{} has no .{field} field or method",
                            value.type_name()
                        )),
                        target.span.end,
                    )),
                }
            }
            ExprKind::Lambda(def) => self.make_function(def),
        }
    }

    fn evaluate_optional(&mut self, expr: Option<&Expr>) -> EvalResult<Option<Value>> {
        expr.map(|expr| self.evaluate(expr)).transpose()
    }

    fn comprehension(&mut self, body: &ComprehensionBody, clauses: &[Clause]) -> EvalResult<Value> {
        let mut collected = match body {
            ComprehensionBody::List(_) => Collected::List(Vec::new()),
            ComprehensionBody::Dict(..) => Collected::Dict(IndexMap::new()),
        };
        self.top_mut().scopes.push(IndexMap::new());
        let result = self.comprehension_clauses(body, clauses, &mut collected);
        self.top_mut().scopes.pop();
        result?;
        Ok(match collected {
            Collected::List(items) => Value::list(items),
            Collected::Dict(map) => Value::new(ValueKind::Dict(map)),
        })
    }

    fn comprehension_clauses(
        &mut self,
        body: &ComprehensionBody,
        clauses: &[Clause],
        out: &mut Collected,
    ) -> EvalResult<()> {
        match clauses.split_first() {
            None => match (body, out) {
                (ComprehensionBody::List(element), Collected::List(items)) => {
                    items.push(self.evaluate(element)?);
                }
                (ComprehensionBody::Dict(key_expr, value_expr), Collected::Dict(map)) => {
                    let key = self.evaluate(key_expr)?;
                    let hashable = key.check_hashable();
                    self.located(hashable, key_expr.span.start)?;
                    let value = self.evaluate(value_expr)?;
                    map.insert(key, value);
                }
                _ => {}
            },
            Some((Clause::For { target, iterable }, rest)) => {
                let sequence = self.evaluate(iterable)?;
                let items = operators::iterate(&sequence);
                for item in self.located(items, iterable.span.start)? {
                    self.tick(target.span.start)?;
                    self.assign(target, item, Binding::Comprehension)?;
                    self.comprehension_clauses(body, rest, out)?;
                }
            }
            Some((Clause::If(condition), rest)) => {
                if self.evaluate(condition)?.is_truthy() {
                    self.comprehension_clauses(body, rest, out)?;
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: Value, binding: Binding) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Variable(name) => {
                self.bind_name(name, value, binding);
                Ok(())
            }
            ExprKind::TupleLiteral(targets) | ExprKind::ListLiteral(targets) => {
                let Some(items) = value.as_list() else {
                    return Err(self.fail(
                        EvalError::eval(format!(
                            "got {} in sequence assignment",
                            value.type_name()
                        )),
                        target.span.start,
                    ));
                };
                if items.len() != targets.len() {
                    let problem = if items.len() > targets.len() {
                        "too many"
                    } else {
                        "too few"
                    };
                    return Err(self.fail(
                        EvalError::eval(format!(
                            "{problem} values to unpack (got {}, want {})",
                            items.len(),
                            targets.len()
                        )),
                        target.span.start,
                    ));
                }
                for (item_target, item) in targets.iter().zip(items.iter()) {
                    ensure_sufficient_stack(|| self.assign(item_target, item.clone(), binding))?;
                }
                Ok(())
            }
            ExprKind::Index {
                target: owner,
                index,
            } => {
                let container = self.evaluate(owner)?;
                let key = self.evaluate(index)?;
                let updated = operators::set_index(&container, &key, value);
                let updated = self.located(updated, owner.span.end)?;
                ensure_sufficient_stack(|| self.write_back(owner, updated))
            }
            _ => Err(self.fail(
                EvalError::eval("cannot assign to expression"),
                target.span.start,
            )),
        }
    }

    /// Stores a rebuilt container back into the place it was read from.
    fn write_back(&mut self, place: &Expr, value: Value) -> EvalResult<()> {
        match &place.kind {
            ExprKind::Variable(name) => {
                self.rebind(name, value);
                Ok(())
            }
            ExprKind::Index {
                target: owner,
                index,
            } => {
                let container = self.evaluate(owner)?;
                let key = self.evaluate(index)?;
                let updated = operators::set_index(&container, &key, value);
                let updated = self.located(updated, owner.span.end)?;
                ensure_sufficient_stack(|| self.write_back(owner, updated))
            }
            _ => Err(self.fail(
                EvalError::eval("cannot assign into a temporary value"),
                place.span.start,
            )),
        }
    }

    fn bind_name(&mut self, name: &str, value: Value, binding: Binding) {
        let frame = self.top_mut();
        let scope = match binding {
            Binding::Comprehension => frame.scopes.last_mut(),
            Binding::Statement if frame.function.is_some() => frame.scopes.first_mut(),
            Binding::Statement => None,
        };
        match scope {
            Some(scope) => {
                scope.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Assigns to whichever scope currently holds `name`.
    fn rebind(&mut self, name: &str, value: Value) {
        let frame = self.top_mut();
        if let Some(scope) = frame
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.contains_key(name))
        {
            scope.insert(name.to_string(), value);
            return;
        }
        if frame.function.is_none() || self.globals.contains_key(name) {
            self.globals.insert(name.to_string(), value);
        } else {
            self.bind_name(name, value, Binding::Statement);
        }
    }

    fn lookup(&mut self, name: &str, offset: usize) -> EvalResult<Value> {
        if let Some(value) = self.resolve(name) {
            return Ok(value);
        }
        Err(self.fail(EvalError::eval(format!("undefined: {name}")), offset))
    }

    fn resolve(&self, name: &str) -> Option<Value> {
        let frame = self.frames.last()?;
        frame
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| frame.captured.as_ref().and_then(|captured| captured.get(name)))
            .or_else(|| self.globals.get(name))
            .or_else(|| self.predeclared.get(name))
            .or_else(|| stdlib::universe().get(name))
            .cloned()
    }

    /// Creates a function value; defaults are evaluated now, once.
    fn make_function(&mut self, def: &Arc<FunctionDef>) -> EvalResult<Value> {
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            params.push(match &param.default {
                Some(default) => ParamSpec::optional(param.name.as_str(), self.evaluate(default)?),
                None => ParamSpec::required(param.name.as_str()),
            });
        }

        let frame = self.top();
        let mut captured = frame
            .captured
            .as_deref()
            .cloned()
            .unwrap_or_default();
        for scope in &frame.scopes {
            captured.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Ok(Value::function(UserFunction {
            def: Arc::clone(def),
            signature: Signature::from_params(def.name.as_str(), params),
            captured: Arc::new(captured),
        }))
    }

    fn call_value(&mut self, callee: &Value, args: &Arguments, offset: usize) -> EvalResult<Value> {
        let Some(callable) = callee.as_callable() else {
            return Err(self.fail(
                EvalError::eval(format!(
                    "invalid call of non-function ({})",
                    callee.type_name()
                )),
                offset,
            ));
        };
        self.top_mut().offset = offset;
        match callable {
            Callable::Builtin(builtin) => self.call_builtin(builtin, args, offset),
            Callable::Function(function) => self.call_function(function, args, offset),
        }
    }

    fn call_builtin(
        &mut self,
        builtin: &Builtin,
        args: &Arguments,
        offset: usize,
    ) -> EvalResult<Value> {
        self.check_depth(offset)?;
        tracing::trace!(
            builtin = builtin.name(),
            positional = args.positional.len(),
            named = args.named.len(),
            "calling builtin"
        );
        self.frames.push(ActiveFrame::builtin(builtin, offset));
        let result = builtin.call(self, args).map_err(|err| {
            if err.has_frames() {
                err
            } else {
                err.with_frames(self.snapshot())
            }
        });
        self.frames.pop();
        result
    }

    fn call_function(
        &mut self,
        function: &UserFunction,
        args: &Arguments,
        offset: usize,
    ) -> EvalResult<Value> {
        if !self.options.allow_recursion
            && self.frames.iter().any(|f| f.is_running(&function.def))
        {
            return Err(self.fail(
                EvalError::eval(format!("function {} called recursively", function.name())),
                offset,
            ));
        }
        self.check_depth(offset)?;

        let bound = function.signature.bind(args);
        let values = self.located(bound.map(|b| b.into_values()), offset)?;
        let locals = function
            .signature
            .params()
            .iter()
            .map(|param| param.name().to_string())
            .zip(values)
            .collect();

        self.frames.push(ActiveFrame::function(function, locals));
        let flow = self.execute_block(&function.def.body);
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Next | Flow::Break | Flow::Continue => Ok(Value::none()),
        }
    }

    fn check_depth(&mut self, offset: usize) -> EvalResult<()> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(self.fail(
                EvalError::eval(format!(
                    "call stack depth exceeds {}",
                    self.options.max_call_depth
                )),
                offset,
            ));
        }
        Ok(())
    }

    /// Counts one step and honours the step budget and cancellation.
    fn tick(&mut self, offset: usize) -> EvalResult<()> {
        self.steps += 1;
        if let Some(max_steps) = self.options.max_steps {
            if self.steps > max_steps {
                return Err(self.fail(EvalError::eval("too many steps"), offset));
            }
        }
        if let Some(reason) = self.cancel.and_then(CancelToken::reason) {
            return Err(self.fail(
                EvalError::eval(format!("execution cancelled: {reason}")),
                offset,
            ));
        }
        Ok(())
    }

    fn located<T>(&mut self, result: EvalResult<T>, offset: usize) -> EvalResult<T> {
        result.map_err(|err| self.fail(err, offset))
    }

    /// Positions the innermost frame at `offset` and captures the stack into `err`.
    ///
    /// Errors that already carry frames pass through untouched.
    fn fail(&mut self, err: EvalError, offset: usize) -> EvalError {
        if err.has_frames() {
            return err;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.offset = offset;
        }
        err.with_frames(self.snapshot())
    }

    fn snapshot(&self) -> Vec<Frame> {
        self.frames
            .iter()
            .map(|frame| Frame {
                location: self.lines.location(frame.offset),
                description: frame.description.clone(),
            })
            .collect()
    }

    fn top(&self) -> &ActiveFrame {
        // The top-level frame is pushed before any evaluation.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ActiveFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl ExecutionContext for Interpreter<'_> {
    fn print(&mut self, msg: &str) {
        self.print.print(msg);
    }

    fn source_name(&self) -> &str {
        self.lines.source()
    }

    fn call(&mut self, callee: &Value, args: Arguments) -> EvalResult<Value> {
        let offset = self.frames.last().map_or(0, |frame| frame.offset);
        self.call_value(callee, &args, offset)
    }

    fn call_depth(&self) -> usize {
        self.frames.len()
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(n) => Value::int(*n),
        Literal::Float(f) => Value::float(*f),
        Literal::Bool(b) => Value::bool(*b),
        Literal::String(s) => Value::string(s.as_str()),
        Literal::None => Value::none(),
    }
}
