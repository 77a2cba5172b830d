use std::sync::Arc;

use crate::{
    ast::{
        BinaryOp, CallArg, Clause, ComprehensionBody, Expr, ExprKind, FunctionDef, Literal,
        LogicalOp, Module, Param, Stmt, StmtKind, UnaryOp,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
    stack::ensure_sufficient_stack,
};

pub fn parse_module(source: &str) -> Result<Module, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    loop_depth: usize,
    function_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            loop_depth: 0,
            function_depth: 0,
        }
    }

    fn parse_module(&mut self) -> Result<Module, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            items.extend(self.parse_statement()?);
        }
        Ok(Module { items })
    }

    fn parse_statement(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::Def) => return Ok(vec![self.parse_def()?]),
                TokenKind::Keyword(Keyword::If) => return Ok(vec![self.parse_if()?]),
                TokenKind::Keyword(Keyword::For) => return Ok(vec![self.parse_for()?]),
                TokenKind::Keyword(Keyword::While) => return Ok(vec![self.parse_while()?]),
                TokenKind::Indent => return Err(self.error(token, "unexpected indentation")),
                _ => {}
            }
        }
        self.parse_simple_line()
    }

    /// One or more `;`-separated small statements ending the logical line.
    fn parse_simple_line(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut statements = vec![self.parse_small_statement()?];
        while self.matches(TokenKind::Semicolon) {
            if self.check(TokenKind::Newline) || self.check(TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_small_statement()?);
        }
        if !self.matches(TokenKind::Newline) && !self.check(TokenKind::Eof) {
            return Err(self.unexpected("expected end of line"));
        }
        Ok(statements)
    }

    fn parse_small_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.peek().cloned().ok_or_else(|| self.error_eof("unexpected end of input"))?;
        match &token.kind {
            TokenKind::Keyword(Keyword::Return) => {
                if self.function_depth == 0 {
                    return Err(self.error(&token, "return statement not within a function"));
                }
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression_list()?)
                };
                let end = value.as_ref().map_or(token.span, |expr| expr.span);
                Ok(Stmt {
                    span: token.span.to(end),
                    kind: StmtKind::Return(value),
                })
            }
            TokenKind::Keyword(Keyword::Break) => {
                if self.loop_depth == 0 {
                    return Err(self.error(&token, "break not in a loop"));
                }
                self.advance();
                Ok(Stmt {
                    span: token.span,
                    kind: StmtKind::Break,
                })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                if self.loop_depth == 0 {
                    return Err(self.error(&token, "continue not in a loop"));
                }
                self.advance();
                Ok(Stmt {
                    span: token.span,
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                Ok(Stmt {
                    span: token.span,
                    kind: StmtKind::Pass,
                })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression_list()?;
        if self.matches(TokenKind::Assign) {
            self.validate_target(&expr)?;
            let value = self.parse_expression_list()?;
            return Ok(Stmt {
                span: expr.span.to(value.span),
                kind: StmtKind::Assign {
                    target: expr,
                    value,
                },
            });
        }
        if let Some(op) = self.peek().and_then(|t| augmented_op(&t.kind)) {
            let op_span = self.advance().span;
            if !matches!(expr.kind, ExprKind::Variable(_) | ExprKind::Index { .. }) {
                return Err(Diagnostic::new(
                    DiagnosticKind::Parser,
                    "invalid target for augmented assignment",
                    expr.span,
                ));
            }
            let value = self.parse_expression_list()?;
            return Ok(Stmt {
                span: expr.span.to(value.span),
                kind: StmtKind::AugAssign {
                    target: expr,
                    op,
                    value,
                    op_span,
                },
            });
        }
        Ok(Stmt {
            span: expr.span,
            kind: StmtKind::Expr(expr),
        })
    }

    fn validate_target(&self, target: &Expr) -> Result<(), Diagnostic> {
        let problem = match &target.kind {
            ExprKind::Variable(_) | ExprKind::Index { .. } => return Ok(()),
            ExprKind::TupleLiteral(items) | ExprKind::ListLiteral(items) => {
                for item in items {
                    ensure_sufficient_stack(|| self.validate_target(item))?;
                }
                return Ok(());
            }
            ExprKind::Field { .. } => "cannot assign to field",
            ExprKind::Slice { .. } => "cannot assign to slice",
            ExprKind::Call { .. } => "cannot assign to function call",
            ExprKind::Literal(_) => "cannot assign to literal",
            _ => "cannot assign to expression",
        };
        Err(Diagnostic::new(DiagnosticKind::Parser, problem, target.span))
    }

    /// The body after `:`, either an indented block or the rest of the line.
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.consume(TokenKind::Colon, "expected `:`")?;
        if !self.matches(TokenKind::Newline) {
            return self.parse_simple_line();
        }
        self.consume(TokenKind::Indent, "expected an indented block")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            body.extend(ensure_sufficient_stack(|| self.parse_statement())?);
        }
        self.matches(TokenKind::Dedent);
        Ok(body)
    }

    fn parse_def(&mut self) -> Result<Stmt, Diagnostic> {
        let def_token = self.consume_keyword(Keyword::Def)?;
        let name = self.consume_identifier("expected function name after `def`")?;
        self.consume(TokenKind::LParen, "expected `(` after function name")?;
        let params = self.parse_params(TokenKind::RParen)?;
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_suite();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;

        Ok(Stmt {
            span: def_token.span.to(name.span),
            kind: StmtKind::Def(Arc::new(FunctionDef {
                name: name.lexeme,
                params,
                body: body?,
                span: def_token.span,
            })),
        })
    }

    fn parse_params(&mut self, terminator: TokenKind) -> Result<Vec<Param>, Diagnostic> {
        let mut params: Vec<Param> = Vec::new();
        let mut seen_optional = false;
        while !self.check(terminator.clone()) {
            let token = self.consume_identifier("expected parameter name")?;
            let default = if self.matches(TokenKind::Assign) {
                Some(self.parse_test()?)
            } else {
                None
            };
            if default.is_some() {
                seen_optional = true;
            } else if seen_optional {
                return Err(self.error(&token, "required parameter may not follow optional"));
            }
            if params.iter().any(|p| p.name == token.lexeme) {
                return Err(self.error(&token, &format!("duplicate parameter: {}", token.lexeme)));
            }
            params.push(Param {
                name: token.lexeme,
                default,
                span: token.span,
            });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let if_token = self.advance();
        let condition = self.parse_expression()?;
        let then_branch = self.parse_suite()?;
        let else_branch = if self.check_keyword(Keyword::Elif) {
            Some(vec![self.parse_if()?])
        } else if self.matches_keyword(Keyword::Else) {
            Some(self.parse_suite()?)
        } else {
            None
        };
        Ok(Stmt {
            span: if_token.span.to(condition.span),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, Diagnostic> {
        let for_token = self.consume_keyword(Keyword::For)?;
        let target = self.parse_for_target()?;
        self.consume_keyword(Keyword::In)?;
        let iterable = self.parse_expression_list()?;

        self.loop_depth += 1;
        let body = self.parse_suite();
        self.loop_depth -= 1;

        Ok(Stmt {
            span: for_token.span.to(iterable.span),
            kind: StmtKind::For {
                target,
                iterable,
                body: body?,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let while_token = self.consume_keyword(Keyword::While)?;
        let condition = self.parse_expression()?;

        self.loop_depth += 1;
        let body = self.parse_suite();
        self.loop_depth -= 1;

        Ok(Stmt {
            span: while_token.span.to(condition.span),
            kind: StmtKind::While {
                condition,
                body: body?,
            },
        })
    }

    /// Loop variables: primaries separated by commas, stopping before `in`.
    fn parse_for_target(&mut self) -> Result<Expr, Diagnostic> {
        let first = self.parse_postfix()?;
        let target = if self.check(TokenKind::Comma) {
            let mut items = vec![first];
            while self.matches(TokenKind::Comma) {
                if self.check_keyword(Keyword::In) {
                    break;
                }
                items.push(self.parse_postfix()?);
            }
            tuple(items)
        } else {
            first
        };
        self.validate_target(&target)?;
        Ok(target)
    }

    fn parse_expression_list(&mut self) -> Result<Expr, Diagnostic> {
        let first = self.parse_test()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.matches(TokenKind::Comma) {
            if self.at_expression_list_end() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(tuple(items))
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_test()
    }

    /// Every nested expression passes through here, so this is where the stack grows.
    fn parse_test(&mut self) -> Result<Expr, Diagnostic> {
        ensure_sufficient_stack(|| self.parse_conditional())
    }

    fn parse_conditional(&mut self) -> Result<Expr, Diagnostic> {
        if self.matches_keyword(Keyword::Lambda) {
            return self.parse_lambda();
        }
        let expr = self.parse_or()?;
        if !self.matches_keyword(Keyword::If) {
            return Ok(expr);
        }
        let condition = self.parse_or()?;
        if !self.matches_keyword(Keyword::Else) {
            return Err(self.unexpected("expected `else` in conditional expression"));
        }
        let else_value = self.parse_test()?;
        Ok(Expr {
            span: expr.span.to(else_value.span),
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                then_value: Box::new(expr),
                else_value: Box::new(else_value),
            },
        })
    }

    fn parse_lambda(&mut self) -> Result<Expr, Diagnostic> {
        let lambda_token = self.previous().clone();
        let params = self.parse_params(TokenKind::Colon)?;
        self.consume(TokenKind::Colon, "expected `:` after lambda parameters")?;

        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_test();
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        let body = body?;

        Ok(Expr {
            span: lambda_token.span.to(body.span),
            kind: ExprKind::Lambda(Arc::new(FunctionDef {
                name: "lambda".into(),
                params,
                body: vec![Stmt {
                    span: body.span,
                    kind: StmtKind::Return(Some(body)),
                }],
                span: lambda_token.span,
            })),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_not()?;
        while self.matches_keyword(Keyword::And) {
            let right = self.parse_not()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, Diagnostic> {
        if self.matches_keyword(Keyword::Not) {
            let operator = self.previous().span;
            let operand = ensure_sufficient_stack(|| self.parse_not())?;
            return Ok(Expr {
                span: operator.to(operand.span),
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(operand),
                },
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_arith()?;
        loop {
            let Some(token) = self.peek().cloned() else {
                break;
            };
            let op = match token.kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::BangEqual => BinaryOp::NotEqual,
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                TokenKind::Keyword(Keyword::In) => BinaryOp::In,
                TokenKind::Keyword(Keyword::Not)
                    if self.peek_kind_at(1) == Some(&TokenKind::Keyword(Keyword::In)) =>
                {
                    self.advance();
                    BinaryOp::NotIn
                }
                _ => break,
            };
            let op_span = token.span.to(self.advance().span);
            let right = self.parse_arith()?;
            expr = binary(op, expr, right, op_span);
        }
        Ok(expr)
    }

    fn parse_arith(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        loop {
            let op = if self.matches(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.matches(TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let op_span = self.previous().span;
            let right = self.parse_term()?;
            expr = binary(op, expr, right, op_span);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.matches(TokenKind::Star) {
                BinaryOp::Mul
            } else if self.matches(TokenKind::Slash) {
                BinaryOp::Div
            } else if self.matches(TokenKind::SlashSlash) {
                BinaryOp::FloorDiv
            } else if self.matches(TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let op_span = self.previous().span;
            let right = self.parse_unary()?;
            expr = binary(op, expr, right, op_span);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Plus) {
            UnaryOp::Plus
        } else {
            return self.parse_postfix();
        };
        let operator = self.previous().span;
        let operand = ensure_sufficient_stack(|| self.parse_unary())?;
        Ok(Expr {
            span: operator.to(operand.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let paren = self.previous().span;
                let args = self.parse_call_args()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
                expr = Expr {
                    span: expr.span.to(rparen.span),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                        paren,
                    },
                };
            } else if self.matches(TokenKind::LBracket) {
                expr = self.parse_subscript(expr)?;
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume_identifier("expected field name after `.`")?;
                expr = Expr {
                    span: expr.span.to(ident.span),
                    kind: ExprKind::Field {
                        target: Box::new(expr),
                        field: ident.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, Diagnostic> {
        let mut args = Vec::new();
        let mut seen_named = false;
        while !self.check(TokenKind::RParen) {
            let named = self.check(TokenKind::Identifier)
                && self.peek_kind_at(1) == Some(&TokenKind::Assign);
            if named {
                let name = self.advance().lexeme;
                self.advance();
                seen_named = true;
                args.push(CallArg {
                    name: Some(name),
                    value: self.parse_test()?,
                });
            } else {
                if seen_named {
                    return Err(self.unexpected("positional argument may not follow named"));
                }
                args.push(CallArg {
                    name: None,
                    value: self.parse_test()?,
                });
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    /// `x[i]` or `x[a:b:c]`; the opening bracket is already consumed.
    fn parse_subscript(&mut self, target: Expr) -> Result<Expr, Diagnostic> {
        let start = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(self.parse_test()?)
        };
        if !self.matches(TokenKind::Colon) {
            let rbracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
            let Some(index) = start else {
                return Err(self.error(&rbracket, "expected index"));
            };
            return Ok(Expr {
                span: target.span.to(rbracket.span),
                kind: ExprKind::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                },
            });
        }
        let end = if self.check(TokenKind::Colon) || self.check(TokenKind::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.matches(TokenKind::Colon) && !self.check(TokenKind::RBracket) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        let rbracket = self.consume(TokenKind::RBracket, "expected `]` after slice")?;
        Ok(Expr {
            span: target.span.to(rbracket.span),
            kind: ExprKind::Slice {
                target: Box::new(target),
                start: start.map(Box::new),
                end,
                step,
            },
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.peek().cloned().ok_or_else(|| self.error_eof("unexpected end of input"))?;
        let literal = match &token.kind {
            TokenKind::Keyword(Keyword::True) => Literal::Bool(true),
            TokenKind::Keyword(Keyword::False) => Literal::Bool(false),
            TokenKind::Keyword(Keyword::None) => Literal::None,
            TokenKind::Int => Literal::Int(self.int_literal(&token)?),
            TokenKind::Float => {
                Literal::Float(token.lexeme.replace('_', "").parse().map_err(|_| {
                    self.error(&token, &format!("invalid float literal `{}`", token.lexeme))
                })?)
            }
            TokenKind::String => Literal::String(token.lexeme.clone()),
            TokenKind::Identifier => {
                self.advance();
                return Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme),
                });
            }
            TokenKind::LParen => return self.parse_parenthesized(),
            TokenKind::LBracket => return self.parse_list(),
            TokenKind::LBrace => return self.parse_dict(),
            TokenKind::Reserved => {
                return Err(self.error(
                    &token,
                    &format!("keyword `{}` is reserved", token.lexeme),
                ));
            }
            _ => return Err(self.unexpected("unexpected token in expression")),
        };
        self.advance();
        Ok(Expr {
            span: token.span,
            kind: ExprKind::Literal(literal),
        })
    }

    fn int_literal(&self, token: &Token) -> Result<i64, Diagnostic> {
        let digits = token.lexeme.replace('_', "");
        let parsed = match digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => digits.parse(),
        };
        parsed.map_err(|_| {
            self.error(
                token,
                &format!("integer literal `{}` out of range", token.lexeme),
            )
        })
    }

    fn parse_parenthesized(&mut self) -> Result<Expr, Diagnostic> {
        let lparen = self.advance();
        if self.check(TokenKind::RParen) {
            let rparen = self.advance();
            return Ok(Expr {
                span: lparen.span.to(rparen.span),
                kind: ExprKind::TupleLiteral(Vec::new()),
            });
        }
        let first = self.parse_test()?;
        if self.check_keyword(Keyword::For) {
            return Err(self.unexpected("generator expressions are not supported"));
        }
        if !self.check(TokenKind::Comma) {
            self.consume(TokenKind::RParen, "expected `)` after expression")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.matches(TokenKind::Comma) {
            if self.check(TokenKind::RParen) {
                break;
            }
            items.push(self.parse_test()?);
        }
        let rparen = self.consume(TokenKind::RParen, "expected `)` after tuple")?;
        Ok(Expr {
            span: lparen.span.to(rparen.span),
            kind: ExprKind::TupleLiteral(items),
        })
    }

    fn parse_list(&mut self) -> Result<Expr, Diagnostic> {
        let lbracket = self.advance();
        let mut items = Vec::new();
        if !self.check(TokenKind::RBracket) {
            let first = self.parse_test()?;
            if self.check_keyword(Keyword::For) {
                let clauses = self.parse_clauses()?;
                let rbracket =
                    self.consume(TokenKind::RBracket, "expected `]` after comprehension")?;
                return Ok(Expr {
                    span: lbracket.span.to(rbracket.span),
                    kind: ExprKind::Comprehension {
                        body: ComprehensionBody::List(Box::new(first)),
                        clauses,
                    },
                });
            }
            items.push(first);
            while self.matches(TokenKind::Comma) {
                if self.check(TokenKind::RBracket) {
                    break;
                }
                items.push(self.parse_test()?);
            }
        }
        let rbracket = self.consume(TokenKind::RBracket, "expected `]` after list literal")?;
        Ok(Expr {
            span: lbracket.span.to(rbracket.span),
            kind: ExprKind::ListLiteral(items),
        })
    }

    fn parse_dict(&mut self) -> Result<Expr, Diagnostic> {
        let lbrace = self.advance();
        let mut entries = Vec::new();
        if !self.check(TokenKind::RBrace) {
            let key = self.parse_test()?;
            self.consume(TokenKind::Colon, "expected `:` in dict literal")?;
            let value = self.parse_test()?;
            if self.check_keyword(Keyword::For) {
                let clauses = self.parse_clauses()?;
                let rbrace = self.consume(TokenKind::RBrace, "expected `}` after comprehension")?;
                return Ok(Expr {
                    span: lbrace.span.to(rbrace.span),
                    kind: ExprKind::Comprehension {
                        body: ComprehensionBody::Dict(Box::new(key), Box::new(value)),
                        clauses,
                    },
                });
            }
            entries.push((key, value));
            while self.matches(TokenKind::Comma) {
                if self.check(TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_test()?;
                self.consume(TokenKind::Colon, "expected `:` in dict literal")?;
                let value = self.parse_test()?;
                entries.push((key, value));
            }
        }
        let rbrace = self.consume(TokenKind::RBrace, "expected `}` after dict literal")?;
        Ok(Expr {
            span: lbrace.span.to(rbrace.span),
            kind: ExprKind::DictLiteral(entries),
        })
    }

    fn parse_clauses(&mut self) -> Result<Vec<Clause>, Diagnostic> {
        let mut clauses = Vec::new();
        loop {
            if self.matches_keyword(Keyword::For) {
                let target = self.parse_for_target()?;
                self.consume_keyword(Keyword::In)?;
                let iterable = self.parse_or()?;
                clauses.push(Clause::For { target, iterable });
            } else if self.matches_keyword(Keyword::If) {
                clauses.push(Clause::If(self.parse_or()?));
            } else {
                break;
            }
        }
        Ok(clauses)
    }

    fn at_statement_end(&self) -> bool {
        self.check(TokenKind::Newline)
            || self.check(TokenKind::Semicolon)
            || self.check(TokenKind::Eof)
    }

    fn at_expression_list_end(&self) -> bool {
        match self.peek().map(|t| &t.kind) {
            None => true,
            Some(kind) => {
                augmented_op(kind).is_some()
                    || matches!(
                        kind,
                        TokenKind::Newline
                            | TokenKind::Semicolon
                            | TokenKind::Eof
                            | TokenKind::Assign
                            | TokenKind::Colon
                            | TokenKind::RParen
                            | TokenKind::RBracket
                            | TokenKind::RBrace
                    )
            }
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        if self.check_keyword(keyword) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected `{}`", keyword_text(keyword))))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.current + offset).map(|t| &t.kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message, token.span)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        let end = self.tokens.last().map_or(SourceSpan::default(), |t| t.span);
        Diagnostic::new(DiagnosticKind::Parser, message, end)
    }

    /// An error at the current token that also says what was found there.
    fn unexpected(&self, message: &str) -> Diagnostic {
        match self.peek() {
            Some(token) => self.error(token, &format!("{message}, found {}", describe(token))),
            None => self.error_eof(message),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, op_span: SourceSpan) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            op_span,
        },
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

fn tuple(items: Vec<Expr>) -> Expr {
    let span = match (items.first(), items.last()) {
        (Some(first), Some(last)) => first.span.to(last.span),
        _ => SourceSpan::default(),
    };
    Expr {
        span,
        kind: ExprKind::TupleLiteral(items),
    }
}

fn augmented_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::PlusAssign => Some(BinaryOp::Add),
        TokenKind::MinusAssign => Some(BinaryOp::Sub),
        TokenKind::StarAssign => Some(BinaryOp::Mul),
        TokenKind::SlashAssign => Some(BinaryOp::Div),
        TokenKind::SlashSlashAssign => Some(BinaryOp::FloorDiv),
        TokenKind::PercentAssign => Some(BinaryOp::Mod),
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Newline => "newline".into(),
        TokenKind::Indent => "indentation".into(),
        TokenKind::Dedent => "end of block".into(),
        TokenKind::Eof => "end of input".into(),
        TokenKind::String => format!("string {:?}", token.lexeme),
        _ => format!("`{}`", token.lexeme),
    }
}

fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::And => "and",
        Keyword::Break => "break",
        Keyword::Continue => "continue",
        Keyword::Def => "def",
        Keyword::Elif => "elif",
        Keyword::Else => "else",
        Keyword::For => "for",
        Keyword::If => "if",
        Keyword::In => "in",
        Keyword::Lambda => "lambda",
        Keyword::Not => "not",
        Keyword::Or => "or",
        Keyword::Pass => "pass",
        Keyword::Return => "return",
        Keyword::While => "while",
        Keyword::True => "True",
        Keyword::False => "False",
        Keyword::None => "None",
    }
}
