use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    And,
    Break,
    Continue,
    Def,
    Elif,
    Else,
    For,
    If,
    In,
    Lambda,
    Not,
    Or,
    Pass,
    Return,
    While,
    True,
    False,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Int,
    Float,
    String,
    Keyword(Keyword),
    /// A word the language sets aside (`class`, `import`, ...) and rejects.
    Reserved,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    SlashSlashAssign,
    PercentAssign,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text, except for strings where it holds the decoded value.
    pub lexeme: String,
    pub span: SourceSpan,
}

/// Scanner producing Python-style layout tokens (NEWLINE, INDENT, DEDENT).
///
/// Newlines inside brackets are insignificant, as are blank and comment-only lines.
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
    indents: Vec<usize>,
    depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
            indents: vec![0],
            depth: 0,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = if let Some((idx, ch)) = self.peeked.take() {
            Some((idx, ch))
        } else {
            self.chars.next()
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            Some((idx, ch))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn peek_char(&mut self) -> Option<char> {
        self.peek().map(|(_, ch)| ch)
    }

    /// The character after the peeked one.
    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if let Some((idx, ch)) = self.peek() {
            if ch == expected {
                self.peeked = None;
                self.current = idx + ch.len_utf8();
                true
            } else {
                false
            }
        } else {
            false
        }
    }

    fn collect_while<F>(&mut self, mut predicate: F)
    where
        F: FnMut(char) -> bool,
    {
        while let Some(ch) = self.peek_char() {
            if predicate(ch) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>, start: usize) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::Lexer,
            message,
            SourceSpan::new(start, self.current.max(start)),
        )
    }

    fn skip_comment(&mut self) {
        self.collect_while(|ch| ch != '\n');
    }

    /// Consumes leading blanks of a line and returns the indentation width.
    fn measure_indent(&mut self) -> usize {
        let mut width = 0;
        while let Some(ch) = self.peek_char() {
            match ch {
                ' ' => width += 1,
                '\t' => width += 8 - width % 8,
                _ => break,
            }
            self.bump();
        }
        width
    }

    fn skip_inline_whitespace(&mut self) -> Result<(), Diagnostic> {
        while let Some((idx, ch)) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    self.match_next('\r');
                    if !self.match_next('\n') {
                        return Err(self.error("unexpected `\\` outside a string", idx));
                    }
                }
                '\n' if self.depth > 0 => {
                    self.bump();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn layout(&mut self, tokens: &mut Vec<Token>, width: usize) -> Result<(), Diagnostic> {
        let here = SourceSpan::new(self.current, self.current);
        let innermost = self.indents.last().copied().unwrap_or(0);
        if width > innermost {
            self.indents.push(width);
            tokens.push(layout_token(TokenKind::Indent, here));
            return Ok(());
        }
        while width < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            tokens.push(layout_token(TokenKind::Dedent, here));
        }
        if width != self.indents.last().copied().unwrap_or(0) {
            return Err(self.error(
                "unindent does not match any outer indentation level",
                self.current,
            ));
        }
        Ok(())
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        self.collect_while(|ch| ch.is_alphanumeric() || ch == '_');
        let end = self.current;
        let lexeme = self.source[start..end].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            span: SourceSpan { start, end },
        }
    }

    fn number_literal(&mut self, start: usize, first: char) -> Token {
        if first == '0' && matches!(self.peek_char(), Some('x' | 'X')) {
            self.bump();
            self.collect_while(|ch| ch.is_ascii_hexdigit() || ch == '_');
            let end = self.current;
            return Token {
                kind: TokenKind::Int,
                lexeme: self.source[start..end].to_string(),
                span: SourceSpan { start, end },
            };
        }
        let mut is_float = false;
        let mut seen_exponent = false;
        while let Some(ch) = self.peek_char() {
            match ch {
                '0'..='9' | '_' => {
                    self.bump();
                }
                '.' if !is_float && !seen_exponent => {
                    is_float = true;
                    self.bump();
                }
                'e' | 'E' if !seen_exponent => {
                    is_float = true;
                    seen_exponent = true;
                    self.bump();
                    if let Some('+' | '-') = self.peek_char() {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let end = self.current;
        Token {
            kind: if is_float {
                TokenKind::Float
            } else {
                TokenKind::Int
            },
            lexeme: self.source[start..end].to_string(),
            span: SourceSpan { start, end },
        }
    }

    fn string_literal(&mut self, start: usize, quote: char) -> Result<Token, Diagnostic> {
        let triple = self.peek_char() == Some(quote) && self.peek_second() == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }
        let mut value = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                '\\' => match self.bump() {
                    Some((_, esc)) => match esc {
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        '0' => value.push('\0'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        '\\' => value.push('\\'),
                        '\n' => {}
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    },
                    None => break,
                },
                '\n' if !triple => {
                    return Err(self.error("unterminated string literal", start));
                }
                c if c == quote => {
                    if !triple {
                        return Ok(self.string_token(start, value));
                    }
                    if self.peek_char() == Some(quote) && self.peek_second() == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(self.string_token(start, value));
                    }
                    value.push(c);
                }
                other => value.push(other),
            }
        }
        Err(self.error("unterminated string literal", start))
    }

    fn string_token(&self, start: usize, value: String) -> Token {
        Token {
            kind: TokenKind::String,
            lexeme: value,
            span: SourceSpan {
                start,
                end: self.current,
            },
        }
    }

    fn simple_token(&mut self, start: usize, kind: TokenKind) -> Token {
        let end = self.current;
        Token {
            kind,
            lexeme: self.source[start..end].to_string(),
            span: SourceSpan { start, end },
        }
    }

    fn operator_with_assign(&mut self, start: usize, plain: TokenKind, assign: TokenKind) -> Token {
        if self.match_next('=') {
            self.simple_token(start, assign)
        } else {
            self.simple_token(start, plain)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut at_line_start = true;
        loop {
            if at_line_start && self.depth == 0 {
                let width = self.measure_indent();
                match self.peek_char() {
                    Some('\n' | '\r') => {
                        self.bump();
                        continue;
                    }
                    Some('#') => {
                        self.skip_comment();
                        continue;
                    }
                    None => break,
                    Some(_) => {}
                }
                at_line_start = false;
                self.layout(&mut tokens, width)?;
            }

            self.skip_inline_whitespace()?;
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => break,
            };

            let token = match ch {
                '\n' => {
                    at_line_start = true;
                    if !matches!(
                        tokens.last().map(|t| &t.kind),
                        None | Some(TokenKind::Newline)
                    ) {
                        tokens.push(self.simple_token(start, TokenKind::Newline));
                    }
                    continue;
                }
                c if c.is_alphabetic() || c == '_' => self.identifier_or_keyword(start),
                c @ '0'..='9' => self.number_literal(start, c),
                '"' | '\'' => self.string_literal(start, ch)?,
                '(' | '[' | '{' => {
                    self.depth += 1;
                    let kind = match ch {
                        '(' => TokenKind::LParen,
                        '[' => TokenKind::LBracket,
                        _ => TokenKind::LBrace,
                    };
                    self.simple_token(start, kind)
                }
                ')' | ']' | '}' => {
                    self.depth = self.depth.saturating_sub(1);
                    let kind = match ch {
                        ')' => TokenKind::RParen,
                        ']' => TokenKind::RBracket,
                        _ => TokenKind::RBrace,
                    };
                    self.simple_token(start, kind)
                }
                ',' => self.simple_token(start, TokenKind::Comma),
                '.' => self.simple_token(start, TokenKind::Dot),
                ':' => self.simple_token(start, TokenKind::Colon),
                ';' => self.simple_token(start, TokenKind::Semicolon),
                '+' => self.operator_with_assign(start, TokenKind::Plus, TokenKind::PlusAssign),
                '-' => self.operator_with_assign(start, TokenKind::Minus, TokenKind::MinusAssign),
                '*' => self.operator_with_assign(start, TokenKind::Star, TokenKind::StarAssign),
                '%' => {
                    self.operator_with_assign(start, TokenKind::Percent, TokenKind::PercentAssign)
                }
                '/' => {
                    if self.match_next('/') {
                        self.operator_with_assign(
                            start,
                            TokenKind::SlashSlash,
                            TokenKind::SlashSlashAssign,
                        )
                    } else {
                        self.operator_with_assign(start, TokenKind::Slash, TokenKind::SlashAssign)
                    }
                }
                '=' => {
                    self.operator_with_assign(start, TokenKind::Assign, TokenKind::EqualEqual)
                }
                '!' => {
                    if self.match_next('=') {
                        self.simple_token(start, TokenKind::BangEqual)
                    } else {
                        return Err(self.error("unexpected character `!`", start));
                    }
                }
                '<' => self.operator_with_assign(start, TokenKind::Less, TokenKind::LessEqual),
                '>' => {
                    self.operator_with_assign(start, TokenKind::Greater, TokenKind::GreaterEqual)
                }
                other => {
                    return Err(self.error(format!("unexpected character `{other}`"), start));
                }
            };
            tokens.push(token);
        }

        let end = SourceSpan::new(self.current, self.current);
        if !matches!(
            tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline)
        ) {
            tokens.push(layout_token(TokenKind::Newline, end));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            tokens.push(layout_token(TokenKind::Dedent, end));
        }
        tokens.push(layout_token(TokenKind::Eof, end));
        Ok(tokens)
    }
}

fn layout_token(kind: TokenKind, span: SourceSpan) -> Token {
    Token {
        kind,
        lexeme: String::new(),
        span,
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "and" => Kw::And,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "def" => Kw::Def,
        "elif" => Kw::Elif,
        "else" => Kw::Else,
        "for" => Kw::For,
        "if" => Kw::If,
        "in" => Kw::In,
        "lambda" => Kw::Lambda,
        "not" => Kw::Not,
        "or" => Kw::Or,
        "pass" => Kw::Pass,
        "return" => Kw::Return,
        "while" => Kw::While,
        "True" => Kw::True,
        "False" => Kw::False,
        "None" => Kw::None,
        "as" | "assert" | "async" | "await" | "class" | "del" | "except" | "finally"
        | "from" | "global" | "import" | "is" | "nonlocal" | "raise" | "try" | "with"
        | "yield" => return Some(TokenKind::Reserved),
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}
