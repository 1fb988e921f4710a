//! JavaScript token scanning
//!
//! Just enough lexing to tell identifiers apart from strings, comments, template text
//! and regular expressions. Import references are rewritten on top of it so every read
//! of an imported binding goes through the exporting module's namespace.

use std::collections::HashMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Ident,
    Punct,
    /// String, number, regular expression or template text
    Literal,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: Kind,
    pub(crate) range: Range<usize>,
    /// A line break separates this token from the previous one
    pub(crate) newline_before: bool,
}

impl Token {
    pub(crate) fn text<'a>(&self, code: &'a str) -> &'a str {
        &code[self.range.clone()]
    }
}

/// Keywords after which `/` starts a regular expression
const REGEX_AFTER: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case",
    "do", "else", "yield", "await",
];

/// Tokens that continue an expression onto the next line
const CONTINUATIONS: &[&str] = &[
    ".", "?.", ",", "?", ":", "+", "-", "*", "/", "%", "=", "&", "|", "^", "<", ">", "(", "[",
    "=>",
];

/// Split `code` into tokens
pub(crate) fn tokenize(code: &str) -> Result<Vec<Token>, String> {
    Scanner {
        code,
        bytes: code.as_bytes(),
        pos: 0,
        newline: false,
        braces: Vec::new(),
        tokens: Vec::new(),
    }
    .run()
}

struct Scanner<'a> {
    code: &'a str,
    bytes: &'a [u8],
    pos: usize,
    newline: bool,
    /// Open braces; `true` marks a template substitution
    braces: Vec<bool>,
    tokens: Vec<Token>,
}

impl Scanner<'_> {
    fn run(mut self) -> Result<Vec<Token>, String> {
        while let Some(c) = self.peek(0) {
            match c {
                b'\n' => {
                    self.newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek(1) == Some(b'/') => self.line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.block_comment()?,
                b'/' if self.regex_allowed() => self.regex()?,
                b'\'' | b'"' => self.string(c)?,
                b'`' => {
                    let start = self.pos;
                    self.pos += 1;
                    self.template(start)?;
                }
                b'0'..=b'9' => self.number(),
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.number(),
                b'#' => self.ident(),
                c if is_ident_byte(c) => self.ident(),
                b'{' => {
                    self.braces.push(false);
                    self.push(Kind::Punct, 1);
                }
                b'}' => {
                    if self.braces.pop() == Some(true) {
                        let start = self.pos;
                        self.pos += 1;
                        self.template(start)?;
                    } else {
                        self.push(Kind::Punct, 1);
                    }
                }
                _ => {
                    let len = if self.code[self.pos..].starts_with("...") {
                        3
                    } else if self.code[self.pos..].starts_with("=>")
                        || (self.code[self.pos..].starts_with("?.")
                            && !matches!(self.peek(2), Some(b'0'..=b'9')))
                    {
                        2
                    } else {
                        1
                    };
                    self.push(Kind::Punct, len);
                }
            }
        }

        if self.braces.contains(&true) {
            return Err("unterminated template literal".to_string());
        }
        Ok(self.tokens)
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Emit a token of `len` bytes at the cursor
    fn push(&mut self, kind: Kind, len: usize) {
        self.emit(kind, self.pos..self.pos + len);
        self.pos += len;
    }

    fn emit(&mut self, kind: Kind, range: Range<usize>) {
        self.tokens.push(Token {
            kind,
            range,
            newline_before: std::mem::take(&mut self.newline),
        });
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(token) => match token.kind {
                Kind::Punct => !matches!(token.text(self.code), ")" | "]" | "}"),
                Kind::Ident => REGEX_AFTER.contains(&token.text(self.code)),
                Kind::Literal => false,
            },
        }
    }

    fn line_comment(&mut self) {
        while !matches!(self.peek(0), None | Some(b'\n')) {
            self.pos += 1;
        }
    }

    fn block_comment(&mut self) -> Result<(), String> {
        let end = self.code[self.pos + 2..]
            .find("*/")
            .ok_or_else(|| "unterminated comment".to_string())?;
        let comment = &self.code[self.pos..self.pos + 2 + end + 2];
        if comment.contains('\n') {
            self.newline = true;
        }
        self.pos += comment.len();
        Ok(())
    }

    fn string(&mut self, quote: u8) -> Result<(), String> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(c) if c == quote => {
                    self.pos += 1;
                    self.emit(Kind::Literal, start..self.pos);
                    return Ok(());
                }
                Some(b'\n') | None => return Err("unterminated string literal".to_string()),
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Template text from `start` up to the closing backtick or the next `${`
    fn template(&mut self, start: usize) -> Result<(), String> {
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    self.emit(Kind::Literal, start..self.pos);
                    return Ok(());
                }
                Some(b'$') if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.emit(Kind::Literal, start..self.pos);
                    self.braces.push(true);
                    return Ok(());
                }
                Some(_) => self.pos += 1,
                None => return Err("unterminated template literal".to_string()),
            }
        }
    }

    fn regex(&mut self) -> Result<(), String> {
        let start = self.pos;
        let mut in_class = false;
        self.pos += 1;
        loop {
            match self.peek(0) {
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(b'\n') | None => {
                    return Err("unterminated regular expression".to_string())
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek(0).map(is_ident_byte).unwrap_or(false) {
            self.pos += 1;
        }
        self.emit(Kind::Literal, start..self.pos);
        Ok(())
    }

    fn number(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            let exponent_sign = matches!(c, b'+' | b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.code[start..].starts_with("0x");
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.emit(Kind::Literal, start..self.pos);
    }

    fn ident(&mut self) {
        let start = self.pos;
        self.pos += 1;
        while self.peek(0).map(is_ident_byte).unwrap_or(false) {
            self.pos += 1;
        }
        self.emit(Kind::Ident, start..self.pos);
    }
}

/// Identifier bytes; non-ASCII bytes belong to identifiers
fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c >= 0x80
}

/// Whether `token` follows a `.` or `?.`, i.e. is a property name
pub(crate) fn is_member(code: &str, tokens: &[Token], index: usize) -> bool {
    index
        .checked_sub(1)
        .map(|prev| matches!(tokens[prev].text(code), "." | "?."))
        .unwrap_or(false)
}

/// Names bound by the declarator list starting at byte `start`
///
/// Reads `a = 1, b = f(x, y)` up to the terminating `;`, the end of the statement at a
/// line break, or the enclosing block's `}`.
pub(crate) fn declarator_names(
    code: &str,
    tokens: &[Token],
    start: usize,
) -> Result<Vec<String>, String> {
    let first = tokens
        .iter()
        .position(|token| token.range.start >= start)
        .ok_or_else(|| "missing declarator".to_string())?;

    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut expect_name = true;

    for index in first..tokens.len() {
        let token = &tokens[index];
        let text = token.text(code);

        if expect_name {
            if token.kind != Kind::Ident {
                return Err(format!("unsupported export declarator `{}`", text));
            }
            names.push(text.to_string());
            expect_name = false;
            continue;
        }

        if depth == 0 && token.newline_before && ends_expression(code, &tokens[index - 1]) {
            let continues = match token.kind {
                Kind::Punct => CONTINUATIONS.contains(&text),
                Kind::Literal => text.starts_with('`'),
                Kind::Ident => matches!(text, "in" | "instanceof"),
            };
            if !continues {
                break;
            }
        }

        match (token.kind, text) {
            (Kind::Punct, "(" | "[" | "{") => depth += 1,
            (Kind::Punct, ")" | "]" | "}") => match depth.checked_sub(1) {
                Some(outer) => depth = outer,
                None => break,
            },
            (Kind::Punct, ",") if depth == 0 => expect_name = true,
            (Kind::Punct, ";") if depth == 0 => break,
            _ => {}
        }
    }

    Ok(names)
}

fn ends_expression(code: &str, token: &Token) -> bool {
    match token.kind {
        Kind::Ident | Kind::Literal => true,
        Kind::Punct => matches!(token.text(code), ")" | "]" | "}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Block,
    Object,
    /// Destructuring target of a declaration
    Pattern,
    Group { params: bool, rewritten: bool },
}

/// Replace every free reference to a key of `names` with its expression
///
/// Property names, object keys and methods stay untouched; shorthand properties are
/// expanded. Declaring one of the names again in the same code is an error.
pub(crate) fn rewrite_references(
    code: &str,
    names: &HashMap<String, String>,
) -> Result<String, String> {
    if names.is_empty() {
        return Ok(code.to_string());
    }

    let tokens = tokenize(code)?;
    let text = |index: usize| tokens.get(index).map(|token| token.text(code));
    let shadowed = |name: &str| format!("`{}` shadows an imported binding", name);

    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;
    let mut contexts: Vec<Context> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        let current = token.text(code);
        let prev = index.checked_sub(1).and_then(text);
        let next = text(index + 1);

        match token.kind {
            Kind::Punct => match current {
                "{" => contexts.push(match prev {
                    Some("var" | "let" | "const") => Context::Pattern,
                    _ if opens_block(prev) => Context::Block,
                    _ => Context::Object,
                }),
                "(" => {
                    let before = index.checked_sub(2).and_then(text);
                    let in_object = contexts.last() == Some(&Context::Object);
                    let params = matches!(prev, Some("function" | "catch"))
                        || matches!(before, Some("function"))
                        || (in_object && matches!(before, Some("{" | "," | "get" | "set" | "async" | "*")));
                    contexts.push(Context::Group {
                        params,
                        rewritten: false,
                    });
                }
                "[" => contexts.push(Context::Group {
                    params: false,
                    rewritten: false,
                }),
                ")" => {
                    if let Some(Context::Group { rewritten: true, .. }) = contexts.pop() {
                        if next == Some("=>") {
                            return Err("an arrow function parameter shadows an imported binding".to_string());
                        }
                    }
                }
                "}" | "]" => {
                    contexts.pop();
                }
                _ => {}
            },
            Kind::Ident => {
                let Some(replacement) = names.get(current) else {
                    continue;
                };
                if is_member(code, &tokens, index) {
                    continue;
                }
                if matches!(prev, Some("var" | "let" | "const" | "function" | "class"))
                    || next == Some("=>")
                {
                    return Err(shadowed(current));
                }

                let key_position = matches!(prev, Some("{" | ","));
                let expression = match contexts.last_mut() {
                    Some(Context::Pattern) if next != Some(":") => return Err(shadowed(current)),
                    Some(Context::Pattern) => continue,
                    Some(Context::Group { params: true, .. }) => return Err(shadowed(current)),
                    Some(Context::Object) if key_position && matches!(next, Some(":" | "(")) => {
                        continue
                    }
                    Some(Context::Object)
                        if next == Some("(") && matches!(prev, Some("get" | "set" | "async" | "*")) =>
                    {
                        continue
                    }
                    Some(Context::Object) if key_position && matches!(next, Some("," | "}")) => {
                        format!("{}: {}", current, replacement)
                    }
                    context => {
                        if let Some(Context::Group { rewritten, .. }) = context {
                            *rewritten = true;
                        }
                        let called = next == Some("(")
                            || next.map(|n| n.starts_with('`')).unwrap_or(false);
                        if called && prev != Some("new") && replacement.contains('.') {
                            format!("(0, {})", replacement)
                        } else {
                            replacement.clone()
                        }
                    }
                };

                out.push_str(&code[cursor..token.range.start]);
                out.push_str(&expression);
                cursor = token.range.end;
            }
            Kind::Literal => {}
        }
    }

    out.push_str(&code[cursor..]);
    Ok(out)
}

/// Whether a `{` after `prev` opens a block rather than an object literal
fn opens_block(prev: Option<&str>) -> bool {
    match prev {
        None => true,
        Some(prev) => matches!(
            prev,
            ")" | ";" | "{" | "}" | "=>" | "else" | "do" | "try" | "finally"
        ),
    }
}
