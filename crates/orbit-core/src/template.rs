//! Script template rendering.
//!
//! Supports the part of Jinja that action templates use: `{{ expr }}` output,
//! `{% if expr %}` / `{% elif expr %}` / `{% else %}` / `{% endif %}` blocks,
//! filter chains (`lower`, `upper`, `trim`, `json`, `escape`), comparisons,
//! `and` / `or` / `not`, string and integer literals, and the inline
//! `a if cond else b` form. Rendering is a pure text transform.

use std::cmp::Ordering;

use crate::action::{ArgValue, Arguments};
use crate::error::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Lower,
    Upper,
    Trim,
    Json,
    Escape,
}

impl Filter {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "lower" => Ok(Self::Lower),
            "upper" => Ok(Self::Upper),
            "trim" => Ok(Self::Trim),
            "json" => Ok(Self::Json),
            "escape" => Ok(Self::Escape),
            other => Err(TemplateError::UnknownFilter {
                filter: other.to_owned(),
            }),
        }
    }

    fn apply(self, value: &ArgValue) -> ArgValue {
        let text = match self {
            Self::Lower => value.render().to_lowercase(),
            Self::Upper => value.render().to_uppercase(),
            Self::Trim => value.render().trim().to_owned(),
            Self::Json => value.to_json().to_string(),
            Self::Escape => value.render().replace('\\', "\\\\").replace('"', "\\\""),
        };
        ArgValue::String(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Var(String),
    Literal(ArgValue),
    Filter(Box<Expr>, Filter),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Cond {
        then: Box<Expr>,
        test: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Variable reported when the expression evaluates to nothing.
    fn subject(&self) -> Option<&str> {
        match self {
            Self::Var(name) => Some(name),
            Self::Literal(_) => None,
            Self::Filter(inner, _) | Self::Not(inner) => inner.subject(),
            Self::And(l, r) | Self::Or(l, r) | Self::Compare(l, _, r) => {
                l.subject().or_else(|| r.subject())
            }
            Self::Cond {
                then,
                test,
                otherwise,
            } => then
                .subject()
                .or_else(|| test.subject())
                .or_else(|| otherwise.as_deref().and_then(Self::subject)),
        }
    }

    fn collect_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Var(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Self::Literal(_) => {}
            Self::Filter(inner, _) | Self::Not(inner) => inner.collect_names(names),
            Self::And(l, r) | Self::Or(l, r) | Self::Compare(l, _, r) => {
                l.collect_names(names);
                r.collect_names(names);
            }
            Self::Cond {
                then,
                test,
                otherwise,
            } => {
                then.collect_names(names);
                test.collect_names(names);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_names(names);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme<'a> {
    Ident(&'a str),
    Str(String),
    Int(i64),
    Pipe,
    Open,
    Close,
    Op(CmpOp),
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "if" | "else" | "elif" | "and" | "or" | "not" | "in" | "is")
}

fn lex(source: &str, offset: usize) -> Result<Vec<Lexeme<'_>>, TemplateError> {
    let syntax = |message: String| TemplateError::Syntax { offset, message };
    let mut lexemes = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' | '(' | ')' => {
                chars.next();
                lexemes.push(match c {
                    '|' => Lexeme::Pipe,
                    '(' => Lexeme::Open,
                    _ => Lexeme::Close,
                });
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    if ch == '\\' {
                        if let Some((_, escaped)) = chars.next() {
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                        continue;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(syntax(format!(
                        "unterminated string literal in '{}'",
                        source.trim()
                    )));
                }
                lexemes.push(Lexeme::Str(text));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let or_equal = chars.next_if(|&(_, n)| n == '=').is_some();
                let op = match (c, or_equal) {
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    ('>', true) => CmpOp::Ge,
                    _ => {
                        return Err(syntax(format!("unexpected '{c}' in '{}'", source.trim())));
                    }
                };
                lexemes.push(Lexeme::Op(op));
            }
            c if c.is_ascii_digit() || c == '-' => {
                chars.next();
                let mut end = start + 1;
                while let Some((i, _)) = chars.next_if(|&(_, d)| d.is_ascii_digit()) {
                    end = i + 1;
                }
                let text = &source[start..end];
                let n = text
                    .parse()
                    .map_err(|_| syntax(format!("invalid number '{text}'")))?;
                lexemes.push(Lexeme::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some((i, _)) =
                    chars.next_if(|&(_, d)| d.is_ascii_alphanumeric() || d == '_')
                {
                    end = i + 1;
                }
                lexemes.push(Lexeme::Ident(&source[start..end]));
            }
            other => {
                return Err(syntax(format!("unexpected '{other}' in '{}'", source.trim())));
            }
        }
    }

    Ok(lexemes)
}

/// Recursive-descent parser for the body of `{{ }}` and `{% if %}`.
///
/// Precedence, loosest first: inline `if`/`else`, `or`, `and`, `not`,
/// comparison, filter.
struct ExprParser<'a> {
    lexemes: Vec<Lexeme<'a>>,
    pos: usize,
    source: &'a str,
    offset: usize,
}

impl<'a> ExprParser<'a> {
    fn parse(source: &'a str, offset: usize) -> Result<Expr, TemplateError> {
        let mut parser = Self {
            lexemes: lex(source, offset)?,
            pos: 0,
            source,
            offset,
        };
        let expr = parser.conditional()?;
        if parser.pos < parser.lexemes.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn error(&self, what: &str) -> TemplateError {
        TemplateError::Syntax {
            offset: self.offset,
            message: format!("{what} in '{}'", self.source.trim()),
        }
    }

    fn peek(&self) -> Option<&Lexeme<'a>> {
        self.lexemes.get(self.pos)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        let found = matches!(self.peek(), Some(Lexeme::Ident(w)) if *w == word);
        if found {
            self.pos += 1;
        }
        found
    }

    fn conditional(&mut self) -> Result<Expr, TemplateError> {
        let then = self.or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let test = self.or()?;
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.conditional()?))
        } else {
            None
        };
        Ok(Expr::Cond {
            then: Box::new(then),
            test: Box::new(test),
            otherwise,
        })
    }

    fn or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, TemplateError> {
        let left = self.filtered()?;
        if let Some(&Lexeme::Op(op)) = self.peek() {
            self.pos += 1;
            let right = self.filtered()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn filtered(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        while matches!(self.peek(), Some(Lexeme::Pipe)) {
            self.pos += 1;
            let Some(Lexeme::Ident(name)) = self.peek() else {
                return Err(self.error("expected filter name"));
            };
            let filter = Filter::parse(name)?;
            self.pos += 1;
            expr = Expr::Filter(Box::new(expr), filter);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        let Some(lexeme) = self.peek().cloned() else {
            return Err(self.error("expected expression"));
        };
        self.pos += 1;
        match lexeme {
            Lexeme::Ident("true" | "True") => Ok(Expr::Literal(ArgValue::Boolean(true))),
            Lexeme::Ident("false" | "False") => Ok(Expr::Literal(ArgValue::Boolean(false))),
            Lexeme::Ident(word) if is_keyword(word) => {
                Err(self.error(&format!("unexpected '{word}'")))
            }
            Lexeme::Ident(name) => Ok(Expr::Var(name.to_owned())),
            Lexeme::Str(text) => Ok(Expr::Literal(ArgValue::String(text))),
            Lexeme::Int(n) => Ok(Expr::Literal(ArgValue::Integer(n))),
            Lexeme::Open => {
                let inner = self.conditional()?;
                if !matches!(self.peek(), Some(Lexeme::Close)) {
                    return Err(self.error("expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Lexeme::Close | Lexeme::Pipe | Lexeme::Op(_) => Err(self.error("expected expression")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        test: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Tag that closes the node list being parsed.
#[derive(Debug)]
enum Block {
    Elif(Expr),
    Else,
    Endif,
}

impl Block {
    fn name(&self) -> &'static str {
        match self {
            Self::Elif(_) => "elif",
            Self::Else => "else",
            Self::Endif => "endif",
        }
    }
}

#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Expr { body: &'a str, offset: usize },
    Tag { body: &'a str, offset: usize },
}

/// Parsed template, reusable across renders.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Syntax` for unterminated or unbalanced tags and
    /// malformed expressions, and `TemplateError::UnknownFilter` for
    /// unsupported filters.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        let mut pos = 0;
        let (nodes, end) = parse_nodes(&tokens, &mut pos)?;
        if let Some((block, offset)) = end {
            return Err(TemplateError::Syntax {
                offset,
                message: format!("unexpected '{{% {} %}}'", block.name()),
            });
        }
        Ok(Self { nodes })
    }

    /// Render with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::MissingValue` when an output expression or an
    /// ordering comparison needs a value that was not supplied, and
    /// `TemplateError::Incomparable` when an ordering compares mismatched types.
    pub fn render(&self, args: &Arguments) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_nodes(&self.nodes, args, &mut out)?;
        Ok(out)
    }

    /// Names referenced by the template, in first-use order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(&self.nodes, &mut names);
        names
    }
}

/// Parse and render in one step.
///
/// # Errors
///
/// See [`Template::parse`] and [`Template::render`].
pub fn render(source: &str, args: &Arguments) -> Result<String, TemplateError> {
    Template::parse(source)?.render(args)
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < source.len() {
        let rest = &source[pos..];
        let next_expr = rest.find("{{");
        let next_tag = rest.find("{%");
        let (start, is_tag) = match (next_expr, next_tag) {
            (None, None) => {
                tokens.push(Token::Text(rest));
                break;
            }
            (Some(e), Some(t)) if t < e => (t, true),
            (Some(e), _) => (e, false),
            (None, Some(t)) => (t, true),
        };

        if start > 0 {
            tokens.push(Token::Text(&rest[..start]));
        }
        let offset = pos + start;
        let close = if is_tag { "%}" } else { "}}" };
        let body_start = offset + 2;
        let Some(end) = source[body_start..].find(close) else {
            return Err(TemplateError::Syntax {
                offset,
                message: format!("unterminated tag, expected '{close}'"),
            });
        };
        let body = &source[body_start..body_start + end];
        tokens.push(if is_tag {
            Token::Tag { body, offset }
        } else {
            Token::Expr { body, offset }
        });
        pos = body_start + end + 2;
    }

    Ok(tokens)
}

/// Parses until end of input or a block tag (`elif` / `else` / `endif`), which
/// is consumed and returned to the caller.
fn parse_nodes(
    tokens: &[Token<'_>],
    pos: &mut usize,
) -> Result<(Vec<Node>, Option<(Block, usize)>), TemplateError> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        match token {
            Token::Text(text) => nodes.push(Node::Text((*text).to_owned())),
            Token::Expr { body, offset } => {
                nodes.push(Node::Output(ExprParser::parse(body, *offset)?));
            }
            Token::Tag { body, offset } => {
                let body = body.trim();
                let (keyword, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
                match keyword {
                    "if" => {
                        let test = ExprParser::parse(rest, *offset)?;
                        nodes.push(parse_if(tokens, pos, test, *offset)?);
                    }
                    "elif" => {
                        let test = ExprParser::parse(rest, *offset)?;
                        return Ok((nodes, Some((Block::Elif(test), *offset))));
                    }
                    "else" if rest.is_empty() => return Ok((nodes, Some((Block::Else, *offset)))),
                    "endif" if rest.is_empty() => {
                        return Ok((nodes, Some((Block::Endif, *offset))));
                    }
                    _ => {
                        return Err(TemplateError::Syntax {
                            offset: *offset,
                            message: format!("unsupported tag '{body}'"),
                        });
                    }
                }
            }
        }
    }

    Ok((nodes, None))
}

fn parse_if(
    tokens: &[Token<'_>],
    pos: &mut usize,
    test: Expr,
    offset: usize,
) -> Result<Node, TemplateError> {
    let unclosed = || TemplateError::Syntax {
        offset,
        message: "'if' block is never closed with 'endif'".to_owned(),
    };

    let (then, end) = parse_nodes(tokens, pos)?;
    let otherwise = match end {
        Some((Block::Endif, _)) => Vec::new(),
        Some((Block::Elif(test), elif_offset)) => vec![parse_if(tokens, pos, test, elif_offset)?],
        Some((Block::Else, else_offset)) => {
            let (otherwise, end) = parse_nodes(tokens, pos)?;
            match end {
                Some((Block::Endif, _)) => otherwise,
                Some((block, o)) => {
                    return Err(TemplateError::Syntax {
                        offset: o,
                        message: format!(
                            "'{}' after 'else' at byte {else_offset}",
                            block.name()
                        ),
                    });
                }
                None => return Err(unclosed()),
            }
        }
        None => return Err(unclosed()),
    };

    Ok(Node::If {
        test,
        then,
        otherwise,
    })
}

fn truthy(value: Option<&ArgValue>) -> bool {
    value.is_some_and(ArgValue::is_truthy)
}

/// Evaluates an expression; `None` is an undefined value.
fn eval(expr: &Expr, args: &Arguments) -> Result<Option<ArgValue>, TemplateError> {
    Ok(match expr {
        Expr::Var(name) => args.get(name).cloned(),
        Expr::Literal(value) => Some(value.clone()),
        Expr::Filter(inner, filter) => eval(inner, args)?.map(|v| filter.apply(&v)),
        Expr::Not(inner) => Some(ArgValue::Boolean(!truthy(eval(inner, args)?.as_ref()))),
        Expr::And(l, r) => {
            let left = eval(l, args)?;
            if truthy(left.as_ref()) {
                eval(r, args)?
            } else {
                left
            }
        }
        Expr::Or(l, r) => {
            let left = eval(l, args)?;
            if truthy(left.as_ref()) {
                left
            } else {
                eval(r, args)?
            }
        }
        Expr::Compare(l, op, r) => Some(ArgValue::Boolean(compare(l, *op, r, args)?)),
        Expr::Cond {
            then,
            test,
            otherwise,
        } => {
            if truthy(eval(test, args)?.as_ref()) {
                eval(then, args)?
            } else if let Some(otherwise) = otherwise {
                eval(otherwise, args)?
            } else {
                Some(ArgValue::String(String::new()))
            }
        }
    })
}

fn require(expr: &Expr, args: &Arguments) -> Result<ArgValue, TemplateError> {
    eval(expr, args)?.ok_or_else(|| TemplateError::MissingValue {
        placeholder: expr.subject().unwrap_or("expression").to_owned(),
    })
}

fn compare(left: &Expr, op: CmpOp, right: &Expr, args: &Arguments) -> Result<bool, TemplateError> {
    let holds: fn(Ordering) -> bool = match op {
        CmpOp::Eq => return Ok(eval(left, args)? == eval(right, args)?),
        CmpOp::Ne => return Ok(eval(left, args)? != eval(right, args)?),
        CmpOp::Lt => Ordering::is_lt,
        CmpOp::Le => Ordering::is_le,
        CmpOp::Gt => Ordering::is_gt,
        CmpOp::Ge => Ordering::is_ge,
    };
    let (l, r) = (require(left, args)?, require(right, args)?);
    let ordering = match (&l, &r) {
        (ArgValue::Integer(a), ArgValue::Integer(b)) => a.cmp(b),
        (ArgValue::String(a), ArgValue::String(b)) => a.cmp(b),
        (ArgValue::Boolean(a), ArgValue::Boolean(b)) => a.cmp(b),
        _ => {
            return Err(TemplateError::Incomparable {
                left: l.param_type().to_string(),
                right: r.param_type().to_string(),
            });
        }
    };
    Ok(holds(ordering))
}

fn render_nodes(nodes: &[Node], args: &Arguments, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => out.push_str(&require(expr, args)?.render()),
            Node::If {
                test,
                then,
                otherwise,
            } => {
                let branch = if truthy(eval(test, args)?.as_ref()) {
                    then
                } else {
                    otherwise
                };
                render_nodes(branch, args, out)?;
            }
        }
    }
    Ok(())
}

fn collect_names<'a>(nodes: &'a [Node], names: &mut Vec<&'a str>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Output(expr) => expr.collect_names(names),
            Node::If {
                test,
                then,
                otherwise,
            } => {
                test.collect_names(names);
                collect_names(then, names);
                collect_names(otherwise, names);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, ArgValue)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(render("return 1", &Arguments::new()).unwrap(), "return 1");
        assert_eq!(render("", &Arguments::new()).unwrap(), "");
    }

    #[test]
    fn substitutes_placeholder() {
        let out = render("echo \"{{ msg }}\"", &args(&[("msg", "hello".into())])).unwrap();
        assert_eq!(out, "echo \"hello\"");
    }

    #[test]
    fn substitutes_without_spaces() {
        let out = render("{{msg}}-{{ msg }}", &args(&[("msg", "x".into())])).unwrap();
        assert_eq!(out, "x-x");
    }

    #[test]
    fn renders_typed_values() {
        let a = args(&[
            ("n", ArgValue::Integer(42)),
            ("flag", ArgValue::Boolean(false)),
            ("list", ArgValue::Array(vec![json!("a"), json!(1)])),
        ]);
        assert_eq!(render("{{ n }} {{ flag }} {{ list }}", &a).unwrap(), "42 false [\"a\",1]");
    }

    #[test]
    fn missing_value_is_error() {
        let err = render("hello {{ name }}", &Arguments::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingValue {
                placeholder: "name".into()
            }
        );
    }

    #[test]
    fn filters_apply_in_order() {
        let a = args(&[("s", "  Hello World ".into())]);
        assert_eq!(render("{{ s|trim|upper }}", &a).unwrap(), "HELLO WORLD");
        assert_eq!(render("{{ s | trim | lower }}", &a).unwrap(), "hello world");
    }

    #[test]
    fn lower_filter_on_boolean() {
        let a = args(&[("overwrite", ArgValue::Boolean(true))]);
        assert_eq!(render("if {{ overwrite|lower }} then", &a).unwrap(), "if true then");
    }

    #[test]
    fn escape_filter_quotes() {
        let a = args(&[("s", r#"say "hi" \ bye"#.into())]);
        assert_eq!(render("{{ s|escape }}", &a).unwrap(), r#"say \"hi\" \\ bye"#);
    }

    #[test]
    fn json_filter_quotes_strings() {
        let a = args(&[("s", "a\"b".into()), ("n", ArgValue::Integer(3))]);
        assert_eq!(render("{{ s|json }} {{ n|json }}", &a).unwrap(), r#""a\"b" 3"#);
    }

    #[test]
    fn unknown_filter_rejected() {
        let err = Template::parse("{{ s|reverse }}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFilter { ref filter } if filter == "reverse"));
    }

    #[test]
    fn if_else_blocks() {
        let tpl = Template::parse("a{% if cal %}[{{ cal }}]{% else %}[default]{% endif %}b").unwrap();
        assert_eq!(tpl.render(&args(&[("cal", "Work".into())])).unwrap(), "a[Work]b");
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "a[default]b");
        assert_eq!(tpl.render(&args(&[("cal", "".into())])).unwrap(), "a[default]b");
    }

    #[test]
    fn if_not_block() {
        let tpl = Template::parse("{% if not quiet %}loud{% endif %}").unwrap();
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "loud");
        assert_eq!(tpl.render(&args(&[("quiet", true.into())])).unwrap(), "");
    }

    #[test]
    fn nested_if_blocks() {
        let tpl =
            Template::parse("{% if a %}{% if b %}ab{% else %}a{% endif %}{% endif %}").unwrap();
        assert_eq!(tpl.render(&args(&[("a", true.into()), ("b", true.into())])).unwrap(), "ab");
        assert_eq!(tpl.render(&args(&[("a", true.into())])).unwrap(), "a");
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "");
    }

    #[test]
    fn skipped_branch_does_not_need_values() {
        let tpl = Template::parse("{% if email %}set e to \"{{ email }}\"{% endif %}").unwrap();
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "");
    }

    #[test]
    fn unterminated_expression() {
        let err = Template::parse("hello {{ name").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { offset: 6, .. }));
    }

    #[test]
    fn unclosed_if() {
        let err = Template::parse("{% if a %}x").unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn stray_endif() {
        let err = Template::parse("x{% endif %}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { offset: 1, .. }));
    }

    #[test]
    fn unsupported_tag() {
        let err = Template::parse("{% for x in y %}{% endfor %}").unwrap_err();
        assert!(err.to_string().contains("unsupported tag"));
    }

    #[test]
    fn invalid_placeholder_name() {
        assert!(Template::parse("{{ }}").is_err());
        assert!(Template::parse("{{ 1abc }}").is_err());
    }

    #[test]
    fn placeholders_in_first_use_order() {
        let tpl = Template::parse("{{ b }}{% if a %}{{ c }}{{ b }}{% endif %}").unwrap();
        assert_eq!(tpl.placeholders(), vec!["b", "a", "c"]);
    }

    #[test]
    fn single_braces_are_text() {
        let out = render("set l to {}\n{ x }", &Arguments::new()).unwrap();
        assert_eq!(out, "set l to {}\n{ x }");
    }

    #[test]
    fn filtered_condition_follows_jinja_truthiness() {
        let tpl = Template::parse(
            "{% if include_completed|lower %}every reminder{% else %}open reminders{% endif %}",
        )
        .unwrap();
        // "false" is a non-empty string once lowered
        assert_eq!(
            tpl.render(&args(&[("include_completed", false.into())])).unwrap(),
            "every reminder"
        );
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "open reminders");
    }

    #[test]
    fn ordering_comparison_against_literal() {
        let tpl = Template::parse(
            "{% if priority > 0 %}set priority of newReminder to {{ priority }}{% endif %}",
        )
        .unwrap();
        assert_eq!(
            tpl.render(&args(&[("priority", ArgValue::Integer(5))])).unwrap(),
            "set priority of newReminder to 5"
        );
        assert_eq!(tpl.render(&args(&[("priority", ArgValue::Integer(0))])).unwrap(), "");
    }

    #[test]
    fn ordering_needs_a_value() {
        let err = render("{% if priority > 0 %}x{% endif %}", &Arguments::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingValue {
                placeholder: "priority".into()
            }
        );
    }

    #[test]
    fn ordering_rejects_mixed_types() {
        let err = render("{% if label < 3 %}x{% endif %}", &args(&[("label", "a".into())]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Incomparable { .. }));
    }

    #[test]
    fn equality_comparison_selects_branch() {
        let tpl =
            Template::parse("{% if index == 0 %}close current tab{% else %}close tab {{ index }}{% endif %}")
                .unwrap();
        assert_eq!(
            tpl.render(&args(&[("index", ArgValue::Integer(0))])).unwrap(),
            "close current tab"
        );
        assert_eq!(
            tpl.render(&args(&[("index", ArgValue::Integer(2))])).unwrap(),
            "close tab 2"
        );
    }

    #[test]
    fn missing_value_is_unequal() {
        let tpl = Template::parse("{% if mode != 'dark' %}light{% endif %}").unwrap();
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "light");
        assert_eq!(tpl.render(&args(&[("mode", "dark".into())])).unwrap(), "");
    }

    #[test]
    fn inline_conditional_expression() {
        let tpl = Template::parse(r#"set recursiveFlag to {{ "true" if recursive else "false" }}"#)
            .unwrap();
        assert_eq!(
            tpl.render(&args(&[("recursive", true.into())])).unwrap(),
            "set recursiveFlag to true"
        );
        assert_eq!(
            tpl.render(&args(&[("recursive", false.into())])).unwrap(),
            "set recursiveFlag to false"
        );
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "set recursiveFlag to false");
    }

    #[test]
    fn inline_conditional_without_else_renders_empty() {
        assert_eq!(render("[{{ 'x' if flag }}]", &Arguments::new()).unwrap(), "[]");
    }

    #[test]
    fn boolean_operators_and_grouping() {
        let tpl = Template::parse("{% if (a or b) and not c %}yes{% else %}no{% endif %}").unwrap();
        assert_eq!(tpl.render(&args(&[("b", true.into())])).unwrap(), "yes");
        assert_eq!(
            tpl.render(&args(&[("a", true.into()), ("c", true.into())])).unwrap(),
            "no"
        );
        assert_eq!(tpl.render(&Arguments::new()).unwrap(), "no");
    }

    #[test]
    fn or_yields_operand_value() {
        let out = render("{{ name or 'anonymous' }}", &Arguments::new()).unwrap();
        assert_eq!(out, "anonymous");
    }

    #[test]
    fn elif_chain() {
        let tpl = Template::parse(
            "{% if level >= 80 %}loud{% elif level >= 20 %}normal{% else %}quiet{% endif %}",
        )
        .unwrap();
        let level = |n| args(&[("level", ArgValue::Integer(n))]);
        assert_eq!(tpl.render(&level(90)).unwrap(), "loud");
        assert_eq!(tpl.render(&level(20)).unwrap(), "normal");
        assert_eq!(tpl.render(&level(-1)).unwrap(), "quiet");
    }

    #[test]
    fn malformed_expressions() {
        assert!(matches!(
            Template::parse("{{ 'open }}").unwrap_err(),
            TemplateError::Syntax { .. }
        ));
        assert!(matches!(
            Template::parse("{% if a = 1 %}{% endif %}").unwrap_err(),
            TemplateError::Syntax { .. }
        ));
        assert!(matches!(
            Template::parse("{% if (a %}{% endif %}").unwrap_err(),
            TemplateError::Syntax { .. }
        ));
        assert!(matches!(
            Template::parse("{% if %}{% endif %}").unwrap_err(),
            TemplateError::Syntax { .. }
        ));
        assert!(matches!(
            Template::parse("{{ a b }}").unwrap_err(),
            TemplateError::Syntax { .. }
        ));
    }

    #[test]
    fn else_must_close_with_endif() {
        let err = Template::parse("{% if a %}x{% else %}y{% elif b %}z{% endif %}").unwrap_err();
        assert!(err.to_string().contains("after 'else'"));
    }

    #[test]
    fn placeholders_cover_conditions_and_literals() {
        let tpl = Template::parse("{{ 'a' if flag else other }}{% if n > 1 %}{{ n }}{% endif %}")
            .unwrap();
        assert_eq!(tpl.placeholders(), vec!["flag", "other", "n"]);
    }
}
