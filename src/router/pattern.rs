//! 路由模式编译。
//!
//! 语法与 path-to-regexp 一致：`:name`、`:name(\\d+)`、匿名分组 `(\\d+)`、
//! 修饰符 `?` `*` `+`、转义 `\\x` 以及 `{prefix:name suffix}` 分组。
//! 编译结果是一个大小写不敏感的 `Regex` 和按出现顺序排列的参数列表。

use regex::Regex;

use std::fmt;

use crate::exception::Exception;

/// 参数分隔符，构成默认参数模式 `[^/#?]+?` 与结尾的可选分隔符。
const DELIMITER_CLASS: &str = "[/#?]";
const DEFAULT_PATTERN: &str = "[^/#?]+?";
/// 紧贴在参数前、会被当作参数前缀的字符
const PREFIXES: &str = "./";

/// 参数名：具名参数或按出现顺序编号的匿名参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenName {
    Named(String),
    Index(usize),
}

impl fmt::Display for TokenName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenName::Named(name) => write!(f, "{}", name),
            TokenName::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    None,
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Modifier {
    fn from_char(c: char) -> Self {
        match c {
            '?' => Modifier::Optional,
            '*' => Modifier::ZeroOrMore,
            '+' => Modifier::OneOrMore,
            _ => Modifier::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::None => "",
            Modifier::Optional => "?",
            Modifier::ZeroOrMore => "*",
            Modifier::OneOrMore => "+",
        }
    }

    fn is_repeat(&self) -> bool {
        matches!(self, Modifier::ZeroOrMore | Modifier::OneOrMore)
    }
}

/// 路由模式中的一个参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: TokenName,
    pub prefix: String,
    pub suffix: String,
    pub pattern: String,
    pub modifier: Modifier,
}

impl Token {
    pub fn is_optional(&self) -> bool {
        matches!(self.modifier, Modifier::Optional | Modifier::ZeroOrMore)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Token(Token),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LexKind {
    Open,
    Close,
    Pattern,
    Name,
    Char,
    EscapedChar,
    Modifier,
    End,
}

#[derive(Debug, Clone)]
struct Lexeme {
    kind: LexKind,
    index: usize,
    value: String,
}

fn error(message: String) -> Exception {
    Exception::router(message)
}

fn lex(source: &str) -> Result<Vec<Lexeme>, Exception> {
    let chars: Vec<char> = source.chars().collect();
    let mut lexemes = vec![];
    let mut i = 0;

    let push = |lexemes: &mut Vec<Lexeme>, kind, index, value: String| {
        lexemes.push(Lexeme { kind, index, value })
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => push(&mut lexemes, LexKind::Modifier, i, c.to_string()),
            '{' => push(&mut lexemes, LexKind::Open, i, c.to_string()),
            '}' => push(&mut lexemes, LexKind::Close, i, c.to_string()),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| error(format!("Unexpected end of pattern after \"\\\" at {}", i)))?;
                push(&mut lexemes, LexKind::EscapedChar, i, escaped.to_string());
                i += 2;
                continue;
            }
            ':' => {
                let mut j = i + 1;
                let mut name = String::new();
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    name.push(chars[j]);
                    j += 1;
                }
                if name.is_empty() {
                    return Err(error(format!("Missing parameter name at {}", i)));
                }
                push(&mut lexemes, LexKind::Name, i, name);
                i = j;
                continue;
            }
            '(' => {
                let mut depth = 1;
                let mut pattern = String::new();
                let mut j = i + 1;

                if chars.get(j) == Some(&'?') {
                    return Err(error(format!("Pattern cannot start with \"?\" at {}", j)));
                }

                while j < chars.len() {
                    if chars[j] == '\\' {
                        pattern.push(chars[j]);
                        if let Some(next) = chars.get(j + 1) {
                            pattern.push(*next);
                        }
                        j += 2;
                        continue;
                    }
                    if chars[j] == ')' {
                        depth -= 1;
                        if depth == 0 {
                            j += 1;
                            break;
                        }
                    } else if chars[j] == '(' {
                        depth += 1;
                        if chars.get(j + 1) != Some(&'?') {
                            return Err(error(format!("Capturing groups are not allowed at {}", j)));
                        }
                    }
                    pattern.push(chars[j]);
                    j += 1;
                }

                if depth > 0 {
                    return Err(error(format!("Unbalanced pattern at {}", i)));
                }
                if pattern.is_empty() {
                    return Err(error(format!("Missing pattern at {}", i)));
                }
                push(&mut lexemes, LexKind::Pattern, i, pattern);
                i = j;
                continue;
            }
            _ => push(&mut lexemes, LexKind::Char, i, c.to_string()),
        }
        i += 1;
    }

    push(&mut lexemes, LexKind::End, i, String::new());
    Ok(lexemes)
}

struct Parser {
    lexemes: Vec<Lexeme>,
    position: usize,
}

impl Parser {
    fn try_consume(&mut self, kind: LexKind) -> Option<String> {
        match self.lexemes.get(self.position) {
            Some(lexeme) if lexeme.kind == kind => {
                self.position += 1;
                Some(lexeme.value.clone())
            }
            _ => None,
        }
    }

    fn must_consume(&mut self, kind: LexKind) -> Result<String, Exception> {
        if let Some(value) = self.try_consume(kind) {
            return Ok(value);
        }
        let (found, index) = match self.lexemes.get(self.position) {
            Some(lexeme) => (format!("{:?}", lexeme.kind), lexeme.index),
            None => ("nothing".to_string(), self.position),
        };
        Err(error(format!(
            "Unexpected {} at {}, expected {:?}",
            found.to_uppercase(),
            index,
            kind
        )))
    }

    fn consume_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(value) = self
            .try_consume(LexKind::Char)
            .or_else(|| self.try_consume(LexKind::EscapedChar))
        {
            text.push_str(&value);
        }
        text
    }

    fn modifier(&mut self) -> Modifier {
        self.try_consume(LexKind::Modifier)
            .and_then(|value| value.chars().next())
            .map_or(Modifier::None, Modifier::from_char)
    }
}

fn parse(source: &str) -> Result<Vec<Part>, Exception> {
    let mut parser = Parser {
        lexemes: lex(source)?,
        position: 0,
    };
    let mut parts = vec![];
    let mut key = 0;
    let mut path = String::new();

    let next_index = |key: &mut usize| {
        let index = *key;
        *key += 1;
        TokenName::Index(index)
    };

    while parser.position < parser.lexemes.len() {
        let ch = parser.try_consume(LexKind::Char);
        let name = parser.try_consume(LexKind::Name);
        let pattern = parser.try_consume(LexKind::Pattern);

        if name.is_some() || pattern.is_some() {
            let mut prefix = ch.unwrap_or_default();
            if !PREFIXES.contains(prefix.as_str()) || prefix.is_empty() {
                path.push_str(&prefix);
                prefix = String::new();
            }
            if !path.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut path)));
            }
            let name = match name {
                Some(name) => TokenName::Named(name),
                None => next_index(&mut key),
            };
            parts.push(Part::Token(Token {
                name,
                prefix,
                suffix: String::new(),
                pattern: pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
                modifier: parser.modifier(),
            }));
            continue;
        }

        if let Some(value) = ch.or_else(|| parser.try_consume(LexKind::EscapedChar)) {
            path.push_str(&value);
            continue;
        }

        if !path.is_empty() {
            parts.push(Part::Text(std::mem::take(&mut path)));
        }

        if parser.try_consume(LexKind::Open).is_some() {
            let prefix = parser.consume_text();
            let name = parser.try_consume(LexKind::Name);
            let pattern = parser.try_consume(LexKind::Pattern);
            let suffix = parser.consume_text();
            parser.must_consume(LexKind::Close)?;

            let modifier = parser.modifier();
            match (name, pattern) {
                (Some(name), pattern) => parts.push(Part::Token(Token {
                    name: TokenName::Named(name),
                    prefix,
                    suffix,
                    pattern: pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
                    modifier,
                })),
                (None, Some(pattern)) => parts.push(Part::Token(Token {
                    name: next_index(&mut key),
                    prefix,
                    suffix,
                    pattern,
                    modifier,
                })),
                // 不含参数的分组：`{/static}?`
                (None, None) => parts.push(Part::Token(Token {
                    name: TokenName::Named(String::new()),
                    prefix,
                    suffix,
                    pattern: String::new(),
                    modifier,
                })),
            }
            continue;
        }

        parser.must_consume(LexKind::End)?;
    }

    Ok(parts)
}

/// 编译完成的路由模式
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    tokens: Vec<Token>,
}

impl CompiledPattern {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// 捕获参数，按在模式中出现的顺序排列
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// 将路由模式编译为正则表达式与参数列表。
pub fn compile(source: &str) -> Result<CompiledPattern, Exception> {
    let parts = parse(source)?;
    let mut route = String::from("(?i)^");
    let mut tokens = vec![];

    for part in parts {
        let token = match part {
            Part::Text(text) => {
                route.push_str(&regex::escape(&text));
                continue;
            }
            Part::Token(token) => token,
        };

        let prefix = regex::escape(&token.prefix);
        let suffix = regex::escape(&token.suffix);
        let modifier = token.modifier.as_str();

        if token.pattern.is_empty() {
            route.push_str(&format!("(?:{}{}){}", prefix, suffix, modifier));
            continue;
        }

        let pattern = &token.pattern;
        if !prefix.is_empty() || !suffix.is_empty() {
            if token.modifier.is_repeat() {
                let optional = if token.modifier == Modifier::ZeroOrMore { "?" } else { "" };
                route.push_str(&format!(
                    "(?:{prefix}((?:{pattern})(?:{suffix}{prefix}(?:{pattern}))*){suffix}){optional}"
                ));
            } else {
                route.push_str(&format!("(?:{}({}){}){}", prefix, pattern, suffix, modifier));
            }
        } else if token.modifier.is_repeat() {
            route.push_str(&format!("((?:{}){})", pattern, modifier));
        } else {
            route.push_str(&format!("({}){}", pattern, modifier));
        }
        tokens.push(token);
    }

    route.push_str(DELIMITER_CLASS);
    route.push_str("?$");

    let regex = Regex::new(&route).map_err(|e| {
        error(format!("Invalid route pattern \"{}\": {}", source, e)).with_cause(e)
    })?;

    Ok(CompiledPattern { regex, tokens })
}
