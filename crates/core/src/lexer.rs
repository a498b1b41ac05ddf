//! Indentation-sensitive tokenizer.
//!
//! Indentation is turned into a virtual block structure: an indent stack
//! starting at `[0]`, one `Indent` per push, one `Dedent` per pop. Blank
//! and comment-only lines never touch the stack. Newlines inside `()` or
//! `[]` are ignored so long lists may wrap.

use crate::error::ParseError;
use crate::keywords::Keyword;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A word that is not in the keyword table
    Identifier,
    Keyword(Keyword),
    /// Quoted string literal; `text` holds the content with escapes resolved
    Str,
    /// Integer or decimal literal; `text` keeps the exact spelling
    Number,
    /// Number immediately followed by a unit, e.g. `7d`, `30s`
    Duration,
    Colon,
    Arrow,   // ->
    LArrow,  // <-
    BiArrow, // <->
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,    // =
    EqEq,  // ==
    NotEq, // !=
    Lt,
    Gt,
    Le,
    Ge,
    Dot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Identifier => "identifier".into(),
            TokenKind::Keyword(k) => format!("keyword '{}'", k),
            TokenKind::Str => "string".into(),
            TokenKind::Number => "number".into(),
            TokenKind::Duration => "duration".into(),
            TokenKind::Colon => "':'".into(),
            TokenKind::Arrow => "'->'".into(),
            TokenKind::LArrow => "'<-'".into(),
            TokenKind::BiArrow => "'<->'".into(),
            TokenKind::Comma => "','".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
            TokenKind::LBracket => "'['".into(),
            TokenKind::RBracket => "']'".into(),
            TokenKind::Eq => "'='".into(),
            TokenKind::EqEq => "'=='".into(),
            TokenKind::NotEq => "'!='".into(),
            TokenKind::Lt => "'<'".into(),
            TokenKind::Gt => "'>'".into(),
            TokenKind::Le => "'<='".into(),
            TokenKind::Ge => "'>='".into(),
            TokenKind::Dot => "'.'".into(),
            TokenKind::Question => "'?'".into(),
            TokenKind::Plus => "'+'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::Star => "'*'".into(),
            TokenKind::Slash => "'/'".into(),
            TokenKind::Newline => "end of line".into(),
            TokenKind::Indent => "indent".into(),
            TokenKind::Dedent => "dedent".into(),
            TokenKind::Eof => "end of file".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::Keyword(_))
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(k) => Some(k),
            _ => None,
        }
    }
}

pub const TAB_WIDTH: usize = 4;

const DURATION_UNITS: &[&str] = &["ms", "s", "m", "min", "h", "d", "w", "y"];

pub fn tokenize(text: &str, file: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut last_line: u32 = 1;

    for (idx, raw_line) in text.split('\n').enumerate() {
        let line_no = idx as u32 + 1;
        last_line = line_no;
        let chars: Vec<char> = raw_line.trim_end_matches('\r').chars().collect();

        let mut pos = 0usize;
        let mut level = 0usize;
        while pos < chars.len() && (chars[pos] == ' ' || chars[pos] == '\t') {
            level += if chars[pos] == '\t' { TAB_WIDTH } else { 1 };
            pos += 1;
        }
        if pos == chars.len() || chars[pos] == '#' {
            continue;
        }

        if depth == 0 {
            let column = pos as u32 + 1;
            let top = *indents.last().unwrap_or(&0);
            if level > top {
                indents.push(level);
                tokens.push(Token::new(TokenKind::Indent, "", line_no, column));
            } else if level < top {
                while indents.len() > 1 && level < *indents.last().unwrap_or(&0) {
                    indents.pop();
                    tokens.push(Token::new(TokenKind::Dedent, "", line_no, column));
                }
                if *indents.last().unwrap_or(&0) != level {
                    return Err(ParseError::at(
                        file,
                        line_no,
                        column,
                        "inconsistent indentation: dedent does not match any outer indentation level",
                    ));
                }
            }
        }

        lex_line(&chars, pos, line_no, file, &mut depth, &mut tokens)?;

        if depth == 0 {
            tokens.push(Token::new(
                TokenKind::Newline,
                "",
                line_no,
                chars.len() as u32 + 1,
            ));
        }
    }

    if depth > 0 {
        return Err(ParseError::at(
            file,
            last_line,
            1,
            "unexpected end of file: unclosed '(' or '['",
        ));
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token::new(TokenKind::Dedent, "", last_line + 1, 1));
    }
    tokens.push(Token::new(TokenKind::Eof, "", last_line + 1, 1));
    tracing::trace!(file, count = tokens.len(), "tokenized");
    Ok(tokens)
}

fn lex_line(
    chars: &[char],
    mut pos: usize,
    line: u32,
    file: &str,
    depth: &mut usize,
    out: &mut Vec<Token>,
) -> Result<(), ParseError> {
    while pos < chars.len() {
        let c = chars[pos];
        let column = pos as u32 + 1;

        if c == ' ' || c == '\t' {
            pos += 1;
            continue;
        }
        if c == '#' {
            break;
        }

        // String literal
        if c == '"' {
            pos += 1;
            let mut s = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(ParseError::at(
                        file,
                        line,
                        column,
                        "unterminated string literal",
                    ));
                }
                let sc = chars[pos];
                if sc == '"' {
                    pos += 1;
                    break;
                }
                if sc == '\\' {
                    pos += 1;
                    if pos >= chars.len() {
                        return Err(ParseError::at(
                            file,
                            line,
                            column,
                            "unterminated escape in string literal",
                        ));
                    }
                    match chars[pos] {
                        '"' => s.push('"'),
                        '\\' => s.push('\\'),
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        other => {
                            s.push('\\');
                            s.push(other);
                        }
                    }
                    pos += 1;
                    continue;
                }
                s.push(sc);
                pos += 1;
            }
            out.push(Token::new(TokenKind::Str, s, line, column));
            continue;
        }

        // Number, decimal, or duration
        if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            let mut is_decimal = false;
            if pos + 1 < chars.len() && chars[pos] == '.' && chars[pos + 1].is_ascii_digit() {
                is_decimal = true;
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if !is_decimal && pos < chars.len() && chars[pos].is_ascii_alphabetic() {
                let unit_start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_')
                {
                    pos += 1;
                }
                let unit: String = chars[unit_start..pos].iter().collect();
                if !DURATION_UNITS.contains(&unit.as_str()) {
                    return Err(ParseError::at(
                        file,
                        line,
                        column,
                        format!(
                            "invalid number literal '{}'",
                            chars[start..pos].iter().collect::<String>()
                        ),
                    ));
                }
                let text: String = chars[start..pos].iter().collect();
                out.push(Token::new(TokenKind::Duration, text, line, column));
                continue;
            }
            let text: String = chars[start..pos].iter().collect();
            out.push(Token::new(TokenKind::Number, text, line, column));
            continue;
        }

        // Identifier / keyword
        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            let kind = match Keyword::lookup(&word) {
                Some(k) => TokenKind::Keyword(k),
                None => TokenKind::Identifier,
            };
            out.push(Token::new(kind, word, line, column));
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let after = chars.get(pos + 2).copied();
        let (kind, width) = match (c, next) {
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('<', Some('-')) if after == Some('>') => (TokenKind::BiArrow, 3),
            ('<', Some('-')) => (TokenKind::LArrow, 2),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            (':', _) => (TokenKind::Colon, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('=', _) => (TokenKind::Eq, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('.', _) => (TokenKind::Dot, 1),
            ('?', _) => (TokenKind::Question, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            _ => {
                return Err(ParseError::at(
                    file,
                    line,
                    column,
                    format!("unexpected character '{}'", c),
                ))
            }
        };
        match kind {
            TokenKind::LParen | TokenKind::LBracket => *depth += 1,
            TokenKind::RParen | TokenKind::RBracket => *depth = depth.saturating_sub(1),
            _ => {}
        }
        let text: String = chars[pos..pos + width].iter().collect();
        out.push(Token::new(kind, text, line, column));
        pos += width;
    }
    Ok(())
}
