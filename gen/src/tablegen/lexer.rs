//! Streaming tokenizer for TableGen textual dumps.

use std::fmt;

use super::parser::ParseError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Str,
    /// `$name` operand binding inside a DAG.
    Var,
    /// `!name` bang operator.
    BangOp,
    /// A run of `-` characters (section header framing).
    Dashes,
    /// `// ...` to end of line.
    Comment,
    LBrace,
    RBrace,
    LAngle,
    RAngle,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Eq,
    Colon,
    Question,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Str => "string",
            TokenKind::Var => "$variable",
            TokenKind::BangOp => "!operator",
            TokenKind::Dashes => "\"-\"",
            TokenKind::Comment => "comment",
            TokenKind::LBrace => "\"{\"",
            TokenKind::RBrace => "\"}\"",
            TokenKind::LAngle => "\"<\"",
            TokenKind::RAngle => "\">\"",
            TokenKind::LParen => "\"(\"",
            TokenKind::RParen => "\")\"",
            TokenKind::LBracket => "\"[\"",
            TokenKind::RBracket => "\"]\"",
            TokenKind::Comma => "\",\"",
            TokenKind::Semi => "\";\"",
            TokenKind::Eq => "\"=\"",
            TokenKind::Colon => "\":\"",
            TokenKind::Question => "\"?\"",
            TokenKind::Eof => "end of input",
        };
        fmt.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Identifier text, literal value text, or comment body.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'src> {
    src: &'src str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column + 1);
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(self.token(TokenKind::Eof, String::new(), line, column)),
        };

        match ch {
            '{' => Ok(self.single(TokenKind::LBrace, line, column)),
            '}' => Ok(self.single(TokenKind::RBrace, line, column)),
            '<' => Ok(self.single(TokenKind::LAngle, line, column)),
            '>' => Ok(self.single(TokenKind::RAngle, line, column)),
            '(' => Ok(self.single(TokenKind::LParen, line, column)),
            ')' => Ok(self.single(TokenKind::RParen, line, column)),
            '[' => Ok(self.single(TokenKind::LBracket, line, column)),
            ']' => Ok(self.single(TokenKind::RBracket, line, column)),
            ',' => Ok(self.single(TokenKind::Comma, line, column)),
            ';' => Ok(self.single(TokenKind::Semi, line, column)),
            '=' => Ok(self.single(TokenKind::Eq, line, column)),
            ':' => Ok(self.single(TokenKind::Colon, line, column)),
            '?' => Ok(self.single(TokenKind::Question, line, column)),
            '$' => self.var(line, column),
            '!' => self.bang_op(line, column),
            '/' => self.comment(line, column),
            '"' => self.string(line, column),
            '-' => {
                if self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                    self.number(line, column)
                } else {
                    Ok(self.dashes(line, column))
                }
            }
            ch if ch.is_ascii_digit() => self.number(line, column),
            ch if is_ident_start(ch) => Ok(self.ident(line, column)),
            ch => Err(ParseError::new(
                line,
                column,
                format!("unexpected character '{ch}'"),
            )),
        }
    }

    fn token(&self, kind: TokenKind, text: String, line: usize, column: usize) -> Token {
        Token {
            kind,
            text,
            line,
            column,
        }
    }

    fn single(&mut self, kind: TokenKind, line: usize, column: usize) -> Token {
        self.bump();
        self.token(kind, String::new(), line, column)
    }

    fn ident(&mut self, line: usize, column: usize) -> Token {
        let start = self.offset;
        while self.peek().is_some_and(is_ident_part) {
            self.bump();
        }
        let text = self.src[start..self.offset].to_owned();
        self.token(TokenKind::Ident, text, line, column)
    }

    fn var(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        self.bump();
        if !self.peek().is_some_and(is_ident_start) {
            return Err(ParseError::new(line, column, "expected name after '$'".into()));
        }
        let mut token = self.ident(line, column);
        token.kind = TokenKind::Var;
        Ok(token)
    }

    fn bang_op(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        self.bump();
        if !self.peek().is_some_and(is_ident_start) {
            return Err(ParseError::new(line, column, "expected name after '!'".into()));
        }
        let mut token = self.ident(line, column);
        token.kind = TokenKind::BangOp;
        Ok(token)
    }

    fn dashes(&mut self, line: usize, column: usize) -> Token {
        while self.peek() == Some('-') {
            self.bump();
        }
        self.token(TokenKind::Dashes, String::new(), line, column)
    }

    fn number(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        let start = self.offset;
        if self.peek() == Some('-') {
            self.bump();
        }
        if self.peek() == Some('0') {
            self.bump();
            if matches!(self.peek(), Some('x' | 'X' | 'b' | 'B')) {
                self.bump();
            }
        }
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.bump();
        }
        let text = &self.src[start..self.offset];
        if parse_int(text).is_none() {
            return Err(ParseError::new(
                line,
                column,
                format!("invalid integer literal \"{text}\""),
            ));
        }
        Ok(self.token(TokenKind::Int, text.to_owned(), line, column))
    }

    fn comment(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        self.bump();
        if self.peek() != Some('/') {
            return Err(ParseError::new(line, column, "expected \"//\"".into()));
        }
        self.bump();
        let start = self.offset;
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
        let text = self.src[start..self.offset].trim().to_owned();
        Ok(self.token(TokenKind::Comment, text, line, column))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        self.bump();
        if matches!(self.peek(), Some('\n' | '\r')) {
            return self.multiline_string(line, column);
        }

        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.bump();
                    return Ok(self.token(TokenKind::Str, text, line, column));
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(ch) => text.push(ch),
                        None => break,
                    }
                    self.bump();
                }
                Some('\n') | None => break,
                Some(ch) => {
                    text.push(ch);
                    self.bump();
                }
            }
        }
        Err(ParseError::new(line, column, "unterminated string".into()))
    }

    /// A quote immediately followed by end-of-line starts a multiline
    /// literal; it ends at the next line whose first character is a quote.
    fn multiline_string(&mut self, line: usize, column: usize) -> Result<Token, ParseError> {
        let mut text = String::new();
        self.eat_line_end();
        loop {
            if self.peek() == Some('"') {
                self.bump();
                return Ok(self.token(TokenKind::Str, text, line, column));
            }
            if self.peek().is_none() {
                return Err(ParseError::new(line, column, "unterminated string".into()));
            }
            if !text.is_empty() {
                text.push('\n');
            }
            let start = self.offset;
            while self.peek().is_some_and(|c| c != '\n') {
                self.bump();
            }
            text.push_str(self.src[start..self.offset].trim_end_matches('\r'));
            self.eat_line_end();
        }
    }

    fn eat_line_end(&mut self) {
        if self.peek() == Some('\r') {
            self.bump();
        }
        if self.peek() == Some('\n') {
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

pub(super) fn parse_int(text: &str) -> Option<i64> {
    let (neg, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        text.parse().ok()?
    };
    Some(if neg { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn punctuation_and_idents() {
        let tokens = lex("bits<32> Inst = { 1, 0, ? };");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            [
                TokenKind::Ident,
                TokenKind::LAngle,
                TokenKind::Int,
                TokenKind::RAngle,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::LBrace,
                TokenKind::Int,
                TokenKind::Comma,
                TokenKind::Int,
                TokenKind::Comma,
                TokenKind::Question,
                TokenKind::RBrace,
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn headers() {
        let tokens = lex("------------- Classes -------------");
        assert_eq!(tokens[0].kind, TokenKind::Dashes);
        assert_eq!(tokens[1].text, "Classes");
        assert_eq!(tokens[2].kind, TokenKind::Dashes);
    }

    #[test]
    fn numbers() {
        let tokens = lex("42 -7 0x1f 0b1010");
        let values: Vec<_> = tokens[..4]
            .iter()
            .map(|t| parse_int(&t.text).unwrap())
            .collect();
        assert_eq!(values, [42, -7, 0x1f, 0b1010]);
    }

    #[test]
    fn string_escapes() {
        let tokens = lex(r#""mov\t$rd, $imm""#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "mov\t$rd, $imm");
    }

    #[test]
    fn multiline_string() {
        let tokens = lex("\"\nline one\nline two\n\" ;");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "line one\nline two");
        assert_eq!(tokens[1].kind, TokenKind::Semi);
    }

    #[test]
    fn comment_body() {
        let tokens = lex("// Instruction LimaInst\ndef");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].text, "Instruction LimaInst");
        assert_eq!(tokens[1].text, "def");
    }

    #[test]
    fn position_tracking() {
        let tokens = lex("def\n  Foo");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn rejects_garbage() {
        let mut lexer = Lexer::new("def @");
        lexer.next_token().unwrap();
        assert!(lexer.next_token().is_err());
    }
}
