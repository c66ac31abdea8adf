/// Lexical analysis for story documents — keywords, literals,
/// punctuation, and opaque code blocks.

use serde::{Deserialize, Serialize};

/// Keywords that head sections and timeline items. Everything else that
/// scans like a word is an identifier (`true`/`false` become booleans).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kw {
    States,
    GlobalVars,
    LinkedLists,
    Characters,
    Tags,
    Chapter,
    Group,
    Node,
    Dialogue,
    Action,
}

impl Kw {
    /// Look up an identifier in the keyword table.
    pub fn from_ident(ident: &str) -> Option<Kw> {
        match ident {
            "states" => Some(Self::States),
            "global_vars" => Some(Self::GlobalVars),
            "linked-lists" => Some(Self::LinkedLists),
            "characters" => Some(Self::Characters),
            "tags" => Some(Self::Tags),
            "chapter" => Some(Self::Chapter),
            "group" => Some(Self::Group),
            "node" => Some(Self::Node),
            "dialogue" => Some(Self::Dialogue),
            "action" => Some(Self::Action),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    At,
    Str,
    Int,
    Float,
    Bool,
    Ident,
    Keyword(Kw),
    CodeBlock,
    Error,
    Eof,
}

/// Decoded payload of a token: string content between the quotes, code
/// text between the delimiters, parsed numbers and booleans. `Error`
/// tokens carry their description here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

/// A token with its exact source slice and 1-based position. The lexeme
/// includes delimiters (quotes, `<!`/`!>`) so that concatenating
/// lexemes reproduces the source minus whitespace and comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
    pub value: Option<TokenValue>,
}

impl Token {
    /// The lexeme to show in error messages; `Eof` has no source slice.
    pub fn display_lexeme(&self) -> &str {
        if self.kind == TokenKind::Eof {
            "end of file"
        } else {
            &self.lexeme
        }
    }
}

/// Scan a source string into tokens. Always `Eof`-terminated. Scanning
/// stops after the first `Error` token; the parser treats that token as
/// a fatal parse failure.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let stop = matches!(token.kind, TokenKind::Error | TokenKind::Eof);
        let was_error = token.kind == TokenKind::Error;
        tokens.push(token);
        if stop {
            if was_error {
                tokens.push(lexer.eof_token());
            }
            break;
        }
    }
    tokens
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    /// Consume one character, advancing line/column. The three line
    /// ending conventions (`\n`, `\r`, `\r\n`) each count one line.
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        match c {
            '\r' => {
                self.line += 1;
                self.column = 1;
            }
            '\n' => {
                let after_cr = self.pos >= 2 && self.chars[self.pos - 2] == '\r';
                if !after_cr {
                    self.line += 1;
                }
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    /// Skip whitespace and `#` comments (comment runs to end of line).
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' || c == '\r' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn eof_token(&self) -> Token {
        Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: self.line,
            column: self.column,
            value: None,
        }
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        if self.at_end() {
            return self.eof_token();
        }

        let start = self.pos;
        let line = self.line;
        let column = self.column;
        let c = match self.bump() {
            Some(c) => c,
            None => return self.eof_token(),
        };

        match c {
            '{' => self.token(start, line, column, TokenKind::LBrace, None),
            '}' => self.token(start, line, column, TokenKind::RBrace, None),
            '[' => self.token(start, line, column, TokenKind::LBracket, None),
            ']' => self.token(start, line, column, TokenKind::RBracket, None),
            '(' => self.token(start, line, column, TokenKind::LParen, None),
            ')' => self.token(start, line, column, TokenKind::RParen, None),
            ':' => self.token(start, line, column, TokenKind::Colon, None),
            ',' => self.token(start, line, column, TokenKind::Comma, None),
            '@' => self.token(start, line, column, TokenKind::At, None),
            '"' => self.string(start, line, column),
            '<' => {
                if self.peek() == Some('!') {
                    self.bump();
                    self.code_block(start, line, column)
                } else {
                    self.token(
                        start,
                        line,
                        column,
                        TokenKind::Error,
                        Some(TokenValue::Str("unexpected character '<'".to_string())),
                    )
                }
            }
            '-' => {
                if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    self.number(start, line, column)
                } else {
                    self.token(
                        start,
                        line,
                        column,
                        TokenKind::Error,
                        Some(TokenValue::Str("unexpected character '-'".to_string())),
                    )
                }
            }
            c if c.is_ascii_digit() => self.number(start, line, column),
            c if c.is_alphabetic() || c == '_' => self.word(start, line, column),
            c => self.token(
                start,
                line,
                column,
                TokenKind::Error,
                Some(TokenValue::Str(format!("unexpected character '{}'", c))),
            ),
        }
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    /// A token whose lexeme is the source slice from `start` to the
    /// current position.
    fn token(
        &self,
        start: usize,
        line: u32,
        column: u32,
        kind: TokenKind,
        value: Option<TokenValue>,
    ) -> Token {
        Token {
            kind,
            lexeme: self.slice(start),
            line,
            column,
            value,
        }
    }

    /// String literal: `"`…`"`, verbatim content, may span lines, no
    /// escape processing.
    fn string(&mut self, start: usize, line: u32, column: u32) -> Token {
        loop {
            match self.bump() {
                Some('"') => {
                    let lexeme = self.slice(start);
                    let content: String = self.chars[start + 1..self.pos - 1].iter().collect();
                    return Token {
                        kind: TokenKind::Str,
                        lexeme,
                        line,
                        column,
                        value: Some(TokenValue::Str(content)),
                    };
                }
                Some(_) => {}
                None => {
                    return Token {
                        kind: TokenKind::Error,
                        lexeme: "\"".to_string(),
                        line,
                        column,
                        value: Some(TokenValue::Str("unterminated string literal".to_string())),
                    };
                }
            }
        }
    }

    /// Opaque code block: `<!`…`!>`, inner text carried verbatim. Line
    /// counting continues inside. The error token for an unterminated
    /// block is positioned at the opener.
    fn code_block(&mut self, start: usize, line: u32, column: u32) -> Token {
        loop {
            if self.at_end() {
                return Token {
                    kind: TokenKind::Error,
                    lexeme: "<!".to_string(),
                    line,
                    column,
                    value: Some(TokenValue::Str("unterminated code block".to_string())),
                };
            }
            if self.peek() == Some('!') && self.peek_next() == Some('>') {
                self.bump();
                self.bump();
                let lexeme = self.slice(start);
                let content: String = self.chars[start + 2..self.pos - 2].iter().collect();
                return Token {
                    kind: TokenKind::CodeBlock,
                    lexeme,
                    line,
                    column,
                    value: Some(TokenValue::Str(content)),
                };
            }
            self.bump();
        }
    }

    /// Numeric literal: optional `-`, digits, and a fractional part only
    /// when a digit follows the dot.
    fn number(&mut self, start: usize, line: u32, column: u32) -> Token {
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.')
            && self.peek_next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            is_float = true;
            self.bump();
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.bump();
            }
        }
        let lexeme = self.slice(start);
        if is_float {
            match lexeme.parse::<f64>() {
                Ok(n) => Token {
                    kind: TokenKind::Float,
                    lexeme,
                    line,
                    column,
                    value: Some(TokenValue::Float(n)),
                },
                Err(_) => Token {
                    kind: TokenKind::Error,
                    lexeme,
                    line,
                    column,
                    value: Some(TokenValue::Str("malformed float literal".to_string())),
                },
            }
        } else {
            match lexeme.parse::<i64>() {
                Ok(n) => Token {
                    kind: TokenKind::Int,
                    lexeme,
                    line,
                    column,
                    value: Some(TokenValue::Int(n)),
                },
                Err(_) => Token {
                    kind: TokenKind::Error,
                    lexeme,
                    line,
                    column,
                    value: Some(TokenValue::Str(
                        "integer literal out of range".to_string(),
                    )),
                },
            }
        }
    }

    /// Identifier or keyword. Hyphens are significant inside words, so
    /// `linked-list-data` scans as one identifier.
    fn word(&mut self, start: usize, line: u32, column: u32) -> Token {
        while self
            .peek()
            .map(|c| c.is_alphanumeric() || c == '_' || c == '-')
            .unwrap_or(false)
        {
            self.bump();
        }
        let lexeme = self.slice(start);
        let (kind, value) = match lexeme.as_str() {
            "true" => (TokenKind::Bool, Some(TokenValue::Bool(true))),
            "false" => (TokenKind::Bool, Some(TokenValue::Bool(false))),
            word => match Kw::from_ident(word) {
                Some(kw) => (TokenKind::Keyword(kw), None),
                None => (TokenKind::Ident, None),
            },
        };
        Token {
            kind,
            lexeme,
            line,
            column,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn punctuation_tokens() {
        assert_eq!(
            kinds("{ } [ ] : , @ ( )"),
            vec![
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::Colon,
                TokenKind::Comma,
                TokenKind::At,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = tokenize("node linked-lists linked-list-data speaker_1");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Kw::Node));
        assert_eq!(tokens[1].kind, TokenKind::Keyword(Kw::LinkedLists));
        assert_eq!(tokens[2].kind, TokenKind::Ident);
        assert_eq!(tokens[2].lexeme, "linked-list-data");
        assert_eq!(tokens[3].kind, TokenKind::Ident);
        assert_eq!(tokens[3].lexeme, "speaker_1");
    }

    #[test]
    fn booleans_decode() {
        let tokens = tokenize("true false");
        assert_eq!(tokens[0].value, Some(TokenValue::Bool(true)));
        assert_eq!(tokens[1].value, Some(TokenValue::Bool(false)));
    }

    #[test]
    fn numbers_decode() {
        let tokens = tokenize("42 -17 5.6 -0.25");
        assert_eq!(tokens[0].value, Some(TokenValue::Int(42)));
        assert_eq!(tokens[1].value, Some(TokenValue::Int(-17)));
        assert_eq!(tokens[2].value, Some(TokenValue::Float(5.6)));
        assert_eq!(tokens[3].value, Some(TokenValue::Float(-0.25)));
    }

    #[test]
    fn integer_then_stray_dot() {
        // "5." is an integer followed by an unrecognized character.
        let tokens = tokenize("5.");
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[1].kind, TokenKind::Error);
    }

    #[test]
    fn string_spans_lines_verbatim() {
        let tokens = tokenize("\"first\nsecond\"");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(
            tokens[0].value,
            Some(TokenValue::Str("first\nsecond".to_string()))
        );
        assert_eq!(tokens[0].lexeme, "\"first\nsecond\"");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn string_no_escape_processing() {
        let tokens = tokenize(r#""a\nb""#);
        assert_eq!(tokens[0].value, Some(TokenValue::Str("a\\nb".to_string())));
    }

    #[test]
    fn unterminated_string_is_error() {
        let tokens = tokenize("\"open");
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn code_block_verbatim() {
        let tokens = tokenize("<! x = 1; { nested } !>");
        assert_eq!(tokens[0].kind, TokenKind::CodeBlock);
        assert_eq!(
            tokens[0].value,
            Some(TokenValue::Str(" x = 1; { nested } ".to_string()))
        );
        // Braces inside the block never become tokens.
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn code_block_counts_lines() {
        let tokens = tokenize("<! a\nb\nc !> next");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].lexeme, "next");
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn unterminated_code_block_reports_opening_line() {
        let tokens = tokenize("node 1 { }\n<! foo");
        let error = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Error)
            .expect("error token");
        assert_eq!(error.line, 2);
        assert_eq!(
            error.value,
            Some(TokenValue::Str("unterminated code block".to_string()))
        );
    }

    #[test]
    fn comments_skipped() {
        let tokens = tokenize("# heading\nnode # trailing\n2");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Kw::Node));
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[1].kind, TokenKind::Int);
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn line_endings_count_once() {
        for newline in ["\n", "\r", "\r\n"] {
            let source = format!("a{}b{}c", newline, newline);
            let tokens = tokenize(&source);
            assert_eq!(tokens[0].line, 1, "newline {:?}", newline);
            assert_eq!(tokens[1].line, 2, "newline {:?}", newline);
            assert_eq!(tokens[2].line, 3, "newline {:?}", newline);
        }
    }

    #[test]
    fn columns_are_one_based() {
        let tokens = tokenize("ab cd\n efg");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 4));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 2));
    }

    #[test]
    fn scanning_stops_at_first_error() {
        let tokens = tokenize("node ~ group");
        assert_eq!(tokens[0].kind, TokenKind::Keyword(Kw::Node));
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[2].kind, TokenKind::Eof);
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn lexeme_concatenation_drops_only_trivia() {
        let source = "states [ \"a\", \"b\" ] # comment\nnode 1 { }";
        let concatenated: String = tokenize(source).iter().map(|t| t.lexeme.as_str()).collect();
        let stripped: String = "states[\"a\",\"b\"]node1{}".to_string();
        assert_eq!(concatenated, stripped);
    }
}
