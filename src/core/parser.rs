/// Recursive-descent parser for story documents.
///
/// Consumes the token stream produced by the lexer and assembles the
/// story graph. Error reporting is first-wins: the first recorded error
/// aborts the parse and later errors are ignored. Sections may appear
/// in any order and each is optional; stray tokens between sections are
/// tolerated.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::lexer::{self, Kw, Token, TokenKind, TokenValue};
use crate::schema::character::{Character, ListData, ListRecords, Record, RecordField};
use crate::schema::group::{Group, GroupTag, NodeGraph};
use crate::schema::linked_list::{FieldSpec, LinkedListType, ListScope};
use crate::schema::node::{
    Action, ActionKind, AdjustOp, ChoiceOption, Dialogue, ExitScope, FieldModification, ModOp,
    Node, SpokenLine, StoryEvent, TimelineItem,
};
use crate::schema::story::{Chapter, State, StoryGraph};
use crate::schema::tag::{TagDefinition, TagKind};
use crate::schema::value::{Value, ValueType};
use crate::schema::variable::GlobalVariable;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Error at line {line}, column {column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse a story document from a string.
pub fn parse_string(source: &str) -> Result<StoryGraph, ParseError> {
    Parser::new(lexer::tokenize(source)).parse()
}

/// Parse a story document from a file (`.sdc` by convention).
pub fn parse_file(path: &Path) -> Result<StoryGraph, ParseError> {
    let source = std::fs::read_to_string(path)?;
    parse_string(&source)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    error: Option<ParseError>,
    story: StoryGraph,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            pos: 0,
            error: None,
            story: StoryGraph::default(),
        }
    }

    fn parse(mut self) -> Result<StoryGraph, ParseError> {
        loop {
            if let Some(err) = self.error.take() {
                return Err(err);
            }
            match self.peek().kind {
                TokenKind::Keyword(Kw::States) => {
                    let _ = self.parse_states();
                }
                TokenKind::Keyword(Kw::GlobalVars) => {
                    let _ = self.parse_global_vars();
                }
                TokenKind::Keyword(Kw::LinkedLists) => {
                    let _ = self.parse_linked_lists();
                }
                TokenKind::Keyword(Kw::Characters) => {
                    let _ = self.parse_characters();
                }
                TokenKind::Keyword(Kw::Tags) => {
                    let _ = self.parse_tags();
                }
                TokenKind::Keyword(Kw::Chapter) => {
                    let _ = self.parse_chapter();
                }
                TokenKind::Keyword(Kw::Group) => {
                    let _ = self.parse_group();
                }
                TokenKind::Keyword(Kw::Node) => {
                    let _ = self.parse_node();
                }
                TokenKind::Error => self.lexer_error(),
                TokenKind::Eof => break,
                // Stray tokens between sections are tolerated.
                _ => {
                    self.advance();
                }
            }
        }
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        debug!(
            states = self.story.states.len(),
            global_vars = self.story.global_vars.len(),
            tags = self.story.tags.len(),
            linked_lists = self.story.linked_lists.len(),
            characters = self.story.characters.len(),
            chapters = self.story.chapters.len(),
            groups = self.story.groups.len(),
            nodes = self.story.nodes.len(),
            "parsed story document"
        );
        Ok(self.story)
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        // The token stream is always Eof-terminated.
        let index = self.pos.min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(TokenKind::Error) {
            self.lexer_error();
            return None;
        }
        if self.check(kind) {
            Some(self.advance())
        } else {
            let token = self.peek().clone();
            self.set_error(&token, what);
            None
        }
    }

    /// Record an error. First error wins; later calls are ignored.
    fn set_error(&mut self, token: &Token, what: &str) {
        if self.error.is_none() {
            self.error = Some(ParseError::Syntax {
                line: token.line,
                column: token.column,
                message: format!("{} (got '{}')", what, token.display_lexeme()),
            });
        }
    }

    /// Convert a lexer `Error` token into the fatal parse error.
    fn lexer_error(&mut self) {
        let token = self.peek().clone();
        let what = match &token.value {
            Some(TokenValue::Str(description)) => description.clone(),
            _ => "invalid token".to_string(),
        };
        self.set_error(&token, &what);
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// True while a `[`-delimited or `{`-delimited list body continues.
    fn in_body(&self, close: TokenKind) -> bool {
        !self.check(close) && !self.check(TokenKind::Eof) && !self.failed()
    }

    /// Peek lexeme if the next token reads as a word (identifier or
    /// keyword). Field names share the keyword space (`tags`, `group`).
    fn peek_word(&self) -> Option<&str> {
        match self.peek().kind {
            TokenKind::Ident | TokenKind::Keyword(_) => Some(self.peek().lexeme.as_str()),
            _ => None,
        }
    }

    fn string(&mut self, what: &str) -> Option<String> {
        let token = self.expect(TokenKind::Str, what)?;
        match token.value {
            Some(TokenValue::Str(content)) => Some(content),
            _ => None,
        }
    }

    fn integer(&mut self, what: &str) -> Option<i64> {
        let token = self.expect(TokenKind::Int, what)?;
        match token.value {
            Some(TokenValue::Int(n)) => Some(n),
            _ => None,
        }
    }

    /// A word (identifier or keyword) or a string literal. Record keys
    /// and list names accept both spellings.
    fn word_or_string(&mut self, what: &str) -> Option<String> {
        match self.peek().kind {
            TokenKind::Ident | TokenKind::Keyword(_) => Some(self.advance().lexeme),
            TokenKind::Str => self.string(what),
            TokenKind::Error => {
                self.lexer_error();
                None
            }
            _ => {
                let token = self.peek().clone();
                self.set_error(&token, what);
                None
            }
        }
    }

    fn literal(&mut self, what: &str) -> Option<Value> {
        let token = self.peek().clone();
        let value = match (&token.kind, &token.value) {
            (TokenKind::Str, Some(TokenValue::Str(s))) => Value::String(s.clone()),
            (TokenKind::Int, Some(TokenValue::Int(n))) => Value::Int(*n),
            (TokenKind::Float, Some(TokenValue::Float(n))) => Value::Float(*n),
            (TokenKind::Bool, Some(TokenValue::Bool(b))) => Value::Bool(*b),
            (TokenKind::Error, _) => {
                self.lexer_error();
                return None;
            }
            _ => {
                self.set_error(&token, what);
                return None;
            }
        };
        self.advance();
        Some(value)
    }

    /// `@<kind>(<integer>)`. The reference kind must match the context
    /// it appears in; the id is retained unchecked (validation is the
    /// reference validator's concern).
    fn reference(&mut self, expected: &str) -> Option<i64> {
        self.expect(TokenKind::At, "expected '@' reference")?;
        let kind_token = self.peek().clone();
        let kind = self.word_or_string("expected reference kind after '@'")?;
        if kind != expected {
            self.set_error(&kind_token, &format!("expected @{} reference", expected));
            return None;
        }
        self.expect(TokenKind::LParen, "expected '(' in reference")?;
        let id = self.integer("expected integer id in reference")?;
        self.expect(TokenKind::RParen, "expected ')' in reference")?;
        Some(id)
    }

    /// Skip one value form: a literal, an `@` reference, or a balanced
    /// `[`/`{` structure. Used to tolerate fields of unrecognized event
    /// kinds.
    fn skip_value(&mut self) {
        match self.peek().kind {
            TokenKind::LBrace | TokenKind::LBracket => {
                let mut depth = 0usize;
                while !self.check(TokenKind::Eof) && !self.failed() {
                    match self.peek().kind {
                        TokenKind::LBrace | TokenKind::LBracket => depth += 1,
                        TokenKind::RBrace | TokenKind::RBracket => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                self.advance();
                                return;
                            }
                        }
                        TokenKind::Error => {
                            self.lexer_error();
                            return;
                        }
                        _ => {}
                    }
                    self.advance();
                }
            }
            TokenKind::At => {
                self.advance();
                if self.peek_word().is_some() {
                    self.advance();
                }
                if self.matches(TokenKind::LParen) {
                    while !self.check(TokenKind::RParen)
                        && !self.check(TokenKind::Eof)
                        && !self.failed()
                    {
                        self.advance();
                    }
                    self.matches(TokenKind::RParen);
                }
            }
            TokenKind::Eof => {}
            _ => {
                self.advance();
            }
        }
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    /// `states [ "s1", "s2", ... ]`
    fn parse_states(&mut self) -> Option<()> {
        self.advance();
        self.expect(TokenKind::LBracket, "expected '[' after states")?;
        while self.in_body(TokenKind::RBracket) {
            let token = self.peek().clone();
            let name = self.string("expected state name string")?;
            if self.story.get_state(&name).is_some() {
                self.set_error(&token, &format!("duplicate state '{}'", name));
                return None;
            }
            self.story.states.push(State { name });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close states")?;
        Some(())
    }

    /// `global_vars [ "Name": { type: "...", default: <literal> }, ... ]`
    fn parse_global_vars(&mut self) -> Option<()> {
        self.advance();
        self.expect(TokenKind::LBracket, "expected '[' after global_vars")?;
        while self.in_body(TokenKind::RBracket) {
            let name_token = self.peek().clone();
            let name = self.string("expected variable name string")?;
            if self.story.get_global_variable(&name).is_some() {
                self.set_error(&name_token, &format!("duplicate global variable '{}'", name));
                return None;
            }
            self.expect(TokenKind::Colon, "expected ':' after variable name")?;
            self.expect(TokenKind::LBrace, "expected '{' to open variable body")?;

            let mut declared: Option<ValueType> = None;
            let mut default: Option<(Token, Value)> = None;
            while self.in_body(TokenKind::RBrace) {
                match self.peek_word() {
                    Some("type") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after type")?;
                        let type_token = self.peek().clone();
                        let type_name = self.string("expected variable type string")?;
                        match ValueType::from_name(&type_name) {
                            Some(ty) => declared = Some(ty),
                            None => {
                                self.set_error(
                                    &type_token,
                                    &format!("unknown variable type '{}'", type_name),
                                );
                                return None;
                            }
                        }
                    }
                    Some("default") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after default")?;
                        let value_token = self.peek().clone();
                        let value = self.literal("expected default literal")?;
                        default = Some((value_token, value));
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(&token, "unexpected field in global variable");
                        return None;
                    }
                }
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close variable body")?;

            let end_token = self.peek().clone();
            let Some(value_type) = declared else {
                self.set_error(&end_token, &format!("variable '{}' missing type", name));
                return None;
            };
            let Some((value_token, value)) = default else {
                self.set_error(&end_token, &format!("variable '{}' missing default", name));
                return None;
            };
            let default = match coerce_default(value_type, value) {
                Some(v) => v,
                None => {
                    self.set_error(
                        &value_token,
                        &format!(
                            "default for '{}' does not match declared type '{}'",
                            name, value_type
                        ),
                    );
                    return None;
                }
            };
            self.story.global_vars.push(GlobalVariable {
                name,
                value_type,
                default,
            });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close global_vars")?;
        Some(())
    }

    /// `linked-lists [ "Name": { scope: "...", structure: { Field: { type: "..." }, ... } }, ... ]`
    fn parse_linked_lists(&mut self) -> Option<()> {
        self.advance();
        self.expect(TokenKind::LBracket, "expected '[' after linked-lists")?;
        while self.in_body(TokenKind::RBracket) {
            let name_token = self.peek().clone();
            let name = self.string("expected linked-list name string")?;
            if self.story.get_linked_list(&name).is_some() {
                self.set_error(&name_token, &format!("duplicate linked-list '{}'", name));
                return None;
            }
            self.expect(TokenKind::Colon, "expected ':' after linked-list name")?;
            self.expect(TokenKind::LBrace, "expected '{' to open linked-list body")?;

            let mut scope: Option<ListScope> = None;
            let mut structure: Vec<FieldSpec> = Vec::new();
            while self.in_body(TokenKind::RBrace) {
                match self.peek_word() {
                    Some("scope") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after scope")?;
                        let scope_token = self.peek().clone();
                        let scope_name = self.string("expected scope string")?;
                        match ListScope::from_name(&scope_name) {
                            Some(s) => scope = Some(s),
                            None => {
                                self.set_error(
                                    &scope_token,
                                    &format!("unknown linked-list scope '{}'", scope_name),
                                );
                                return None;
                            }
                        }
                    }
                    Some("structure") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after structure")?;
                        self.expect(TokenKind::LBrace, "expected '{' to open structure")?;
                        while self.in_body(TokenKind::RBrace) {
                            let field = self.word_or_string("expected structure field name")?;
                            self.expect(TokenKind::Colon, "expected ':' after field name")?;
                            self.expect(TokenKind::LBrace, "expected '{' to open field body")?;
                            let mut field_type: Option<ValueType> = None;
                            while self.in_body(TokenKind::RBrace) {
                                match self.peek_word() {
                                    Some("type") => {
                                        self.advance();
                                        self.expect(TokenKind::Colon, "expected ':' after type")?;
                                        let type_token = self.peek().clone();
                                        let type_name =
                                            self.string("expected field type string")?;
                                        match ValueType::from_name(&type_name) {
                                            Some(ty) => field_type = Some(ty),
                                            None => {
                                                self.set_error(
                                                    &type_token,
                                                    &format!(
                                                        "unknown field type '{}'",
                                                        type_name
                                                    ),
                                                );
                                                return None;
                                            }
                                        }
                                    }
                                    _ => {
                                        let token = self.peek().clone();
                                        self.set_error(
                                            &token,
                                            "unexpected field in structure entry",
                                        );
                                        return None;
                                    }
                                }
                                self.matches(TokenKind::Comma);
                            }
                            self.expect(TokenKind::RBrace, "expected '}' to close field body")?;
                            let Some(value_type) = field_type else {
                                let token = self.peek().clone();
                                self.set_error(
                                    &token,
                                    &format!("structure field '{}' missing type", field),
                                );
                                return None;
                            };
                            structure.push(FieldSpec {
                                name: field,
                                value_type,
                            });
                            self.matches(TokenKind::Comma);
                        }
                        self.expect(TokenKind::RBrace, "expected '}' to close structure")?;
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(&token, "unexpected field in linked-list");
                        return None;
                    }
                }
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close linked-list body")?;

            let end_token = self.peek().clone();
            let Some(scope) = scope else {
                self.set_error(&end_token, &format!("linked-list '{}' missing scope", name));
                return None;
            };
            if structure.is_empty() {
                self.set_error(
                    &end_token,
                    &format!("linked-list '{}' must declare a non-empty structure", name),
                );
                return None;
            }
            self.story.linked_lists.push(LinkedListType {
                name,
                scope,
                structure,
            });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close linked-lists")?;
        Some(())
    }

    /// `characters [ "Name": { biography: "...", description: "...",
    /// linked-list-data: { List: {...} | [ "key": {...}, ... ], ... } }, ... ]`
    fn parse_characters(&mut self) -> Option<()> {
        self.advance();
        self.expect(TokenKind::LBracket, "expected '[' after characters")?;
        while self.in_body(TokenKind::RBracket) {
            let name_token = self.peek().clone();
            let name = self.string("expected character name string")?;
            if self.story.get_character(&name).is_some() {
                self.set_error(&name_token, &format!("duplicate character '{}'", name));
                return None;
            }
            self.expect(TokenKind::Colon, "expected ':' after character name")?;
            self.expect(TokenKind::LBrace, "expected '{' to open character body")?;

            let mut biography = String::new();
            let mut description = String::new();
            let mut list_data: Vec<ListData> = Vec::new();
            while self.in_body(TokenKind::RBrace) {
                match self.peek_word() {
                    Some("biography") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after biography")?;
                        biography = self.string("expected biography string")?;
                    }
                    Some("description") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after description")?;
                        description = self.string("expected description string")?;
                    }
                    Some("linked-list-data") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after linked-list-data")?;
                        self.expect(TokenKind::LBrace, "expected '{' to open linked-list-data")?;
                        while self.in_body(TokenKind::RBrace) {
                            let list = self.word_or_string("expected linked-list name")?;
                            self.expect(TokenKind::Colon, "expected ':' after list name")?;
                            let records = if self.check(TokenKind::LBracket) {
                                self.advance();
                                let mut collection = Vec::new();
                                while self.in_body(TokenKind::RBracket) {
                                    let key = self.string("expected record key string")?;
                                    self.expect(TokenKind::Colon, "expected ':' after record key")?;
                                    let record = self.parse_record()?;
                                    collection.push((key, record));
                                    self.matches(TokenKind::Comma);
                                }
                                self.expect(
                                    TokenKind::RBracket,
                                    "expected ']' to close record collection",
                                )?;
                                ListRecords::Collection(collection)
                            } else {
                                ListRecords::Single(self.parse_record()?)
                            };
                            list_data.push(ListData { list, records });
                            self.matches(TokenKind::Comma);
                        }
                        self.expect(TokenKind::RBrace, "expected '}' to close linked-list-data")?;
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(&token, "unexpected field in character");
                        return None;
                    }
                }
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close character body")?;
            self.story.characters.push(Character {
                name,
                biography,
                description,
                list_data,
            });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close characters")?;
        Some(())
    }

    /// `{ Field: <literal>, ... }` — one linked-list record.
    fn parse_record(&mut self) -> Option<Record> {
        self.expect(TokenKind::LBrace, "expected '{' to open record")?;
        let mut fields = Vec::new();
        while self.in_body(TokenKind::RBrace) {
            let name = self.word_or_string("expected record field name")?;
            self.expect(TokenKind::Colon, "expected ':' after record field name")?;
            let value = self.literal("expected record field literal")?;
            fields.push(RecordField { name, value });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close record")?;
        Some(fields)
    }

    /// `tags [ "Name": { type: "single"|"key-value", color: "#...", keys: [...] }, ... ]`
    fn parse_tags(&mut self) -> Option<()> {
        self.advance();
        self.expect(TokenKind::LBracket, "expected '[' after tags")?;
        while self.in_body(TokenKind::RBracket) {
            let name_token = self.peek().clone();
            let name = self.string("expected tag name string")?;
            if self.story.get_tag_definition(&name).is_some() {
                self.set_error(&name_token, &format!("duplicate tag '{}'", name));
                return None;
            }
            self.expect(TokenKind::Colon, "expected ':' after tag name")?;
            self.expect(TokenKind::LBrace, "expected '{' to open tag body")?;

            let mut kind: Option<TagKind> = None;
            let mut color = String::new();
            let mut keys: Vec<String> = Vec::new();
            while self.in_body(TokenKind::RBrace) {
                match self.peek_word() {
                    Some("type") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after type")?;
                        let kind_token = self.peek().clone();
                        let kind_name = self.string("expected tag type string")?;
                        match TagKind::from_name(&kind_name) {
                            Some(k) => kind = Some(k),
                            None => {
                                self.set_error(
                                    &kind_token,
                                    &format!("unknown tag type '{}'", kind_name),
                                );
                                return None;
                            }
                        }
                    }
                    Some("color") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after color")?;
                        color = self.string("expected color string")?;
                    }
                    Some("keys") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after keys")?;
                        self.expect(TokenKind::LBracket, "expected '[' to open keys")?;
                        while self.in_body(TokenKind::RBracket) {
                            keys.push(self.string("expected key string")?);
                            self.matches(TokenKind::Comma);
                        }
                        self.expect(TokenKind::RBracket, "expected ']' to close keys")?;
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(&token, "unexpected field in tag");
                        return None;
                    }
                }
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close tag body")?;

            let end_token = self.peek().clone();
            let Some(kind) = kind else {
                self.set_error(&end_token, &format!("tag '{}' missing type", name));
                return None;
            };
            match kind {
                TagKind::Single if !keys.is_empty() => {
                    self.set_error(
                        &end_token,
                        &format!("tag '{}' of type single cannot declare keys", name),
                    );
                    return None;
                }
                TagKind::KeyValue if keys.is_empty() => {
                    self.set_error(
                        &end_token,
                        &format!("tag '{}' of type key-value must declare keys", name),
                    );
                    return None;
                }
                _ => {}
            }
            self.story.tags.push(TagDefinition {
                name,
                kind,
                color,
                keys,
            });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close tags")?;
        Some(())
    }

    /// `chapter N { name: "..." }`
    fn parse_chapter(&mut self) -> Option<()> {
        self.advance();
        let id_token = self.peek().clone();
        let id = self.integer("expected chapter id")?;
        if self.story.get_chapter(id).is_some() {
            self.set_error(&id_token, &format!("duplicate chapter id {}", id));
            return None;
        }
        self.expect(TokenKind::LBrace, "expected '{' to open chapter body")?;
        let mut name = String::new();
        while self.in_body(TokenKind::RBrace) {
            match self.peek_word() {
                Some("name") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after name")?;
                    name = self.string("expected chapter name string")?;
                }
                _ => {
                    let token = self.peek().clone();
                    self.set_error(&token, "unexpected field in chapter");
                    return None;
                }
            }
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close chapter body")?;
        self.story.chapters.push(Chapter { id, name });
        Some(())
    }

    /// `group N { chapter: N, name, content, parent-group: N, tags: [...],
    /// linked-lists: [...], nodes: { start, end, points } }`
    fn parse_group(&mut self) -> Option<()> {
        self.advance();
        let id_token = self.peek().clone();
        let id = self.integer("expected group id")?;
        if self.story.get_group(id).is_some() {
            self.set_error(&id_token, &format!("duplicate group id {}", id));
            return None;
        }
        self.expect(TokenKind::LBrace, "expected '{' to open group body")?;

        let mut chapter: Option<i64> = None;
        let mut name = String::new();
        let mut content = String::new();
        let mut parent_group: Option<i64> = None;
        let mut tags: Vec<GroupTag> = Vec::new();
        let mut linked_lists: Vec<String> = Vec::new();
        let mut graph = NodeGraph::default();
        while self.in_body(TokenKind::RBrace) {
            match self.peek_word() {
                Some("chapter") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after chapter")?;
                    chapter = Some(self.integer("expected chapter id")?);
                }
                Some("name") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after name")?;
                    name = self.string("expected group name string")?;
                }
                Some("content") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after content")?;
                    content = self.string("expected group content string")?;
                }
                Some("parent-group") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after parent-group")?;
                    parent_group = Some(self.integer("expected parent group id")?);
                }
                Some("tags") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after tags")?;
                    self.expect(TokenKind::LBracket, "expected '[' to open tags")?;
                    while self.in_body(TokenKind::RBracket) {
                        let tag = self.string("expected tag name string")?;
                        let mut key = None;
                        let mut value = None;
                        if self.matches(TokenKind::Colon) {
                            self.expect(TokenKind::LBrace, "expected '{' to open tag entry")?;
                            while self.in_body(TokenKind::RBrace) {
                                match self.peek_word() {
                                    Some("key") => {
                                        self.advance();
                                        self.expect(TokenKind::Colon, "expected ':' after key")?;
                                        key = Some(self.string("expected key string")?);
                                    }
                                    Some("value") => {
                                        self.advance();
                                        self.expect(TokenKind::Colon, "expected ':' after value")?;
                                        value = Some(self.string("expected value string")?);
                                    }
                                    _ => {
                                        let token = self.peek().clone();
                                        self.set_error(&token, "unexpected field in tag entry");
                                        return None;
                                    }
                                }
                                self.matches(TokenKind::Comma);
                            }
                            self.expect(TokenKind::RBrace, "expected '}' to close tag entry")?;
                        }
                        tags.push(GroupTag { tag, key, value });
                        self.matches(TokenKind::Comma);
                    }
                    self.expect(TokenKind::RBracket, "expected ']' to close tags")?;
                }
                Some("linked-lists") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after linked-lists")?;
                    self.expect(TokenKind::LBracket, "expected '[' to open linked-lists")?;
                    while self.in_body(TokenKind::RBracket) {
                        linked_lists.push(self.string("expected linked-list name string")?);
                        self.matches(TokenKind::Comma);
                    }
                    self.expect(TokenKind::RBracket, "expected ']' to close linked-lists")?;
                }
                Some("nodes") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after nodes")?;
                    graph = self.parse_node_graph()?;
                }
                _ => {
                    let token = self.peek().clone();
                    self.set_error(&token, "unexpected field in group");
                    return None;
                }
            }
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close group body")?;

        let end_token = self.peek().clone();
        let Some(chapter) = chapter else {
            self.set_error(&end_token, &format!("group {} missing chapter", id));
            return None;
        };
        self.story.groups.push(Group {
            id,
            chapter,
            name,
            content,
            parent_group,
            tags,
            linked_lists,
            graph,
        });
        Some(())
    }

    /// `{ start: N, end: N, points: { N: [N, ...], ... } }`
    fn parse_node_graph(&mut self) -> Option<NodeGraph> {
        self.expect(TokenKind::LBrace, "expected '{' to open nodes body")?;
        let mut graph = NodeGraph::default();
        while self.in_body(TokenKind::RBrace) {
            match self.peek_word() {
                Some("start") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after start")?;
                    graph.start = self.integer("expected start node id")?;
                }
                Some("end") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after end")?;
                    graph.end = self.integer("expected end node id")?;
                }
                Some("points") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after points")?;
                    self.expect(TokenKind::LBrace, "expected '{' to open points")?;
                    while self.in_body(TokenKind::RBrace) {
                        let from = self.integer("expected node id in points")?;
                        self.expect(TokenKind::Colon, "expected ':' after node id")?;
                        self.expect(TokenKind::LBracket, "expected '[' to open successors")?;
                        let mut successors = Vec::new();
                        while self.in_body(TokenKind::RBracket) {
                            successors.push(self.integer("expected successor node id")?);
                            self.matches(TokenKind::Comma);
                        }
                        self.expect(TokenKind::RBracket, "expected ']' to close successors")?;
                        graph.points.insert(from, successors);
                        self.matches(TokenKind::Comma);
                    }
                    self.expect(TokenKind::RBrace, "expected '}' to close points")?;
                }
                _ => {
                    let token = self.peek().clone();
                    self.set_error(&token, "unexpected field in nodes body");
                    return None;
                }
            }
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close nodes body")?;
        Some(graph)
    }

    /// `node N { title, content, timeline: { <items> } }`
    fn parse_node(&mut self) -> Option<()> {
        self.advance();
        let id_token = self.peek().clone();
        let id = self.integer("expected node id")?;
        if self.story.get_node(id).is_some() {
            self.set_error(&id_token, &format!("duplicate node id {}", id));
            return None;
        }
        self.expect(TokenKind::LBrace, "expected '{' to open node body")?;

        let mut title = String::new();
        let mut content = String::new();
        let mut timeline: Vec<TimelineItem> = Vec::new();
        while self.in_body(TokenKind::RBrace) {
            match self.peek_word() {
                Some("title") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after title")?;
                    title = self.string("expected node title string")?;
                }
                Some("content") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after content")?;
                    content = self.string("expected node content string")?;
                }
                Some("timeline") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after timeline")?;
                    self.expect(TokenKind::LBrace, "expected '{' to open timeline")?;
                    while self.in_body(TokenKind::RBrace) {
                        match self.peek().kind {
                            TokenKind::Keyword(Kw::Dialogue) => {
                                timeline.push(TimelineItem::Dialogue(self.parse_dialogue()?));
                            }
                            TokenKind::Keyword(Kw::Action) => {
                                self.advance();
                                let label = self.integer("expected action label")?;
                                timeline.push(TimelineItem::Action(
                                    self.parse_action_body(label)?,
                                ));
                            }
                            _ => {
                                let token = self.peek().clone();
                                self.set_error(
                                    &token,
                                    "expected dialogue or action in timeline",
                                );
                                return None;
                            }
                        }
                        self.matches(TokenKind::Comma);
                    }
                    self.expect(TokenKind::RBrace, "expected '}' to close timeline")?;
                }
                _ => {
                    let token = self.peek().clone();
                    self.set_error(&token, "unexpected field in node");
                    return None;
                }
            }
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close node body")?;
        self.story.nodes.push(Node {
            id,
            title,
            content,
            timeline,
        });
        Some(())
    }

    /// `dialogue N { Speaker: "text"  Speaker: "text"  ... }`
    fn parse_dialogue(&mut self) -> Option<Dialogue> {
        self.advance();
        let label_token = self.peek().clone();
        let label = self.integer("expected dialogue label")?;
        self.expect(TokenKind::LBrace, "expected '{' to open dialogue body")?;
        let mut lines = Vec::new();
        while self.in_body(TokenKind::RBrace) {
            let speaker = match self.peek_word() {
                Some(_) => self.advance().lexeme,
                None => {
                    let token = self.peek().clone();
                    self.set_error(&token, "expected speaker name");
                    return None;
                }
            };
            self.expect(TokenKind::Colon, "expected ':' after speaker name")?;
            let text = self.string("expected dialogue text string")?;
            lines.push(SpokenLine { speaker, text });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close dialogue body")?;
        if lines.is_empty() {
            self.set_error(
                &label_token,
                &format!("dialogue {} must contain at least one line", label),
            );
            return None;
        }
        Some(Dialogue { label, lines })
    }

    /// An action body. A local brace-depth counter tolerates
    /// unrecognized nested structure; recognized fields are only picked
    /// up at depth one. Flat `goto`/`exit`/`enter` references set the
    /// action kind directly.
    fn parse_action_body(&mut self, label: i64) -> Option<Action> {
        let open = self.expect(TokenKind::LBrace, "expected '{' to open action body")?;
        let mut depth = 1usize;
        let mut declared: Option<String> = None;
        let mut code: Option<String> = None;
        let mut goto_target: Option<i64> = None;
        let mut exit_scope: Option<ExitScope> = None;
        let mut enter_target: Option<i64> = None;
        let mut options: Option<Vec<ChoiceOption>> = None;
        let mut event: Option<StoryEvent> = None;

        loop {
            if self.failed() {
                return None;
            }
            match self.peek().kind {
                TokenKind::Eof => {
                    self.set_error(&open, "unterminated action body");
                    return None;
                }
                TokenKind::Error => {
                    self.lexer_error();
                    return None;
                }
                TokenKind::RBrace => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::LBrace => {
                    self.advance();
                    depth += 1;
                }
                TokenKind::CodeBlock if depth == 1 => {
                    let token = self.advance();
                    if let Some(TokenValue::Str(text)) = token.value {
                        code = Some(text);
                    }
                }
                _ if depth == 1 && self.peek_word() == Some("type") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after type")?;
                    declared = Some(self.string("expected action type string")?);
                }
                _ if depth == 1 && self.peek_word() == Some("goto") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after goto")?;
                    goto_target = Some(self.reference("node")?);
                }
                _ if depth == 1 && self.peek_word() == Some("exit") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after exit")?;
                    let target_token = self.peek().clone();
                    let target = self.string("expected exit target string")?;
                    match ExitScope::from_name(&target) {
                        Some(scope) => exit_scope = Some(scope),
                        None => {
                            self.set_error(
                                &target_token,
                                &format!("unknown exit target '{}'", target),
                            );
                            return None;
                        }
                    }
                }
                _ if depth == 1 && self.peek_word() == Some("enter") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after enter")?;
                    enter_target = Some(self.reference("group")?);
                }
                _ if depth == 1 && self.peek_word() == Some("data") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after data")?;
                    event = Some(self.parse_event_data()?);
                }
                _ if depth == 1 && self.peek_word() == Some("choices") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after choices")?;
                    options = Some(self.parse_choice_options()?);
                }
                _ => {
                    self.advance();
                }
            }
        }

        let kind = if let Some(node) = goto_target {
            ActionKind::Goto { node }
        } else if let Some(scope) = exit_scope {
            ActionKind::Exit(scope)
        } else if let Some(group) = enter_target {
            ActionKind::Enter { group }
        } else if let Some(options) = options {
            ActionKind::Choice(options)
        } else if let Some(event) = event {
            ActionKind::Event(event)
        } else if let Some(code) = code {
            ActionKind::Code(code)
        } else {
            ActionKind::Unknown(declared.unwrap_or_default())
        };
        Some(Action { label, kind })
    }

    /// `{ type: "<event-kind>" ...fields... }`. Unrecognized fields are
    /// skipped so unknown event kinds still parse (to `Unknown`).
    fn parse_event_data(&mut self) -> Option<StoryEvent> {
        let open = self.expect(TokenKind::LBrace, "expected '{' to open event data")?;
        let mut type_name: Option<String> = None;
        let mut name: Option<String> = None;
        let mut character: Option<String> = None;
        let mut increment: Option<f64> = None;
        let mut value: Option<Value> = None;
        let mut toggle = false;
        let mut chapter: Option<i64> = None;
        let mut group: Option<i64> = None;
        let mut node: Option<i64> = None;
        let mut reference: Option<String> = None;
        let mut values: Vec<FieldModification> = Vec::new();

        while self.in_body(TokenKind::RBrace) {
            match self.peek_word() {
                Some("type") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after type")?;
                    type_name = Some(self.string("expected event type string")?);
                }
                Some("name") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after name")?;
                    name = Some(self.string("expected name string")?);
                }
                Some("character") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after character")?;
                    character = Some(self.string("expected character string")?);
                }
                Some("increment") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after increment")?;
                    let value_token = self.peek().clone();
                    let literal = self.literal("expected increment literal")?;
                    match literal.as_f64() {
                        Some(n) => increment = Some(n),
                        None => {
                            self.set_error(&value_token, "increment must be a number");
                            return None;
                        }
                    }
                }
                Some("value") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after value")?;
                    value = Some(self.literal("expected value literal")?);
                }
                Some("toggle") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after toggle")?;
                    self.string("expected toggle string")?;
                    toggle = true;
                }
                Some("chapter") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after chapter")?;
                    chapter = Some(self.reference("chapter")?);
                }
                Some("group") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after group")?;
                    group = Some(self.reference("group")?);
                }
                Some("node") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after node")?;
                    node = Some(self.reference("node")?);
                }
                Some("reference") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after reference")?;
                    reference = Some(self.string("expected reference string")?);
                }
                Some("values") => {
                    self.advance();
                    self.expect(TokenKind::Colon, "expected ':' after values")?;
                    values = self.parse_modifications()?;
                }
                Some(_) => {
                    // Fields of unrecognized event kinds.
                    self.advance();
                    if self.matches(TokenKind::Colon) {
                        self.skip_value();
                    }
                }
                None => {
                    let token = self.peek().clone();
                    self.set_error(&token, "expected field name in event data");
                    return None;
                }
            }
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBrace, "expected '}' to close event data")?;

        let Some(type_name) = type_name else {
            self.set_error(&open, "event data missing type");
            return None;
        };
        let event = match type_name.as_str() {
            "next-node" => StoryEvent::NextNode,
            "exit-current-node" => StoryEvent::ExitCurrentNode,
            "exit-current-group" => StoryEvent::ExitCurrentGroup,
            "adjust-variable" => {
                let Some(name) = name else {
                    self.set_error(&open, "adjust-variable event missing name");
                    return None;
                };
                let supplied =
                    usize::from(increment.is_some()) + usize::from(value.is_some()) + usize::from(toggle);
                if supplied != 1 {
                    self.set_error(
                        &open,
                        "adjust-variable requires exactly one of increment, value, toggle",
                    );
                    return None;
                }
                let op = if let Some(amount) = increment {
                    AdjustOp::Increment(amount)
                } else if let Some(value) = value {
                    AdjustOp::Set(value)
                } else {
                    AdjustOp::Toggle
                };
                StoryEvent::AdjustVariable { name, op }
            }
            "add-state" | "remove-state" => {
                let Some(state) = name else {
                    self.set_error(&open, "state event missing name");
                    return None;
                };
                let Some(character) = character else {
                    self.set_error(&open, "state event missing character");
                    return None;
                };
                if type_name == "add-state" {
                    StoryEvent::AddState { state, character }
                } else {
                    StoryEvent::RemoveState { state, character }
                }
            }
            "progress-story" => StoryEvent::ProgressStory {
                chapter,
                group,
                node,
            },
            "linked-list" => {
                let Some(list) = reference else {
                    self.set_error(&open, "linked-list event missing reference");
                    return None;
                };
                StoryEvent::LinkedList { list, values }
            }
            _ => StoryEvent::Unknown(type_name),
        };
        Some(event)
    }

    /// `[ "Field": { amount|set|append|replace|toggle: <literal> }, ... ]`
    fn parse_modifications(&mut self) -> Option<Vec<FieldModification>> {
        self.expect(TokenKind::LBracket, "expected '[' to open values")?;
        let mut modifications = Vec::new();
        while self.in_body(TokenKind::RBracket) {
            let field_token = self.peek().clone();
            let field = self.word_or_string("expected modification field name")?;
            self.expect(TokenKind::Colon, "expected ':' after field name")?;
            self.expect(TokenKind::LBrace, "expected '{' to open modification")?;
            let mut op: Option<ModOp> = None;
            while self.in_body(TokenKind::RBrace) {
                let op_name = match self.peek_word() {
                    Some(word @ ("amount" | "set" | "append" | "replace" | "toggle")) => {
                        word.to_string()
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(
                            &token,
                            "expected one of amount, set, append, replace, toggle",
                        );
                        return None;
                    }
                };
                self.advance();
                self.expect(TokenKind::Colon, "expected ':' after modification operation")?;
                let operand = self.literal("expected modification literal")?;
                if op.is_some() {
                    self.set_error(
                        &field_token,
                        &format!("modification for '{}' sets more than one operation", field),
                    );
                    return None;
                }
                op = Some(match op_name.as_str() {
                    "amount" => ModOp::Amount(operand),
                    "set" => ModOp::Set(operand),
                    "append" => ModOp::Append(operand),
                    "replace" => ModOp::Replace(operand),
                    _ => ModOp::Toggle(operand),
                });
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close modification")?;
            let Some(op) = op else {
                self.set_error(
                    &field_token,
                    &format!(
                        "modification for '{}' must set one of amount, set, append, replace, toggle",
                        field
                    ),
                );
                return None;
            };
            modifications.push(FieldModification { field, op });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close values")?;
        Some(modifications)
    }

    /// `[ { text: "..." choice: { action M { ... } ... } }, ... ]`
    fn parse_choice_options(&mut self) -> Option<Vec<ChoiceOption>> {
        self.expect(TokenKind::LBracket, "expected '[' to open choices")?;
        let mut options = Vec::new();
        while self.in_body(TokenKind::RBracket) {
            let open = self.expect(TokenKind::LBrace, "expected '{' to open choice option")?;
            let mut text: Option<String> = None;
            let mut actions: Vec<Action> = Vec::new();
            while self.in_body(TokenKind::RBrace) {
                match self.peek_word() {
                    Some("text") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after text")?;
                        text = Some(self.string("expected choice text string")?);
                    }
                    Some("choice") => {
                        self.advance();
                        self.expect(TokenKind::Colon, "expected ':' after choice")?;
                        self.expect(TokenKind::LBrace, "expected '{' to open choice actions")?;
                        while self.in_body(TokenKind::RBrace) {
                            if self.check(TokenKind::Keyword(Kw::Action)) {
                                self.advance();
                                let label = self.integer("expected action label")?;
                                actions.push(self.parse_action_body(label)?);
                                self.matches(TokenKind::Comma);
                            } else {
                                let token = self.peek().clone();
                                self.set_error(&token, "expected action in choice");
                                return None;
                            }
                        }
                        self.expect(TokenKind::RBrace, "expected '}' to close choice actions")?;
                    }
                    _ => {
                        let token = self.peek().clone();
                        self.set_error(&token, "unexpected field in choice option");
                        return None;
                    }
                }
                self.matches(TokenKind::Comma);
            }
            self.expect(TokenKind::RBrace, "expected '}' to close choice option")?;
            let Some(text) = text else {
                self.set_error(&open, "choice option missing text");
                return None;
            };
            options.push(ChoiceOption { text, actions });
            self.matches(TokenKind::Comma);
        }
        self.expect(TokenKind::RBracket, "expected ']' to close choices")?;
        Some(options)
    }
}

/// Check a default literal against the declared variable type. The one
/// accepted coercion is an integer literal for a float variable.
fn coerce_default(declared: ValueType, value: Value) -> Option<Value> {
    match (declared, value) {
        (ValueType::Float, Value::Int(n)) => Some(Value::Float(n as f64)),
        (declared, value) if value.value_type() == declared => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> StoryGraph {
        match parse_string(source) {
            Ok(story) => story,
            Err(e) => panic!("expected parse to succeed, got: {}", e),
        }
    }

    fn parse_err(source: &str) -> String {
        match parse_string(source) {
            Ok(_) => panic!("expected parse to fail"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn parse_states_section() {
        let story = parse_ok(r#"states [ "injured", "trusted" ]"#);
        assert_eq!(story.states.len(), 2);
        assert_eq!(story.states[0].name, "injured");
    }

    #[test]
    fn duplicate_state_rejected() {
        let message = parse_err(r#"states [ "a", "a" ]"#);
        assert!(message.contains("duplicate state 'a'"), "{}", message);
    }

    #[test]
    fn parse_global_vars_all_types() {
        let story = parse_ok(
            r#"global_vars [
                "Name": { type: "string", default: "Ada" },
                "Money": { type: "int", default: 20 },
                "Alive": { type: "bool", default: true },
                "Karma": { type: "float", default: -0.5 },
            ]"#,
        );
        assert_eq!(story.global_vars.len(), 4);
        assert_eq!(story.global_vars[1].default, Value::Int(20));
        assert_eq!(story.global_vars[3].default, Value::Float(-0.5));
    }

    #[test]
    fn global_var_int_default_promotes_to_float() {
        let story = parse_ok(r#"global_vars [ "Karma": { type: "float", default: 5 } ]"#);
        assert_eq!(story.global_vars[0].default, Value::Float(5.0));
    }

    #[test]
    fn global_var_type_mismatch_rejected() {
        let message =
            parse_err(r#"global_vars [ "Money": { type: "int", default: "lots" } ]"#);
        assert!(message.contains("does not match declared type 'int'"), "{}", message);
    }

    #[test]
    fn parse_linked_lists_section() {
        let story = parse_ok(
            r#"linked-lists [
                "Profession": {
                    scope: "character",
                    structure: { Value: { type: "int" }, Title: { type: "string" } }
                }
            ]"#,
        );
        let list = story.get_linked_list("Profession").unwrap();
        assert_eq!(list.scope, ListScope::Character);
        assert_eq!(list.structure.len(), 2);
    }

    #[test]
    fn empty_structure_rejected() {
        let message =
            parse_err(r#"linked-lists [ "P": { scope: "global", structure: { } } ]"#);
        assert!(message.contains("non-empty structure"), "{}", message);
    }

    #[test]
    fn parse_characters_with_list_data() {
        let story = parse_ok(
            r#"characters [
                "Saniyah": {
                    biography: "Grew up by the docks.",
                    description: "Tall.",
                    linked-list-data: {
                        Profession: { Value: 4 },
                        Inventory: [ "knife": { Count: 1 }, "rope": { Count: 2 } ]
                    }
                }
            ]"#,
        );
        let character = story.get_character("Saniyah").unwrap();
        assert_eq!(character.biography, "Grew up by the docks.");
        assert!(character.owns_list("Profession"));
        match character.list_data("Inventory") {
            Some(ListRecords::Collection(entries)) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].0, "knife");
            }
            other => panic!("unexpected list data: {:?}", other),
        }
    }

    #[test]
    fn parse_tags_section() {
        let story = parse_ok(
            r##"tags [
                "Danger": { type: "single", color: "#ff0000" },
                "Location": { type: "key-value", color: "#00ff00", keys: ["coords", "region"] }
            ]"##,
        );
        assert_eq!(story.tags.len(), 2);
        assert_eq!(story.tags[0].kind, TagKind::Single);
        assert_eq!(story.tags[1].keys.len(), 2);
    }

    #[test]
    fn single_tag_with_keys_rejected() {
        let message =
            parse_err(r##"tags [ "D": { type: "single", color: "#fff", keys: ["x"] } ]"##);
        assert!(message.contains("cannot declare keys"), "{}", message);
    }

    #[test]
    fn parse_chapter_and_group() {
        let story = parse_ok(
            r#"
            chapter 1 { name: "The Docks" }
            group 2 {
                chapter: 1,
                name: "Arrival",
                content: "The harbor at dusk.",
                parent-group: 7,
                tags: [ "Danger", "Location": { key: "coords", value: "12,40" } ],
                linked-lists: [ "Profession" ],
                nodes: { start: 1, end: 3, points: { 1: [2], 2: [3] } }
            }
            "#,
        );
        assert_eq!(story.get_chapter(1).unwrap().name, "The Docks");
        let group = story.get_group(2).unwrap();
        assert_eq!(group.chapter, 1);
        assert_eq!(group.parent_group, Some(7));
        assert_eq!(group.tags.len(), 2);
        assert_eq!(group.tags[1].key.as_deref(), Some("coords"));
        assert_eq!(group.graph.start, 1);
        assert_eq!(group.graph.successors(1), &[2]);
    }

    #[test]
    fn duplicate_group_id_rejected() {
        let message = parse_err(
            r#"group 1 { chapter: 1 } group 1 { chapter: 1 }"#,
        );
        assert!(message.contains("duplicate group id 1"), "{}", message);
    }

    #[test]
    fn parse_node_with_dialogue() {
        let story = parse_ok(
            r#"node 1 {
                title: "Arrival",
                content: "",
                timeline: {
                    dialogue 1 { A: "hi"  B: "hey" }
                }
            }"#,
        );
        let node = story.get_node(1).unwrap();
        assert_eq!(node.timeline.len(), 1);
        match &node.timeline[0] {
            TimelineItem::Dialogue(d) => {
                assert_eq!(d.label, 1);
                assert_eq!(d.lines.len(), 2);
                assert_eq!(d.lines[0].speaker, "A");
                assert_eq!(d.lines[1].text, "hey");
            }
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn empty_dialogue_rejected() {
        let message = parse_err(r#"node 1 { timeline: { dialogue 1 { } } }"#);
        assert!(message.contains("at least one line"), "{}", message);
    }

    #[test]
    fn duplicate_labels_tolerated() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                dialogue 1 { A: "one" }
                dialogue 1 { A: "two" }
            } }"#,
        );
        let node = story.get_node(1).unwrap();
        assert_eq!(node.timeline.len(), 2);
        assert_eq!(node.timeline[0].label(), 1);
        assert_eq!(node.timeline[1].label(), 1);
    }

    #[test]
    fn parse_code_action() {
        let story = parse_ok(
            r#"node 1 { timeline: { action 1 { type: "code" <! x = 1; !> } } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                label: 1,
                kind: ActionKind::Code(code),
            }) => assert_eq!(code, " x = 1; "),
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn parse_flat_references() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "event" goto: @node(2) }
                action 2 { type: "event" exit: "group" }
                action 3 { type: "event" enter: @group(5) }
            } }"#,
        );
        let node = story.get_node(1).unwrap();
        let kinds: Vec<_> = node
            .timeline
            .iter()
            .map(|item| match item {
                TimelineItem::Action(a) => a.kind.clone(),
                other => panic!("unexpected item: {:?}", other),
            })
            .collect();
        assert_eq!(kinds[0], ActionKind::Goto { node: 2 });
        assert_eq!(kinds[1], ActionKind::Exit(ExitScope::Group));
        assert_eq!(kinds[2], ActionKind::Enter { group: 5 });
    }

    #[test]
    fn reference_kind_must_match_context() {
        let message = parse_err(
            r#"node 1 { timeline: { action 1 { goto: @group(2) } } }"#,
        );
        assert!(message.contains("expected @node reference"), "{}", message);
    }

    #[test]
    fn parse_adjust_variable_event() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: { type: "adjust-variable" name: "Money" increment: 5.6 } }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                kind: ActionKind::Event(StoryEvent::AdjustVariable { name, op }),
                ..
            }) => {
                assert_eq!(name, "Money");
                assert_eq!(op, &AdjustOp::Increment(5.6));
            }
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn adjust_variable_requires_exactly_one_operation() {
        let none = parse_err(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: { type: "adjust-variable" name: "Money" } }
            } }"#,
        );
        assert!(none.contains("exactly one"), "{}", none);

        let both = parse_err(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: { type: "adjust-variable" name: "Money" increment: 1 toggle: "toggle" } }
            } }"#,
        );
        assert!(both.contains("exactly one"), "{}", both);
    }

    #[test]
    fn parse_progress_story_event() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: { type: "progress-story" group: @group(3) node: @node(9) } }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                kind: ActionKind::Event(StoryEvent::ProgressStory { chapter, group, node }),
                ..
            }) => {
                assert_eq!(*chapter, None);
                assert_eq!(*group, Some(3));
                assert_eq!(*node, Some(9));
            }
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn parse_linked_list_event() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: {
                    type: "linked-list"
                    reference: "Profession"
                    values: [ "Value": { amount: 4 }, "Title": { replace: "Captain" } ]
                } }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                kind: ActionKind::Event(StoryEvent::LinkedList { list, values }),
                ..
            }) => {
                assert_eq!(list, "Profession");
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].op, ModOp::Amount(Value::Int(4)));
                assert_eq!(
                    values[1].op,
                    ModOp::Replace(Value::String("Captain".to_string()))
                );
            }
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn modification_with_two_operations_rejected() {
        let message = parse_err(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: {
                    type: "linked-list" reference: "P"
                    values: [ "V": { amount: 1 set: 2 } ]
                } }
            } }"#,
        );
        assert!(message.contains("more than one operation"), "{}", message);
    }

    #[test]
    fn parse_choice_with_nested_actions() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 2 { type: "choice" choices: [
                    { text: "Go" choice: { action 3 { type: "event" goto: @node(2) } } },
                    { text: "Stay" choice: { } }
                ] }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                label: 2,
                kind: ActionKind::Choice(options),
            }) => {
                assert_eq!(options.len(), 2);
                assert_eq!(options[0].text, "Go");
                assert_eq!(options[0].actions.len(), 1);
                assert_eq!(options[0].actions[0].kind, ActionKind::Goto { node: 2 });
                assert!(options[1].actions.is_empty());
            }
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_tolerated() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "event" data: { type: "weather-change" intensity: 3 region: "north" } }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                kind: ActionKind::Event(StoryEvent::Unknown(kind)),
                ..
            }) => assert_eq!(kind, "weather-change"),
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn unrecognized_action_body_tolerated() {
        let story = parse_ok(
            r#"node 1 { timeline: {
                action 1 { type: "mystery" extra: { nested: { deep: 1 } } }
            } }"#,
        );
        match &story.get_node(1).unwrap().timeline[0] {
            TimelineItem::Action(Action {
                kind: ActionKind::Unknown(declared),
                ..
            }) => assert_eq!(declared, "mystery"),
            other => panic!("unexpected timeline item: {:?}", other),
        }
    }

    #[test]
    fn unterminated_code_block_fails_with_opening_line() {
        let message = parse_err("node 1 { }\n<! foo");
        assert!(message.starts_with("Error at line 2"), "{}", message);
        assert!(message.contains("unterminated code block"), "{}", message);
    }

    #[test]
    fn first_error_wins() {
        // Both the stray '%' and the missing brace are errors; only the
        // first is reported.
        let message = parse_err("states [ % ] node 1 {");
        assert!(message.contains("line 1, column 10"), "{}", message);
    }

    #[test]
    fn stray_tokens_between_sections_tolerated() {
        let story = parse_ok(r#"42 "loose" chapter 1 { name: "One" }"#);
        assert_eq!(story.chapters.len(), 1);
    }

    #[test]
    fn trailing_commas_allowed() {
        let story = parse_ok(
            r##"states [ "a", "b", ]
               tags [ "D": { type: "single", color: "#fff", }, ]"##,
        );
        assert_eq!(story.states.len(), 2);
        assert_eq!(story.tags.len(), 1);
    }

    #[test]
    fn crlf_line_counting_in_errors() {
        let message = parse_err("states [ \"a\" ]\r\nnode x { }");
        assert!(message.starts_with("Error at line 2"), "{}", message);
    }
}
