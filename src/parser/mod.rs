//! Splits a migration script into statements, classifying each for
//! transactionality and carrying dialect-specific payloads (e.g. Postgres
//! `COPY ... FROM STDIN` inline data).
//!
//! The scanning loop here is dialect-agnostic; a [`DialectHooks`]
//! implementation (see [`postgres`]) supplies the quoting and block-depth
//! rules a given database's SQL dialect needs, so adding a new dialect
//! means writing a new `DialectHooks` impl rather than branching inside
//! the scanner.

pub mod postgres;

use crate::error::{Error, Kind};
use crate::migration::TransactionBehavior;

/// A sentinel statement type a [`DialectHooks::detect_statement_type`] may
/// report, changing how the scanner tokenizes what follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementType {
    Normal,
    /// Postgres `COPY ... FROM STDIN`: the statement is followed by inline
    /// tabular data terminated by a lone `\.` line.
    Copy,
}

/// One statement split out of a script, with its source position and
/// classification.
#[derive(Clone, Debug)]
pub struct ParsedStatement {
    pub start_offset: usize,
    pub line: usize,
    pub column: usize,
    pub sql_text: String,
    pub statement_type: StatementType,
    pub can_execute_in_transaction: TransactionBehavior,
    pub delimiter: char,
    pub batchable: bool,
    /// Present only for [`StatementType::Copy`] statements: the raw payload
    /// between the statement and the terminating `\.` line.
    pub copy_data: Option<String>,
}

/// Parsing context threaded through a single `parse` call: the server
/// version (used by version-gated non-transactional rules), and the
/// default statement delimiter.
#[derive(Clone, Debug)]
pub struct ParsingContext {
    /// `(major, minor)`. `None` means the server version could not be
    /// determined; callers should treat that the same as a pre-12 server
    /// (see [`ParsingContext::is_pre_12`]) rather than erroring.
    pub server_version: Option<(u16, u16)>,
    pub default_delimiter: char,
}

impl Default for ParsingContext {
    fn default() -> Self {
        ParsingContext {
            server_version: None,
            default_delimiter: ';',
        }
    }
}

impl ParsingContext {
    /// Conservative default: until proven otherwise, assume the server
    /// predates version 12.
    pub fn is_pre_12(&self) -> bool {
        match self.server_version {
            Some((major, _)) => major < 12,
            None => true,
        }
    }
}

/// Tracks nested block constructs (`BEGIN ATOMIC ... END`, `CASE ... END`)
/// so the scanner knows when a `;` is a real statement terminator versus an
/// inner delimiter masked by block depth.
#[derive(Default)]
pub struct BlockTracker {
    pub depth: i32,
    prev_significant_token: Option<String>,
}

impl BlockTracker {
    fn observe(&mut self, token: &str) {
        self.prev_significant_token = Some(token.to_ascii_uppercase());
    }

    /// Whether the previous significant token was `BEGIN`, consumed by the
    /// `ATOMIC` rule (it increments block depth only immediately after
    /// `BEGIN` at the current paren depth).
    pub fn prev_was(&self, keyword: &str) -> bool {
        self.prev_significant_token.as_deref() == Some(keyword)
    }
}

/// Dialect capability set the generic scanner dispatches to.
pub trait DialectHooks {
    /// An optional sentinel character (e.g. `$` for Postgres) that, when
    /// encountered outside any other literal, triggers
    /// [`read_alternative_string_literal`](Self::read_alternative_string_literal).
    fn alternative_string_literal_quote(&self) -> Option<char>;

    /// Consume an alternative string literal starting at the current
    /// scanner position (the trigger character has already been peeked but
    /// not consumed), returning its full raw text including delimiters.
    fn read_alternative_string_literal(&self, scanner: &mut Scanner) -> Result<String, Error>;

    /// Classify a simplified statement (comments stripped, whitespace
    /// collapsed to single spaces, upper-cased). Returning
    /// `Some(StatementType::Copy)` switches the scanner into COPY-payload
    /// mode immediately after this statement terminates.
    fn detect_statement_type(&self, simplified: &str) -> Option<StatementType>;

    /// `Yes`/`No`/`Inherit`, decided from the regex rules this dialect's
    /// non-transactional statements need to match.
    fn detect_can_execute_in_transaction(
        &self,
        simplified: &str,
        ctx: &ParsingContext,
    ) -> TransactionBehavior;

    /// Update `tracker.depth` when `token` is a block-opening/closing
    /// keyword for this dialect (e.g. Postgres `ATOMIC`/`CASE`/`END`).
    fn adjust_block_depth(&self, tracker: &mut BlockTracker, token: &str);
}

/// Cursor over the script being parsed, tracking byte offset, line and
/// column for error reporting and statement start positions.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Scanner<'a> {
        Scanner {
            chars: input.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The character `n` positions ahead (`0` is the same as [`peek`](Self::peek)),
    /// without consuming anything.
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.chars.clone().nth(n)
    }

    /// Whether the upcoming characters spell `s`, without consuming them.
    pub fn starts_with(&self, s: &str) -> bool {
        let mut clone = self.chars.clone();
        for expected in s.chars() {
            match clone.next() {
                Some(c) if c == expected => continue,
                _ => return false,
            }
        }
        true
    }
}

/// Parse `sql` into statements under `ctx`, dispatching dialect-specific
/// decisions to `hooks`.
pub fn parse(
    sql: &str,
    ctx: &ParsingContext,
    hooks: &dyn DialectHooks,
) -> Result<Vec<ParsedStatement>, Error> {
    let mut scanner = Scanner::new(sql);
    let mut statements = Vec::new();
    let delimiter = ctx.default_delimiter;

    loop {
        skip_insignificant(&mut scanner)?;
        if scanner.is_eof() {
            break;
        }
        let stmt = scan_statement(&mut scanner, ctx, hooks, delimiter)?;
        if !stmt.sql_text.trim().is_empty() {
            statements.push(stmt);
        }
    }

    Ok(statements)
}

/// Skip whitespace and comments that precede the next statement.
fn skip_insignificant(scanner: &mut Scanner) -> Result<(), Error> {
    loop {
        match scanner.peek() {
            Some(c) if c.is_whitespace() => {
                scanner.advance();
            }
            Some('-') => {
                if scanner.starts_with("--") {
                    scanner.advance();
                    scanner.advance();
                    while let Some(c) = scanner.peek() {
                        if c == '\n' {
                            break;
                        }
                        scanner.advance();
                    }
                } else {
                    break;
                }
            }
            Some('/') => {
                if scanner.starts_with("/*") {
                    scanner.advance();
                    scanner.advance();
                    let mut depth = 1;
                    while depth > 0 {
                        match scanner.advance() {
                            None => {
                                return Err(parse_error(scanner, "unterminated block comment"));
                            }
                            Some('*') if scanner.peek() == Some('/') => {
                                scanner.advance();
                                depth -= 1;
                            }
                            Some('/') if scanner.peek() == Some('*') => {
                                scanner.advance();
                                depth += 1;
                            }
                            _ => {}
                        }
                    }
                } else {
                    break;
                }
            }
            _ => break,
        }
    }
    Ok(())
}

fn parse_error(scanner: &Scanner, reason: &str) -> Error {
    Error::new(
        Kind::ParseError {
            script: String::new(),
            line: scanner.line,
            column: scanner.column,
            reason: reason.to_string(),
        },
        None,
    )
}

/// Scan one statement, starting right after any leading whitespace/comments
/// have been skipped, ending at the first unmasked `delimiter`.
fn scan_statement(
    scanner: &mut Scanner,
    ctx: &ParsingContext,
    hooks: &dyn DialectHooks,
    delimiter: char,
) -> Result<ParsedStatement, Error> {
    let start_offset = scanner.offset();
    let start_line = scanner.line();
    let start_column = scanner.column();

    let mut raw = String::new();
    let mut simplified = String::new();
    let mut last_was_space = true;
    let mut current_word = String::new();

    let mut tracker = BlockTracker::default();
    let mut paren_depth: i32 = 0;
    let alt_quote = hooks.alternative_string_literal_quote();

    let flush_word = |word: &mut String, tracker: &mut BlockTracker, hooks: &dyn DialectHooks| {
        if !word.is_empty() {
            tracker.observe(word);
            hooks.adjust_block_depth(tracker, &word.to_ascii_uppercase());
            word.clear();
        }
    };

    loop {
        if scanner.is_eof() {
            if tracker.depth > 0 {
                return Err(parse_error(scanner, "unterminated block"));
            }
            break;
        }

        let c = scanner.peek().unwrap();

        if tracker.depth == 0 && paren_depth == 0 && c == delimiter {
            scanner.advance();
            raw.push(c);
            flush_word(&mut current_word, &mut tracker, hooks);
            break;
        }

        if c == '\'' {
            flush_word(&mut current_word, &mut tracker, hooks);
            read_quoted(scanner, '\'', &mut raw)?;
            simplified.push_str("'...'");
            last_was_space = false;
            continue;
        }

        if c == '"' {
            flush_word(&mut current_word, &mut tracker, hooks);
            read_quoted(scanner, '"', &mut raw)?;
            simplified.push_str("\"...\"");
            last_was_space = false;
            continue;
        }

        // A `$` followed by a digit is a positional parameter placeholder
        // (`$1`, `$2`, ...), not the start of a dollar-quoted string: Postgres
        // identifiers — and so dollar-quote tags — cannot start with a digit.
        if Some(c) == alt_quote && !matches!(scanner.peek_nth(1), Some(d) if d.is_ascii_digit()) {
            flush_word(&mut current_word, &mut tracker, hooks);
            let literal = hooks.read_alternative_string_literal(scanner)?;
            raw.push_str(&literal);
            simplified.push_str("$...$");
            last_was_space = false;
            continue;
        }

        if c == '(' {
            flush_word(&mut current_word, &mut tracker, hooks);
            paren_depth += 1;
            raw.push(c);
            simplified.push(c);
            scanner.advance();
            last_was_space = false;
            continue;
        }

        if c == ')' {
            flush_word(&mut current_word, &mut tracker, hooks);
            paren_depth -= 1;
            raw.push(c);
            simplified.push(c);
            scanner.advance();
            last_was_space = false;
            continue;
        }

        if c.is_whitespace() {
            flush_word(&mut current_word, &mut tracker, hooks);
            raw.push(c);
            scanner.advance();
            if !last_was_space {
                simplified.push(' ');
                last_was_space = true;
            }
            continue;
        }

        if is_word_char(c) {
            current_word.push(c);
            raw.push(c);
            simplified.push(c.to_ascii_uppercase());
            last_was_space = false;
            scanner.advance();
            continue;
        }

        flush_word(&mut current_word, &mut tracker, hooks);
        raw.push(c);
        simplified.push(c);
        last_was_space = false;
        scanner.advance();
    }

    let simplified = simplified.trim().to_string();
    let statement_type = hooks.detect_statement_type(&simplified).unwrap_or(StatementType::Normal);
    let can_execute_in_transaction = hooks.detect_can_execute_in_transaction(&simplified, ctx);

    let mut copy_data = None;
    if statement_type == StatementType::Copy {
        copy_data = Some(consume_copy_payload(scanner));
    }

    Ok(ParsedStatement {
        start_offset,
        line: start_line,
        column: start_column,
        sql_text: raw,
        statement_type,
        can_execute_in_transaction,
        delimiter,
        batchable: statement_type == StatementType::Normal,
        copy_data,
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn read_quoted(scanner: &mut Scanner, quote: char, out: &mut String) -> Result<(), Error> {
    out.push(scanner.advance().unwrap());
    loop {
        match scanner.advance() {
            None => return Err(parse_error(scanner, "unterminated string literal")),
            Some(c) if c == quote => {
                out.push(c);
                if scanner.peek() == Some(quote) {
                    out.push(scanner.advance().unwrap());
                    continue;
                }
                break;
            }
            Some(c) => out.push(c),
        }
    }
    Ok(())
}

/// After the statement-terminating newline, consume lines verbatim until a
/// line whose trimmed content is exactly `\.`; that sentinel line is
/// discarded, and everything before it becomes the statement's payload,
/// preserving line endings.
fn consume_copy_payload(scanner: &mut Scanner) -> String {
    // consume up to and including the newline that ends the COPY statement
    while let Some(c) = scanner.peek() {
        scanner.advance();
        if c == '\n' {
            break;
        }
    }

    let mut payload = String::new();
    loop {
        let mut line = String::new();
        let mut saw_any = false;
        loop {
            match scanner.peek() {
                None => break,
                Some(c) => {
                    saw_any = true;
                    scanner.advance();
                    line.push(c);
                    if c == '\n' {
                        break;
                    }
                }
            }
        }
        if !saw_any {
            break;
        }
        if line.trim_end_matches(['\n', '\r']) == "\\." {
            break;
        }
        payload.push_str(&line);
    }
    payload
}
