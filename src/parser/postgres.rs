//! PostgreSQL dialect hooks: dollar-quoted strings, `COPY ... FROM STDIN`,
//! `BEGIN ATOMIC`/`CASE` block depth, and the regexes that flag statements
//! which cannot run inside a transaction.

use regex::Regex;

use super::{BlockTracker, DialectHooks, ParsingContext, Scanner, StatementType};
use crate::error::{Error, Kind};
use crate::migration::TransactionBehavior;

lazy_static::lazy_static! {
    static ref CREATE_DROP_DB: Regex =
        Regex::new(r"^(CREATE|DROP) (DATABASE|TABLESPACE|SUBSCRIPTION)\b").unwrap();
    static ref ALTER_SYSTEM: Regex = Regex::new(r"^ALTER SYSTEM\b").unwrap();
    static ref INDEX_CONCURRENTLY: Regex =
        Regex::new(r"^(CREATE|DROP)( UNIQUE)? INDEX CONCURRENTLY\b").unwrap();
    static ref REINDEX: Regex =
        Regex::new(r"^REINDEX( VERBOSE)? (SCHEMA|DATABASE|SYSTEM)\b").unwrap();
    static ref VACUUM: Regex = Regex::new(r"^VACUUM\b").unwrap();
    static ref DISCARD_ALL: Regex = Regex::new(r"^DISCARD ALL\b").unwrap();
    static ref ALTER_TYPE_ADD_VALUE: Regex = Regex::new(r"^ALTER TYPE .+ ADD VALUE\b").unwrap();
    static ref COPY_FROM_STDIN: Regex = Regex::new(r"^COPY\b.*\bFROM STDIN\b").unwrap();
}

/// The PostgreSQL [`DialectHooks`] implementation.
pub struct PostgresHooks;

impl DialectHooks for PostgresHooks {
    fn alternative_string_literal_quote(&self) -> Option<char> {
        Some('$')
    }

    fn read_alternative_string_literal(&self, scanner: &mut Scanner) -> Result<String, Error> {
        let mut out = String::new();
        // opening '$'
        out.push(scanner.advance().expect("caller verified a '$' is present"));

        let mut tag = String::new();
        loop {
            match scanner.advance() {
                None => return Err(unterminated(scanner, "unterminated dollar-quote tag")),
                Some('$') => {
                    out.push('$');
                    break;
                }
                Some(c) if is_tag_char(c) => {
                    tag.push(c);
                    out.push(c);
                }
                Some(_) => {
                    // not a valid tag character: this '$' was not actually
                    // opening a dollar-quoted string (e.g. a bare '$' in an
                    // expression). Treat what we've consumed as literal text.
                    return Err(unterminated(scanner, "invalid dollar-quote tag"));
                }
            }
        }

        let terminator = format!("${tag}$");
        loop {
            if scanner.starts_with(&terminator) {
                for _ in 0..terminator.chars().count() {
                    out.push(scanner.advance().unwrap());
                }
                break;
            }
            match scanner.advance() {
                None => return Err(unterminated(scanner, "unterminated dollar-quoted string")),
                Some(c) => out.push(c),
            }
        }

        Ok(out)
    }

    fn detect_statement_type(&self, simplified: &str) -> Option<StatementType> {
        if COPY_FROM_STDIN.is_match(simplified) {
            Some(StatementType::Copy)
        } else {
            None
        }
    }

    fn detect_can_execute_in_transaction(
        &self,
        simplified: &str,
        ctx: &ParsingContext,
    ) -> TransactionBehavior {
        if CREATE_DROP_DB.is_match(simplified)
            || ALTER_SYSTEM.is_match(simplified)
            || INDEX_CONCURRENTLY.is_match(simplified)
            || REINDEX.is_match(simplified)
            || VACUUM.is_match(simplified)
            || DISCARD_ALL.is_match(simplified)
        {
            return TransactionBehavior::No;
        }

        if ctx.is_pre_12() && ALTER_TYPE_ADD_VALUE.is_match(simplified) {
            return TransactionBehavior::No;
        }

        TransactionBehavior::Inherit
    }

    fn adjust_block_depth(&self, tracker: &mut BlockTracker, token: &str) {
        if token == "ATOMIC" && tracker.prev_was("BEGIN") {
            tracker.depth += 1;
        } else if token == "CASE" && tracker.depth > 0 {
            tracker.depth += 1;
        } else if token == "END" && tracker.depth > 0 {
            tracker.depth -= 1;
        }
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn unterminated(scanner: &Scanner, reason: &str) -> Error {
    Error::new(
        Kind::ParseError {
            script: String::new(),
            line: scanner.line(),
            column: scanner.column(),
            reason: reason.to_string(),
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn begin_atomic_masks_inner_semicolons() {
        let sql = "CREATE FUNCTION f() RETURNS int LANGUAGE SQL BEGIN ATOMIC \
                    SELECT 1; SELECT 2; END;";
        let stmts = parse(sql, &ParsingContext::default(), &PostgresHooks).unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn case_inside_atomic_block_does_not_end_block_early() {
        let sql = "CREATE FUNCTION f() RETURNS int LANGUAGE SQL BEGIN ATOMIC \
                    SELECT CASE WHEN true THEN 1 ELSE 2 END; END;";
        let stmts = parse(sql, &ParsingContext::default(), &PostgresHooks).unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn alter_type_add_value_non_transactional_before_pg12() {
        let ctx = ParsingContext {
            server_version: Some((11, 0)),
            ..ParsingContext::default()
        };
        let stmts = parse("ALTER TYPE color ADD VALUE 'blue';", &ctx, &PostgresHooks).unwrap();
        assert_eq!(stmts[0].can_execute_in_transaction, TransactionBehavior::No);
    }

    #[test]
    fn alter_type_add_value_transactional_on_pg12_plus() {
        let ctx = ParsingContext {
            server_version: Some((12, 0)),
            ..ParsingContext::default()
        };
        let stmts = parse("ALTER TYPE color ADD VALUE 'blue';", &ctx, &PostgresHooks).unwrap();
        assert_eq!(
            stmts[0].can_execute_in_transaction,
            TransactionBehavior::Inherit
        );
    }

    #[test]
    fn unknown_server_version_defaults_conservative() {
        let ctx = ParsingContext {
            server_version: None,
            ..ParsingContext::default()
        };
        let stmts = parse("ALTER TYPE color ADD VALUE 'blue';", &ctx, &PostgresHooks).unwrap();
        assert_eq!(stmts[0].can_execute_in_transaction, TransactionBehavior::No);
    }
}
