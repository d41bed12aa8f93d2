//! Joining and splitting the `generatedDDL` text of a migration.
//!
//! Statements are separated by `;`. Semicolons only stay inside a statement when
//! they sit in a dollar-quoted body (`$$ … $$`, `$tag$ … $tag$`) or between two
//! `-- Function body follows` marker lines. Quotes and comments are not tracked, so
//! a driver's statements survive `join_statements` then `split_statements` whatever
//! quoting convention its dialect uses.

/// Marker line drivers emit around function bodies.
pub const FUNCTION_BODY_MARKER: &str = "-- Function body follows";

/// Separator used in `generatedDDL`.
pub const STATEMENT_SEPARATOR: &str = ";\n";

pub fn join_statements(statements: &[String]) -> String {
    statements.join(STATEMENT_SEPARATOR)
}

#[derive(Debug, PartialEq, Eq)]
enum Region<'a> {
    Code,
    Dollar(&'a str),
    FunctionBody,
}

/// Split DDL into trimmed, non-empty statements without their trailing `;`.
pub fn split_statements(ddl: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut region = Region::Code;
    let mut i = 0;

    while i < ddl.len() {
        let rest = &ddl[i..];

        match region {
            Region::Code => {
                if rest.starts_with(FUNCTION_BODY_MARKER) && at_line_start(ddl, i) {
                    current.push_str(FUNCTION_BODY_MARKER);
                    i += FUNCTION_BODY_MARKER.len();
                    region = Region::FunctionBody;
                    continue;
                }
                if let Some(tag) = dollar_tag(rest) {
                    current.push_str(tag);
                    i += tag.len();
                    region = Region::Dollar(tag);
                    continue;
                }
                if rest.starts_with(';') {
                    push_statement(&mut statements, &mut current);
                    i += 1;
                    continue;
                }
            }
            Region::Dollar(tag) => {
                if rest.starts_with(tag) {
                    current.push_str(tag);
                    i += tag.len();
                    region = Region::Code;
                    continue;
                }
            }
            Region::FunctionBody => {
                if rest.starts_with(FUNCTION_BODY_MARKER) && at_line_start(ddl, i) {
                    current.push_str(FUNCTION_BODY_MARKER);
                    i += FUNCTION_BODY_MARKER.len();
                    region = Region::Code;
                    continue;
                }
            }
        }

        // Consume one character as-is.
        if let Some(c) = rest.chars().next() {
            current.push(c);
            i += c.len_utf8();
        }
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Only whitespace precedes `idx` on its line.
fn at_line_start(ddl: &str, idx: usize) -> bool {
    let line_start = ddl[..idx].rfind('\n').map(|p| p + 1).unwrap_or(0);
    ddl[line_start..idx].trim().is_empty()
}

/// The opening delimiter of a dollar-quoted body, if `rest` starts with one.
fn dollar_tag(rest: &str) -> Option<&str> {
    let after = rest.strip_prefix('$')?;
    let end = after.find('$')?;
    let tag = &after[..end];
    let valid = tag.is_empty()
        || (tag
            .chars()
            .next()
            .map(|c| c.is_alphabetic() || c == '_')
            .unwrap_or(false)
            && tag.chars().all(|c| c.is_alphanumeric() || c == '_'));
    if valid {
        Some(&rest[..end + 2])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_split() {
        let ddl = "create table a (id int);\nalter table a add column b text;\n";
        assert_eq!(
            split_statements(ddl),
            vec![
                "create table a (id int)".to_string(),
                "alter table a add column b text".to_string()
            ]
        );
    }

    #[test]
    fn test_dollar_quoted_function_is_one_statement() {
        let ddl = "CREATE FUNCTION f() RETURNS int AS $$\nBEGIN;\nRETURN 1;\nEND;\n$$ LANGUAGE plpgsql;";
        let statements = split_statements(ddl);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0],
            "CREATE FUNCTION f() RETURNS int AS $$\nBEGIN;\nRETURN 1;\nEND;\n$$ LANGUAGE plpgsql"
        );
    }

    #[test]
    fn test_tagged_dollar_quote_needs_matching_tag() {
        let ddl = "create function g() returns text as $body$ select '$$;'; $body$ language sql;\nselect 1";
        let statements = split_statements(ddl);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with("$body$ language sql"));
        assert_eq!(statements[1], "select 1");
    }

    #[test]
    fn test_function_body_marker_region() {
        let ddl = "create procedure p()\n-- Function body follows\nbegin; select 1; end;\n-- Function body follows\n;\ncreate table t (id int)";
        let statements = split_statements(ddl);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("begin; select 1; end;"));
        assert_eq!(statements[1], "create table t (id int)");
    }

    #[test]
    fn test_backslash_escaped_quote_does_not_swallow_next_statement() {
        let plan = vec![
            "alter table t comment 'it\\'s'".to_string(),
            "create table x (id int)".to_string(),
        ];
        assert_eq!(split_statements(&join_statements(&plan)), plan);
    }

    #[test]
    fn test_trailing_line_comment_keeps_separator() {
        let plan = vec![
            "create table a (id int) -- primary".to_string(),
            "create table b (id int)".to_string(),
        ];
        assert_eq!(split_statements(&join_statements(&plan)), plan);
    }

    #[test]
    fn test_unbalanced_quotes_do_not_span_statements() {
        let statements = split_statements("comment on table t is 'don't';\ncreate table \"x (id int)");
        assert_eq!(statements, vec!["comment on table t is 'don't'", "create table \"x (id int)"]);
    }

    #[test]
    fn test_positional_parameter_is_not_a_dollar_quote() {
        let statements = split_statements("prepare q as select $1; select 2");
        assert_eq!(statements, vec!["prepare q as select $1", "select 2"]);
    }

    #[test]
    fn test_join_then_split_returns_plan() {
        let plan = vec![
            "create table users (id integer primary key, name text default 'x')".to_string(),
            "CREATE FUNCTION f() RETURNS int AS $$\nBEGIN;\nRETURN 1;\nEND;\n$$ LANGUAGE plpgsql".to_string(),
            "create procedure p()\n-- Function body follows\nbegin; select 1; end;\n-- Function body follows".to_string(),
            "create index idx_users_name on users (name)".to_string(),
        ];
        assert_eq!(split_statements(&join_statements(&plan)), plan);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_statements("").is_empty());
        assert!(split_statements(" ;\n; ").is_empty());
    }
}
