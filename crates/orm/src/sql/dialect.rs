//! Per-engine SQL token rules

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::backends::DatabaseValue;

/// Words quoted whenever they appear as an identifier segment
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "add", "all", "alter", "and", "any", "as", "asc", "between", "by", "case", "check", "column",
        "constraint", "create", "cross", "current_date", "current_time", "current_user", "database",
        "default", "delete", "desc", "distinct", "drop", "else", "end", "exists", "fetch", "file",
        "for", "foreign", "from", "full", "function", "grant", "group", "having", "identity", "if",
        "in", "index", "inner", "insert", "interval", "into", "is", "join", "key", "left", "like",
        "limit", "match", "natural", "not", "null", "offset", "on", "option", "or", "order", "outer",
        "percent", "primary", "procedure", "range", "rank", "read", "references", "right", "row",
        "rows", "schema", "select", "session_user", "set", "table", "then", "to", "top", "trigger",
        "union", "unique", "update", "user", "using", "values", "view", "when", "where", "with",
    ]
    .into_iter()
    .collect()
});

/// SQL dialect spoken by a supported engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Ordinal `?` placeholders, backtick quoting
    MySql,
    /// Named `@paramN` placeholders, bracket quoting
    MsSql,
    /// Ordinal `$N` placeholders, double-quote quoting
    Postgres,
}

impl SqlDialect {
    /// Placeholder for the `n`-th bound parameter of a statement (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::MySql => "?".to_string(),
            SqlDialect::MsSql => format!("@param{}", n),
            SqlDialect::Postgres => format!("${}", n),
        }
    }

    /// Whether placeholders carry names the driver binds by
    pub fn uses_named_parameters(&self) -> bool {
        matches!(self, SqlDialect::MsSql)
    }

    /// Opening and closing identifier quote characters
    pub fn identifier_quotes(&self) -> (char, char) {
        match self {
            SqlDialect::MySql => ('`', '`'),
            SqlDialect::MsSql => ('[', ']'),
            SqlDialect::Postgres => ('"', '"'),
        }
    }

    /// Quote a single identifier segment unconditionally
    pub fn quote_identifier(&self, segment: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let escaped = segment.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    pub fn is_reserved(word: &str) -> bool {
        RESERVED_WORDS.contains(word.to_ascii_lowercase().as_str())
    }

    /// Escape a field reference, quoting only reserved segments.
    ///
    /// Accepts `column`, `table.column`, `table.*`, `*` and `<field> AS <alias>`.
    /// Anything else (function calls, arithmetic, already-quoted text) is an
    /// expression and is returned untouched.
    pub fn escape_identifier(&self, field: &str) -> String {
        let field = field.trim();
        let parts: Vec<&str> = field.split_whitespace().collect();
        if parts.len() == 3 && parts[1].eq_ignore_ascii_case("as") && is_plain_reference(parts[2]) {
            if is_plain_reference(parts[0]) {
                return format!(
                    "{} AS {}",
                    self.escape_reference(parts[0]),
                    self.escape_reference(parts[2])
                );
            }
            return field.to_string();
        }
        if parts.len() == 1 && is_plain_reference(field) {
            return self.escape_reference(field);
        }
        field.to_string()
    }

    fn escape_reference(&self, reference: &str) -> String {
        reference
            .split('.')
            .map(|segment| {
                if segment != "*" && Self::is_reserved(segment) {
                    self.quote_identifier(segment)
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a value as an inline SQL literal
    pub fn literal(&self, value: &DatabaseValue) -> String {
        match value {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => match self {
                SqlDialect::Postgres => (if *b { "TRUE" } else { "FALSE" }).to_string(),
                SqlDialect::MySql | SqlDialect::MsSql => (if *b { "1" } else { "0" }).to_string(),
            },
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float32(f) => f.to_string(),
            DatabaseValue::Float64(f) => f.to_string(),
            DatabaseValue::String(s) => quote_string(s),
            DatabaseValue::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                match self {
                    SqlDialect::MySql => format!("X'{}'", hex),
                    SqlDialect::MsSql => format!("0x{}", hex),
                    SqlDialect::Postgres => format!("'\\x{}'", hex),
                }
            }
            DatabaseValue::Uuid(u) => quote_string(&u.to_string()),
            DatabaseValue::Json(j) => quote_string(&j.to_string()),
            other => match other.to_json() {
                serde_json::Value::String(s) => quote_string(&s),
                json => quote_string(&json.to_string()),
            },
        }
    }

    /// Two-way conditional expression
    pub fn conditional(&self, condition: &str, then: &str, otherwise: &str) -> String {
        match self {
            SqlDialect::MySql => format!("IF({}, {}, {})", condition, then, otherwise),
            SqlDialect::MsSql | SqlDialect::Postgres => {
                format!("CASE WHEN {} THEN {} ELSE {} END", condition, then, otherwise)
            }
        }
    }

    /// Paging suffix placed after any ORDER BY clause.
    ///
    /// SQL Server only pages through `OFFSET .. FETCH`, which requires an
    /// ORDER BY; a neutral one is supplied when the statement has none.
    pub fn paging_clause(&self, limit: Option<u64>, offset: Option<u64>, has_order: bool) -> String {
        if limit.is_none() && offset.is_none() {
            return String::new();
        }
        match self {
            SqlDialect::MsSql => {
                let mut clause = String::new();
                if !has_order {
                    clause.push_str(" ORDER BY (SELECT NULL)");
                }
                clause.push_str(&format!(" OFFSET {} ROWS", offset.unwrap_or(0)));
                if let Some(limit) = limit {
                    clause.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                }
                clause
            }
            SqlDialect::MySql => match (limit, offset) {
                (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
                (Some(limit), None) => format!(" LIMIT {}", limit),
                // MySQL has no OFFSET without LIMIT
                (None, Some(offset)) => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
                (None, None) => String::new(),
            },
            SqlDialect::Postgres => {
                let mut clause = String::new();
                if let Some(limit) = limit {
                    clause.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = offset {
                    clause.push_str(&format!(" OFFSET {}", offset));
                }
                clause
            }
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::MySql => write!(f, "mysql"),
            SqlDialect::MsSql => write!(f, "mssql"),
            SqlDialect::Postgres => write!(f, "postgres"),
        }
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn is_plain_reference(text: &str) -> bool {
    !text.is_empty()
        && text.split('.').all(|segment| {
            segment == "*"
                || (!segment.is_empty()
                    && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !segment.starts_with(|c: char| c.is_ascii_digit()))
        })
}
