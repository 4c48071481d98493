//! Defines the `Dialect` trait for database-specific SQL syntax.

use crate::query::ast::expr::DatePart;
use std::str::FromStr;

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a parameterized query.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL uses `?`
    fn get_placeholder(&self, index: usize) -> String;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Extracts the text at `path` from the already rendered JSON expression.
    fn json_extract(&self, expr: &str, path: &[String]) -> String;

    fn json_array_length(&self, expr: &str) -> String;

    fn date_part(&self, part: DatePart, expr: &str) -> String;

    /// Native case-insensitive LIKE keyword, if the dialect has one.
    fn ilike_keyword(&self) -> Option<&'static str>;

    /// Suffix making `\` the LIKE escape character, empty where it already is.
    fn like_escape_clause(&self) -> &'static str;

    fn intersects(&self, expr: &str, geometry: &str, bbox: bool) -> String;
}

fn quote_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn get_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc.
        format!("${}", index + 1)
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn json_extract(&self, expr: &str, path: &[String]) -> String {
        let keys = path
            .iter()
            .map(|key| quote_literal(key))
            .collect::<Vec<_>>()
            .join(", ");
        format!("jsonb_extract_path_text(CAST({expr} AS jsonb), {keys})")
    }

    fn json_array_length(&self, expr: &str) -> String {
        format!("jsonb_array_length(CAST({expr} AS jsonb))")
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String {
        let field = match part {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Week => "WEEK",
            DatePart::Day => "DAY",
            DatePart::Weekday => "DOW",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        };
        format!("CAST(EXTRACT({field} FROM {expr}) AS integer)")
    }

    fn ilike_keyword(&self) -> Option<&'static str> {
        Some("ILIKE")
    }

    fn like_escape_clause(&self) -> &'static str {
        r" ESCAPE '\'"
    }

    fn intersects(&self, expr: &str, geometry: &str, bbox: bool) -> String {
        if bbox {
            format!("({expr} && ST_GeomFromGeoJSON({geometry}))")
        } else {
            format!("ST_Intersects({expr}, ST_GeomFromGeoJSON({geometry}))")
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#"`{}`"#, ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        // MySQL uses ?
        "?".into()
    }

    fn name(&self) -> String {
        "MySQL".into()
    }

    fn json_extract(&self, expr: &str, path: &[String]) -> String {
        let selector = path
            .iter()
            .map(|key| format!(".\"{}\"", key.replace('"', "\\\"")))
            .collect::<String>();
        format!(
            "JSON_UNQUOTE(JSON_EXTRACT({expr}, {}))",
            quote_literal(&format!("${selector}"))
        )
    }

    fn json_array_length(&self, expr: &str) -> String {
        format!("JSON_LENGTH({expr})")
    }

    fn date_part(&self, part: DatePart, expr: &str) -> String {
        match part {
            DatePart::Year => format!("YEAR({expr})"),
            DatePart::Month => format!("MONTH({expr})"),
            DatePart::Week => format!("WEEK({expr}, 3)"),
            DatePart::Day => format!("DAYOFMONTH({expr})"),
            DatePart::Weekday => format!("(DAYOFWEEK({expr}) - 1)"),
            DatePart::Hour => format!("HOUR({expr})"),
            DatePart::Minute => format!("MINUTE({expr})"),
            DatePart::Second => format!("SECOND({expr})"),
        }
    }

    fn ilike_keyword(&self) -> Option<&'static str> {
        None
    }

    fn like_escape_clause(&self) -> &'static str {
        ""
    }

    fn intersects(&self, expr: &str, geometry: &str, bbox: bool) -> String {
        if bbox {
            format!("MBRIntersects({expr}, ST_GeomFromGeoJSON({geometry}))")
        } else {
            format!("ST_Intersects({expr}, ST_GeomFromGeoJSON({geometry}))")
        }
    }
}

/// Dialect selection by name, used by the `plan` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Postgres,
    MySql,
}

impl DialectKind {
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &Postgres,
            DialectKind::MySql => &MySql,
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" => Ok(DialectKind::MySql),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}
