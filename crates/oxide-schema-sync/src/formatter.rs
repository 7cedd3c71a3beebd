//! Identifier quoting, naming conventions and literal formatting.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::field::LogicalSchema;
use crate::schema::DefaultValue;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("Invalid camel boundary regex"));

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-_]+").expect("Invalid separator regex"));

/// How logical names become table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// `Sales Invoice` -> `sales_invoice`.
    SnakeCase,
    /// `Sales Invoice` -> `salesInvoice`.
    CamelCase,
    /// Keep the name as written.
    #[default]
    Preserve,
}

impl NamingStrategy {
    /// Converts a logical name.
    #[must_use]
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::Preserve => name.to_string(),
            Self::SnakeCase => to_snake_case(name),
            Self::CamelCase => to_camel_case(name),
        }
    }
}

fn to_snake_case(name: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(name.trim(), "${1}_${2}");
    SEPARATORS
        .replace_all(&split, "_")
        .trim_matches('_')
        .to_lowercase()
}

fn to_camel_case(name: &str) -> String {
    let snake = to_snake_case(name);
    let mut out = String::with_capacity(snake.len());
    for (i, word) in snake.split('_').filter(|w| !w.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Formatter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    /// Identifier quote character.
    pub quote: char,
    /// Naming strategy for derived table names.
    pub naming: NamingStrategy,
    /// Prefix of derived table names.
    pub table_prefix: String,
    /// Whether statement comments are rendered into the SQL text.
    pub include_comments: bool,
    /// Whether long statements are wrapped across lines.
    pub pretty: bool,
    /// Line length at which pretty printing wraps.
    pub max_line_length: usize,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            quote: '`',
            naming: NamingStrategy::Preserve,
            table_prefix: "tab".to_string(),
            include_comments: false,
            pretty: false,
            max_line_length: 100,
        }
    }
}

/// Formats identifiers, literals and whole statements.
#[derive(Debug, Clone, Default)]
pub struct SqlFormatter {
    options: FormatterOptions,
}

impl SqlFormatter {
    /// Creates a formatter with the given options.
    #[must_use]
    pub fn new(options: FormatterOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &FormatterOptions {
        &self.options
    }

    /// Quotes an identifier, doubling embedded quote characters.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        let q = self.options.quote;
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Quotes and joins identifiers with `, `.
    #[must_use]
    pub fn quote_list<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> String {
        names
            .into_iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Applies the naming strategy to a logical name.
    #[must_use]
    pub fn convert_name(&self, name: &str) -> String {
        self.options.naming.apply(name)
    }

    /// Resolves the table name of a logical schema.
    ///
    /// An explicit table name is used verbatim; otherwise the prefix is
    /// prepended to the converted schema name.
    #[must_use]
    pub fn table_name(&self, schema: &LogicalSchema) -> String {
        match schema.table_name.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(explicit) => explicit.to_string(),
            None => format!("{}{}", self.options.table_prefix, self.convert_name(&schema.name)),
        }
    }

    /// Formats a string as a single-quoted SQL literal.
    #[must_use]
    pub fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Formats a default value; `None` means no DEFAULT clause.
    #[must_use]
    pub fn format_default(&self, value: Option<&DefaultValue>) -> Option<String> {
        value.map(DefaultValue::to_sql)
    }

    /// Renders a statement with its optional comment and pretty printing.
    #[must_use]
    pub fn finish(&self, sql: &str, comment: Option<&str>) -> String {
        let body = if self.options.pretty {
            self.wrap(sql)
        } else {
            sql.to_string()
        };
        match comment {
            Some(c) if self.options.include_comments && !c.trim().is_empty() => {
                let header: Vec<String> = c.lines().map(|l| format!("-- {l}")).collect();
                format!("{}\n{body}", header.join("\n"))
            }
            _ => body,
        }
    }

    /// Wraps lines longer than the configured maximum at `, ` boundaries.
    #[must_use]
    pub fn wrap(&self, sql: &str) -> String {
        let max = self.options.max_line_length.max(20);
        let mut out: Vec<String> = Vec::new();
        for line in sql.lines() {
            if line.len() <= max {
                out.push(line.to_string());
                continue;
            }
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            let continuation = format!("{indent}    ");
            let mut current = String::new();
            let parts: Vec<&str> = line.split(", ").collect();
            let last = parts.len() - 1;
            for (i, part) in parts.into_iter().enumerate() {
                let piece = if i < last {
                    format!("{part},")
                } else {
                    part.to_string()
                };
                if current.is_empty() {
                    current = piece;
                } else if current.len() + 1 + piece.len() <= max {
                    current.push(' ');
                    current.push_str(&piece);
                } else {
                    out.push(current);
                    current = format!("{continuation}{}", piece.trim_start());
                }
            }
            out.push(current);
        }
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes_quote_char() {
        let f = SqlFormatter::default();
        assert_eq!(f.quote_identifier("badge_id"), "`badge_id`");
        assert_eq!(f.quote_identifier("we`ird"), "`we``ird`");

        let f = SqlFormatter::new(FormatterOptions {
            quote: '"',
            ..FormatterOptions::default()
        });
        assert_eq!(f.quote_identifier("name"), "\"name\"");
    }

    #[test]
    fn test_naming_strategies() {
        assert_eq!(NamingStrategy::SnakeCase.apply("Sales Invoice"), "sales_invoice");
        assert_eq!(NamingStrategy::SnakeCase.apply("SalesInvoice"), "sales_invoice");
        assert_eq!(NamingStrategy::CamelCase.apply("Sales Invoice"), "salesInvoice");
        assert_eq!(NamingStrategy::CamelCase.apply("sales_invoice_item"), "salesInvoiceItem");
        assert_eq!(NamingStrategy::Preserve.apply("Sales Invoice"), "Sales Invoice");
    }

    #[test]
    fn test_table_name_explicit_wins() {
        let f = SqlFormatter::new(FormatterOptions {
            naming: NamingStrategy::SnakeCase,
            ..FormatterOptions::default()
        });
        let schema = LogicalSchema::new("Sales Invoice");
        assert_eq!(f.table_name(&schema), "tabsales_invoice");
        let schema = schema.table_name("Invoices");
        assert_eq!(f.table_name(&schema), "Invoices");

        let f = SqlFormatter::default();
        assert_eq!(f.table_name(&LogicalSchema::new("Employee")), "tabEmployee");
    }

    #[test]
    fn test_default_formatting_is_total() {
        let f = SqlFormatter::default();
        assert_eq!(f.format_default(None), None);
        assert_eq!(f.format_default(Some(&DefaultValue::Integer(0))).as_deref(), Some("0"));
        assert_eq!(f.format_default(Some(&DefaultValue::Bool(true))).as_deref(), Some("1"));
        assert_eq!(f.format_default(Some(&DefaultValue::Bool(false))).as_deref(), Some("0"));
        assert_eq!(
            f.format_default(Some(&DefaultValue::String("O'Reilly".into())))
                .as_deref(),
            Some("'O''Reilly'")
        );
    }

    #[test]
    fn test_comments_only_when_enabled() {
        let f = SqlFormatter::default();
        assert_eq!(f.finish("DROP TABLE `t`", Some("cleanup")), "DROP TABLE `t`");

        let f = SqlFormatter::new(FormatterOptions {
            include_comments: true,
            ..FormatterOptions::default()
        });
        assert_eq!(
            f.finish("DROP TABLE `t`", Some("cleanup")),
            "-- cleanup\nDROP TABLE `t`"
        );
    }

    #[test]
    fn test_wrap_long_lines() {
        let f = SqlFormatter::new(FormatterOptions {
            pretty: true,
            max_line_length: 30,
            ..FormatterOptions::default()
        });
        let sql = "INSERT INTO `t` (`a`, `b`, `c`, `d`, `e`, `f`, `g`)";
        let wrapped = f.finish(sql, None);
        assert!(wrapped.lines().count() > 1);
        assert!(wrapped.lines().all(|l| l.len() <= 34));
        assert_eq!(wrapped.replace("\n    ", " "), sql);
    }
}
