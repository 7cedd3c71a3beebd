//! Index definitions, naming and DDL.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GenerateError, Result};
use crate::field::IndexSpec;
use crate::formatter::SqlFormatter;
use crate::schema::{IndexColumn, IndexDefinition, SortOrder};

/// Practical maximum identifier length of the target engine.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static NON_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("Invalid identifier regex"));

fn sanitize(part: &str) -> String {
    NON_IDENT.replace_all(part.trim(), "_").into_owned()
}

/// Builds index definitions and their CREATE/DROP statements.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    formatter: SqlFormatter,
}

impl IndexBuilder {
    /// Creates an index builder.
    #[must_use]
    pub fn new(formatter: SqlFormatter) -> Self {
        Self { formatter }
    }

    /// Generates `idx_<table>_<columns>` (`uidx_` when unique).
    ///
    /// Names longer than [`MAX_IDENTIFIER_LENGTH`] are cut from the
    /// column-derived suffix; the prefix and table part are only cut when
    /// they alone exceed the limit.
    #[must_use]
    pub fn generate_index_name(&self, table: &str, columns: &[&str], unique: bool) -> String {
        let prefix = if unique { "uidx_" } else { "idx_" };
        let head = format!("{prefix}{}", sanitize(table));
        let suffix = columns
            .iter()
            .map(|c| sanitize(c))
            .collect::<Vec<_>>()
            .join("_");

        let full = format!("{head}_{suffix}");
        if full.len() <= MAX_IDENTIFIER_LENGTH {
            return full;
        }
        if head.len() + 1 >= MAX_IDENTIFIER_LENGTH {
            return head[..head.len().min(MAX_IDENTIFIER_LENGTH)].to_string();
        }
        let room = MAX_IDENTIFIER_LENGTH - head.len() - 1;
        format!("{head}_{}", &suffix[..room])
    }

    /// Returns true if the `IndexSpec` can produce an index.
    #[must_use]
    pub fn validate_index(&self, spec: &IndexSpec) -> bool {
        self.check_spec("", spec).is_ok()
    }

    fn check_spec(&self, table: &str, spec: &IndexSpec) -> Result<()> {
        let invalid = |message: &str| GenerateError::InvalidIndex {
            table: table.to_string(),
            index: spec.name.clone().unwrap_or_default(),
            message: message.to_string(),
        };
        if spec.columns.is_empty() {
            return Err(invalid("index has no columns"));
        }
        if spec.columns.iter().any(|c| c.name().trim().is_empty()) {
            return Err(invalid("index column name is empty"));
        }
        if matches!(spec.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(invalid("index name is empty"));
        }
        if matches!(spec.name.as_deref(), Some(name) if name.len() > MAX_IDENTIFIER_LENGTH) {
            return Err(invalid("index name exceeds the identifier length limit"));
        }
        Ok(())
    }

    /// Resolves a logical index spec against a table.
    pub fn build_index_definition(&self, table: &str, spec: &IndexSpec) -> Result<IndexDefinition> {
        if table.trim().is_empty() {
            return Err(GenerateError::TableNameConflict {
                table: table.to_string(),
                message: "table name is empty".to_string(),
            });
        }
        self.check_spec(table, spec)?;

        let columns: Vec<IndexColumn> = spec
            .columns
            .iter()
            .map(|c| IndexColumn {
                name: c.name().to_string(),
                order: c.order(),
            })
            .collect();
        let name = match &spec.name {
            Some(name) => name.clone(),
            None => {
                let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                self.generate_index_name(table, &names, spec.unique)
            }
        };

        Ok(IndexDefinition {
            name,
            table: table.to_string(),
            columns,
            unique: spec.unique,
            kind: spec.kind,
            predicate: spec
                .predicate
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }

    /// Renders `CREATE [UNIQUE] INDEX`.
    #[must_use]
    pub fn build_create_index_statement(&self, index: &IndexDefinition) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.formatter.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.formatter.quote_identifier(&index.table));
        sql.push_str(" (");

        let cols: Vec<String> = index
            .columns
            .iter()
            .map(|c| match c.order {
                SortOrder::Asc => self.formatter.quote_identifier(&c.name),
                SortOrder::Desc => format!("{} DESC", self.formatter.quote_identifier(&c.name)),
            })
            .collect();
        sql.push_str(&cols.join(", "));
        sql.push(')');

        if let Some(predicate) = index.predicate.as_deref().filter(|p| !p.trim().is_empty()) {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql
    }

    /// Renders `DROP INDEX`. Index names are global in the target engine.
    #[must_use]
    pub fn build_drop_index_statement(&self, name: &str) -> String {
        format!("DROP INDEX {}", self.formatter.quote_identifier(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::IndexColumnSpec;

    fn builder() -> IndexBuilder {
        IndexBuilder::default()
    }

    #[test]
    fn test_generate_index_name() {
        let b = builder();
        assert_eq!(
            b.generate_index_name("tabEmployee", &["badge_id"], false),
            "idx_tabEmployee_badge_id"
        );
        assert_eq!(
            b.generate_index_name("tabEmployee", &["company", "status"], true),
            "uidx_tabEmployee_company_status"
        );
        assert_eq!(
            b.generate_index_name("tabSales Invoice", &["posting date"], false),
            "idx_tabSales_Invoice_posting_date"
        );
    }

    #[test]
    fn test_long_names_truncate_column_suffix() {
        let b = builder();
        let columns = [
            "a_very_long_column_name_number_one",
            "a_very_long_column_name_number_two",
        ];
        let name = b.generate_index_name("tabEmployee", &columns, true);
        assert!(name.len() <= MAX_IDENTIFIER_LENGTH);
        assert_eq!(name.len(), MAX_IDENTIFIER_LENGTH);
        assert!(name.starts_with("uidx_tabEmployee_a_very_long"));
        assert_eq!(name, b.generate_index_name("tabEmployee", &columns, true));
    }

    #[test]
    fn test_oversized_table_still_fits() {
        let table = "t".repeat(80);
        let name = builder().generate_index_name(&table, &["x"], false);
        assert_eq!(name.len(), MAX_IDENTIFIER_LENGTH);
        assert!(name.starts_with("idx_ttt"));
    }

    #[test]
    fn test_table_part_near_limit() {
        let b = builder();
        // `idx_` plus the table gives heads of 61, 62 and 63 characters.
        let name = b.generate_index_name(&"t".repeat(57), &["col"], false);
        assert_eq!(name, format!("idx_{}_c", "t".repeat(57)));
        let name = b.generate_index_name(&"t".repeat(58), &["col"], false);
        assert_eq!(name, format!("idx_{}", "t".repeat(58)));
        let name = b.generate_index_name(&"t".repeat(59), &["col"], false);
        assert_eq!(name, format!("idx_{}", "t".repeat(59)));
        let name = b.generate_index_name(&"t".repeat(57), &["col"], true);
        assert_eq!(name, format!("uidx_{}", "t".repeat(57)));
    }

    #[test]
    fn test_table_length_sweep_fits_limit() {
        let b = builder();
        for len in 55..=65 {
            let table = "t".repeat(len);
            for (unique, prefix) in [(false, "idx_"), (true, "uidx_")] {
                let name = b.generate_index_name(&table, &["col"], unique);
                assert!(name.len() <= MAX_IDENTIFIER_LENGTH, "{len}: {name}");
                let head = format!("{prefix}{table}");
                let kept = head.len().min(MAX_IDENTIFIER_LENGTH);
                assert!(name.starts_with(&head[..kept]), "{len}: {name}");
                assert!(!name.ends_with('_'), "{len}: {name}");
            }
        }
    }

    #[test]
    fn test_definition_defaults_ascending_and_generates_name() {
        let spec = IndexSpec::on(&["company", "status"]);
        let def = builder().build_index_definition("tabEmployee", &spec).unwrap();
        assert_eq!(def.name, "idx_tabEmployee_company_status");
        assert!(def.columns.iter().all(|c| c.order == SortOrder::Asc));
    }

    #[test]
    fn test_invalid_specs_fail_fast() {
        let b = builder();
        let empty = IndexSpec {
            name: Some("idx".into()),
            columns: vec![],
            unique: false,
            kind: None,
            predicate: None,
        };
        assert!(!b.validate_index(&empty));
        assert_eq!(
            b.build_index_definition("t", &empty).unwrap_err().code(),
            "INVALID_INDEX"
        );

        let unnamed = IndexSpec::on(&["a"]).named("  ");
        assert!(!b.validate_index(&unnamed));
        assert!(b.build_index_definition("t", &unnamed).is_err());
        assert!(b.validate_index(&IndexSpec::on(&["a"])));
    }

    #[test]
    fn test_blank_predicate_is_no_predicate() {
        let spec = IndexSpec::on(&["a"]).predicate("   ");
        let def = builder().build_index_definition("t", &spec).unwrap();
        assert_eq!(def.predicate, None);
        assert!(!builder().build_create_index_statement(&def).contains("WHERE"));
    }

    #[test]
    fn test_create_and_drop_statements() {
        let spec = IndexSpec {
            name: Some("idx_active".into()),
            columns: vec![
                IndexColumnSpec::from("email"),
                IndexColumnSpec::Ordered {
                    name: "created".into(),
                    order: Some(SortOrder::Desc),
                },
            ],
            unique: true,
            kind: None,
            predicate: Some("enabled = 1".into()),
        };
        let def = builder().build_index_definition("tabUser", &spec).unwrap();
        assert_eq!(
            builder().build_create_index_statement(&def),
            "CREATE UNIQUE INDEX `idx_active` ON `tabUser` (`email`, `created` DESC) WHERE enabled = 1"
        );
        assert_eq!(
            builder().build_drop_index_statement(&def.name),
            "DROP INDEX `idx_active`"
        );
    }
}
