//! Generator configuration.
//!
//! Every field has a default, so a configuration file only needs the
//! settings it changes:
//!
//! ```json
//! {
//!   "formatter": { "quote": "\"", "naming": "snake_case", "include_comments": true },
//!   "rebuild": { "verify_row_count": true },
//!   "foreign_keys": "recreate",
//!   "rollback_mode": "strict"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintOptions;
use crate::dialect::SqliteDialect;
use crate::diff::SchemaDiffer;
use crate::formatter::{FormatterOptions, SqlFormatter};
use crate::generator::{ForeignKeyMode, SqlGenerator};
use crate::rebuild::TableRebuildStrategy;
use crate::rollback::RollbackMode;
use crate::type_mapper::TypeMapper;

/// Errors raised while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The content is not a valid configuration.
    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Settings of the whole generation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Quoting, naming and layout.
    pub formatter: FormatterOptions,
    /// Default table rebuild strategy.
    pub rebuild: TableRebuildStrategy,
    /// Foreign key handling during rebuilds.
    pub foreign_keys: ForeignKeyMode,
    /// Rollback derivation mode.
    pub rollback_mode: RollbackMode,
    /// Default foreign key actions.
    pub constraints: ConstraintOptions,
}

impl GeneratorConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses a configuration from JSON.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Sets the identifier quote character.
    #[must_use]
    pub fn with_quote(mut self, quote: char) -> Self {
        self.formatter.quote = quote;
        self
    }

    /// Sets the rollback mode.
    #[must_use]
    pub fn with_rollback_mode(mut self, mode: RollbackMode) -> Self {
        self.rollback_mode = mode;
        self
    }

    /// Builds the SQLite dialect.
    #[must_use]
    pub fn dialect(&self) -> SqliteDialect {
        SqliteDialect::with_options(self.formatter.clone(), self.constraints)
    }

    /// Builds the type mapper. Link fields reference tables carrying the
    /// configured table prefix.
    #[must_use]
    pub fn type_mapper(&self) -> TypeMapper {
        TypeMapper::new().with_link_table_prefix(self.formatter.table_prefix.clone())
    }

    /// Builds the schema differ.
    #[must_use]
    pub fn differ(&self) -> SchemaDiffer {
        let dialect = self.dialect();
        SchemaDiffer::new(
            SqlFormatter::new(self.formatter.clone()),
            self.type_mapper(),
            dialect.constraints().clone(),
            dialect.indexes().clone(),
        )
    }

    /// Builds the SQL generator.
    #[must_use]
    pub fn generator(&self) -> SqlGenerator {
        SqlGenerator::new(
            self.dialect(),
            self.rebuild.clone(),
            self.rollback_mode,
            self.foreign_keys,
        )
    }
}
