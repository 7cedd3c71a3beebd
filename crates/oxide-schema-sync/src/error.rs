//! Error types for schema comparison and SQL generation.
//!
//! Errors are split by phase: [`GenerateError`] covers code generation
//! (type mapping, constraints, indexes, rebuilds, rollback) and
//! [`CompareError`] covers loading and diffing schemas. Both expose a
//! machine-readable [`code`](GenerateError::code) so callers can decide
//! whether to skip a schema or abort a batch.

/// Errors raised while generating migration SQL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// The logical field type has no column mapping.
    #[error("Unsupported field type '{field_type}' for field '{field}'")]
    UnsupportedFieldType {
        /// Field name.
        field: String,
        /// Logical type name.
        field_type: String,
    },

    /// The field is a layout element and never produces a column.
    #[error("Field '{field}' of type '{field_type}' is a layout field and has no column")]
    LayoutField {
        /// Field name.
        field: String,
        /// Logical type name.
        field_type: String,
    },

    /// A constraint value is empty or otherwise unusable.
    #[error("Invalid constraint on '{target}': {message}")]
    InvalidConstraint {
        /// Column or table the constraint belongs to.
        target: String,
        /// What is wrong with it.
        message: String,
    },

    /// A table name is empty or collides with another table.
    #[error("Table name conflict for '{table}': {message}")]
    TableNameConflict {
        /// Table name.
        table: String,
        /// Details.
        message: String,
    },

    /// A column name is empty or collides with another column.
    #[error("Column name conflict in '{table}' for '{column}': {message}")]
    ColumnNameConflict {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Details.
        message: String,
    },

    /// An index specification is invalid.
    #[error("Invalid index '{index}' on '{table}': {message}")]
    InvalidIndex {
        /// Table name.
        table: String,
        /// Index name (may be empty).
        index: String,
        /// Details.
        message: String,
    },

    /// A table rebuild request is malformed.
    #[error("Invalid rebuild of '{table}': {message}")]
    InvalidRebuild {
        /// Table name.
        table: String,
        /// Details.
        message: String,
    },

    /// Strict rollback could not invert a forward statement.
    #[error("Rollback unavailable for statement {position}: {reason}")]
    RollbackUnavailable {
        /// Zero-based position of the forward statement.
        position: usize,
        /// Why it could not be inverted.
        reason: String,
    },

    /// Wraps another error with the schema it occurred in.
    #[error("Schema '{schema}': {source}")]
    InSchema {
        /// Logical schema name.
        schema: String,
        /// Underlying error.
        #[source]
        source: Box<GenerateError>,
    },
}

impl GenerateError {
    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFieldType { .. } => "UNSUPPORTED_FIELD_TYPE",
            Self::LayoutField { .. } => "LAYOUT_FIELD",
            Self::InvalidConstraint { .. } => "INVALID_CONSTRAINT",
            Self::TableNameConflict { .. } => "TABLE_NAME_CONFLICT",
            Self::ColumnNameConflict { .. } => "COLUMN_NAME_CONFLICT",
            Self::InvalidIndex { .. } => "INVALID_INDEX",
            Self::InvalidRebuild { .. } => "INVALID_REBUILD",
            Self::RollbackUnavailable { .. } => "ROLLBACK_UNAVAILABLE",
            Self::InSchema { source, .. } => source.code(),
        }
    }

    /// Returns the schema name, if this error carries one.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        match self {
            Self::InSchema { schema, .. } => Some(schema),
            _ => None,
        }
    }

    /// Returns the field or column the error refers to, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnsupportedFieldType { field, .. } | Self::LayoutField { field, .. } => {
                Some(field)
            }
            Self::ColumnNameConflict { column, .. } => Some(column),
            Self::InvalidConstraint { target, .. } => Some(target),
            Self::InSchema { source, .. } => source.field(),
            _ => None,
        }
    }

    /// Attaches a schema name to this error.
    #[must_use]
    pub fn in_schema(self, schema: impl Into<String>) -> Self {
        match self {
            already @ Self::InSchema { .. } => already,
            other => Self::InSchema {
                schema: schema.into(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn constraint(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConstraint {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading or comparing schemas.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompareError {
    /// The logical schema provider does not know this name.
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    /// The live database has no such table.
    #[error("Table '{table}' not found for schema '{schema}'")]
    TableNotFound {
        /// Logical schema name.
        schema: String,
        /// Table name.
        table: String,
    },

    /// The logical schema is internally inconsistent.
    #[error("Schema '{schema}' failed validation: {message}")]
    SchemaValidation {
        /// Logical schema name.
        schema: String,
        /// Details.
        message: String,
    },

    /// A field could not be compared against its live column.
    #[error("Failed to compare field '{field}' of '{schema}': {source}")]
    FieldComparison {
        /// Logical schema name.
        schema: String,
        /// Field name.
        field: String,
        /// Underlying generation error.
        #[source]
        source: GenerateError,
    },

    /// An index could not be compared against the live index set.
    #[error("Failed to compare index '{index}' of '{schema}': {source}")]
    IndexComparison {
        /// Logical schema name.
        schema: String,
        /// Index name.
        index: String,
        /// Underlying generation error.
        #[source]
        source: GenerateError,
    },

    /// A provider failed while loading data.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Live introspection exceeded its time budget.
    #[error("Introspection of '{schema}' timed out after {millis}ms")]
    Timeout {
        /// Logical schema name.
        schema: String,
        /// Budget in milliseconds.
        millis: u64,
    },
}

impl CompareError {
    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            Self::TableNotFound { .. } => "TABLE_NOT_FOUND",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION",
            Self::FieldComparison { .. } => "FIELD_COMPARISON",
            Self::IndexComparison { .. } => "INDEX_COMPARISON",
            Self::Provider(_) => "PROVIDER",
            Self::Timeout { .. } => "TIMEOUT",
        }
    }

    /// Returns the schema name, if this error carries one.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        match self {
            Self::SchemaNotFound(schema)
            | Self::TableNotFound { schema, .. }
            | Self::SchemaValidation { schema, .. }
            | Self::FieldComparison { schema, .. }
            | Self::IndexComparison { schema, .. }
            | Self::Timeout { schema, .. } => Some(schema),
            Self::Provider(_) => None,
        }
    }
}

impl From<sqlx::Error> for CompareError {
    fn from(err: sqlx::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerateError>;
