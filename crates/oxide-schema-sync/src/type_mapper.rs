//! Logical field type to physical column mapping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{GenerateError, Result};
use crate::field::{Field, FieldType, LogicalSchema};
use crate::schema::{ColumnDefinition, ColumnType, ForeignKeyRef, DEFAULT_DECIMAL_SCALE};

/// Default length of short text columns.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 140;

/// Physical type a logical type maps to, with default parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMapping {
    /// Physical column type.
    pub column_type: ColumnType,
    /// Length used when the field declares none.
    pub length: Option<u32>,
    /// Precision used when the field declares none.
    pub precision: Option<u32>,
}

impl TypeMapping {
    /// Mapping without default parameters.
    #[must_use]
    pub const fn plain(column_type: ColumnType) -> Self {
        Self {
            column_type,
            length: None,
            precision: None,
        }
    }

    const fn varchar(length: u32) -> Self {
        Self {
            column_type: ColumnType::Varchar,
            length: Some(length),
            precision: None,
        }
    }

    const fn decimal(precision: u32) -> Self {
        Self {
            column_type: ColumnType::Decimal,
            length: None,
            precision: Some(precision),
        }
    }
}

/// Returns the built-in mapping of a logical type.
///
/// `None` means the type never produces a column (layout) or is unknown;
/// [`TypeMapper::map`] tells the two apart.
#[must_use]
pub fn default_mapping(field_type: &FieldType) -> Option<TypeMapping> {
    let mapping = match field_type {
        FieldType::Data
        | FieldType::Link
        | FieldType::DynamicLink
        | FieldType::Select
        | FieldType::Autocomplete
        | FieldType::Phone
        | FieldType::Color
        | FieldType::Barcode
        | FieldType::ReadOnly
        | FieldType::Password => TypeMapping::varchar(DEFAULT_VARCHAR_LENGTH),
        FieldType::SmallText
        | FieldType::Text
        | FieldType::LongText
        | FieldType::TextEditor
        | FieldType::HtmlEditor
        | FieldType::MarkdownEditor
        | FieldType::Code
        | FieldType::Attach
        | FieldType::AttachImage
        | FieldType::Signature => TypeMapping::plain(ColumnType::Text),
        FieldType::Geolocation | FieldType::Json => TypeMapping::plain(ColumnType::Json),
        FieldType::Int | FieldType::Check => TypeMapping::plain(ColumnType::Integer),
        FieldType::Float | FieldType::Currency | FieldType::Percent | FieldType::Duration => {
            TypeMapping::decimal(DEFAULT_DECIMAL_SCALE)
        }
        FieldType::Rating => TypeMapping::decimal(2),
        FieldType::Date => TypeMapping::plain(ColumnType::Date),
        FieldType::Datetime => TypeMapping::plain(ColumnType::DateTime),
        FieldType::Time => TypeMapping::plain(ColumnType::Time),
        FieldType::SectionBreak
        | FieldType::ColumnBreak
        | FieldType::TabBreak
        | FieldType::Html
        | FieldType::Button
        | FieldType::Heading
        | FieldType::Other(_) => return None,
    };
    Some(mapping)
}

/// Maps logical fields to column definitions.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    overrides: HashMap<FieldType, TypeMapping>,
    link_table_prefix: String,
    link_column: String,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMapper {
    /// Creates a mapper using the built-in type table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            link_table_prefix: "tab".to_string(),
            link_column: "name".to_string(),
        }
    }

    /// Binds a logical type to a custom mapping, replacing the built-in one.
    #[must_use]
    pub fn with_mapping(mut self, field_type: FieldType, mapping: TypeMapping) -> Self {
        self.overrides.insert(field_type, mapping);
        self
    }

    /// Sets the prefix of tables referenced by link fields.
    #[must_use]
    pub fn with_link_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.link_table_prefix = prefix.into();
        self
    }

    /// Sets the referenced column of link fields.
    #[must_use]
    pub fn with_link_column(mut self, column: impl Into<String>) -> Self {
        self.link_column = column.into();
        self
    }

    /// Returns the mapping used for a logical type, if any.
    #[must_use]
    pub fn mapping_for(&self, field_type: &FieldType) -> Option<TypeMapping> {
        self.overrides
            .get(field_type)
            .copied()
            .or_else(|| default_mapping(field_type))
    }

    /// Maps one field to its column definition.
    ///
    /// Layout fields fail with [`GenerateError::LayoutField`] and unknown
    /// types with [`GenerateError::UnsupportedFieldType`].
    pub fn map(&self, field: &Field) -> Result<ColumnDefinition> {
        if field.name.trim().is_empty() {
            return Err(GenerateError::ColumnNameConflict {
                table: String::new(),
                column: field.name.clone(),
                message: "field name is empty".to_string(),
            });
        }
        if field.field_type.is_layout() && !self.overrides.contains_key(&field.field_type) {
            return Err(GenerateError::LayoutField {
                field: field.name.clone(),
                field_type: field.field_type.to_string(),
            });
        }
        let mapping =
            self.mapping_for(&field.field_type)
                .ok_or_else(|| GenerateError::UnsupportedFieldType {
                    field: field.name.clone(),
                    field_type: field.field_type.to_string(),
                })?;

        let ty = mapping.column_type;
        let mut column = ColumnDefinition::new(field.name.clone(), ty);
        column.length = field
            .length
            .or(mapping.length)
            .filter(|_| ty.supports_length());
        column.precision = field
            .precision
            .or(mapping.precision)
            .filter(|_| ty.supports_precision());
        column.nullable = !field.required && !field.primary_key;
        column.unique = field.unique;
        column.primary_key = field.primary_key;
        column.auto_increment = field.auto_increment;
        column.default = field.default.clone();

        if field.field_type == FieldType::Link {
            column.foreign_key = Some(self.link_target(field)?);
        }

        Ok(column)
    }

    /// Maps every data field of a schema, skipping layout fields.
    pub fn map_schema(&self, schema: &LogicalSchema) -> Result<Vec<ColumnDefinition>> {
        schema
            .fields
            .iter()
            .filter(|f| !f.field_type.is_layout())
            .map(|f| self.map(f))
            .collect()
    }

    /// Resolves the table referenced by a link field.
    ///
    /// `Entity` references `tab<Entity>`; `Entity:custom_table` references
    /// `custom_table` verbatim.
    fn link_target(&self, field: &Field) -> Result<ForeignKeyRef> {
        let options = field
            .options
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| {
                GenerateError::constraint(&field.name, "link field has no target entity")
            })?;
        let table = match options.split_once(':') {
            Some((_, explicit)) => explicit.to_string(),
            None => format!("{}{}", self.link_table_prefix, options),
        };
        Ok(ForeignKeyRef::new(table, self.link_column.clone()))
    }
}
