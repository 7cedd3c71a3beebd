//! Logical schema types.
//!
//! A logical schema is the declarative description of a table: named
//! fields with a logical type, plus index specifications. It knows nothing
//! about the database; the type mapper turns it into physical columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::{DefaultValue, SortOrder};

/// Logical field types.
///
/// Serialized by display name (`"Data"`, `"Section Break"`). Names that are
/// not known to this enum deserialize as [`FieldType::Other`] so the type
/// mapper can report them as unsupported (or bind them via an override).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    /// Short text.
    Data,
    /// Link to another entity.
    Link,
    /// Link whose target entity is stored in another field.
    DynamicLink,
    /// One of a declared set of options.
    Select,
    /// Autocompleted short text.
    Autocomplete,
    /// Phone number.
    Phone,
    /// Color value.
    Color,
    /// Barcode value.
    Barcode,
    /// Read-only display of short text.
    ReadOnly,
    /// Password (stored hashed elsewhere, column holds a marker).
    Password,
    /// Small text.
    SmallText,
    /// Text.
    Text,
    /// Long text.
    LongText,
    /// Rich text editor content.
    TextEditor,
    /// HTML editor content.
    HtmlEditor,
    /// Markdown editor content.
    MarkdownEditor,
    /// Source code.
    Code,
    /// Attachment URL.
    Attach,
    /// Image attachment URL.
    AttachImage,
    /// Signature image data.
    Signature,
    /// GeoJSON document.
    Geolocation,
    /// JSON document.
    Json,
    /// Integer.
    Int,
    /// Boolean stored as 0/1.
    Check,
    /// Floating point number.
    Float,
    /// Monetary amount.
    Currency,
    /// Percentage.
    Percent,
    /// Star rating.
    Rating,
    /// Duration in seconds.
    Duration,
    /// Date.
    Date,
    /// Date and time.
    Datetime,
    /// Time of day.
    Time,
    /// Layout: section break.
    SectionBreak,
    /// Layout: column break.
    ColumnBreak,
    /// Layout: tab break.
    TabBreak,
    /// Layout: static HTML block.
    Html,
    /// Layout: button.
    Button,
    /// Layout: heading.
    Heading,
    /// Any other type name.
    Other(String),
}

impl FieldType {
    /// Returns true for types that only affect form layout.
    #[must_use]
    pub fn is_layout(&self) -> bool {
        matches!(
            self,
            Self::SectionBreak
                | Self::ColumnBreak
                | Self::TabBreak
                | Self::Html
                | Self::Button
                | Self::Heading
        )
    }

    /// Display name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Data => "Data",
            Self::Link => "Link",
            Self::DynamicLink => "Dynamic Link",
            Self::Select => "Select",
            Self::Autocomplete => "Autocomplete",
            Self::Phone => "Phone",
            Self::Color => "Color",
            Self::Barcode => "Barcode",
            Self::ReadOnly => "Read Only",
            Self::Password => "Password",
            Self::SmallText => "Small Text",
            Self::Text => "Text",
            Self::LongText => "Long Text",
            Self::TextEditor => "Text Editor",
            Self::HtmlEditor => "HTML Editor",
            Self::MarkdownEditor => "Markdown Editor",
            Self::Code => "Code",
            Self::Attach => "Attach",
            Self::AttachImage => "Attach Image",
            Self::Signature => "Signature",
            Self::Geolocation => "Geolocation",
            Self::Json => "JSON",
            Self::Int => "Int",
            Self::Check => "Check",
            Self::Float => "Float",
            Self::Currency => "Currency",
            Self::Percent => "Percent",
            Self::Rating => "Rating",
            Self::Duration => "Duration",
            Self::Date => "Date",
            Self::Datetime => "Datetime",
            Self::Time => "Time",
            Self::SectionBreak => "Section Break",
            Self::ColumnBreak => "Column Break",
            Self::TabBreak => "Tab Break",
            Self::Html => "HTML",
            Self::Button => "Button",
            Self::Heading => "Heading",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Data" => Self::Data,
            "Link" => Self::Link,
            "Dynamic Link" => Self::DynamicLink,
            "Select" => Self::Select,
            "Autocomplete" => Self::Autocomplete,
            "Phone" => Self::Phone,
            "Color" => Self::Color,
            "Barcode" => Self::Barcode,
            "Read Only" => Self::ReadOnly,
            "Password" => Self::Password,
            "Small Text" => Self::SmallText,
            "Text" => Self::Text,
            "Long Text" => Self::LongText,
            "Text Editor" => Self::TextEditor,
            "HTML Editor" => Self::HtmlEditor,
            "Markdown Editor" => Self::MarkdownEditor,
            "Code" => Self::Code,
            "Attach" => Self::Attach,
            "Attach Image" => Self::AttachImage,
            "Signature" => Self::Signature,
            "Geolocation" => Self::Geolocation,
            "JSON" => Self::Json,
            "Int" => Self::Int,
            "Check" => Self::Check,
            "Float" => Self::Float,
            "Currency" => Self::Currency,
            "Percent" => Self::Percent,
            "Rating" => Self::Rating,
            "Duration" => Self::Duration,
            "Date" => Self::Date,
            "Datetime" => Self::Datetime,
            "Time" => Self::Time,
            "Section Break" => Self::SectionBreak,
            "Column Break" => Self::ColumnBreak,
            "Tab Break" => Self::TabBreak,
            "HTML" => Self::Html,
            "Button" => Self::Button,
            "Heading" => Self::Heading,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.as_str().to_string()
    }
}

/// A field of a logical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name; becomes the column name.
    #[serde(rename = "fieldname")]
    pub name: String,
    /// Logical type.
    #[serde(rename = "fieldtype")]
    pub field_type: FieldType,
    /// Whether a value is mandatory (NOT NULL).
    #[serde(default)]
    pub required: bool,
    /// Whether values must be unique.
    #[serde(default)]
    pub unique: bool,
    /// Maximum length for text-like types.
    #[serde(default)]
    pub length: Option<u32>,
    /// Decimal places for numeric types.
    #[serde(default)]
    pub precision: Option<u32>,
    /// Default value.
    #[serde(default)]
    pub default: Option<DefaultValue>,
    /// Type-specific options: link target (`Entity` or `Entity:table`) or
    /// newline-separated choices for selects.
    #[serde(default)]
    pub options: Option<String>,
    /// Lower numeric bound.
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Upper numeric bound.
    #[serde(default)]
    pub max_value: Option<f64>,
    /// Whether this field is (part of) the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether this field auto-increments.
    #[serde(default)]
    pub auto_increment: bool,
    /// Previous name of this field, when it was renamed.
    #[serde(default)]
    pub renamed_from: Option<String>,
}

impl Field {
    /// Creates an optional field of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            length: None,
            precision: None,
            default: None,
            options: None,
            min_value: None,
            max_value: None,
            primary_key: false,
            auto_increment: false,
            renamed_from: None,
        }
    }

    /// Marks the field as mandatory.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the length.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Sets the precision.
    #[must_use]
    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the options string.
    #[must_use]
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Sets numeric bounds.
    #[must_use]
    pub fn bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    /// Marks the field as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self
    }

    /// Marks the field as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Records the previous name of this field.
    #[must_use]
    pub fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.renamed_from = Some(old_name.into());
        self
    }

    /// Choices of a select field, one per non-empty line.
    #[must_use]
    pub fn select_options(&self) -> Vec<&str> {
        self.options
            .as_deref()
            .map(|o| o.lines().map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// A column inside an index specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexColumnSpec {
    /// Bare column name, ascending.
    Name(String),
    /// Column with an explicit order.
    Ordered {
        /// Column name.
        name: String,
        /// Sort direction; ascending when absent.
        #[serde(default)]
        order: Option<SortOrder>,
    },
}

impl IndexColumnSpec {
    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Ordered { name, .. } => name,
        }
    }

    /// Sort direction, ascending when unspecified.
    #[must_use]
    pub fn order(&self) -> SortOrder {
        match self {
            Self::Name(_) => SortOrder::Asc,
            Self::Ordered { order, .. } => order.unwrap_or_default(),
        }
    }
}

impl From<&str> for IndexColumnSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Logical index specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Explicit index name; generated when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Indexed columns.
    pub columns: Vec<IndexColumnSpec>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Index structure hint.
    #[serde(default)]
    pub kind: Option<crate::schema::IndexKind>,
    /// Partial index predicate.
    #[serde(default, rename = "where")]
    pub predicate: Option<String>,
}

impl IndexSpec {
    /// Creates a non-unique index spec over the given columns.
    #[must_use]
    pub fn on(columns: &[&str]) -> Self {
        Self {
            name: None,
            columns: columns.iter().map(|c| IndexColumnSpec::from(*c)).collect(),
            unique: false,
            kind: None,
            predicate: None,
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a partial index predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

/// Declarative definition of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalSchema {
    /// Entity name (e.g. `Employee`).
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Index specifications.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    /// Explicit table name; derived from `name` when absent.
    #[serde(default)]
    pub table_name: Option<String>,
}

impl LogicalSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
            table_name: None,
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets an explicit table name.
    #[must_use]
    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that produce a column.
    pub fn data_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.field_type.is_layout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_round_trips_display_names() {
        assert_eq!("Section Break".parse::<FieldType>().ok(), Some(FieldType::SectionBreak));
        assert_eq!(FieldType::DynamicLink.to_string(), "Dynamic Link");
        assert_eq!(
            "Hologram".parse::<FieldType>().ok(),
            Some(FieldType::Other("Hologram".to_string()))
        );
    }

    #[test]
    fn test_field_deserializes_from_json() {
        let field: Field = serde_json::from_str(
            r#"{"fieldname": "badge_id", "fieldtype": "Data", "required": true, "unique": true, "length": 20}"#,
        )
        .unwrap();
        assert_eq!(field.name, "badge_id");
        assert_eq!(field.field_type, FieldType::Data);
        assert!(field.required && field.unique);
        assert_eq!(field.length, Some(20));
    }

    #[test]
    fn test_select_options() {
        let field = Field::new("status", FieldType::Select).options("Open\n\n Closed \n");
        assert_eq!(field.select_options(), vec!["Open", "Closed"]);
    }

    #[test]
    fn test_index_column_spec_defaults_to_ascending() {
        let spec: IndexSpec =
            serde_json::from_str(r#"{"columns": ["a", {"name": "b", "order": "desc"}, {"name": "c"}]}"#)
                .unwrap();
        let orders: Vec<SortOrder> = spec.columns.iter().map(IndexColumnSpec::order).collect();
        assert_eq!(orders, vec![SortOrder::Asc, SortOrder::Desc, SortOrder::Asc]);
    }

    #[test]
    fn test_layout_fields_excluded_from_data_fields() {
        let schema = LogicalSchema::new("Employee")
            .field(Field::new("details", FieldType::SectionBreak))
            .field(Field::new("first_name", FieldType::Data));
        let names: Vec<&str> = schema.data_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first_name"]);
    }
}
