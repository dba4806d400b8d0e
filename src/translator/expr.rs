//! Translated values and the conversions between their shapes.
//!
//! Every value is evaluated once per resource row. SQL NULL is the empty
//! collection. The shape records how a value is held:
//!
//! - `Native`: a SQL scalar, e.g. the result of `upper()` or a literal
//! - `Json`: a single JSON item, e.g. `Patient.birthDate`
//! - `JsonArray`: a collection as a JSON array; NULL and `[]` are both empty

use crate::fhirpath_ast::LiteralValue;
use crate::sql_dialect::SqlType;
use crate::type_registry::TYPE_REGISTRY;

use super::errors::TranslationError;
use super::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Native(SqlType),
    Json,
    JsonArray,
}

impl ValueShape {
    pub fn describe(&self) -> String {
        match self {
            ValueShape::Native(t) => format!("native:{}", t.system_type()),
            ValueShape::Json => "json".to_string(),
            ValueShape::JsonArray => "json_array".to_string(),
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ValueShape::JsonArray)
    }
}

/// A choice element navigated by its base name (`Observation.value`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceInfo {
    /// The value the element was read from
    pub parent: Box<SqlExpr>,
    /// Element base name (`value`)
    pub element: String,
    /// Allowed concrete types in declaration order
    pub types: Vec<&'static str>,
}

/// A translated expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlExpr {
    pub sql: String,
    pub shape: ValueShape,
    /// Static type name resolvable by the type registry (`HumanName`, `System.Integer`)
    pub fhir_type: Option<String>,
    pub choice: Option<ChoiceInfo>,
    /// Relations the SQL reads, in first-reference order
    pub tables: Vec<String>,
    /// The SQL is exactly the value column of its only relation
    pub column_ref: bool,
    /// FHIRPath text of the value, for error messages
    pub path: String,
    /// The literal this value was written as, when known at translation time
    pub literal: Option<LiteralValue>,
}

impl SqlExpr {
    /// A value that reads no relation.
    pub fn constant(sql: impl Into<String>, sql_type: SqlType, path: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            shape: ValueShape::Native(sql_type),
            fhir_type: Some(format!("System.{}", sql_type.system_type())),
            choice: None,
            tables: Vec::new(),
            column_ref: false,
            path: path.into(),
            literal: None,
        }
    }

    /// The empty collection.
    pub fn empty(path: impl Into<String>) -> Self {
        Self {
            sql: "NULL".to_string(),
            shape: ValueShape::Json,
            fhir_type: None,
            choice: None,
            tables: Vec::new(),
            column_ref: false,
            path: path.into(),
            literal: None,
        }
    }

    /// A value computed from several operands; reads every relation they read.
    pub fn composite(
        sql: impl Into<String>,
        shape: ValueShape,
        parts: &[&SqlExpr],
        path: impl Into<String>,
    ) -> Self {
        Self {
            sql: sql.into(),
            shape,
            fhir_type: match shape {
                ValueShape::Native(t) => Some(format!("System.{}", t.system_type())),
                _ => None,
            },
            choice: None,
            tables: merged_tables(parts.iter().copied()),
            column_ref: false,
            path: path.into(),
            literal: None,
        }
    }

    /// The current row of an unnested collection.
    pub fn item(alias: &str, fhir_type: Option<String>) -> Self {
        Self {
            sql: format!("{}.value", alias),
            shape: ValueShape::Json,
            fhir_type,
            choice: None,
            tables: Vec::new(),
            column_ref: false,
            path: "$this".to_string(),
            literal: None,
        }
    }

    /// Derive a new value from this one, keeping its relations and path.
    pub fn derive(&self, sql: impl Into<String>, shape: ValueShape) -> Self {
        Self {
            sql: sql.into(),
            shape,
            fhir_type: match shape {
                ValueShape::Native(t) => Some(format!("System.{}", t.system_type())),
                _ => self.fhir_type.clone(),
            },
            choice: None,
            tables: self.tables.clone(),
            column_ref: false,
            path: self.path.clone(),
            literal: None,
        }
    }

    pub fn with_type(mut self, fhir_type: Option<String>) -> Self {
        self.fhir_type = fhir_type;
        self
    }

    pub fn with_literal(mut self, literal: LiteralValue) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add the relations another value reads.
    pub fn merge_tables(mut self, other: &SqlExpr) -> Self {
        for table in &other.tables {
            if !self.tables.contains(table) {
                self.tables.push(table.clone());
            }
        }
        self
    }

    pub fn is_constant(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn is_null_literal(&self) -> bool {
        self.sql == "NULL"
    }

    /// The SQL scalar type this value converts to without guessing.
    pub fn scalar_type(&self) -> Option<SqlType> {
        if let ValueShape::Native(t) = self.shape {
            return Some(t);
        }
        scalar_type_of(self.fhir_type.as_deref()?)
    }
}

/// The SQL scalar type values of a registry type are held as, if any.
pub fn scalar_type_of(type_name: &str) -> Option<SqlType> {
    let entry = TYPE_REGISTRY.resolve(type_name)?;
    match entry.system_equivalent {
        Some(system) => SqlType::from_system_type(system),
        None => SqlType::from_system_type(entry.name)
            .filter(|_| entry.namespace == crate::type_registry::TypeNamespace::System),
    }
}

/// Union of the relations read by several values, in first-reference order.
pub fn merged_tables<'a>(exprs: impl IntoIterator<Item = &'a SqlExpr>) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for expr in exprs {
        for table in &expr.tables {
            if !tables.contains(table) {
                tables.push(table.clone());
            }
        }
    }
    tables
}

impl Translator {
    /// View a value as a collection.
    pub(crate) fn as_collection(&self, expr: &SqlExpr) -> SqlExpr {
        let d = self.dialect.as_ref();
        match expr.shape {
            ValueShape::JsonArray => expr.clone(),
            _ if expr.is_null_literal() => expr.derive("NULL", ValueShape::JsonArray),
            ValueShape::Json => {
                let sql = d.case_when(
                    &[(d.is_null(&expr.sql), "NULL".to_string())],
                    Some(&d.json_build_array(&[expr.sql.clone()])),
                );
                expr.derive(sql, ValueShape::JsonArray)
            }
            ValueShape::Native(_) => {
                let sql = d.case_when(
                    &[(d.is_null(&expr.sql), "NULL".to_string())],
                    Some(&d.json_build_array(&[self.native_to_json(expr)])),
                );
                expr.derive(sql, ValueShape::JsonArray)
                    .with_type(expr.fhir_type.clone())
            }
        }
    }

    /// Reduce a value to at most one item. A collection with more than one
    /// item becomes empty.
    pub(crate) fn as_singleton(&self, expr: &SqlExpr) -> SqlExpr {
        let d = self.dialect.as_ref();
        match expr.shape {
            ValueShape::Native(_) | ValueShape::Json => expr.clone(),
            ValueShape::JsonArray => {
                let sql = d.case_when(
                    &[(
                        d.comparison(
                            &d.json_array_length(&expr.sql),
                            crate::sql_dialect::ComparisonOp::Eq,
                            "1",
                        ),
                        d.json_array_element(&expr.sql, "0"),
                    )],
                    None,
                );
                let mut single = expr.derive(sql, ValueShape::Json);
                single.choice = expr.choice.clone();
                single
            }
        }
    }

    /// A single JSON item (natives are wrapped).
    pub(crate) fn as_json_item(&self, expr: &SqlExpr) -> SqlExpr {
        let single = self.as_singleton(expr);
        match single.shape {
            ValueShape::Native(_) => {
                let sql = self.native_to_json(&single);
                single
                    .derive(sql, ValueShape::Json)
                    .with_type(single.fhir_type.clone())
            }
            _ => single,
        }
    }

    /// JSON form of a native value. Constants are cast first so untyped
    /// literals have a type to convert from.
    fn native_to_json(&self, expr: &SqlExpr) -> String {
        match expr.shape {
            ValueShape::Native(t) if expr.is_constant() => {
                self.dialect.to_json(&self.dialect.cast(&expr.sql, t))
            }
            _ => self.dialect.to_json(&expr.sql),
        }
    }

    /// A SQL scalar of the requested type, converting singletons as needed.
    pub(crate) fn as_native(&self, expr: &SqlExpr, target: SqlType) -> SqlExpr {
        let d = self.dialect.as_ref();
        let single = self.as_singleton(expr);
        match single.shape {
            ValueShape::Native(t) if t == target => single,
            _ if single.is_null_literal() => single.derive(d.typed_null(target), ValueShape::Native(target)),
            ValueShape::Native(_) => single.derive(d.cast(&single.sql, target), ValueShape::Native(target)),
            _ => single.derive(
                d.json_to_native(&single.sql, target),
                ValueShape::Native(target),
            ),
        }
    }

    /// A scalar using the value's own type, or `fallback` when it is unknown.
    pub(crate) fn as_scalar(&self, expr: &SqlExpr, fallback: SqlType) -> SqlExpr {
        self.as_native(expr, expr.scalar_type().unwrap_or(fallback))
    }

    /// A boolean scalar, rejecting values statically known not to be boolean.
    pub(crate) fn as_boolean(
        &self,
        expr: &SqlExpr,
        operation: &str,
    ) -> Result<SqlExpr, TranslationError> {
        match expr.scalar_type() {
            None | Some(SqlType::Boolean) => Ok(self.as_native(expr, SqlType::Boolean)),
            Some(other) => Err(TranslationError::invalid_operand(
                operation,
                expr.path.clone(),
                format!("expected Boolean, found {}", other.system_type()),
            )),
        }
    }

    /// A string scalar; primitive values of other types are converted.
    pub(crate) fn as_string(&self, expr: &SqlExpr) -> SqlExpr {
        let single = self.as_singleton(expr);
        match single.shape {
            ValueShape::Json if !single.is_null_literal() => {
                let sql = self.dialect.json_text(&single.sql);
                single.derive(sql, ValueShape::Native(SqlType::String))
            }
            _ => self.as_native(&single, SqlType::String),
        }
    }

    /// A collection where both NULL and `[]` read as `[]`.
    pub(crate) fn collection_or_empty(&self, expr: &SqlExpr) -> String {
        let collection = self.as_collection(expr);
        self.dialect
            .coalesce(&[collection.sql, self.dialect.empty_json_array()])
    }

    /// Number of items: 0 for an empty collection.
    pub(crate) fn item_count(&self, expr: &SqlExpr) -> String {
        let d = self.dialect.as_ref();
        match expr.shape {
            ValueShape::JsonArray => {
                d.coalesce(&[d.json_array_length(&expr.sql), "0".to_string()])
            }
            _ => d.case_when(&[(d.is_null(&expr.sql), "0".to_string())], Some("1")),
        }
    }

    /// `true` when the value holds at least one item.
    pub(crate) fn has_items(&self, expr: &SqlExpr) -> String {
        let d = self.dialect.as_ref();
        match expr.shape {
            ValueShape::JsonArray => d.comparison(
                &self.item_count(expr),
                crate::sql_dialect::ComparisonOp::Gt,
                "0",
            ),
            _ => d.is_not_null(&expr.sql),
        }
    }
}
