use crate::sql_dialect::JsonPath;
use crate::type_registry::{ResolvedElement, TypeNamespace, TYPE_REGISTRY};

use super::errors::TranslationError;
use super::expr::{ChoiceInfo, SqlExpr, ValueShape};
use super::Translator;

/// Element types that carry no static type: any resource may appear there.
const OPEN_RESOURCE_TYPES: &[&str] = &["Resource", "DomainResource"];

impl Translator {
    /// Member access `parent.name`, flattening collections.
    pub(crate) fn navigate(
        &self,
        parent: &SqlExpr,
        name: &str,
    ) -> Result<SqlExpr, TranslationError> {
        let path = format!("{}.{}", parent.path, name);
        if parent.is_null_literal() {
            return Ok(SqlExpr::empty(path));
        }

        let parent_type = parent
            .fhir_type
            .as_deref()
            .and_then(|t| TYPE_REGISTRY.resolve(t));

        if let Some(entry) = parent_type {
            if entry.is_primitive() || entry.namespace == TypeNamespace::System {
                return Err(TranslationError::invalid_operand(
                    "navigation",
                    path,
                    format!("'{}' is a primitive {} value", parent.path, entry),
                ));
            }
        }

        match parent_type {
            Some(entry) if TYPE_REGISTRY.is_modelled(entry.name) => {
                let element = TYPE_REGISTRY.element(entry.name, name).ok_or_else(|| {
                    TranslationError::UnresolvableIdentifier {
                        name: name.to_string(),
                        path: parent.path.clone(),
                    }
                })?;
                self.navigate_element(parent, &element, name, path)
            }
            _ => self.navigate_untyped(parent, name, path),
        }
    }

    fn navigate_element(
        &self,
        parent: &SqlExpr,
        element: &ResolvedElement<'_>,
        name: &str,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        if element.is_polymorphic() {
            return self.navigate_choice(parent, element, name, path);
        }

        let (sql, shape) = self.extract_key(parent, &element.json_key, element.is_collection(), &path)?;
        let fhir_type = element
            .concrete_type
            .filter(|t| !OPEN_RESOURCE_TYPES.contains(t))
            .map(str::to_string);

        Ok(parent
            .derive(sql, shape)
            .with_type(fhir_type)
            .with_path(path))
    }

    /// `value` on an element declared as `value[x]`: whichever concrete key is
    /// present. The choice is recorded so type operations can pick a key.
    fn navigate_choice(
        &self,
        parent: &SqlExpr,
        element: &ResolvedElement<'_>,
        name: &str,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let keys = element.definition.choice_keys();

        let (sql, shape) = match parent.shape {
            ValueShape::JsonArray => {
                let arrays: Vec<String> = keys
                    .iter()
                    .map(|(key, _)| {
                        let extracted =
                            d.json_extract(&parent.sql, &JsonPath::new().wildcard().field(key));
                        d.coalesce(&[extracted, d.empty_json_array()])
                    })
                    .collect();
                let concatenated = arrays
                    .into_iter()
                    .reduce(|acc, next| d.json_array_concat(&acc, &next))
                    .unwrap_or_else(|| d.empty_json_array());
                (concatenated, ValueShape::JsonArray)
            }
            ValueShape::Json => {
                let values: Vec<String> = keys
                    .iter()
                    .map(|(key, _)| d.json_extract(&parent.sql, &JsonPath::new().field(key)))
                    .collect();
                (d.coalesce(&values), ValueShape::Json)
            }
            ValueShape::Native(_) => {
                return Err(TranslationError::invalid_operand(
                    "navigation",
                    path,
                    "cannot navigate into a scalar value",
                ))
            }
        };

        let mut result = parent.derive(sql, shape).with_type(None).with_path(path);
        result.choice = Some(ChoiceInfo {
            parent: Box::new(parent.clone()),
            element: name.to_string(),
            types: element.definition.types.to_vec(),
        });
        Ok(result)
    }

    /// Navigation without a known type: read the key as-is.
    fn navigate_untyped(
        &self,
        parent: &SqlExpr,
        name: &str,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        let (sql, shape) = self.extract_key(parent, name, false, &path)?;
        Ok(parent.derive(sql, shape).with_type(None).with_path(path))
    }

    /// Read `key` from a single JSON item or from every item of a JSON array.
    pub(crate) fn extract_key(
        &self,
        parent: &SqlExpr,
        key: &str,
        repeats: bool,
        path: &str,
    ) -> Result<(String, ValueShape), TranslationError> {
        let mut json_path = match parent.shape {
            ValueShape::Json => JsonPath::new().field(key),
            ValueShape::JsonArray => JsonPath::new().wildcard().field(key),
            ValueShape::Native(_) => {
                return Err(TranslationError::invalid_operand(
                    "navigation",
                    path,
                    "cannot navigate into a scalar value",
                ))
            }
        };
        if repeats {
            json_path = json_path.wildcard();
        }
        let shape = if json_path.has_wildcard() {
            ValueShape::JsonArray
        } else {
            ValueShape::Json
        };
        Ok((self.dialect.json_extract(&parent.sql, &json_path), shape))
    }
}
