//! `is`, `as` and `ofType()`.
//!
//! A test is decided statically whenever the operand's type is known. Choice
//! elements pick their concrete keys. Untyped JSON is checked at runtime for
//! primitive targets (JSON type plus text pattern) and resource targets
//! (`resourceType`); other complex targets never match untyped values.

use crate::fhirpath_ast::TypeSpecifier;
use crate::sql_dialect::{JsonPath, SqlType};
use crate::type_registry::{choice_key, TypeEntry, TYPE_REGISTRY};

use super::context::TranslationContext;
use super::errors::TranslationError;
use super::expr::{ChoiceInfo, SqlExpr, ValueShape};
use super::Translator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeTest {
    /// Boolean test of a single value
    Is,
    /// The single value when it has the type, else empty
    As,
    /// The items that have the type
    OfType,
}

impl Translator {
    pub(crate) fn type_operation(
        &self,
        test: TypeTest,
        operand: SqlExpr,
        specifier: &TypeSpecifier,
        path: &str,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        if operand.is_null_literal() {
            return Ok(match test {
                TypeTest::Is => SqlExpr::constant(
                    self.dialect.typed_null(SqlType::Boolean),
                    SqlType::Boolean,
                    path,
                ),
                TypeTest::As | TypeTest::OfType => SqlExpr::empty(path),
            });
        }

        let Some(target) = TYPE_REGISTRY.resolve_specifier(specifier) else {
            ctx.warn(format!(
                "Unknown type '{}' in '{}'; the test never matches",
                specifier, path
            ));
            return Ok(self.never_matches(test, &operand, path));
        };

        if let Some(choice) = operand.choice.clone() {
            return self.choice_type_operation(test, &operand, &choice, target, path);
        }

        let static_type = operand
            .fhir_type
            .as_deref()
            .and_then(|t| TYPE_REGISTRY.resolve(t));
        if let Some(actual) = static_type {
            let matches = TYPE_REGISTRY.conforms_to(actual, target);
            log::trace!("{} conforms to {}: {}", actual, target, matches);
            return Ok(self.static_type_operation(test, &operand, matches, path));
        }

        self.runtime_type_operation(test, &operand, target, path, ctx)
    }

    /// Result of a test known to fail for every non-empty input.
    fn never_matches(&self, test: TypeTest, operand: &SqlExpr, path: &str) -> SqlExpr {
        match test {
            TypeTest::Is => self.null_guarded_test(operand, self.dialect.boolean_literal(false), path),
            TypeTest::As | TypeTest::OfType => SqlExpr::empty(path),
        }
    }

    /// `CASE WHEN <operand is empty> THEN NULL ELSE <test> END`
    fn null_guarded_test(&self, operand: &SqlExpr, test: String, path: &str) -> SqlExpr {
        let d = self.dialect.as_ref();
        let single = self.as_singleton(operand);
        let sql = d.case_when(
            &[(d.is_null(&single.sql), "NULL".to_string())],
            Some(&test),
        );
        SqlExpr::composite(sql, ValueShape::Native(SqlType::Boolean), &[operand], path)
    }

    fn static_type_operation(
        &self,
        test: TypeTest,
        operand: &SqlExpr,
        matches: bool,
        path: &str,
    ) -> SqlExpr {
        if !matches {
            return self.never_matches(test, operand, path);
        }
        match test {
            TypeTest::Is => self.null_guarded_test(operand, self.dialect.boolean_literal(true), path),
            TypeTest::As => self.as_singleton(operand).with_path(path),
            TypeTest::OfType => operand.clone().with_path(path),
        }
    }

    /// Type test on a choice element: only the keys of conforming types count.
    fn choice_type_operation(
        &self,
        test: TypeTest,
        operand: &SqlExpr,
        choice: &ChoiceInfo,
        target: &TypeEntry,
        path: &str,
    ) -> Result<SqlExpr, TranslationError> {
        let keys: Vec<String> = choice
            .types
            .iter()
            .filter(|t| {
                TYPE_REGISTRY
                    .resolve(t)
                    .map_or(false, |entry| TYPE_REGISTRY.conforms_to(entry, target))
            })
            .map(|t| choice_key(&choice.element, t))
            .collect();
        if keys.is_empty() {
            return Ok(self.never_matches(test, operand, path));
        }

        let d = self.dialect.as_ref();
        match test {
            TypeTest::Is => {
                let parent = self.as_singleton(&choice.parent);
                let present: Vec<String> = keys
                    .iter()
                    .map(|key| {
                        d.is_not_null(&d.json_extract(&parent.sql, &JsonPath::new().field(key)))
                    })
                    .collect();
                let any = present
                    .into_iter()
                    .reduce(|acc, next| d.or(&acc, &next))
                    .unwrap_or_else(|| d.boolean_literal(false));
                Ok(self
                    .null_guarded_test(operand, any, path)
                    .merge_tables(&parent))
            }
            TypeTest::As | TypeTest::OfType => {
                let value = self.choice_elements(choice, &keys, path)?;
                let value = match test {
                    TypeTest::As => self.as_singleton(&value),
                    _ => value,
                };
                Ok(value.with_path(path))
            }
        }
    }

    /// The values of the given concrete keys of a choice element.
    pub(crate) fn choice_elements(
        &self,
        choice: &ChoiceInfo,
        keys: &[String],
        path: &str,
    ) -> Result<SqlExpr, TranslationError> {
        let mut values = keys
            .iter()
            .map(|key| self.navigate(&choice.parent, key))
            .collect::<Result<Vec<_>, _>>()?;

        let value = if values.len() == 1 {
            values.remove(0)
        } else if values.iter().all(|v| v.shape == ValueShape::Json) {
            let parts: Vec<&SqlExpr> = values.iter().collect();
            let sqls: Vec<String> = values.iter().map(|v| v.sql.clone()).collect();
            SqlExpr::composite(self.dialect.coalesce(&sqls), ValueShape::Json, &parts, path)
        } else {
            let mut iter = values.into_iter();
            let first = iter.next().unwrap_or_else(|| SqlExpr::empty(path));
            iter.fold(first, |acc, next| {
                self.combine_collections(&acc, &next, path.to_string())
            })
        };
        Ok(value)
    }

    /// Type test decided by the database from the JSON value itself.
    fn runtime_type_operation(
        &self,
        test: TypeTest,
        operand: &SqlExpr,
        target: &TypeEntry,
        path: &str,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        if self.runtime_check(&operand.sql, target).is_none() {
            ctx.warn(format!(
                "'{}' cannot be checked on an untyped value in '{}'; the test never matches",
                target, path
            ));
            return Ok(self.never_matches(test, operand, path));
        }

        let d = self.dialect.as_ref();
        let target_type = Some(target.qualified_name());
        match test {
            TypeTest::Is => {
                let single = self.as_json_item(operand);
                let check = self.runtime_check(&single.sql, target).unwrap_or_default();
                let test = d.coalesce(&[check, d.boolean_literal(false)]);
                Ok(self.null_guarded_test(operand, test, path))
            }
            TypeTest::As => {
                let single = self.as_json_item(operand);
                let check = self.runtime_check(&single.sql, target).unwrap_or_default();
                let sql = d.case_when(&[(check, single.sql.clone())], None);
                Ok(single
                    .derive(sql, ValueShape::Json)
                    .with_type(target_type)
                    .with_path(path))
            }
            TypeTest::OfType => {
                let alias = ctx.next_item_alias();
                let item = SqlExpr::item(&alias, None);
                let filter = self.runtime_check(&item.sql, target).unwrap_or_default();
                let aggregate =
                    d.json_array_agg(&item.sql, Some(&Self::ordinal(&alias)), false);
                Ok(self.collection_subquery(
                    operand,
                    &alias,
                    &aggregate,
                    Some(&filter),
                    &[],
                    ValueShape::JsonArray,
                    target_type,
                    path,
                    ctx,
                ))
            }
        }
    }

    /// Predicate testing whether a JSON item is of `target`; `None` when the
    /// type cannot be checked at runtime.
    fn runtime_check(&self, json: &str, target: &TypeEntry) -> Option<String> {
        if target.is_resource() {
            let d = self.dialect.as_ref();
            let names: Vec<String> = TYPE_REGISTRY
                .resource_types_conforming_to(target)
                .into_iter()
                .map(|name| d.string_literal(name))
                .collect();
            let resource_type = d.json_text(&d.json_extract(json, &JsonPath::new().field("resourceType")));
            return Some(d.in_list(&resource_type, &names));
        }
        self.dialect.json_type_check(json, target)
    }
}
