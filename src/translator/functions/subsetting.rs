use crate::sql_dialect::{ComparisonOp, SqlType};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

impl Translator {
    pub(super) fn subsetting_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let input = &call.input;

        match call.name {
            "first" => {
                if input.shape != ValueShape::JsonArray {
                    return Ok(input.clone().with_path(call.path.as_str()));
                }
                let zero = SqlExpr::constant("0", SqlType::Integer, "0");
                Ok(self.element_at(input, &zero, call.path.clone()))
            }
            "last" => {
                if input.shape != ValueShape::JsonArray {
                    return Ok(input.clone().with_path(call.path.as_str()));
                }
                let count = self.item_count(input);
                let sql = d.case_when(
                    &[(
                        d.comparison(&count, ComparisonOp::Gt, "0"),
                        d.json_array_element(&input.sql, &d.arithmetic(&count, "-", "1")),
                    )],
                    None,
                );
                Ok(input
                    .derive(sql, ValueShape::Json)
                    .with_path(call.path.as_str()))
            }
            "single" => Ok(self.as_singleton(input).with_path(call.path.as_str())),
            "tail" => {
                let one = SqlExpr::constant("1", SqlType::Integer, "1");
                Ok(self.skip_items(input, &one, &call.path))
            }
            "skip" => {
                let count = self.count_argument(call, ctx)?;
                Ok(self.skip_items(input, &count, &call.path))
            }
            "take" => {
                let count = self.count_argument(call, ctx)?;
                let n = self.as_native(&count, SqlType::Integer);
                let array = self.as_collection(input);
                let sql = d.case_when(
                    &[
                        (d.is_null(&n.sql), "NULL".to_string()),
                        (d.comparison(&n.sql, ComparisonOp::LtEq, "0"), "NULL".to_string()),
                    ],
                    Some(&d.json_array_slice(&array.sql, "0", Some(&n.sql))),
                );
                Ok(SqlExpr::composite(sql, ValueShape::JsonArray, &[input, &count], call.path.as_str())
                    .with_type(input.fhir_type.clone()))
            }
            other => Err(call.invalid(format!("'{}' is not a subsetting function", other))),
        }
    }

    /// Integer argument of `skip()` / `take()`.
    fn count_argument(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let count = self.argument(call, 0, ctx)?;
        match count.scalar_type() {
            None | Some(SqlType::Integer) => Ok(count),
            Some(other) => Err(call.invalid(format!(
                "expected an Integer argument, found {}",
                other.system_type()
            ))),
        }
    }

    /// All items after the first `count`; the whole input for `count <= 0`.
    fn skip_items(&self, input: &SqlExpr, count: &SqlExpr, path: &str) -> SqlExpr {
        let d = self.dialect.as_ref();
        let n = self.as_native(count, SqlType::Integer);
        let array = self.as_collection(input);
        let sql = d.case_when(
            &[
                (d.is_null(&n.sql), "NULL".to_string()),
                (d.comparison(&n.sql, ComparisonOp::LtEq, "0"), array.sql.clone()),
            ],
            Some(&d.json_array_slice(&array.sql, &n.sql, None)),
        );
        SqlExpr::composite(sql, ValueShape::JsonArray, &[input, count], path)
            .with_type(input.fhir_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use crate::fhirpath_ast::ExpressionNode;
    use crate::sql_dialect::{DuckDbDialect, PostgresDialect};
    use crate::translator::{SqlFragment, Translator, TranslationError, META_VALUE_KIND};
    use std::sync::Arc;

    fn translate(ast: &ExpressionNode) -> Vec<SqlFragment> {
        Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(ast)
            .unwrap()
    }

    fn result_of(fragments: &[SqlFragment]) -> &SqlFragment {
        &fragments[fragments.len() - 2]
    }

    #[test]
    fn test_first_reads_index_zero() {
        let fragments = translate(&ExpressionNode::dotted("Patient.name").call("first", vec![]));
        let first = result_of(&fragments);
        assert!(first.expression.contains("json_extract(fhirpath_cte_1.value, '$[0]')"));
        assert_eq!(first.meta(META_VALUE_KIND), Some("json"));
        assert_eq!(first.meta(crate::translator::META_FHIR_TYPE), Some("HumanName"));
    }

    #[test]
    fn test_first_of_single_value_is_identity() {
        let fragments = translate(&ExpressionNode::dotted("Patient.birthDate").call("first", vec![]));
        // birthDate, then the terminal fragment
        assert_eq!(fragments.len(), 2);
    }

    #[test]
    fn test_last_uses_count_minus_one() {
        let fragments = translate(&ExpressionNode::dotted("Patient.name").call("last", vec![]));
        let last = result_of(&fragments);
        assert!(last.expression.starts_with("CASE WHEN (COALESCE(json_array_length(fhirpath_cte_1.value), 0) > 0)"));
        assert!(last.expression.contains("- 1)"));
    }

    #[test]
    fn test_skip_and_take_guard_counts() {
        let skip = translate(
            &ExpressionNode::dotted("Patient.name").call("skip", vec![ExpressionNode::integer(2)]),
        );
        let sql = &result_of(&skip).expression;
        assert!(sql.contains("WHEN (2 <= 0) THEN fhirpath_cte_1.value"), "{}", sql);
        assert!(sql.contains("list_slice("));

        let translator = Translator::new(Arc::new(PostgresDialect::new()));
        let take = translator
            .translate(&ExpressionNode::dotted("Patient.name").call("take", vec![ExpressionNode::integer(1)]))
            .unwrap();
        let sql = &result_of(&take).expression;
        assert!(sql.contains("WHEN (1 <= 0) THEN NULL"));
        assert!(sql.contains("e.ordinality > 0 AND e.ordinality <= 1"));
    }

    #[test]
    fn test_take_rejects_string_count() {
        let err = Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(
                &ExpressionNode::dotted("Patient.name").call("take", vec![ExpressionNode::string("2")]),
            )
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidOperand { .. }));
    }

    #[test]
    fn test_tail_skips_one() {
        let fragments = translate(&ExpressionNode::dotted("Patient.name.given").call("tail", vec![]));
        assert!(result_of(&fragments).expression.contains("WHEN (1 <= 0)"));
    }
}
