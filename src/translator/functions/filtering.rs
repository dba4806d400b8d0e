use crate::sql_dialect::{ComparisonOp, JsonPath};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

impl Translator {
    pub(super) fn filtering_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        match call.name {
            "where" => self.filter_collection(call, ctx),
            "select" => self.project_collection(call, ctx),
            "extension" => self.extensions_by_url(call, ctx),
            other => Err(call.invalid(format!("'{}' is not a filtering function", other))),
        }
    }

    /// Items of the input for which the first argument is `true`, in order.
    pub(super) fn filter_collection(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let (alias, criteria) = self.lambda_argument(call, 0, &call.input, ctx)?;
        let criteria = self.as_boolean(&criteria, call.name)?;
        let item = SqlExpr::item(&alias, None);
        let aggregate =
            self.dialect
                .json_array_agg(&item.sql, Some(&Self::ordinal(&alias)), false);

        Ok(self.collection_subquery(
            &call.input,
            &alias,
            &aggregate,
            Some(&criteria.sql),
            &[&criteria],
            ValueShape::JsonArray,
            call.input.fhir_type.clone(),
            &call.path,
            ctx,
        ))
    }

    /// `select()`: the projection of every item, flattened and in order.
    fn project_collection(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let (alias, projection) = self.lambda_argument(call, 0, &call.input, ctx)?;
        let order = Self::ordinal(&alias);

        let (aggregate, filter) = match projection.shape {
            ValueShape::JsonArray => (d.json_array_flatten_agg(&projection.sql, Some(&order)), None),
            _ => {
                let value = self.as_json_item(&projection);
                (
                    d.json_array_agg(&value.sql, Some(&order), false),
                    Some(d.is_not_null(&value.sql)),
                )
            }
        };

        Ok(self.collection_subquery(
            &call.input,
            &alias,
            &aggregate,
            filter.as_deref(),
            &[&projection],
            ValueShape::JsonArray,
            projection.fhir_type.clone(),
            &call.path,
            ctx,
        ))
    }

    /// `extension(url)`: the input's extensions whose `url` equals the argument.
    fn extensions_by_url(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let url = self.argument(call, 0, ctx)?;
        if let Some(t) = url.scalar_type() {
            if t != crate::sql_dialect::SqlType::String {
                return Err(call.invalid(format!(
                    "extension url must be a String, found {}",
                    t.system_type()
                )));
            }
        }
        let url = self.as_string(&url);

        let (sql, shape) = self.extract_key(&call.input, "extension", true, &call.path)?;
        let extensions = call
            .input
            .derive(sql, shape)
            .with_type(Some("Extension".to_string()));

        let alias = ctx.next_item_alias();
        let item = SqlExpr::item(&alias, None);
        let item_url = d.json_text(&d.json_extract(&item.sql, &JsonPath::new().field("url")));
        let filter = d.comparison(&item_url, ComparisonOp::Eq, &url.sql);
        let aggregate = d.json_array_agg(&item.sql, Some(&Self::ordinal(&alias)), false);

        Ok(self.collection_subquery(
            &extensions,
            &alias,
            &aggregate,
            Some(&filter),
            &[&url],
            ValueShape::JsonArray,
            Some("Extension".to_string()),
            &call.path,
            ctx,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::fhirpath_ast::{BinaryOperator, ExpressionNode};
    use crate::sql_dialect::{DuckDbDialect, PostgresDialect};
    use crate::translator::{Translator, TranslationError, META_FILTER};
    use std::sync::Arc;

    fn family_is(name: &str) -> ExpressionNode {
        ExpressionNode::binary(
            BinaryOperator::Equal,
            ExpressionNode::identifier("family"),
            ExpressionNode::string(name),
        )
    }

    #[test]
    fn test_where_keeps_order_and_type() {
        let ast = ExpressionNode::dotted("Patient.name").call("where", vec![family_is("Smith")]);
        let translator = Translator::new(Arc::new(DuckDbDialect::new()));
        let fragments = translator.translate(&ast).unwrap();
        let filtered = fragments.iter().find(|f| f.is_aggregate).unwrap();
        assert_eq!(
            filtered.expression,
            "to_json(list(item_1.value ORDER BY item_1.ordinal))"
        );
        assert_eq!(
            filtered.meta(META_FILTER),
            Some("(json_extract_string(json_extract(item_1.value, '$.family'), '$') = 'Smith')")
        );
        assert_eq!(
            filtered.meta(crate::translator::META_FHIR_TYPE),
            Some("HumanName")
        );
    }

    #[test]
    fn test_where_rejects_non_boolean_criteria() {
        let ast = ExpressionNode::dotted("Patient.name")
            .call("where", vec![ExpressionNode::string("yes")]);
        let err = Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(&ast)
            .unwrap_err();
        assert!(matches!(err, TranslationError::InvalidOperand { .. }));
    }

    #[test]
    fn test_nested_lambda_stays_inline() {
        // Patient.name.where(given.where($this = 'Jo').exists())
        let inner = ExpressionNode::identifier("given")
            .call(
                "where",
                vec![ExpressionNode::binary(
                    BinaryOperator::Equal,
                    ExpressionNode::variable("$this"),
                    ExpressionNode::string("Jo"),
                )],
            )
            .call("exists", vec![]);
        let ast = ExpressionNode::dotted("Patient.name").call("where", vec![inner]);
        let translator = Translator::new(Arc::new(PostgresDialect::new()));
        let fragments = translator.translate(&ast).unwrap();

        let aggregates: Vec<_> = fragments.iter().filter(|f| f.is_aggregate).collect();
        assert_eq!(aggregates.len(), 1);
        let filter = aggregates[0].meta(META_FILTER).unwrap();
        assert!(filter.contains("(SELECT jsonb_agg(item_2.value ORDER BY item_2.ordinal) FROM"));
        assert!(filter.contains("jsonb_path_query_array(item_1.value, '$.given[*]')"));
    }

    #[test]
    fn test_select_flattens_collections() {
        let ast = ExpressionNode::dotted("Patient.name")
            .call("select", vec![ExpressionNode::identifier("given")]);
        let fragments = Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(&ast)
            .unwrap();
        let projected = fragments.iter().find(|f| f.is_aggregate).unwrap();
        assert!(projected.expression.starts_with("to_json(flatten(list("));
        assert_eq!(
            projected.meta(crate::translator::META_FHIR_TYPE),
            Some("string")
        );
    }

    #[test]
    fn test_select_of_single_values_skips_empties() {
        let ast = ExpressionNode::dotted("Patient.name")
            .call("select", vec![ExpressionNode::identifier("family")]);
        let fragments = Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(&ast)
            .unwrap();
        let projected = fragments.iter().find(|f| f.is_aggregate).unwrap();
        assert_eq!(
            projected.meta(META_FILTER),
            Some("(json_extract(item_1.value, '$.family') IS NOT NULL)")
        );
    }

    #[test]
    fn test_extension_filters_by_url() {
        let ast = ExpressionNode::identifier("Patient").call(
            "extension",
            vec![ExpressionNode::string("http://example.org/race")],
        );
        let fragments = Translator::new(Arc::new(DuckDbDialect::new()))
            .translate(&ast)
            .unwrap();
        let extensions = fragments.iter().find(|f| f.is_aggregate).unwrap();
        assert_eq!(
            extensions.meta(META_FILTER),
            Some("(json_extract_string(json_extract(item_1.value, '$.url'), '$') = 'http://example.org/race')")
        );
        assert!(extensions
            .meta(crate::translator::META_UNNEST_SOURCE)
            .unwrap()
            .contains("json_extract(patient.resource, '$.extension[*]')"));
    }
}
