use crate::sql_dialect::{AggregateFunction, ComparisonOp, SqlType};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

impl Translator {
    pub(super) fn existence_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let input = &call.input;
        let boolean = ValueShape::Native(SqlType::Boolean);

        match call.name {
            "empty" => Ok(SqlExpr::composite(
                d.not(&self.has_items(input)),
                boolean,
                &[input],
                call.path.as_str(),
            )),
            "exists" if call.args.is_empty() => Ok(SqlExpr::composite(
                self.has_items(input),
                boolean,
                &[input],
                call.path.as_str(),
            )),
            "exists" => {
                let matching = self.filter_collection(call, ctx)?;
                Ok(SqlExpr::composite(
                    self.has_items(&matching),
                    boolean,
                    &[&matching],
                    call.path.as_str(),
                ))
            }
            "all" => {
                let (alias, criteria) = self.lambda_argument(call, 0, input, ctx)?;
                let criteria = self.as_boolean(&criteria, call.name)?;
                let aggregate = d.coalesce(&[
                    d.aggregate(
                        AggregateFunction::BoolAnd,
                        &d.coalesce(&[criteria.sql.clone(), d.boolean_literal(false)]),
                        None,
                    ),
                    d.boolean_literal(true),
                ]);
                Ok(self.collection_subquery(
                    input,
                    &alias,
                    &aggregate,
                    None,
                    &[&criteria],
                    boolean,
                    None,
                    &call.path,
                    ctx,
                ))
            }
            "allTrue" | "anyTrue" | "allFalse" | "anyFalse" => {
                Ok(self.boolean_aggregate(call, ctx))
            }
            "count" => Ok(SqlExpr::composite(
                self.item_count(input),
                ValueShape::Native(SqlType::Integer),
                &[input],
                call.path.as_str(),
            )),
            "distinct" => Ok(self.distinct_items(input, &call.path, ctx)),
            "isDistinct" => {
                let distinct = self.distinct_items(input, &call.path, ctx);
                let sql = d.comparison(
                    &self.item_count(&self.as_collection(input)),
                    ComparisonOp::Eq,
                    &self.item_count(&distinct),
                );
                Ok(SqlExpr::composite(
                    sql,
                    boolean,
                    &[input, &distinct],
                    call.path.as_str(),
                ))
            }
            "hasValue" => {
                let single = self.as_singleton(input);
                Ok(SqlExpr::composite(
                    d.is_not_null(&single.sql),
                    boolean,
                    &[input],
                    call.path.as_str(),
                ))
            }
            other => Err(call.invalid(format!("'{}' is not an existence function", other))),
        }
    }

    /// `allTrue()`, `anyTrue()`, `allFalse()`, `anyFalse()`; empty input
    /// gives `true` for the `all` forms and `false` for the `any` forms.
    fn boolean_aggregate(&self, call: &Call<'_>, ctx: &mut TranslationContext) -> SqlExpr {
        let d = self.dialect.as_ref();
        let alias = ctx.next_item_alias();
        let item = self.as_native(&SqlExpr::item(&alias, None), SqlType::Boolean);

        let (function, value, when_empty) = match call.name {
            "allTrue" => (AggregateFunction::BoolAnd, item.sql.clone(), true),
            "anyTrue" => (AggregateFunction::BoolOr, item.sql.clone(), false),
            "allFalse" => (AggregateFunction::BoolAnd, d.not(&item.sql), true),
            _ => (AggregateFunction::BoolOr, d.not(&item.sql), false),
        };
        let aggregate = d.coalesce(&[
            d.aggregate(function, &value, None),
            d.boolean_literal(when_empty),
        ]);
        self.collection_subquery(
            &call.input,
            &alias,
            &aggregate,
            None,
            &[],
            ValueShape::Native(SqlType::Boolean),
            None,
            &call.path,
            ctx,
        )
    }

    pub(crate) fn distinct_items(
        &self,
        input: &SqlExpr,
        path: &str,
        ctx: &mut TranslationContext,
    ) -> SqlExpr {
        let alias = ctx.next_item_alias();
        let aggregate = self
            .dialect
            .json_array_agg(&SqlExpr::item(&alias, None).sql, None, true);
        self.collection_subquery(
            input,
            &alias,
            &aggregate,
            None,
            &[],
            ValueShape::JsonArray,
            input.fhir_type.clone(),
            path,
            ctx,
        )
    }
}
