use crate::sql_dialect::{AggregateFunction, SqlType};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

impl Translator {
    /// `sum()`, `min()`, `max()` and `avg()` over the items of the input.
    pub(super) fn aggregate_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let item_type = call.input.scalar_type();
        let numeric_only = matches!(call.name, "sum" | "avg");
        if let Some(t) = item_type {
            if numeric_only && !t.is_numeric() {
                return Err(call.invalid(format!("expected numbers, found {}", t.system_type())));
            }
            if t == SqlType::Boolean {
                return Err(call.invalid("Boolean values are not ordered"));
            }
        }
        let item_type = item_type.unwrap_or(SqlType::Decimal);

        let alias = ctx.next_item_alias();
        let item = SqlExpr::item(&alias, call.input.fhir_type.clone());
        let value = self.as_native(&item, item_type);

        let (aggregate, result_type) = match call.name {
            "sum" => (
                d.cast(
                    &d.coalesce(&[
                        d.aggregate(AggregateFunction::Sum, &value.sql, None),
                        "0".to_string(),
                    ]),
                    item_type,
                ),
                item_type,
            ),
            "min" => (d.aggregate(AggregateFunction::Min, &value.sql, None), item_type),
            "max" => (d.aggregate(AggregateFunction::Max, &value.sql, None), item_type),
            "avg" => (
                d.cast(&d.aggregate(AggregateFunction::Avg, &value.sql, None), SqlType::Decimal),
                SqlType::Decimal,
            ),
            other => return Err(call.invalid(format!("'{}' is not an aggregate function", other))),
        };

        Ok(self.collection_subquery(
            &call.input,
            &alias,
            &aggregate,
            None,
            &[],
            ValueShape::Native(result_type),
            None,
            &call.path,
            ctx,
        ))
    }
}
