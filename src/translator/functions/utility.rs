use crate::sql_dialect::SqlType;

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

impl Translator {
    pub(super) fn utility_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        match call.name {
            "not" => {
                let b = self.as_boolean(&call.input, call.name)?;
                Ok(SqlExpr::composite(
                    self.dialect.not(&b.sql),
                    ValueShape::Native(SqlType::Boolean),
                    &[&call.input],
                    call.path.as_str(),
                ))
            }
            "iif" => self.iif(call, ctx),
            other => Err(call.invalid(format!("'{}' is not a utility function", other))),
        }
    }

    /// `iif(criterion, true-result[, otherwise-result])`. Only the chosen
    /// branch contributes; both branches are brought to a common shape.
    fn iif(&self, call: &Call<'_>, ctx: &mut TranslationContext) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let criterion = self.argument(call, 0, ctx)?;
        let criterion = self.as_boolean(&criterion, call.name)?;
        let then = self.argument(call, 1, ctx)?;
        let otherwise = match call.args.len() {
            3 => self.argument(call, 2, ctx)?,
            _ => SqlExpr::empty(call.path.as_str()),
        };

        let (then_sql, otherwise_sql, shape) = if otherwise.is_null_literal() {
            (then.sql.clone(), None, then.shape)
        } else if then.is_null_literal() {
            (then.sql.clone(), Some(otherwise.sql.clone()), otherwise.shape)
        } else {
            match (then.shape, otherwise.shape) {
                (ValueShape::Native(a), ValueShape::Native(b)) if a == b => {
                    (then.sql.clone(), Some(otherwise.sql.clone()), then.shape)
                }
                (ValueShape::JsonArray, _) | (_, ValueShape::JsonArray) => (
                    self.as_collection(&then).sql,
                    Some(self.as_collection(&otherwise).sql),
                    ValueShape::JsonArray,
                ),
                _ => (
                    self.as_json_item(&then).sql,
                    Some(self.as_json_item(&otherwise).sql),
                    ValueShape::Json,
                ),
            }
        };

        let sql = d.case_when(&[(criterion.sql.clone(), then_sql)], otherwise_sql.as_deref());
        let fhir_type = if otherwise.is_null_literal() {
            then.fhir_type.clone()
        } else if then.is_null_literal() || then.fhir_type == otherwise.fhir_type {
            otherwise.fhir_type.clone()
        } else {
            None
        };
        Ok(
            SqlExpr::composite(sql, shape, &[&criterion, &then, &otherwise], call.path.as_str())
                .with_type(fhir_type),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TranslatorConfig;
    use crate::fhirpath_ast::{BinaryOperator, ExpressionNode};
    use crate::sql_dialect::DuckDbDialect;
    use crate::translator::{Translator, TranslationError, META_VALUE_KIND};
    use std::sync::Arc;

    fn translator() -> Translator {
        Translator::with_config(
            Arc::new(DuckDbDialect::new()),
            TranslatorConfig {
                resource_type: Some("Patient".to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_not_negates_boolean() {
        let ast = ExpressionNode::boolean(true).call("not", vec![]);
        let fragments = translator().translate(&ast).unwrap();
        assert_eq!(fragments.last().unwrap().expression, "(NOT TRUE)");
    }

    #[test]
    fn test_iif_with_matching_natives() {
        let ast = ExpressionNode::function(
            "iif",
            vec![
                ExpressionNode::binary(
                    BinaryOperator::GreaterThan,
                    ExpressionNode::integer(2),
                    ExpressionNode::integer(1),
                ),
                ExpressionNode::string("yes"),
                ExpressionNode::string("no"),
            ],
        );
        let fragments = translator().translate(&ast).unwrap();
        assert_eq!(
            fragments.last().unwrap().expression,
            "CASE WHEN (2 > 1) THEN 'yes' ELSE 'no' END"
        );
    }

    #[test]
    fn test_iif_mixed_shapes_become_json() {
        let ast = ExpressionNode::function(
            "iif",
            vec![
                ExpressionNode::boolean(true),
                ExpressionNode::dotted("Patient.birthDate"),
                ExpressionNode::string("unknown"),
            ],
        );
        let fragments = translator().translate(&ast).unwrap();
        let result = &fragments[fragments.len() - 2];
        assert_eq!(
            result.expression,
            "CASE WHEN TRUE THEN fhirpath_cte_1.value ELSE to_json(CAST('unknown' AS VARCHAR)) END"
        );
        assert_eq!(result.meta(META_VALUE_KIND), Some("json"));
    }

    #[test]
    fn test_iif_with_input_is_rejected() {
        let ast = ExpressionNode::dotted("Patient.name").call(
            "iif",
            vec![ExpressionNode::boolean(true), ExpressionNode::integer(1)],
        );
        assert!(matches!(
            translator().translate(&ast),
            Err(TranslationError::InvalidOperand { .. })
        ));
    }
}
