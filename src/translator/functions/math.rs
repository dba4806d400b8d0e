use crate::sql_dialect::{ComparisonOp, MathFunction, SqlType};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

/// Largest argument `exp()` accepts without overflowing a double
const MAX_EXP_ARGUMENT: &str = "709";
/// Below this `exp()` underflows; the result is taken as zero
const MIN_EXP_ARGUMENT: &str = "-708";

impl Translator {
    pub(super) fn math_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let x = self.numeric_operand(call, &call.input)?;
        let input_type = x.scalar_type().unwrap_or(SqlType::Decimal);
        let decimal = self.as_native(&x, SqlType::Decimal);

        let (sql, result_type, extra) = match call.name {
            "abs" => (d.math_function(MathFunction::Abs, &x.sql), input_type, None),
            "ceiling" | "floor" | "truncate" => {
                let function = match call.name {
                    "ceiling" => MathFunction::Ceiling,
                    "floor" => MathFunction::Floor,
                    _ => MathFunction::Truncate,
                };
                let sql = d.cast(&d.math_function(function, &x.sql), SqlType::Integer);
                (sql, SqlType::Integer, None)
            }
            "round" => {
                let precision = if call.args.is_empty() {
                    SqlExpr::constant("0", SqlType::Integer, "0")
                } else {
                    let arg = self.argument(call, 0, ctx)?;
                    self.as_native(&self.numeric_operand(call, &arg)?, SqlType::Integer)
                };
                let sql = d.case_when(
                    &[(
                        d.comparison(&precision.sql, ComparisonOp::Lt, "0"),
                        "NULL".to_string(),
                    )],
                    Some(&d.round(&decimal.sql, &precision.sql)),
                );
                (sql, SqlType::Decimal, Some(precision))
            }
            "sqrt" => (
                self.guarded(
                    &d.comparison(&decimal.sql, ComparisonOp::Lt, "0"),
                    &d.math_function(MathFunction::Sqrt, &decimal.sql),
                ),
                SqlType::Decimal,
                None,
            ),
            "ln" => (
                self.guarded(
                    &d.comparison(&decimal.sql, ComparisonOp::LtEq, "0"),
                    &d.math_function(MathFunction::Ln, &decimal.sql),
                ),
                SqlType::Decimal,
                None,
            ),
            "exp" => (
                self.exp_bounded(&decimal.sql, &d.math_function(MathFunction::Exp, &decimal.sql)),
                SqlType::Decimal,
                None,
            ),
            "log" => {
                let base = self.argument(call, 0, ctx)?;
                let base = self.as_native(&self.numeric_operand(call, &base)?, SqlType::Decimal);
                let invalid = d.or(
                    &d.or(
                        &d.comparison(&decimal.sql, ComparisonOp::LtEq, "0"),
                        &d.comparison(&base.sql, ComparisonOp::LtEq, "0"),
                    ),
                    &d.comparison(&base.sql, ComparisonOp::Eq, "1"),
                );
                let sql = self.guarded(&invalid, &d.log(&decimal.sql, &base.sql));
                (sql, SqlType::Decimal, Some(base))
            }
            "power" => {
                let exponent = self.argument(call, 0, ctx)?;
                let exponent =
                    self.as_native(&self.numeric_operand(call, &exponent)?, SqlType::Decimal);
                let invalid = d.or(
                    &d.and(
                        &d.comparison(&decimal.sql, ComparisonOp::Eq, "0"),
                        &d.comparison(&exponent.sql, ComparisonOp::Lt, "0"),
                    ),
                    &d.and(
                        &d.comparison(&decimal.sql, ComparisonOp::Lt, "0"),
                        &d.comparison(
                            &exponent.sql,
                            ComparisonOp::NotEq,
                            &d.math_function(MathFunction::Floor, &exponent.sql),
                        ),
                    ),
                );
                // log of |base ^ exponent|; base 0 reads as 1 so ln never sees 0
                let magnitude = d.arithmetic(
                    &exponent.sql,
                    "*",
                    &d.math_function(
                        MathFunction::Ln,
                        &d.case_when(
                            &[(
                                d.comparison(&decimal.sql, ComparisonOp::Eq, "0"),
                                "1".to_string(),
                            )],
                            Some(&d.math_function(MathFunction::Abs, &decimal.sql)),
                        ),
                    ),
                );
                let power = d.power(&decimal.sql, &exponent.sql);
                let finite = d.case_when(&[(d.is_finite(&power), power.clone())], None);
                (
                    self.guarded(&invalid, &self.exp_bounded(&magnitude, &finite)),
                    SqlType::Decimal,
                    Some(exponent),
                )
            }
            other => return Err(call.invalid(format!("'{}' is not a math function", other))),
        };

        let mut parts = vec![&call.input];
        if let Some(extra) = extra.as_ref() {
            parts.push(extra);
        }
        Ok(SqlExpr::composite(
            sql,
            ValueShape::Native(result_type),
            &parts,
            call.path.as_str(),
        ))
    }

    /// A numeric operand; values statically known to be non-numeric are rejected.
    fn numeric_operand(&self, call: &Call<'_>, value: &SqlExpr) -> Result<SqlExpr, TranslationError> {
        match value.scalar_type() {
            Some(t) if !t.is_numeric() => Err(call.invalid(format!(
                "expected a number, found {}",
                t.system_type()
            ))),
            _ => Ok(self.as_scalar(value, SqlType::Decimal)),
        }
    }

    /// `value` for a result whose natural log is `magnitude`: empty when it
    /// would overflow a double, zero when it would underflow.
    fn exp_bounded(&self, magnitude: &str, value: &str) -> String {
        let d = self.dialect.as_ref();
        d.case_when(
            &[
                (
                    d.comparison(magnitude, ComparisonOp::Gt, MAX_EXP_ARGUMENT),
                    "NULL".to_string(),
                ),
                (
                    d.comparison(magnitude, ComparisonOp::Lt, MIN_EXP_ARGUMENT),
                    d.decimal_literal("0.0"),
                ),
            ],
            Some(value),
        )
    }

    /// `CASE WHEN invalid THEN NULL ELSE value END`
    fn guarded(&self, invalid: &str, value: &str) -> String {
        self.dialect
            .case_when(&[(invalid.to_string(), "NULL".to_string())], Some(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TranslatorConfig;
    use crate::fhirpath_ast::ExpressionNode;
    use crate::sql_dialect::DuckDbDialect;
    use crate::translator::{Translator, TranslationError};
    use std::sync::Arc;

    fn translator() -> Translator {
        Translator::with_config(
            Arc::new(DuckDbDialect::new()),
            TranslatorConfig {
                resource_type: Some("Observation".to_string()),
                ..Default::default()
            },
        )
    }

    fn result(ast: &ExpressionNode) -> String {
        translator()
            .translate(ast)
            .unwrap()
            .last()
            .unwrap()
            .expression
            .clone()
    }

    #[test]
    fn test_sqrt_of_negative_is_empty() {
        let ast = ExpressionNode::negate(ExpressionNode::integer(4)).call("sqrt", vec![]);
        assert_eq!(
            result(&ast),
            "CASE WHEN (CAST((-4) AS DOUBLE) < 0) THEN NULL ELSE sqrt(CAST((-4) AS DOUBLE)) END"
        );
    }

    #[test]
    fn test_ceiling_returns_integer() {
        let ast = ExpressionNode::decimal("1.1").call("ceiling", vec![]);
        assert_eq!(result(&ast), "CAST(ceil(CAST(1.1 AS DOUBLE)) AS BIGINT)");
    }

    #[test]
    fn test_power_guards_domain() {
        let ast = ExpressionNode::integer(0).call("power", vec![ExpressionNode::integer(0)]);
        let sql = result(&ast);
        assert!(sql.contains("((CAST(0 AS DOUBLE) = 0) AND (CAST(0 AS DOUBLE) < 0))"), "{}", sql);
        assert!(sql.contains("isfinite(pow(CAST(0 AS DOUBLE), CAST(0 AS DOUBLE)))"));
    }

    #[test]
    fn test_power_guards_overflow_before_evaluating() {
        let ast = ExpressionNode::integer(10).call("power", vec![ExpressionNode::integer(400)]);
        let sql = result(&ast);
        let guard = "((CAST(400 AS DOUBLE) * ln(CASE WHEN (CAST(10 AS DOUBLE) = 0) THEN 1 \
                     ELSE abs(CAST(10 AS DOUBLE)) END)) > 709) THEN NULL";
        assert!(sql.contains(guard), "{}", sql);
        assert!(sql.contains("< -708) THEN CAST(0.0 AS DOUBLE)"), "{}", sql);
        assert!(sql.find(guard) < sql.find("pow("), "{}", sql);
    }

    #[test]
    fn test_exp_bounds_argument() {
        let ast = ExpressionNode::integer(800).call("exp", vec![]);
        assert_eq!(
            result(&ast),
            "CASE WHEN (CAST(800 AS DOUBLE) > 709) THEN NULL \
             WHEN (CAST(800 AS DOUBLE) < -708) THEN CAST(0.0 AS DOUBLE) \
             ELSE exp(CAST(800 AS DOUBLE)) END"
        );
    }

    #[test]
    fn test_log_rejects_base_one() {
        let ast = ExpressionNode::integer(8).call("log", vec![ExpressionNode::integer(2)]);
        let sql = result(&ast);
        assert!(sql.contains("(CAST(2 AS DOUBLE) = 1)"));
        assert!(sql.contains("(ln(CAST(8 AS DOUBLE)) / ln(CAST(2 AS DOUBLE)))"));
    }

    #[test]
    fn test_math_on_string_is_rejected() {
        let ast = ExpressionNode::string("a").call("abs", vec![]);
        assert!(matches!(
            translator().translate(&ast),
            Err(TranslationError::InvalidOperand { .. })
        ));
    }
}
