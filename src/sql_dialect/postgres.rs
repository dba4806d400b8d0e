//! PostgreSQL spelling of the dialect primitives.
//!
//! JSON values are `jsonb`. Simple paths use the `->` operators; wildcard
//! paths go through `jsonb_path_query_array`, whose lax mode also flattens
//! nested arrays.

use super::{
    AggregateFunction, ComparisonOp, Dialect, DialectKind, JsonPath, MathFunction, PathSegment,
    SqlType,
};
use crate::type_registry::TypeEntry;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    fn type_name(sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::String => "TEXT",
            SqlType::Integer => "BIGINT",
            SqlType::Decimal => "NUMERIC",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::DateTime => "TIMESTAMPTZ",
            SqlType::Time => "TIME",
        }
    }

    fn as_double(expr: &str) -> String {
        format!("CAST({} AS DOUBLE PRECISION)", expr)
    }

    /// BIGINT from text matching `pattern`; NULL when it does not match or
    /// is out of range.
    fn text_to_bigint(&self, text: &str, pattern: &str) -> String {
        let numeric = format!("CAST({} AS NUMERIC)", text);
        format!(
            "CASE WHEN {} ~ {} THEN CASE WHEN {} BETWEEN {} AND {} THEN CAST({} AS BIGINT) END END",
            text,
            self.string_literal(pattern),
            numeric,
            i64::MIN,
            i64::MAX,
            numeric
        )
    }
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::PostgreSql
    }

    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn integer_literal(&self, value: i64) -> String {
        if value < 0 {
            format!("({})", value)
        } else {
            value.to_string()
        }
    }

    fn decimal_literal(&self, text: &str) -> String {
        format!("{}::numeric", text)
    }

    fn boolean_literal(&self, value: bool) -> String {
        let literal = if value { "true" } else { "false" };
        literal.to_string()
    }

    fn date_literal(&self, text: &str) -> String {
        format!("'{}'::date", text)
    }

    fn datetime_literal(&self, text: &str) -> String {
        format!("'{}'::timestamptz", text)
    }

    fn time_literal(&self, text: &str) -> String {
        format!("'{}'::time", text)
    }

    fn typed_null(&self, sql_type: SqlType) -> String {
        format!("NULL::{}", Self::type_name(sql_type).to_lowercase())
    }

    fn json_extract(&self, json: &str, path: &JsonPath) -> String {
        if path.is_empty() {
            return json.to_string();
        }
        if path.has_wildcard() {
            return format!(
                "jsonb_path_query_array({}, '{}')",
                json,
                path.to_json_path_text()
            );
        }
        let mut sql = json.to_string();
        for segment in &path.segments {
            match segment {
                PathSegment::Field(name) => sql = format!("{} -> '{}'", sql, name),
                PathSegment::Index(i) => sql = format!("{} -> {}", sql, i),
                PathSegment::Wildcard => {}
            }
        }
        format!("({})", sql)
    }

    fn json_to_native(&self, json: &str, sql_type: SqlType) -> String {
        let text = self.json_text(json);
        match sql_type {
            SqlType::Integer => self.text_to_bigint(&text, r"^[+-]?[0-9]+(\.0+)?$"),
            other => self.try_cast_text(&text, other),
        }
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_jsonb({})", expr)
    }

    fn json_text(&self, json: &str) -> String {
        format!("({} #>> '{{}}')", json)
    }

    fn json_array_length(&self, json: &str) -> String {
        format!("jsonb_array_length({})", json)
    }

    fn json_array_element(&self, json: &str, index: &str) -> String {
        format!("({} -> CAST({} AS INTEGER))", json, index)
    }

    fn json_build_array(&self, items: &[String]) -> String {
        format!("jsonb_build_array({})", items.join(", "))
    }

    fn empty_json_array(&self) -> String {
        "'[]'::jsonb".to_string()
    }

    fn json_array_concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn json_array_contains(&self, array: &str, item: &str) -> String {
        format!("({} @> jsonb_build_array({}))", array, item)
    }

    fn json_array_slice(&self, array: &str, start: &str, end: Option<&str>) -> String {
        let upper = end
            .map(|end| format!(" AND e.ordinality <= {}", end))
            .unwrap_or_default();
        format!(
            "(SELECT jsonb_agg(e.value ORDER BY e.ordinality) FROM jsonb_array_elements({}) WITH ORDINALITY AS e(value, ordinality) WHERE e.ordinality > {}{})",
            array, start, upper
        )
    }

    fn json_is_array(&self, json: &str) -> String {
        format!("(jsonb_typeof({}) = 'array')", json)
    }

    fn json_type_check(&self, json: &str, entry: &TypeEntry) -> Option<String> {
        let rendering = entry.renderings.postgresql?;
        let tags: Vec<String> = rendering
            .json_types
            .iter()
            .map(|t| self.string_literal(t))
            .collect();
        let tag_check = format!("(jsonb_typeof({}) IN ({}))", json, tags.join(", "));
        Some(match rendering.text_pattern {
            Some(pattern) => format!(
                "({} AND {} ~ {})",
                tag_check,
                self.json_text(json),
                self.string_literal(pattern)
            ),
            None => tag_check,
        })
    }

    fn unnest_json_array(&self, array: &str, alias: &str) -> String {
        format!(
            "(SELECT e.value, e.ordinality - 1 AS ordinal FROM jsonb_array_elements({}) WITH ORDINALITY AS e(value, ordinality)) AS {}",
            array, alias
        )
    }

    fn json_array_agg(&self, value: &str, order_by: Option<&str>, distinct: bool) -> String {
        match (distinct, order_by) {
            (true, _) => format!("jsonb_agg(DISTINCT {})", value),
            (false, Some(order)) => format!("jsonb_agg({} ORDER BY {})", value, order),
            (false, None) => format!("jsonb_agg({})", value),
        }
    }

    fn json_array_flatten_agg(&self, value: &str, order_by: Option<&str>) -> String {
        let order = order_by
            .map(|o| format!(" ORDER BY {}", o))
            .unwrap_or_default();
        format!(
            "jsonb_path_query_array(jsonb_agg({}{}) FILTER (WHERE {} IS NOT NULL), '$[*][*]')",
            value, order, value
        )
    }

    fn aggregate(&self, function: AggregateFunction, expr: &str, filter: Option<&str>) -> String {
        let name = match function {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::BoolAnd => "bool_and",
            AggregateFunction::BoolOr => "bool_or",
        };
        match filter {
            Some(filter) => format!("{}({}) FILTER (WHERE {})", name, expr, filter),
            None => format!("{}({})", name, expr),
        }
    }

    fn string_agg(&self, expr: &str, separator: &str, order_by: Option<&str>) -> String {
        match order_by {
            Some(order) => format!("string_agg({}, {} ORDER BY {})", expr, separator, order),
            None => format!("string_agg({}, {})", expr, separator),
        }
    }

    fn concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("substr({}, {}, {})", expr, start, length),
            None => format!("substr({}, {})", expr, start),
        }
    }

    fn string_position(&self, haystack: &str, needle: &str) -> String {
        format!("strpos({}, {})", haystack, needle)
    }

    fn string_length(&self, expr: &str) -> String {
        format!("char_length({})", expr)
    }

    fn upper(&self, expr: &str) -> String {
        format!("upper({})", expr)
    }

    fn lower(&self, expr: &str) -> String {
        format!("lower({})", expr)
    }

    fn trim(&self, expr: &str) -> String {
        format!("btrim({})", expr)
    }

    fn starts_with(&self, expr: &str, prefix: &str) -> String {
        format!("(left({}, char_length({})) = {})", expr, prefix, prefix)
    }

    fn ends_with(&self, expr: &str, suffix: &str) -> String {
        format!("(right({}, char_length({})) = {})", expr, suffix, suffix)
    }

    fn string_contains(&self, expr: &str, needle: &str) -> String {
        format!("(strpos({}, {}) > 0)", expr, needle)
    }

    fn string_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("replace({}, {}, {})", expr, pattern, substitution)
    }

    fn regex_match(&self, expr: &str, pattern: &str, full: bool) -> String {
        if full {
            format!("({} ~ ('^(?:' || {} || ')$'))", expr, pattern)
        } else {
            format!("({} ~ {})", expr, pattern)
        }
    }

    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("regexp_replace({}, {}, {}, 'g')", expr, pattern, substitution)
    }

    fn cast(&self, expr: &str, sql_type: SqlType) -> String {
        format!("CAST({} AS {})", expr, Self::type_name(sql_type))
    }

    fn try_cast_text(&self, text: &str, sql_type: SqlType) -> String {
        let guard = match sql_type {
            SqlType::String => return text.to_string(),
            SqlType::Integer => return self.text_to_bigint(text, r"^[+-]?[0-9]+$"),
            SqlType::Decimal => r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)$",
            SqlType::Boolean => r"^(true|false|t|f)$",
            SqlType::Date => r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$",
            SqlType::DateTime => r"^[0-9]{4}-[0-9]{2}-[0-9]{2}([T ][0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?)?(Z|[+-][0-9]{2}:[0-9]{2})?$",
            SqlType::Time => r"^[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?$",
        };
        format!(
            "CASE WHEN {} ~* {} THEN CAST({} AS {}) END",
            text,
            self.string_literal(guard),
            text,
            Self::type_name(sql_type)
        )
    }

    fn math_function(&self, function: MathFunction, expr: &str) -> String {
        match function {
            MathFunction::Abs => format!("abs({})", expr),
            MathFunction::Ceiling => format!("ceil({})", expr),
            MathFunction::Floor => format!("floor({})", expr),
            MathFunction::Truncate => format!("trunc({})", expr),
            MathFunction::Sqrt => format!("sqrt({})", Self::as_double(expr)),
            MathFunction::Exp => format!("exp({})", Self::as_double(expr)),
            MathFunction::Ln => format!("ln({})", Self::as_double(expr)),
        }
    }

    fn power(&self, base: &str, exponent: &str) -> String {
        format!("power({}, {})", Self::as_double(base), Self::as_double(exponent))
    }

    fn log(&self, value: &str, base: &str) -> String {
        format!(
            "(ln({}) / ln({}))",
            Self::as_double(value),
            Self::as_double(base)
        )
    }

    fn round(&self, expr: &str, precision: &str) -> String {
        format!("round(CAST({} AS NUMERIC), {})", expr, precision)
    }

    fn is_finite(&self, expr: &str) -> String {
        format!(
            "({} NOT IN ('Infinity'::float8, '-Infinity'::float8, 'NaN'::float8))",
            Self::as_double(expr)
        )
    }

    fn integer_divide(&self, left: &str, right: &str) -> String {
        format!("div({}, {})", left, right)
    }

    fn modulo(&self, left: &str, right: &str) -> String {
        format!("mod({}, {})", left, right)
    }

    fn widen_integer(&self, expr: &str) -> String {
        format!("CAST({} AS NUMERIC)", expr)
    }

    fn arithmetic(&self, left: &str, operator: &str, right: &str) -> String {
        format!("({} {} {})", left, operator, right)
    }

    fn comparison(&self, left: &str, op: ComparisonOp, right: &str) -> String {
        format!("({} {} {})", left, op.symbol(), right)
    }

    fn and(&self, left: &str, right: &str) -> String {
        format!("({} AND {})", left, right)
    }

    fn or(&self, left: &str, right: &str) -> String {
        format!("({} OR {})", left, right)
    }

    fn not(&self, expr: &str) -> String {
        format!("(NOT {})", expr)
    }

    fn is_null(&self, expr: &str) -> String {
        format!("({} IS NULL)", expr)
    }

    fn is_not_null(&self, expr: &str) -> String {
        format!("({} IS NOT NULL)", expr)
    }

    fn case_when(&self, branches: &[(String, String)], otherwise: Option<&str>) -> String {
        let mut sql = String::from("CASE");
        for (condition, value) in branches {
            sql.push_str(&format!(" WHEN {} THEN {}", condition, value));
        }
        if let Some(otherwise) = otherwise {
            sql.push_str(&format!(" ELSE {}", otherwise));
        }
        sql.push_str(" END");
        sql
    }

    fn coalesce(&self, exprs: &[String]) -> String {
        format!("COALESCE({})", exprs.join(", "))
    }

    fn nullif(&self, expr: &str, value: &str) -> String {
        format!("NULLIF({}, {})", expr, value)
    }

    fn in_list(&self, expr: &str, items: &[String]) -> String {
        format!("({} IN ({}))", expr, items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::TYPE_REGISTRY;

    #[test]
    fn test_literals() {
        let d = PostgresDialect::new();
        assert_eq!(d.date_literal("2020-01-01"), "'2020-01-01'::date");
        assert_eq!(d.decimal_literal("1.5"), "1.5::numeric");
        assert_eq!(d.typed_null(SqlType::String), "NULL::text");
        assert_eq!(d.widen_integer("x"), "CAST(x AS NUMERIC)");
    }

    #[test]
    fn test_simple_path_uses_arrow_operators() {
        let d = PostgresDialect::new();
        let path = JsonPath::new().field("name").index(0).field("family");
        assert_eq!(
            d.json_extract("patient.resource", &path),
            "(patient.resource -> 'name' -> 0 -> 'family')"
        );
    }

    #[test]
    fn test_wildcard_path_uses_jsonpath() {
        let d = PostgresDialect::new();
        let path = JsonPath::new().field("name").wildcard().field("given").wildcard();
        assert_eq!(
            d.json_extract("patient.resource", &path),
            "jsonb_path_query_array(patient.resource, '$.name[*].given[*]')"
        );
    }

    #[test]
    fn test_unnest_with_ordinality_is_zero_based() {
        let sql = PostgresDialect::new().unnest_json_array("c.value", "item");
        assert!(sql.contains("jsonb_array_elements(c.value) WITH ORDINALITY"));
        assert!(sql.contains("e.ordinality - 1 AS ordinal"));
    }

    #[test]
    fn test_integer_type_check_adds_text_pattern() {
        let d = PostgresDialect::new();
        let integer = TYPE_REGISTRY.resolve("Integer").unwrap();
        assert_eq!(
            d.json_type_check("x", integer).unwrap(),
            "((jsonb_typeof(x) IN ('number')) AND (x #>> '{}') ~ '^-?[0-9]+$')"
        );
    }

    #[test]
    fn test_json_to_native_never_casts_unchecked_text() {
        let d = PostgresDialect::new();
        assert_eq!(
            d.json_to_native("x", SqlType::DateTime),
            "CASE WHEN (x #>> '{}') ~* '^[0-9]{4}-[0-9]{2}-[0-9]{2}([T ][0-9]{2}:[0-9]{2}(:[0-9]{2}(\\.[0-9]+)?)?)?(Z|[+-][0-9]{2}:[0-9]{2})?$' \
             THEN CAST((x #>> '{}') AS TIMESTAMPTZ) END"
        );
        assert!(d
            .json_to_native("x", SqlType::Boolean)
            .starts_with("CASE WHEN (x #>> '{}') ~* '^(true|false|t|f)$' THEN "));
        assert_eq!(d.json_to_native("x", SqlType::String), "(x #>> '{}')");
    }

    #[test]
    fn test_integer_conversion_checks_range() {
        let d = PostgresDialect::new();
        let sql = d.json_to_native("x", SqlType::Integer);
        assert!(sql.starts_with("CASE WHEN (x #>> '{}') ~ '^[+-]?[0-9]+(\\.0+)?$' THEN "), "{}", sql);
        assert!(sql.contains(
            "BETWEEN -9223372036854775808 AND 9223372036854775807 THEN CAST(CAST((x #>> '{}') AS NUMERIC) AS BIGINT)"
        ));
        assert!(d.try_cast_text("t", SqlType::Integer).contains("BETWEEN -9223372036854775808 AND "));
    }

    #[test]
    fn test_is_finite_excludes_special_values() {
        let sql = PostgresDialect::new().is_finite("v");
        assert!(sql.contains("'Infinity'::float8"));
        assert!(sql.contains("'NaN'::float8"));
    }
}
