use std::collections::BTreeMap;
use std::fmt;

/// FROM-clause item expanding a collection into rows (`alias.value`, `alias.ordinal`)
pub const META_UNNEST_SOURCE: &str = "unnest_source";
/// WHERE condition applied to the unnested rows
pub const META_FILTER: &str = "filter";
/// Comma-separated relations joined to the source on `id`
pub const META_JOIN: &str = "join";
/// Static shape of the produced value (`native:<type>`, `json`, `json_array`)
pub const META_VALUE_KIND: &str = "value_kind";
/// Static FHIR/System type of the produced value, when known
pub const META_FHIR_TYPE: &str = "fhir_type";

/// One SQL building block produced by the translator.
///
/// A fragment becomes one named subquery with columns `id` and `value`,
/// evaluated once per resource row of its source. Fragments are immutable
/// once emitted; the CTE builder only reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    /// Name of the CTE this fragment defines
    pub name: String,
    /// SQL expression producing `value`
    pub expression: String,
    /// Relation the fragment selects from (a previous fragment or the resource table)
    pub source_table: String,
    /// Whether the expression reads the rows of `unnest_source`
    pub requires_unnest: bool,
    /// Whether the expression aggregates those rows back into one value
    pub is_aggregate: bool,
    /// Relations this fragment reads, in the order they were referenced
    pub dependencies: Vec<String>,
    /// CTE generation hints, see the `META_*` keys
    pub metadata: BTreeMap<String, String>,
}

impl SqlFragment {
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        source_table: impl Into<String>,
    ) -> Self {
        let source_table = source_table.into();
        Self {
            name: name.into(),
            expression: expression.into(),
            dependencies: vec![source_table.clone()],
            source_table,
            requires_unnest: false,
            is_aggregate: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_unnest(mut self, unnest_source: impl Into<String>, aggregate: bool) -> Self {
        self.requires_unnest = true;
        self.is_aggregate = aggregate;
        self.metadata
            .insert(META_UNNEST_SOURCE.to_string(), unnest_source.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.as_str())
    }

    /// Relations joined to the source on `id`.
    pub fn joins(&self) -> Vec<&str> {
        self.meta(META_JOIN)
            .map(|j| j.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Neither unnesting, aggregating nor joining: a candidate for inlining.
    pub fn is_pure_scalar(&self) -> bool {
        !self.requires_unnest && !self.is_aggregate && self.joins().is_empty()
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <- {} [{}]{}{}",
            self.name,
            self.source_table,
            self.dependencies.join(", "),
            if self.requires_unnest { " unnest" } else { "" },
            if self.is_aggregate { " aggregate" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_fragment_depends_on_source() {
        let f = SqlFragment::new("c1", "patient.resource", "patient");
        assert_eq!(f.dependencies, vec!["patient".to_string()]);
        assert!(f.is_pure_scalar());
    }

    #[test]
    fn test_joins_parse_metadata() {
        let f = SqlFragment::new("c3", "(c1.value = c2.value)", "c1")
            .with_dependencies(vec!["c1".into(), "c2".into()])
            .with_metadata(META_JOIN, "c2");
        assert_eq!(f.joins(), vec!["c2"]);
        assert!(!f.is_pure_scalar());
    }

    #[test]
    fn test_unnest_marks_shape() {
        let f = SqlFragment::new("c2", "count(*)", "c1").with_unnest("(...) AS item", true);
        assert!(f.requires_unnest && f.is_aggregate);
        assert_eq!(f.meta(META_UNNEST_SOURCE), Some("(...) AS item"));
    }
}
