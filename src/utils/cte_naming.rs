//! Centralized naming for generated CTEs and unnest aliases.
//!
//! All fragment names and row aliases MUST come from these functions so a
//! fragment is always referenced by the same name it was created with.
//!
//! ## Naming Convention
//! - CTEs: `{prefix}_{counter}` (e.g. `fhirpath_cte_3`)
//! - Unnest row aliases: `item_{counter}` (e.g. `item_1`)
//!
//! Counters come from one translation context and only ever increase, so a
//! name is never reused within a query.

/// Default prefix for generated CTE names
pub const DEFAULT_CTE_PREFIX: &str = "fhirpath_cte";

/// Prefix for unnest row aliases
pub const ITEM_ALIAS_PREFIX: &str = "item";

/// Generate a CTE name with a sequence counter.
///
/// # Examples
/// ```
/// use fhirpath_sql::utils::cte_naming::generate_cte_name;
///
/// assert_eq!(generate_cte_name("fhirpath_cte", 1), "fhirpath_cte_1");
/// assert_eq!(generate_cte_name("q", 12), "q_12");
/// ```
pub fn generate_cte_name(prefix: &str, counter: usize) -> String {
    format!("{}_{}", prefix, counter)
}

/// Generate the alias of an unnested row source.
///
/// # Examples
/// ```
/// use fhirpath_sql::utils::cte_naming::generate_item_alias;
///
/// assert_eq!(generate_item_alias(2), "item_2");
/// ```
pub fn generate_item_alias(counter: usize) -> String {
    format!("{}_{}", ITEM_ALIAS_PREFIX, counter)
}
