//! Unit tests - public API pieces exercised in isolation
//!
//! These tests run without a database; they check the generated fragments and
//! SQL text.

mod ast_json_tests;
mod cte_builder_tests;
mod dialect_parity_tests;
