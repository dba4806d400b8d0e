//! Integration tests - the whole compile pipeline and configuration loading
//!
//! These tests verify that validation, translation and assembly work together
//! and that configuration from files and the environment reaches the output.

mod compile_tests;
mod config_tests;
