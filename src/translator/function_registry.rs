/// FHIRPath Function Registry
///
/// Declares every supported function with its category and arity. Arity is
/// checked here before dispatch, so function implementations can index their
/// arguments directly.
use std::collections::HashMap;

use super::errors::TranslationError;

/// Dispatch group of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCategory {
    Existence,
    Filtering,
    Subsetting,
    Combining,
    String,
    Math,
    Conversion,
    Utility,
    Type,
    Aggregate,
}

/// Function registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: FunctionCategory,
    pub min_args: usize,
    pub max_args: usize,
    /// The first argument is evaluated once per input item (`$this` bound)
    pub lambda: bool,
}

impl FunctionSpec {
    const fn new(
        name: &'static str,
        category: FunctionCategory,
        min_args: usize,
        max_args: usize,
    ) -> Self {
        Self {
            name,
            category,
            min_args,
            max_args,
            lambda: false,
        }
    }

    const fn lambda(mut self) -> Self {
        self.lambda = true;
        self
    }

    /// Arity as shown in errors: `0`, `1`, `0-1`, ...
    pub fn expected_arity(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{}-{}", self.min_args, self.max_args)
        }
    }

    pub fn check_arity(&self, actual: usize, path: &str) -> Result<(), TranslationError> {
        if actual < self.min_args || actual > self.max_args {
            return Err(TranslationError::WrongArity {
                function: self.name.to_string(),
                expected: self.expected_arity(),
                actual,
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

/// Get the registry entry for a function name (case-sensitive, as in FHIRPath)
pub fn get_function_spec(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTION_SPECS.get(name)
}

/// Names of all registered functions, sorted
pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = FUNCTION_SPECS.keys().copied().collect();
    names.sort_unstable();
    names
}

// Static function table
lazy_static::lazy_static! {
    static ref FUNCTION_SPECS: HashMap<&'static str, FunctionSpec> = {
        use FunctionCategory::*;

        let specs = [
            // ===== EXISTENCE =====
            FunctionSpec::new("empty", Existence, 0, 0),
            FunctionSpec::new("exists", Existence, 0, 1).lambda(),
            FunctionSpec::new("all", Existence, 1, 1).lambda(),
            FunctionSpec::new("allTrue", Existence, 0, 0),
            FunctionSpec::new("anyTrue", Existence, 0, 0),
            FunctionSpec::new("allFalse", Existence, 0, 0),
            FunctionSpec::new("anyFalse", Existence, 0, 0),
            FunctionSpec::new("count", Existence, 0, 0),
            FunctionSpec::new("distinct", Existence, 0, 0),
            FunctionSpec::new("isDistinct", Existence, 0, 0),
            FunctionSpec::new("hasValue", Existence, 0, 0),

            // ===== FILTERING AND PROJECTION =====
            FunctionSpec::new("where", Filtering, 1, 1).lambda(),
            FunctionSpec::new("select", Filtering, 1, 1).lambda(),
            FunctionSpec::new("extension", Filtering, 1, 1),

            // ===== SUBSETTING =====
            FunctionSpec::new("first", Subsetting, 0, 0),
            FunctionSpec::new("last", Subsetting, 0, 0),
            FunctionSpec::new("tail", Subsetting, 0, 0),
            FunctionSpec::new("skip", Subsetting, 1, 1),
            FunctionSpec::new("take", Subsetting, 1, 1),
            FunctionSpec::new("single", Subsetting, 0, 0),

            // ===== COMBINING =====
            FunctionSpec::new("union", Combining, 1, 1),
            FunctionSpec::new("combine", Combining, 1, 1),

            // ===== STRING =====
            FunctionSpec::new("contains", String, 1, 1),
            FunctionSpec::new("startsWith", String, 1, 1),
            FunctionSpec::new("endsWith", String, 1, 1),
            FunctionSpec::new("upper", String, 0, 0),
            FunctionSpec::new("lower", String, 0, 0),
            FunctionSpec::new("length", String, 0, 0),
            FunctionSpec::new("substring", String, 1, 2),
            FunctionSpec::new("indexOf", String, 1, 1),
            FunctionSpec::new("replace", String, 2, 2),
            FunctionSpec::new("matches", String, 1, 1),
            FunctionSpec::new("matchesFull", String, 1, 1),
            FunctionSpec::new("replaceMatches", String, 2, 2),
            FunctionSpec::new("trim", String, 0, 0),
            FunctionSpec::new("join", String, 0, 1),

            // ===== MATH =====
            FunctionSpec::new("abs", Math, 0, 0),
            FunctionSpec::new("ceiling", Math, 0, 0),
            FunctionSpec::new("floor", Math, 0, 0),
            FunctionSpec::new("round", Math, 0, 1),
            FunctionSpec::new("truncate", Math, 0, 0),
            FunctionSpec::new("sqrt", Math, 0, 0),
            FunctionSpec::new("power", Math, 1, 1),
            FunctionSpec::new("exp", Math, 0, 0),
            FunctionSpec::new("ln", Math, 0, 0),
            FunctionSpec::new("log", Math, 1, 1),

            // ===== CONVERSION =====
            FunctionSpec::new("toString", Conversion, 0, 0),
            FunctionSpec::new("toInteger", Conversion, 0, 0),
            FunctionSpec::new("toDecimal", Conversion, 0, 0),
            FunctionSpec::new("toBoolean", Conversion, 0, 0),
            FunctionSpec::new("convertsToString", Conversion, 0, 0),
            FunctionSpec::new("convertsToInteger", Conversion, 0, 0),
            FunctionSpec::new("convertsToDecimal", Conversion, 0, 0),
            FunctionSpec::new("convertsToBoolean", Conversion, 0, 0),

            // ===== BOOLEAN AND UTILITY =====
            FunctionSpec::new("not", Utility, 0, 0),
            FunctionSpec::new("iif", Utility, 2, 3),

            // ===== TYPES =====
            FunctionSpec::new("is", Type, 1, 1),
            FunctionSpec::new("as", Type, 1, 1),
            FunctionSpec::new("ofType", Type, 1, 1),

            // ===== AGGREGATES =====
            FunctionSpec::new("sum", Aggregate, 0, 0),
            FunctionSpec::new("min", Aggregate, 0, 0),
            FunctionSpec::new("max", Aggregate, 0, 0),
            FunctionSpec::new("avg", Aggregate, 0, 0),
        ];

        specs.into_iter().map(|spec| (spec.name, spec)).collect()
    };
}
