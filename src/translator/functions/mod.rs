//! Function call translation, one module per function category.

mod aggregates;
mod conversion;
mod existence;
mod filtering;
mod math;
mod strings;
mod subsetting;
mod utility;

use crate::fhirpath_ast::{ExpressionNode, TypeSpecifier};

use super::context::TranslationContext;
use super::errors::TranslationError;
use super::expr::SqlExpr;
use super::function_registry::{get_function_spec, FunctionCategory};
use super::type_ops::TypeTest;
use super::Translator;

/// A function invocation with its input already translated.
pub(crate) struct Call<'a> {
    pub name: &'a str,
    /// The value the function is invoked on (`$this` when called without a base)
    pub input: SqlExpr,
    pub args: &'a [ExpressionNode],
    /// FHIRPath text of the whole call
    pub path: String,
}

impl Call<'_> {
    pub fn invalid(&self, reason: impl Into<String>) -> TranslationError {
        TranslationError::invalid_operand(self.name, self.path.clone(), reason)
    }
}

impl Translator {
    pub(super) fn visit_function(
        &self,
        base: Option<&ExpressionNode>,
        name: &str,
        args: &[ExpressionNode],
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let path = node.to_string();
        let spec = get_function_spec(name).ok_or_else(|| TranslationError::UnknownFunction {
            function: name.to_string(),
            path: path.clone(),
        })?;
        spec.check_arity(args.len(), &path)?;

        if name == "iif" && base.is_some() {
            return Err(TranslationError::invalid_operand(
                name,
                path,
                "iif() does not take an input collection",
            ));
        }

        let input = match base {
            Some(base) => self.visit(base, ctx)?,
            None => self.this(ctx),
        };
        let call = Call {
            name,
            input,
            args,
            path,
        };
        log::trace!("function {} ({:?})", name, spec.category);

        match spec.category {
            FunctionCategory::Existence => self.existence_function(&call, ctx),
            FunctionCategory::Filtering => self.filtering_function(&call, ctx),
            FunctionCategory::Subsetting => self.subsetting_function(&call, ctx),
            FunctionCategory::Combining => self.combining_function(&call, ctx),
            FunctionCategory::String => self.string_function(&call, ctx),
            FunctionCategory::Math => self.math_function(&call, ctx),
            FunctionCategory::Conversion => self.conversion_function(&call),
            FunctionCategory::Utility => self.utility_function(&call, ctx),
            FunctionCategory::Type => self.type_function(&call, ctx),
            FunctionCategory::Aggregate => self.aggregate_function(&call, ctx),
        }
    }

    /// Translate argument `index` with the current focus.
    pub(crate) fn argument(
        &self,
        call: &Call<'_>,
        index: usize,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let arg = call.args.get(index).ok_or_else(|| {
            call.invalid(format!("missing argument {}", index + 1))
        })?;
        self.visit(arg, ctx)
    }

    /// Translate argument `index` once per item of `collection`.
    /// Returns the alias naming the item rows and the translated argument.
    pub(crate) fn lambda_argument(
        &self,
        call: &Call<'_>,
        index: usize,
        collection: &SqlExpr,
        ctx: &mut TranslationContext,
    ) -> Result<(String, SqlExpr), TranslationError> {
        let arg = call.args.get(index).ok_or_else(|| {
            call.invalid(format!("missing argument {}", index + 1))
        })?;
        self.in_lambda(collection, ctx, |ctx| self.visit(arg, ctx))
    }

    /// A type name given as a function argument: `ofType(Quantity)`,
    /// `is(System.String)`.
    fn type_argument(&self, call: &Call<'_>) -> Result<TypeSpecifier, TranslationError> {
        match call.args.first() {
            Some(ExpressionNode::Identifier { name }) => Ok(TypeSpecifier::new(name.clone())),
            Some(ExpressionNode::Path { base, name }) => match base.as_ref() {
                ExpressionNode::Identifier { name: namespace } => {
                    Ok(TypeSpecifier::qualified(namespace.clone(), name.clone()))
                }
                _ => Err(call.invalid("expected a type name")),
            },
            _ => Err(call.invalid("expected a type name")),
        }
    }

    fn combining_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let other = self.argument(call, 0, ctx)?;
        match call.name {
            "union" => Ok(self.union_collections(&call.input, &other, call.path.clone(), ctx)),
            "combine" => Ok(self.combine_collections(&call.input, &other, call.path.clone())),
            other => Err(call.invalid(format!("'{}' is not a combining function", other))),
        }
    }

    fn type_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let specifier = self.type_argument(call)?;
        let test = match call.name {
            "is" => TypeTest::Is,
            "as" => TypeTest::As,
            "ofType" => TypeTest::OfType,
            other => return Err(call.invalid(format!("'{}' is not a type function", other))),
        };
        self.type_operation(test, call.input.clone(), &specifier, &call.path, ctx)
    }
}
