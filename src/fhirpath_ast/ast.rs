use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the node-kind set accepted by the translator.
/// Bump whenever a variant is added to or removed from [`ExpressionNode`].
pub const AST_VERSION: u32 = 1;

/// Every `kind` tag the JSON form of the AST may carry.
pub const NODE_KINDS: &[&str] = &[
    "literal",
    "identifier",
    "path",
    "variable",
    "function_call",
    "binary_operation",
    "unary_operation",
    "type_operation",
    "union",
    "indexer",
];

/// A parsed FHIRPath expression.
///
/// The tree is produced by an external parser (or built in code with the
/// helper constructors below) and is never mutated by the compiler.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpressionNode {
    /// A literal value, e.g. `'abc'`, `42`, `@2020-01-01`
    Literal { value: LiteralValue },

    /// The first step of a path, resolved against the current focus
    /// (e.g. `Patient` or `name` inside a `where()` criteria).
    Identifier { name: String },

    /// A member step on a base expression (e.g. `name.given`).
    Path {
        base: Box<ExpressionNode>,
        name: String,
    },

    /// `$this`, `$index`, `$total`, `%resource`, `%context` or an external `%constant`.
    /// The name keeps its `$` / `%` prefix.
    Variable { name: String },

    /// Function invocation. `base` is `None` for calls at the start of an expression.
    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base: Option<Box<ExpressionNode>>,
        name: String,
        #[serde(default)]
        args: Vec<ExpressionNode>,
    },

    BinaryOperation {
        operator: BinaryOperator,
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },

    UnaryOperation {
        polarity: Polarity,
        operand: Box<ExpressionNode>,
    },

    /// `operand is Type` / `operand as Type`
    TypeOperation {
        operator: TypeOperator,
        operand: Box<ExpressionNode>,
        type_specifier: TypeSpecifier,
    },

    /// `left | right`
    Union {
        left: Box<ExpressionNode>,
        right: Box<ExpressionNode>,
    },

    /// `base[index]`
    Indexer {
        base: Box<ExpressionNode>,
        index: Box<ExpressionNode>,
    },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LiteralValue {
    /// `{}`
    Empty,
    Boolean(bool),
    String(String),
    Integer(i64),
    /// Decimal literals keep their source text so no precision is lost.
    Decimal(String),
    /// Date without the leading `@` (e.g. `2020-01-01`)
    Date(String),
    /// DateTime without the leading `@` (e.g. `2020-01-01T10:00:00Z`)
    DateTime(String),
    /// Time without the leading `@T` (e.g. `10:30:00`)
    Time(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Div,
    Mod,
    /// `&` string concatenation
    Concatenate,
    And,
    Or,
    Xor,
    Implies,
    /// Membership: `item in collection`
    In,
    /// Membership: `collection contains item`
    Contains,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Equivalent => "~",
            BinaryOperator::NotEquivalent => "!~",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterOrEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
            BinaryOperator::Concatenate => "&",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Xor => "xor",
            BinaryOperator::Implies => "implies",
            BinaryOperator::In => "in",
            BinaryOperator::Contains => "contains",
        }
    }

    /// Equality, equivalence and ordering operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Equivalent
                | BinaryOperator::NotEquivalent
                | BinaryOperator::LessThan
                | BinaryOperator::LessOrEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterOrEqual
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Plus,
    Minus,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeOperator {
    Is,
    As,
}

impl TypeOperator {
    pub fn keyword(&self) -> &'static str {
        match self {
            TypeOperator::Is => "is",
            TypeOperator::As => "as",
        }
    }
}

/// A (possibly namespace-qualified) type name such as `Integer` or `FHIR.Quantity`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TypeSpecifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl TypeSpecifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn qualified(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Parse `System.String` / `FHIR.code` / `Quantity` into a specifier.
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((ns, name)) => Self::qualified(ns, name),
            None => Self::new(text),
        }
    }
}

impl fmt::Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl ExpressionNode {
    /// Short name of the node kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExpressionNode::Literal { .. } => "literal",
            ExpressionNode::Identifier { .. } => "identifier",
            ExpressionNode::Path { .. } => "path",
            ExpressionNode::Variable { .. } => "variable",
            ExpressionNode::FunctionCall { .. } => "function_call",
            ExpressionNode::BinaryOperation { .. } => "binary_operation",
            ExpressionNode::UnaryOperation { .. } => "unary_operation",
            ExpressionNode::TypeOperation { .. } => "type_operation",
            ExpressionNode::Union { .. } => "union",
            ExpressionNode::Indexer { .. } => "indexer",
        }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&ExpressionNode> {
        match self {
            ExpressionNode::Literal { .. }
            | ExpressionNode::Identifier { .. }
            | ExpressionNode::Variable { .. } => vec![],
            ExpressionNode::Path { base, .. } => vec![base.as_ref()],
            ExpressionNode::FunctionCall { base, args, .. } => {
                let mut children: Vec<&ExpressionNode> = base.iter().map(|b| b.as_ref()).collect();
                children.extend(args.iter());
                children
            }
            ExpressionNode::BinaryOperation { left, right, .. }
            | ExpressionNode::Union { left, right } => vec![left.as_ref(), right.as_ref()],
            ExpressionNode::UnaryOperation { operand, .. }
            | ExpressionNode::TypeOperation { operand, .. } => vec![operand.as_ref()],
            ExpressionNode::Indexer { base, index } => vec![base.as_ref(), index.as_ref()],
        }
    }

    /// Leftmost identifier of the expression, if it starts with one
    /// (`Patient` in `Patient.name.given`).
    pub fn root_identifier(&self) -> Option<&str> {
        match self {
            ExpressionNode::Identifier { name } => Some(name),
            ExpressionNode::Path { base, .. } | ExpressionNode::Indexer { base, .. } => {
                base.root_identifier()
            }
            ExpressionNode::FunctionCall { base: Some(base), .. } => base.root_identifier(),
            ExpressionNode::BinaryOperation { left, .. } | ExpressionNode::Union { left, .. } => {
                left.root_identifier()
            }
            ExpressionNode::UnaryOperation { operand, .. }
            | ExpressionNode::TypeOperation { operand, .. } => operand.root_identifier(),
            _ => None,
        }
    }

    // ----- construction helpers (used by callers without a parser, and by tests) -----

    pub fn identifier(name: impl Into<String>) -> Self {
        ExpressionNode::Identifier { name: name.into() }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        ExpressionNode::Variable { name: name.into() }
    }

    pub fn literal(value: LiteralValue) -> Self {
        ExpressionNode::Literal { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::literal(LiteralValue::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Self::literal(LiteralValue::Integer(value))
    }

    pub fn decimal(value: impl Into<String>) -> Self {
        Self::literal(LiteralValue::Decimal(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::literal(LiteralValue::Boolean(value))
    }

    pub fn date(value: impl Into<String>) -> Self {
        Self::literal(LiteralValue::Date(value.into()))
    }

    pub fn datetime(value: impl Into<String>) -> Self {
        Self::literal(LiteralValue::DateTime(value.into()))
    }

    pub fn empty() -> Self {
        Self::literal(LiteralValue::Empty)
    }

    /// Build a path from dotted text: `"Patient.name.given"`.
    pub fn dotted(path: &str) -> Self {
        let mut parts = path.split('.');
        let first = parts.next().unwrap_or_default();
        parts.fold(Self::identifier(first), |acc, part| acc.path(part))
    }

    /// Function call without a base: `iif(...)`, `today()`
    pub fn function(name: impl Into<String>, args: Vec<ExpressionNode>) -> Self {
        ExpressionNode::FunctionCall {
            base: None,
            name: name.into(),
            args,
        }
    }

    pub fn path(self, name: impl Into<String>) -> Self {
        ExpressionNode::Path {
            base: Box::new(self),
            name: name.into(),
        }
    }

    pub fn call(self, name: impl Into<String>, args: Vec<ExpressionNode>) -> Self {
        ExpressionNode::FunctionCall {
            base: Some(Box::new(self)),
            name: name.into(),
            args,
        }
    }

    pub fn index(self, index: ExpressionNode) -> Self {
        ExpressionNode::Indexer {
            base: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn binary(operator: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        ExpressionNode::BinaryOperation {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn negate(operand: ExpressionNode) -> Self {
        ExpressionNode::UnaryOperation {
            polarity: Polarity::Minus,
            operand: Box::new(operand),
        }
    }

    pub fn union(left: ExpressionNode, right: ExpressionNode) -> Self {
        ExpressionNode::Union {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_type(self, type_name: &str) -> Self {
        ExpressionNode::TypeOperation {
            operator: TypeOperator::Is,
            operand: Box::new(self),
            type_specifier: TypeSpecifier::parse(type_name),
        }
    }

    pub fn as_type(self, type_name: &str) -> Self {
        ExpressionNode::TypeOperation {
            operator: TypeOperator::As,
            operand: Box::new(self),
            type_specifier: TypeSpecifier::parse(type_name),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Empty => write!(f, "{{}}"),
            LiteralValue::Boolean(b) => write!(f, "{}", b),
            LiteralValue::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            LiteralValue::Integer(i) => write!(f, "{}", i),
            LiteralValue::Decimal(d) => write!(f, "{}", d),
            LiteralValue::Date(d) | LiteralValue::DateTime(d) => write!(f, "@{}", d),
            LiteralValue::Time(t) => write!(f, "@T{}", t),
        }
    }
}

/// Renders the tree back to FHIRPath-like text (fully parenthesized operators).
impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionNode::Literal { value } => write!(f, "{}", value),
            ExpressionNode::Identifier { name } => write!(f, "{}", name),
            ExpressionNode::Path { base, name } => write!(f, "{}.{}", base, name),
            ExpressionNode::Variable { name } => write!(f, "{}", name),
            ExpressionNode::FunctionCall { base, name, args } => {
                if let Some(base) = base {
                    write!(f, "{}.", base)?;
                }
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            ExpressionNode::BinaryOperation {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
            ExpressionNode::UnaryOperation { polarity, operand } => match polarity {
                Polarity::Plus => write!(f, "+{}", operand),
                Polarity::Minus => write!(f, "-{}", operand),
            },
            ExpressionNode::TypeOperation {
                operator,
                operand,
                type_specifier,
            } => write!(f, "({} {} {})", operand, operator.keyword(), type_specifier),
            ExpressionNode::Union { left, right } => write!(f, "({} | {})", left, right),
            ExpressionNode::Indexer { base, index } => write!(f, "{}[{}]", base, index),
        }
    }
}
