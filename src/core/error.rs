use std::fmt;

/// Errors produced while defining, compiling, differentiating or
/// evaluating model formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A formula referenced a variable name that is not defined.
    UndefinedVariable(String),
    /// A name lookup for a model function failed.
    UndefinedFunction(String),
    /// Redefining a variable would make it depend (transitively) on itself.
    DependencyLoop(String),
    /// A variable cannot be deleted while something still references it.
    StillReferenced {
        name: String,
        /// The first referrer found, in position order (variables before functions).
        referrer: String,
    },
    /// The operator is evaluable in data transforms but has no meaning
    /// in variable or function formulas (no derivative exists).
    NotAllowedInContext(&'static str),
    /// A formula referenced a formal argument index past its bound list.
    UnboundArgument { index: usize, bound: usize },
    /// Variable formulas must not reference the scan coordinate.
    DependsOnX(String),
    /// The formula needs more evaluation stack than the fixed budget.
    StackOverflow { needed: usize, limit: usize },
}

impl EngineError {
    /// Create an `UndefinedVariable` from anything string-like.
    pub fn undefined_variable(name: impl Into<String>) -> Self {
        EngineError::UndefinedVariable(name.into())
    }

    /// Create a `StillReferenced` from anything string-like.
    pub fn still_referenced(name: impl Into<String>, referrer: impl Into<String>) -> Self {
        EngineError::StillReferenced {
            name: name.into(),
            referrer: referrer.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UndefinedVariable(name) => {
                write!(f, "undefined variable: ${}", name)
            }
            EngineError::UndefinedFunction(name) => {
                write!(f, "undefined function: %{}", name)
            }
            EngineError::DependencyLoop(name) => {
                write!(f, "detected loop in variable dependencies of ${}", name)
            }
            EngineError::StillReferenced { name, referrer } => {
                write!(f, "can't delete ${} because {} depends on it", name, referrer)
            }
            EngineError::NotAllowedInContext(op) => {
                write!(f, "`{}` is not allowed for variables and functions", op)
            }
            EngineError::UnboundArgument { index, bound } => {
                write!(f, "argument index {} is out of range (arity {})", index, bound)
            }
            EngineError::DependsOnX(name) => {
                write!(f, "variable ${} can't depend on x", name)
            }
            EngineError::StackOverflow { needed, limit } => {
                write!(
                    f,
                    "formula needs evaluation stack of depth {} (limit: {})",
                    needed, limit
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;
