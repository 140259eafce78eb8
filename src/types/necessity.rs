//! Boolean gate expressions over scoped variables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Leaf test: the named variable currently holds `necessary_state`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarNecessity {
    /// Id of the variable being tested.
    pub var_id: String,
    /// State the variable must hold.
    pub necessary_state: String,
}

/// Binary combinator for expression trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Both sides must hold.
    #[serde(alias = "And", alias = "AND", alias = "&&")]
    And,
    /// Either side must hold.
    #[serde(alias = "Or", alias = "OR", alias = "||")]
    Or,
}

impl Operator {
    /// Combine two already-evaluated operands.
    pub fn apply(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// Interior node of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NecessityTree {
    /// Left operand.
    pub left: NecessityExpression,
    /// Combinator.
    pub operator: Operator,
    /// Right operand.
    pub right: NecessityExpression,
}

/// Recursive boolean expression gating a phylum branch.
///
/// Serialized externally tagged, e.g. `{"Var": {...}}` or `{"Tree": {...}}`.
/// An absent expression (`Option::None`) is the universal-true default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NecessityExpression {
    /// Equality test on one variable.
    Var(VarNecessity),
    /// Combination of two sub-expressions.
    Tree(Box<NecessityTree>),
}

impl NecessityExpression {
    /// Leaf expression.
    pub fn var(var_id: impl Into<String>, necessary_state: impl Into<String>) -> Self {
        Self::Var(VarNecessity {
            var_id: var_id.into(),
            necessary_state: necessary_state.into(),
        })
    }

    /// Interior expression.
    pub fn tree(left: NecessityExpression, operator: Operator, right: NecessityExpression) -> Self {
        Self::Tree(Box::new(NecessityTree { left, operator, right }))
    }

    /// `left and right`.
    pub fn and(left: NecessityExpression, right: NecessityExpression) -> Self {
        Self::tree(left, Operator::And, right)
    }

    /// `left or right`.
    pub fn or(left: NecessityExpression, right: NecessityExpression) -> Self {
        Self::tree(left, Operator::Or, right)
    }

    /// Every leaf in left-to-right order.
    pub fn leaves(&self) -> Vec<&VarNecessity> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a VarNecessity>) {
        match self {
            Self::Var(leaf) => out.push(leaf),
            Self::Tree(tree) => {
                tree.left.collect_leaves(out);
                tree.right.collect_leaves(out);
            }
        }
    }
}
