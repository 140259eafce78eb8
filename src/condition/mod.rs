//! Evaluation of branch conditions against variable values.
//!
//! Evaluation is total: a leaf naming a variable that does not exist is
//! `false`, never an error. [`lint`] reports such leaves at authoring time.
//! Both sides of a tree are always evaluated before combining.

pub mod builder;

pub use builder::ExpressionBuilder;

use crate::types::{NecessityExpression, VarNecessity, Variable};

/// Evaluate an optional expression. `None` is always true.
pub fn evaluate(expr: Option<&NecessityExpression>, variables: &[Variable]) -> bool {
    match expr {
        None => true,
        Some(expr) => evaluate_expr(expr, variables),
    }
}

fn evaluate_expr(expr: &NecessityExpression, variables: &[Variable]) -> bool {
    match expr {
        NecessityExpression::Var(leaf) => evaluate_leaf(leaf, variables),
        NecessityExpression::Tree(tree) => {
            let left = evaluate_expr(&tree.left, variables);
            let right = evaluate_expr(&tree.right, variables);
            tree.operator.apply(left, right)
        }
    }
}

/// The first variable with the leaf's id decides.
fn evaluate_leaf(leaf: &VarNecessity, variables: &[Variable]) -> bool {
    variables
        .iter()
        .find(|v| v.id() == leaf.var_id)
        .map_or(false, |v| v.holds(&leaf.necessary_state))
}

/// List authoring problems in an expression: leaves naming unknown variables,
/// and leaves testing a state the variable can never hold.
pub fn lint(expr: &NecessityExpression, variables: &[Variable]) -> Vec<String> {
    expr.leaves()
        .into_iter()
        .filter_map(|leaf| match variables.iter().find(|v| v.id() == leaf.var_id) {
            None => Some(format!("Unknown variable {}", leaf.var_id)),
            Some(var) if !var.potential_states().iter().any(|s| *s == leaf.necessary_state) => Some(format!(
                "Variable {} has no state {:?}",
                var.name(),
                leaf.necessary_state
            )),
            Some(_) => None,
        })
        .collect()
}
