//! Incremental authoring of branch conditions.
//!
//! A builder mirrors the shape of a half-edited condition: every slot may still
//! be empty. [`ExpressionBuilder::build`] collects every missing slot instead
//! of stopping at the first, so the writer sees all problems at once. Nested
//! builders compose by return value.

use crate::types::{NecessityExpression, Operator};

/// A condition under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExpressionBuilder {
    /// Nothing chosen yet.
    #[default]
    Undefined,
    /// Single variable test.
    Leaf {
        /// Variable being tested.
        var_id: Option<String>,
        /// Required state.
        necessary_state: Option<String>,
    },
    /// Binary combination.
    Tree {
        /// Left operand.
        left: Box<ExpressionBuilder>,
        /// Combinator.
        operator: Option<Operator>,
        /// Right operand.
        right: Box<ExpressionBuilder>,
    },
}

impl ExpressionBuilder {
    /// Empty leaf.
    pub fn leaf() -> Self {
        Self::Leaf {
            var_id: None,
            necessary_state: None,
        }
    }

    /// Empty tree with undefined operands.
    pub fn tree() -> Self {
        Self::Tree {
            left: Box::default(),
            operator: None,
            right: Box::default(),
        }
    }

    /// Start from an existing expression so it can be edited.
    pub fn from_expression(expr: &NecessityExpression) -> Self {
        match expr {
            NecessityExpression::Var(leaf) => Self::Leaf {
                var_id: Some(leaf.var_id.clone()),
                necessary_state: Some(leaf.necessary_state.clone()),
            },
            NecessityExpression::Tree(tree) => Self::Tree {
                left: Box::new(Self::from_expression(&tree.left)),
                operator: Some(tree.operator),
                right: Box::new(Self::from_expression(&tree.right)),
            },
        }
    }

    /// Produce the expression, or every problem found.
    pub fn build(&self) -> Result<NecessityExpression, Vec<String>> {
        let mut errors = Vec::new();
        let expr = self.build_at("condition", &mut errors);
        match expr {
            Some(expr) if errors.is_empty() => Ok(expr),
            _ => Err(errors),
        }
    }

    fn build_at(&self, path: &str, errors: &mut Vec<String>) -> Option<NecessityExpression> {
        match self {
            Self::Undefined => {
                errors.push(format!("{path}: condition not defined"));
                None
            }
            Self::Leaf { var_id, necessary_state } => {
                if var_id.is_none() {
                    errors.push(format!("{path}: missing variable"));
                }
                if necessary_state.is_none() {
                    errors.push(format!("{path}: missing state"));
                }
                match (var_id, necessary_state) {
                    (Some(var_id), Some(state)) => Some(NecessityExpression::var(var_id.clone(), state.clone())),
                    _ => None,
                }
            }
            Self::Tree { left, operator, right } => {
                let left_path = format!("{path}.left");
                let right_path = format!("{path}.right");
                if matches!(**left, Self::Undefined) {
                    errors.push(format!("{left_path}: missing nested branch"));
                }
                let left = left.build_nested(&left_path, errors);
                if operator.is_none() {
                    errors.push(format!("{path}: missing operator"));
                }
                if matches!(**right, Self::Undefined) {
                    errors.push(format!("{right_path}: missing nested branch"));
                }
                let right = right.build_nested(&right_path, errors);
                match (left, operator, right) {
                    (Some(left), Some(operator), Some(right)) => Some(NecessityExpression::tree(left, *operator, right)),
                    _ => None,
                }
            }
        }
    }

    /// Like `build_at`, but an undefined operand was already reported by the
    /// parent as a missing branch.
    fn build_nested(&self, path: &str, errors: &mut Vec<String>) -> Option<NecessityExpression> {
        match self {
            Self::Undefined => None,
            _ => self.build_at(path, errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(var: &str, state: &str) -> ExpressionBuilder {
        ExpressionBuilder::Leaf {
            var_id: Some(var.to_string()),
            necessary_state: Some(state.to_string()),
        }
    }

    #[test]
    fn test_complete_tree_builds() {
        let builder = ExpressionBuilder::Tree {
            left: Box::new(leaf("v1", "on")),
            operator: Some(Operator::Or),
            right: Box::new(leaf("v2", "off")),
        };

        let expected = NecessityExpression::or(
            NecessityExpression::var("v1", "on"),
            NecessityExpression::var("v2", "off"),
        );
        assert_eq!(builder.build(), Ok(expected));
    }

    #[test]
    fn test_undefined_root() {
        assert_eq!(
            ExpressionBuilder::Undefined.build(),
            Err(vec!["condition: condition not defined".to_string()])
        );
    }

    #[test]
    fn test_collects_every_error() {
        let builder = ExpressionBuilder::Tree {
            left: Box::new(ExpressionBuilder::leaf()),
            operator: None,
            right: Box::new(ExpressionBuilder::Undefined),
        };

        assert_eq!(
            builder.build(),
            Err(vec![
                "condition.left: missing variable".to_string(),
                "condition.left: missing state".to_string(),
                "condition: missing operator".to_string(),
                "condition.right: missing nested branch".to_string(),
            ])
        );
    }

    #[test]
    fn test_nested_errors_carry_path() {
        let builder = ExpressionBuilder::Tree {
            left: Box::new(leaf("v1", "on")),
            operator: Some(Operator::And),
            right: Box::new(ExpressionBuilder::Tree {
                left: Box::new(leaf("v2", "on")),
                operator: Some(Operator::Or),
                right: Box::new(ExpressionBuilder::Leaf {
                    var_id: Some("v3".to_string()),
                    necessary_state: None,
                }),
            }),
        };

        assert_eq!(builder.build(), Err(vec!["condition.right.right: missing state".to_string()]));
    }

    #[test]
    fn test_from_expression_rebuilds() {
        let expr = NecessityExpression::and(
            NecessityExpression::var("a", "1"),
            NecessityExpression::or(NecessityExpression::var("b", "2"), NecessityExpression::var("c", "3")),
        );
        assert_eq!(ExpressionBuilder::from_expression(&expr).build(), Ok(expr));
    }
}
