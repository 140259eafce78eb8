//! Scoped story variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Error when a variable store is incoherent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    /// A current state is not one of the declared potential states.
    #[error("Variable {var_id} has state {state:?} outside its potential states")]
    InvalidState {
        /// Offending variable.
        var_id: String,
        /// The undeclared state.
        state: String,
    },
    /// Two variables share an id.
    #[error("Duplicate variable id: {0}")]
    DuplicateId(String),
    /// A character-scoped variable references an unknown character.
    #[error("Variable {var_id} references unknown character {character_id}")]
    UnknownCharacter {
        /// Offending variable.
        var_id: String,
        /// The missing character.
        character_id: String,
    },
    /// A dialog-scoped variable references an unknown dialog.
    #[error("Variable {var_id} references unknown dialog {dialog_id}")]
    UnknownDialog {
        /// Offending variable.
        var_id: String,
        /// The missing dialog.
        dialog_id: String,
    },
}

/// Project-wide variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalVariable {
    /// Variable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current state.
    pub current_state: String,
    /// Allowed states.
    pub potential_states: Vec<String>,
}

/// Per-character state of a [`GlobalCharacterVariable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterVariableState {
    /// Current state for this character.
    pub current_state: String,
    /// Character owning this state.
    pub character_id: String,
}

/// One logical variable tracked separately for each character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCharacterVariable {
    /// Variable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Allowed states.
    pub potential_states: Vec<String>,
    /// Current state per character.
    pub characters: Vec<CharacterVariableState>,
}

/// Variable bound to one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterVariable {
    /// Variable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current state.
    pub current_state: String,
    /// Allowed states.
    pub potential_states: Vec<String>,
    /// Owning character.
    pub character_id: String,
}

/// Variable bound to one dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogVariable {
    /// Variable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current state.
    pub current_state: String,
    /// Allowed states.
    pub potential_states: Vec<String>,
    /// Owning dialog.
    pub dialog_id: String,
}

/// A scoped variable, externally tagged by scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variable {
    /// Project-wide.
    Global(GlobalVariable),
    /// Per-character state list.
    GlobalChar(GlobalCharacterVariable),
    /// Bound to one character.
    Char(CharacterVariable),
    /// Bound to one dialog.
    Dialog(DialogVariable),
}

impl Variable {
    /// Variable id regardless of scope.
    pub fn id(&self) -> &str {
        match self {
            Self::Global(v) => &v.id,
            Self::GlobalChar(v) => &v.id,
            Self::Char(v) => &v.id,
            Self::Dialog(v) => &v.id,
        }
    }

    /// Display name regardless of scope.
    pub fn name(&self) -> &str {
        match self {
            Self::Global(v) => &v.name,
            Self::GlobalChar(v) => &v.name,
            Self::Char(v) => &v.name,
            Self::Dialog(v) => &v.name,
        }
    }

    /// Allowed states.
    pub fn potential_states(&self) -> &[String] {
        match self {
            Self::Global(v) => &v.potential_states,
            Self::GlobalChar(v) => &v.potential_states,
            Self::Char(v) => &v.potential_states,
            Self::Dialog(v) => &v.potential_states,
        }
    }

    /// Whether the variable currently holds `state`.
    ///
    /// A per-character variable holds a state when any character holds it.
    pub fn holds(&self, state: &str) -> bool {
        match self {
            Self::Global(v) => v.current_state == state,
            Self::Char(v) => v.current_state == state,
            Self::Dialog(v) => v.current_state == state,
            Self::GlobalChar(v) => v.characters.iter().any(|c| c.current_state == state),
        }
    }

    /// Every current state this variable holds.
    fn current_states(&self) -> Vec<&str> {
        match self {
            Self::Global(v) => vec![v.current_state.as_str()],
            Self::Char(v) => vec![v.current_state.as_str()],
            Self::Dialog(v) => vec![v.current_state.as_str()],
            Self::GlobalChar(v) => v.characters.iter().map(|c| c.current_state.as_str()).collect(),
        }
    }
}

/// The persisted collection of a project's variables.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableStore {
    /// All variables.
    pub data: Vec<Variable>,
}

impl VariableStore {
    /// Create a store.
    pub fn new(data: Vec<Variable>) -> Self {
        Self { data }
    }

    /// Find a variable by id.
    pub fn get(&self, var_id: &str) -> Option<&Variable> {
        self.data.iter().find(|v| v.id() == var_id)
    }

    /// Check ids are unique and every current state is declared.
    pub fn validate(&self) -> Result<(), VariableError> {
        let mut seen = BTreeSet::new();
        for var in &self.data {
            if !seen.insert(var.id()) {
                return Err(VariableError::DuplicateId(var.id().to_string()));
            }
            for state in var.current_states() {
                if !var.potential_states().iter().any(|s| s == state) {
                    return Err(VariableError::InvalidState {
                        var_id: var.id().to_string(),
                        state: state.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then check every scoped variable
    /// references a known dialog or character.
    pub fn enforce_coherence(
        &self,
        dialog_ids: &BTreeSet<String>,
        character_ids: &BTreeSet<String>,
    ) -> Result<(), VariableError> {
        self.validate()?;
        for var in &self.data {
            match var {
                Variable::Char(v) if !character_ids.contains(&v.character_id) => {
                    return Err(VariableError::UnknownCharacter {
                        var_id: v.id.clone(),
                        character_id: v.character_id.clone(),
                    });
                }
                Variable::GlobalChar(v) => {
                    if let Some(missing) = v.characters.iter().find(|c| !character_ids.contains(&c.character_id)) {
                        return Err(VariableError::UnknownCharacter {
                            var_id: v.id.clone(),
                            character_id: missing.character_id.clone(),
                        });
                    }
                }
                Variable::Dialog(v) if !dialog_ids.contains(&v.dialog_id) => {
                    return Err(VariableError::UnknownDialog {
                        var_id: v.id.clone(),
                        dialog_id: v.dialog_id.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
