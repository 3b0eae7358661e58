//! Post-action decisions
//!
//! Every operation ends with exactly one decision telling the lifecycle
//! controller what to do with the artifact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens to an artifact after an operation returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostAction {
    /// No side effect
    None,
    /// Refresh the last-access timestamp
    Touch,
    /// Write the serialized artifact to storage (also refreshes access)
    Persist,
    /// Keep the artifact pinned until its background continuation reports
    Background,
}

impl PostAction {
    /// The terminal part of this decision, if it is terminal
    #[must_use]
    pub fn terminal(self) -> Option<TerminalAction> {
        match self {
            PostAction::None => Some(TerminalAction::None),
            PostAction::Touch => Some(TerminalAction::Touch),
            PostAction::Persist => Some(TerminalAction::Persist),
            PostAction::Background => None,
        }
    }
}

impl fmt::Display for PostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PostAction::None => "none",
            PostAction::Touch => "touch",
            PostAction::Persist => "persist",
            PostAction::Background => "background",
        };
        f.write_str(s)
    }
}

/// A decision that ends the lifecycle of one call.
///
/// Background continuations report one of these; they cannot go to
/// background again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalAction {
    None,
    #[default]
    Touch,
    Persist,
}

impl From<TerminalAction> for PostAction {
    fn from(value: TerminalAction) -> Self {
        match value {
            TerminalAction::None => PostAction::None,
            TerminalAction::Touch => PostAction::Touch,
            TerminalAction::Persist => PostAction::Persist,
        }
    }
}

impl fmt::Display for TerminalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PostAction::from(*self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_not_terminal() {
        assert_eq!(PostAction::Background.terminal(), None);
        assert_eq!(PostAction::Persist.terminal(), Some(TerminalAction::Persist));
    }

    #[test]
    fn terminal_action_parses_snake_case() {
        let action: TerminalAction = serde_json::from_str("\"persist\"").unwrap();
        assert_eq!(action, TerminalAction::Persist);
        assert_eq!(action.to_string(), "persist");
    }
}
