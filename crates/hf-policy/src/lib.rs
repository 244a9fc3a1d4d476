//! Policy Gate: a pure mapping from (actor, action class, trust level,
//! scope) to a decision (spec.md §4.5). The default matrix is overridable
//! per deployment; tool-to-action-class classification ships with
//! conservative defaults and an override table.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionClass {
    ReadOnly,
    Reversible,
    Irreversible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    ReportOnly,
    ProposeConfirm,
    AutoNotify,
    FullDelegation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Hive,
    Colony,
    Run,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    RequireApproval,
    Deny,
}

/// Pure decision function implementing the default matrix from spec.md
/// §4.5. `strict_irreversible` flips `full_delegation` + `irreversible`
/// from ALLOW to DENY, matching the matrix's documented override.
pub fn decide(action_class: ActionClass, trust_level: TrustLevel, strict_irreversible: bool) -> Decision {
    use ActionClass::*;
    use Decision::*;
    use TrustLevel::*;

    match (trust_level, action_class) {
        (_, ReadOnly) => Allow,

        (ReportOnly, Reversible) => RequireApproval,
        (ReportOnly, Irreversible) => Deny,

        (ProposeConfirm, Reversible) => Allow,
        (ProposeConfirm, Irreversible) => RequireApproval,

        (AutoNotify, Reversible) => Allow,
        (AutoNotify, Irreversible) => Allow,

        (FullDelegation, Reversible) => Allow,
        (FullDelegation, Irreversible) => {
            if strict_irreversible {
                Deny
            } else {
                Allow
            }
        }
    }
}

/// Tool → action-class classification, with conservative defaults and an
/// override table for deployment-specific tools.
#[derive(Debug, Clone, Default)]
pub struct ToolClassifier {
    overrides: HashMap<String, ActionClass>,
    allowlisted_commands: HashSet<String>,
}

impl ToolClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, tool: impl Into<String>, class: ActionClass) -> Self {
        self.overrides.insert(tool.into(), class);
        self
    }

    pub fn with_allowlisted_command(mut self, command: impl Into<String>) -> Self {
        self.allowlisted_commands.insert(command.into());
        self
    }

    /// Classifies a tool invocation. `run_command` is further split by
    /// whether its target command is allowlisted.
    pub fn classify(&self, tool_name: &str, command_arg: Option<&str>) -> ActionClass {
        if let Some(class) = self.overrides.get(tool_name) {
            return *class;
        }
        match tool_name {
            "read_file" | "list_directory" | "search" | "status" => ActionClass::ReadOnly,
            "create_file" | "edit_file" => ActionClass::Reversible,
            "run_command" => {
                let allowlisted = command_arg
                    .map(|c| self.allowlisted_commands.contains(c))
                    .unwrap_or(false);
                if allowlisted {
                    ActionClass::Reversible
                } else {
                    ActionClass::Irreversible
                }
            }
            "delete_file" | "http_request" => ActionClass::Irreversible,
            // Unknown tool: conservative default.
            _ => ActionClass::Reversible,
        }
    }
}

/// Convenience wrapper bundling the classifier and the `strict_irreversible`
/// deployment override for a full `decide()` call keyed by tool name.
#[derive(Debug, Clone, Default)]
pub struct PolicyGate {
    pub classifier: ToolClassifier,
    pub strict_irreversible: bool,
}

impl PolicyGate {
    pub fn new(classifier: ToolClassifier, strict_irreversible: bool) -> Self {
        PolicyGate {
            classifier,
            strict_irreversible,
        }
    }

    pub fn decide_for_tool(
        &self,
        tool_name: &str,
        command_arg: Option<&str>,
        trust_level: TrustLevel,
    ) -> Decision {
        let class = self.classifier.classify(tool_name, command_arg);
        decide(class, trust_level, self.strict_irreversible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_matches_spec_table() {
        use ActionClass::*;
        use Decision::*;
        use TrustLevel::*;

        assert_eq!(decide(ReadOnly, ReportOnly, false), Allow);
        assert_eq!(decide(Reversible, ReportOnly, false), RequireApproval);
        assert_eq!(decide(Irreversible, ReportOnly, false), Deny);

        assert_eq!(decide(Reversible, ProposeConfirm, false), Allow);
        assert_eq!(decide(Irreversible, ProposeConfirm, false), RequireApproval);

        assert_eq!(decide(Irreversible, AutoNotify, false), Allow);

        assert_eq!(decide(Irreversible, FullDelegation, false), Allow);
        assert_eq!(decide(Irreversible, FullDelegation, true), Deny);
    }

    #[test]
    fn unknown_tool_defaults_to_reversible() {
        let c = ToolClassifier::new();
        assert_eq!(c.classify("frobnicate", None), ActionClass::Reversible);
    }

    #[test]
    fn run_command_depends_on_allowlist() {
        let c = ToolClassifier::new().with_allowlisted_command("ls");
        assert_eq!(c.classify("run_command", Some("ls")), ActionClass::Reversible);
        assert_eq!(c.classify("run_command", Some("rm -rf /")), ActionClass::Irreversible);
    }

    #[test]
    fn report_only_denies_irreversible_tool() {
        let gate = PolicyGate::new(ToolClassifier::new(), false);
        let decision = gate.decide_for_tool("delete_file", None, TrustLevel::ReportOnly);
        assert_eq!(decision, Decision::Deny);
    }

    #[test]
    fn override_table_wins_over_defaults() {
        let classifier = ToolClassifier::new().with_override("read_file", ActionClass::Irreversible);
        assert_eq!(classifier.classify("read_file", None), ActionClass::Irreversible);
    }
}
