pub mod host_rule;
pub mod http_rule;

pub use self::{
    host_rule::{HostRule, HostRuleSpec, VirtualHost},
    http_rule::{HttpRule, HttpRulePath, HttpRuleSpec},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The admission state the controller reports on a rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RuleState {
    Accepted,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RuleStatus {
    pub status: RuleState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === impl RuleStatus ===

impl RuleStatus {
    pub fn accepted() -> Self {
        Self {
            status: RuleState::Accepted,
            error: None,
        }
    }

    pub fn rejected(error: impl ToString) -> Self {
        Self {
            status: RuleState::Rejected,
            error: Some(error.to_string()),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == RuleState::Rejected
    }
}
