use serde::{Deserialize, Serialize};

/// Which named parameter tensors the genetic operators vary.
///
/// `All` varies every tensor of the policy. `WeightsAndBiases` only varies tensors whose
/// name contains `weight` or `bias` and copies the rest (e.g. `action_log_std`) from the
/// first parent unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    #[default]
    All,
    WeightsAndBiases,
}

impl ParameterScope {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::WeightsAndBiases => name.contains("weight") || name.contains("bias"),
        }
    }
}
