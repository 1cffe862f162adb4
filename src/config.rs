use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whether the orchestrator may reuse or take hints from an external
/// memory provider's prior plans (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieveRelevantPlans {
    Off,
    Reuse,
    Hint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Zh,
}

/// Every configuration knob enumerated in spec §4.3 and §6.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub cooperative_planning: bool,
    pub autonomous_execution: bool,
    pub allow_follow_up_input: bool,
    pub max_stalls_before_replan: u32,
    pub max_replans: u32,
    pub max_json_retries: u32,
    pub model_context_token_limit: Option<usize>,
    pub final_answer_prompt: Option<String>,
    pub sentinel_tasks_enabled: bool,
    pub retrieve_relevant_plans: RetrieveRelevantPlans,
    pub memory_controller_key: Option<String>,
    pub allowed_websites: Option<Vec<String>>,
    #[serde(with = "duration_secs")]
    pub min_sleep: Duration,
    #[serde(with = "duration_secs")]
    pub max_sleep: Duration,
    #[serde(with = "duration_secs")]
    pub per_agent_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub per_llm_timeout: Duration,
    pub language: Language,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cooperative_planning: true,
            autonomous_execution: false,
            allow_follow_up_input: true,
            max_stalls_before_replan: 3,
            max_replans: 3,
            max_json_retries: 3,
            model_context_token_limit: None,
            final_answer_prompt: None,
            sentinel_tasks_enabled: false,
            retrieve_relevant_plans: RetrieveRelevantPlans::Off,
            memory_controller_key: None,
            allowed_websites: None,
            min_sleep: Duration::from_secs(10),
            max_sleep: Duration::from_secs(6 * 3600),
            per_agent_timeout: Duration::from_secs(10 * 60),
            per_llm_timeout: Duration::from_secs(2 * 60),
            language: Language::En,
        }
    }
}

impl OrchestratorConfig {
    /// Loads overrides from a YAML file on top of the defaults. Missing
    /// fields keep their default value, matching how the rest of the
    /// ambient stack (dotenv for secrets, this for behavior) is loaded.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn clamp_sleep(&self, seconds: u64) -> Duration {
        Duration::from_secs(seconds).clamp(self.min_sleep, self.max_sleep)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_stalls_before_replan, 3);
        assert_eq!(config.max_replans, 3);
        assert_eq!(config.min_sleep, Duration::from_secs(10));
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let config = OrchestratorConfig::from_yaml_str("autonomous_execution: true\n").unwrap();
        assert!(config.autonomous_execution);
        assert_eq!(config.max_replans, 3);
    }

    #[test]
    fn clamp_sleep_respects_bounds() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.clamp_sleep(1), config.min_sleep);
        assert_eq!(config.clamp_sleep(999_999), config.max_sleep);
    }
}
