//! Run configuration

use std::time::Duration;

use crate::engine::Concurrency;
use crate::llm::ToolChoice;
use crate::policy::StopCondition;

/// Configuration for an `Agent`
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Upper bound on model turns per run
    pub max_steps: usize,
    /// Scheduling of one turn's tool calls
    pub tool_concurrency: Concurrency,
    /// Whole-pipeline re-runs after an infrastructure failure
    pub max_retries: u32,
    /// Base retry delay, doubled per attempt
    pub retry_delay: Duration,
    pub tool_choice: ToolChoice,
    pub stop_conditions: Vec<StopCondition>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            tool_concurrency: Concurrency::Sequential,
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            tool_choice: ToolChoice::Auto,
            stop_conditions: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by `PHOENIX_LOOP_*` environment variables.
    ///
    /// Missing or unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_steps: env_parse("PHOENIX_LOOP_MAX_STEPS").unwrap_or(defaults.max_steps),
            tool_concurrency: std::env::var("PHOENIX_LOOP_TOOL_CONCURRENCY")
                .ok()
                .and_then(|v| parse_concurrency(&v))
                .unwrap_or(defaults.tool_concurrency),
            max_retries: env_parse("PHOENIX_LOOP_MAX_RETRIES").unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    #[must_use]
    pub fn with_tool_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.tool_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_conditions.push(condition);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// `sequential` or a positive in-flight bound
fn parse_concurrency(value: &str) -> Option<Concurrency> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("sequential") {
        return Some(Concurrency::Sequential);
    }
    match value.parse::<usize>().ok()? {
        0 => None,
        1 => Some(Concurrency::Sequential),
        n => Some(Concurrency::Bounded(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.tool_concurrency, Concurrency::Sequential);
        assert_eq!(config.tool_choice, ToolChoice::Auto);
        assert!(config.stop_conditions.is_empty());
    }

    #[test]
    fn test_builders() {
        let config = AgentConfig::default()
            .with_max_steps(0)
            .with_tool_concurrency(Concurrency::Bounded(4))
            .with_max_retries(0)
            .with_stop_condition(StopCondition::step_count_is(2));
        assert_eq!(config.max_steps, 1);
        assert_eq!(config.tool_concurrency, Concurrency::Bounded(4));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.stop_conditions.len(), 1);
    }

    #[test]
    fn test_parse_concurrency() {
        assert_eq!(parse_concurrency("sequential"), Some(Concurrency::Sequential));
        assert_eq!(parse_concurrency(" 4 "), Some(Concurrency::Bounded(4)));
        assert_eq!(parse_concurrency("1"), Some(Concurrency::Sequential));
        assert_eq!(parse_concurrency("0"), None);
        assert_eq!(parse_concurrency("lots"), None);
    }

    #[test]
    fn test_from_env_falls_back_on_garbage() {
        // Only this test touches these variables
        std::env::set_var("PHOENIX_LOOP_MAX_STEPS", "9");
        std::env::set_var("PHOENIX_LOOP_TOOL_CONCURRENCY", "3");
        std::env::set_var("PHOENIX_LOOP_MAX_RETRIES", "many");

        let config = AgentConfig::from_env();
        assert_eq!(config.max_steps, 9);
        assert_eq!(config.tool_concurrency, Concurrency::Bounded(3));
        assert_eq!(config.max_retries, 2);

        std::env::remove_var("PHOENIX_LOOP_MAX_STEPS");
        std::env::remove_var("PHOENIX_LOOP_TOOL_CONCURRENCY");
        std::env::remove_var("PHOENIX_LOOP_MAX_RETRIES");
    }
}
