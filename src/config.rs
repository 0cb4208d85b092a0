use serde::{Deserialize, Serialize};

/// Where a brand-new card lands when the first rating is `again`.
///
/// The routing is a product policy rather than a property of the memory
/// model, so it is an explicit configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewAgainRoute {
    Learning,
    Relearning,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Target recall probability at the next review. Clamped to
    /// [0.70, 0.97] so rating previews keep strictly ordered intervals.
    pub desired_retention: f64,
    /// Routing for `new` + `again`.
    pub new_again_route: NewAgainRoute,
    /// Whether a first-review `easy` graduates straight to `review`.
    pub graduate_easy_immediately: bool,
    /// Upper bound on cards handed out per study session.
    pub session_card_limit: u32,
    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            desired_retention: 0.9,
            new_again_route: NewAgainRoute::Learning,
            graduate_easy_immediately: true,
            session_card_limit: 50,
            log_level: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let desired_retention = std::env::var("RECALL_DESIRED_RETENTION")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(defaults.desired_retention);

        let new_again_route = std::env::var("RECALL_NEW_AGAIN_ROUTE")
            .ok()
            .map(|value| match value.to_ascii_lowercase().as_str() {
                "relearning" => NewAgainRoute::Relearning,
                _ => NewAgainRoute::Learning,
            })
            .unwrap_or(defaults.new_again_route);

        let session_card_limit = std::env::var("RECALL_SESSION_CARD_LIMIT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(defaults.session_card_limit);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| defaults.log_level.clone());

        Self {
            desired_retention,
            new_again_route,
            graduate_easy_immediately: defaults.graduate_easy_immediately,
            session_card_limit,
            log_level,
        }
    }

    /// Desired retention with the scheduling-safe clamp applied.
    pub fn effective_retention(&self) -> f64 {
        self.desired_retention.clamp(0.70, 0.97)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.desired_retention, 0.9);
        assert_eq!(config.new_again_route, NewAgainRoute::Learning);
        assert!(config.graduate_easy_immediately);
    }

    #[test]
    fn test_effective_retention_clamps() {
        let mut config = SchedulerConfig::default();
        config.desired_retention = 0.9999;
        assert_eq!(config.effective_retention(), 0.97);
        config.desired_retention = 0.1;
        assert_eq!(config.effective_retention(), 0.70);
    }
}
