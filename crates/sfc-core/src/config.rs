use serde::{Deserialize, Serialize};
use sfc_store::{ActiveQueriesMode, ConnectionMode};

use crate::collation::CollationConfig;
use crate::error::{SfcError, SfcResult};

/// Configuration of one open domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Mode entered when the domain opens over a connection.
    pub initial_mode: ConnectionMode,
    /// Default policy for queries issued through the domain.
    pub active_queries: ActiveQueriesMode,
    /// Overrides the domain definition's state-management switch when set.
    pub state_management: Option<bool>,
    /// Buffer size of each event subscriber's channel.
    pub event_capacity: usize,
    /// Collation given to every sorted child collection.
    pub collation: CollationConfig,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            initial_mode: ConnectionMode::Online,
            active_queries: ActiveQueriesMode::CachedQuery,
            state_management: None,
            event_capacity: 256,
            collation: CollationConfig::default(),
        }
    }
}

impl DomainConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> SfcResult<Self> {
        toml::from_str(text).map_err(|e| SfcError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SfcResult<String> {
        toml::to_string(self).map_err(|e| SfcError::Config(e.to_string()))
    }

    /// Start in `mode`.
    pub fn with_initial_mode(mut self, mode: ConnectionMode) -> Self {
        self.initial_mode = mode;
        self
    }

    pub fn with_active_queries(mut self, mode: ActiveQueriesMode) -> Self {
        self.active_queries = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DomainConfig::from_toml_str(
            r#"
            initial_mode = "TransactedBatch"

            [collation]
            culture = "de_DE"
            ignore_case = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.initial_mode, ConnectionMode::TransactedBatch);
        assert_eq!(cfg.active_queries, ActiveQueriesMode::CachedQuery);
        assert_eq!(cfg.collation.culture, "de_DE");
        assert!(cfg.collation.ignore_case);
        assert!(cfg.collation.ascending);
        assert_eq!(cfg.event_capacity, 256);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = DomainConfig::default()
            .with_active_queries(ActiveQueriesMode::MultipleActiveQueries);
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(DomainConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = DomainConfig::from_toml_str("initial_mode = 3").unwrap_err();
        assert!(matches!(err, SfcError::Config(_)));
    }
}
