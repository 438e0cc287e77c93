//! Configuration loading and management
//!
//! A console declares one [`ListConfig`] per list page: its page size, its
//! polling period, which fields the search box covers and the predicates
//! the page is seeded with.
//!
//! ```yaml
//! lists:
//!   - name: member_dw_history
//!     poll_interval_ms: 2000
//!     search:
//!       fields: ["profiles.nickname", "users.userid"]
//!     date_field: created_at
//!     base_filters:
//!       - and:
//!           - or:
//!               - { field: type, op: eq, value: deposit }
//!               - { field: type, op: eq, value: withdrawal }
//! ```

use crate::controller::{RowMapper, SearchSpec, TotalRowSpec};
use crate::core::codec::TableOptionsCodec;
use crate::core::error::ConfigError;
use crate::core::predicate::{self, Node, Op};
use crate::core::query::{DEFAULT_PER_PAGE, PAGE_SIZE_OPTIONS, QueryOptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Search box wiring of a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchConfig {
    /// Fields the single search box is matched against
    #[validate(length(min = 1))]
    pub fields: Vec<String>,

    /// Initial state of the case-sensitivity toggle
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Client-side total row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TotalRowConfig {
    #[validate(length(min = 1))]
    pub sum_fields: Vec<String>,
}

/// Configuration for one list page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ListConfig {
    #[validate(length(min = 1))]
    pub name: String,

    /// Field rows are keyed by
    #[serde(default = "default_identity_field")]
    #[validate(length(min = 1))]
    pub identity_field: String,

    #[serde(default = "default_per_page")]
    #[validate(range(min = 1, max = 1000))]
    pub per_page: u64,

    #[serde(default = "default_page_size_options")]
    #[validate(length(min = 1))]
    pub page_size_options: Vec<u64>,

    /// Background refresh period; no polling when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 500))]
    pub poll_interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub search: Option<SearchConfig>,

    /// Field the date-range picker filters on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_field: Option<String>,

    #[serde(default)]
    pub free_text_columns: Vec<String>,

    /// UI column key -> backend field path
    #[serde(default)]
    pub column_fields: IndexMap<String, String>,

    /// Predicates every query of this list starts from
    #[serde(default)]
    pub base_filters: Vec<Node>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub total_row: Option<TotalRowConfig>,
}

fn default_identity_field() -> String {
    "id".to_string()
}

fn default_per_page() -> u64 {
    DEFAULT_PER_PAGE
}

fn default_page_size_options() -> Vec<u64> {
    PAGE_SIZE_OPTIONS.to_vec()
}

impl ListConfig {
    /// A list with defaults for everything but its name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity_field: default_identity_field(),
            per_page: default_per_page(),
            page_size_options: default_page_size_options(),
            poll_interval_ms: None,
            search: None,
            date_field: None,
            free_text_columns: Vec::new(),
            column_fields: IndexMap::new(),
            base_filters: Vec::new(),
            total_row: None,
        }
    }

    /// Check ranges and field paths
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| self.invalid(e.to_string()))?;

        let mut paths: Vec<&str> = vec![self.identity_field.as_str()];
        paths.extend(self.search.iter().flat_map(|s| s.fields.iter().map(String::as_str)));
        paths.extend(self.date_field.as_deref());
        paths.extend(self.column_fields.values().map(String::as_str));
        paths.extend(self.total_row.iter().flat_map(|t| t.sum_fields.iter().map(String::as_str)));
        if let Some(bad) = paths.into_iter().find(|p| !predicate::is_valid_field_path(p)) {
            return Err(self.invalid(format!("invalid field path '{}'", bad)));
        }

        if predicate::has_empty_group(&self.base_filters) {
            return Err(self.invalid("base_filters contains an empty group"));
        }
        if self.page_size_options.contains(&0) {
            return Err(self.invalid("page_size_options must be positive"));
        }
        Ok(())
    }

    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            list: self.name.clone(),
            message: message.into(),
        }
    }

    /// Codec for this page
    pub fn codec(&self) -> TableOptionsCodec {
        self.column_fields.iter().fold(
            TableOptionsCodec::new()
                .with_base_filters(self.base_filters.clone())
                .with_free_text_columns(self.free_text_columns.iter().cloned())
                .with_default_per_page(self.per_page)
                .with_page_size_options(self.page_size_options.iter().copied()),
            |codec, (column, field)| codec.with_column_field(column, field),
        )
    }

    /// Options the page mounts with
    pub fn initial_options(&self) -> QueryOptions {
        self.codec().initial_options()
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn row_mapper(&self) -> RowMapper {
        RowMapper::new(self.identity_field.clone()).with_total_row(
            self.total_row
                .as_ref()
                .map(|t| TotalRowSpec::new(t.sum_fields.iter().cloned())),
        )
    }

    pub fn search_spec(&self) -> Option<SearchSpec> {
        self.search.as_ref().map(|s| SearchSpec {
            fields: s.fields.clone(),
            case_sensitive: s.case_sensitive,
        })
    }
}

/// Complete configuration for the console's lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    pub lists: Vec<ListConfig>,
}

impl ConsoleConfig {
    /// Load and validate configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load and validate configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate_lists()?;
        Ok(config)
    }

    /// Validate every list and reject duplicate names
    pub fn validate_lists(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for list in &self.lists {
            list.check()?;
            if !seen.insert(list.name.as_str()) {
                return Err(list.invalid("duplicate list name"));
            }
        }
        Ok(())
    }

    /// Find a list by name
    pub fn find_list(&self, name: &str) -> Result<&ListConfig, ConfigError> {
        self.lists
            .iter()
            .find(|list| list.name == name)
            .ok_or_else(|| ConfigError::UnknownList {
                name: name.to_string(),
            })
    }

    /// Profiles for the console's standard list pages
    pub fn default_config() -> Self {
        let member_history = ListConfig {
            poll_interval_ms: Some(2_000),
            search: Some(SearchConfig {
                fields: vec!["profiles.nickname".to_string(), "users.userid".to_string()],
                case_sensitive: false,
            }),
            date_field: Some("created_at".to_string()),
            base_filters: vec![Node::and(vec![
                Node::any_of("type", ["deposit", "withdrawal"]),
                Node::any_of("users.role", ["user", "partner"]),
            ])],
            ..ListConfig::named("member_dw_history")
        };

        let casino_live = ListConfig {
            poll_interval_ms: Some(10_000),
            search: Some(SearchConfig {
                fields: vec!["users.userid".to_string(), "game_name".to_string()],
                case_sensitive: false,
            }),
            date_field: Some("bet_at".to_string()),
            base_filters: vec![Node::and(vec![Node::eq("game_type", "live")])],
            ..ListConfig::named("casino_live")
        };

        let mini_game = ListConfig {
            poll_interval_ms: Some(5_000),
            search: Some(SearchConfig {
                fields: vec!["users.userid".to_string()],
                case_sensitive: false,
            }),
            date_field: Some("bet_at".to_string()),
            base_filters: vec![Node::and(vec![Node::eq("game_type", "mini")])],
            ..ListConfig::named("mini_game")
        };

        let direct_members = ListConfig {
            poll_interval_ms: Some(60_000),
            search: Some(SearchConfig {
                fields: vec!["profiles.nickname".to_string(), "userid".to_string()],
                case_sensitive: false,
            }),
            date_field: Some("created_at".to_string()),
            free_text_columns: vec!["nickname".to_string()],
            column_fields: IndexMap::from([(
                "nickname".to_string(),
                "profiles.nickname".to_string(),
            )]),
            base_filters: vec![Node::and(vec![Node::leaf("users.role", Op::Eq, "user")])],
            total_row: Some(TotalRowConfig {
                sum_fields: vec![
                    "balance".to_string(),
                    "point".to_string(),
                    "deposit_total".to_string(),
                    "withdrawal_total".to_string(),
                ],
            }),
            ..ListConfig::named("direct_member_list")
        };

        let domains = ListConfig {
            search: Some(SearchConfig {
                fields: vec!["domain".to_string()],
                case_sensitive: false,
            }),
            ..ListConfig::named("domain")
        };

        Self {
            lists: vec![member_history, casino_live, mini_game, direct_members, domains],
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::default_config()
    }
}
