//! # table-query
//!
//! The table-query protocol behind the list pages of an admin console: grid
//! interactions in, backend-agnostic query descriptors out, remote pages back
//! into table state.
//!
//! ## Features
//!
//! - **Predicate Trees**: AND/OR/leaf filters with `eq`, `like`, `ilike`, `in`, `gte`, `lte`
//! - **Bucket Edits**: search boxes and date pickers replace their own OR-group, never duplicate it
//! - **Grid Codec**: pagination, column filters and multi-column sort mapped to one `QueryOptions`
//! - **Last-Request-Wins**: a slow older response never overwrites a newer one
//! - **Scoped Polling**: background refresh released on unmount or drop
//! - **Configuration-Based**: per-list profiles loaded from YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use table_query::prelude::*;
//!
//! let config = ConsoleConfig::default_config();
//! let list = config.find_list("member_dw_history")?;
//!
//! let controller = RemoteListController::from_config(list, Arc::new(InMemorySource::new()));
//! controller.mount().await;
//! controller.quick_search("alice").await;
//! controller.start_polling(Duration::from_secs(2))?;
//!
//! for row in controller.state().data_rows() {
//!     println!("{}: {}", row.key, row.data);
//! }
//! controller.unmount();
//! ```

pub mod config;
pub mod controller;
pub mod core;
pub mod storage;
pub mod telemetry;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Query Model ===
    pub use crate::core::{
        codec::{
            ColumnFilters, Sorter, SorterResult, SortOrder, TableAction, TableEvent, TableExtra,
            TableOptionsCodec, TablePagination, day_bounds, to_iso,
        },
        predicate::{FilterValue, Leaf, Node, Op},
        query::{Pagination, PaginationMeta, QueryOptions, RemotePage, SortDirection, SortSpec},
    };

    // === Collaborators ===
    pub use crate::core::{
        events::{ListEvent, NotificationBus, NotificationEnvelope},
        source::RemoteSource,
    };

    // === Errors ===
    pub use crate::core::error::{
        ConfigError, NetworkError, TableQueryError, TableQueryResult, ValidationError,
    };

    // === Controller ===
    pub use crate::controller::{
        FetchOutcome, ListSnapshot, LoadStatus, RemoteListController, RowKind, RowMapper,
        RowView, SearchSpec, TotalRowSpec,
    };

    // === Storage ===
    pub use crate::storage::InMemorySource;

    // === Config ===
    pub use crate::config::{ConsoleConfig, ListConfig, SearchConfig, TotalRowConfig};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
