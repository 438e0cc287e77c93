//! Core module containing the query model, the codec and the collaborator seams

pub mod codec;
pub mod error;
pub mod events;
pub mod predicate;
pub mod query;
pub mod source;

pub use codec::{
    ColumnFilters, Sorter, SorterResult, SortOrder, TableAction, TableEvent, TableExtra,
    TableOptionsCodec, TablePagination,
};
pub use error::{ConfigError, NetworkError, TableQueryError, TableQueryResult, ValidationError};
pub use events::{ListEvent, NotificationBus, NotificationEnvelope};
pub use predicate::{FilterValue, Leaf, Node, Op};
pub use query::{Pagination, PaginationMeta, QueryOptions, RemotePage, SortDirection, SortSpec};
pub use source::RemoteSource;
