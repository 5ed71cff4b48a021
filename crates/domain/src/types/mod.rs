//! Domain types and models

pub mod events;
pub mod metrics;
pub mod query;
pub mod recovery;
pub mod session;

pub use events::{AuthEvent, AuthStateChange, ConnectivityEvent, EventKind};
pub use metrics::{MetricCategory, MetricRecord};
pub use query::{
    Filter, FilterOp, Mutation, MutationKind, MutationOptions, OrderBy, Pagination, QueryOptions,
    QuerySpec, RetryOverrides, RowRange,
};
pub use recovery::{RecoveryPhase, RecoveryStats, RecoveryStrategy};
pub use session::{Expiry, Session, SessionBackup, TokenSnapshot, TokenStatus};
