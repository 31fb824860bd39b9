//! SeaORM-centric nested set (modified preorder tree traversal) maintenance.
//!
//! Each record carries a parent reference plus a `left`/`right` boundary pair
//! and a `depth`, so ancestor, descendant and sibling queries become range
//! comparisons. The engine keeps those columns consistent across inserts,
//! moves, cascading deletes and soft-delete restores using set-based
//! statements inside one transaction per operation, and offers repair tools
//! for trees that were modified behind its back.
//!
//! PostgreSQL and SQLite are supported. Concurrent structural mutations of
//! overlapping subtrees are only serialized when an advisory lock strategy is
//! configured (PostgreSQL) or the store runs at serializable isolation.

pub mod boundary;
pub mod cascade;
pub mod config;
pub mod error;
pub mod hooks;
pub mod lock;
pub mod materialize;
pub mod moves;
pub mod repair;
pub mod repository;
pub mod scope;
pub mod traits;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::boundary::Position;
    pub use crate::config::{AdvisoryLockStrategy, NestedSetConfig, NestedSetOptions};
    pub use crate::hooks::{HookRegistry, LifecycleStage};
    pub use crate::moves::MoveOutcome;
    pub use crate::repository::NestedSet;
    pub use crate::traits::{HasBoundaries, HasParentRef, HasTombstone, NestedSetModel, NodeRecord};
}

pub use boundary::{Boundaries, Interval, Position};
pub use config::{AdvisoryLockKey, AdvisoryLockStrategy, NestedSetConfig, NestedSetOptions};
pub use error::{InvalidMove, NestedSetError};
pub use hooks::{
    DeleteMode, HookRegistry, LifecycleEvent, LifecycleHook, LifecycleStage, SoftTreeHook,
    TreeHook,
};
pub use materialize::{to_nested, TreeNode};
pub use moves::MoveOutcome;
pub use nested_set_macros::NestedSetModel as NestedSetModelDerive;
pub use repair::NestingReport;
pub use repository::NestedSet;
pub use scope::TargetScope;
pub use traits::{HasBoundaries, HasParentRef, HasTombstone, NestedSetModel, NodeRecord};
