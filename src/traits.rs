use std::fmt::Debug;
use std::hash::Hash;

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, Condition, EntityTrait, FromQueryResult,
    IntoActiveModel, Value,
};

use crate::boundary::Interval;
use crate::config::NestedSetConfig;

/// Base contract for SeaORM `Model` types maintained by the engine.
///
/// Implementations are normally provided by the `#[derive(NestedSetModel)]`
/// macro, together with [`HasParentRef`] and [`HasBoundaries`].
pub trait NodeRecord:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    /// Default configuration used by [`NestedSet::new`](crate::NestedSet::new).
    fn nested_set_config() -> NestedSetConfig;

    fn id(&self) -> Self::Id;
    fn id_column() -> <Self::Entity as EntityTrait>::Column;
    fn id_to_value(id: &Self::Id) -> Value;

    /// Primary key of a pending active model, when it carries one.
    fn active_id(active: &Self::ActiveModel) -> Option<Self::Id>;

    /// Condition selecting rows that take part in the tree structure.
    ///
    /// Tombstoned rows are excluded by models implementing [`HasTombstone`].
    fn visibility() -> Condition {
        Condition::all()
    }
}

/// Access to the parent reference column.
pub trait HasParentRef: NodeRecord {
    fn parent_id(&self) -> Option<Self::Id>;
    fn parent_column() -> <Self::Entity as EntityTrait>::Column;
    fn parent_to_value(parent: Option<Self::Id>) -> Value;
    fn set_parent(active: &mut Self::ActiveModel, parent: Option<Self::Id>);

    fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }
}

/// Access to the `left`/`right`/`depth` columns.
pub trait HasBoundaries: NodeRecord {
    fn left(&self) -> i32;
    fn right(&self) -> i32;
    fn depth(&self) -> i32;

    fn left_column() -> <Self::Entity as EntityTrait>::Column;
    fn right_column() -> <Self::Entity as EntityTrait>::Column;
    fn depth_column() -> <Self::Entity as EntityTrait>::Column;

    fn set_boundaries(active: &mut Self::ActiveModel, left: i32, right: i32, depth: i32);

    /// Mark the boundary columns as untouched so a save leaves them alone.
    fn clear_boundaries(active: &mut Self::ActiveModel);

    fn interval(&self) -> Interval {
        Interval::new(self.left(), self.right())
    }

    fn descendant_count(&self) -> i32 {
        (self.right() - self.left() - 1) / 2
    }

    fn is_leaf(&self) -> bool {
        self.right() - self.left() == 1
    }

    /// Whether `self` lies in `other`'s subtree, `other` included.
    fn is_inside_subtree(&self, other: &Self) -> bool {
        self.interval().is_within(&other.interval())
    }

    fn is_descendant_of(&self, other: &Self) -> bool {
        self.left() > other.left() && self.right() < other.right()
    }

    fn is_ancestor_of(&self, other: &Self) -> bool {
        other.is_descendant_of(self)
    }
}

/// Soft-delete capability. A tombstoned row keeps its boundaries but drops
/// out of [`NodeRecord::visibility`], so structural shifts skip it.
pub trait HasTombstone: NodeRecord {
    fn tombstone_column() -> <Self::Entity as EntityTrait>::Column;
    fn is_tombstoned(&self) -> bool;

    /// Value stored in the tombstone column when a row is soft-deleted.
    fn tombstone_mark() -> Value;

    /// Typed `NULL` for the tombstone column.
    fn cleared_tombstone() -> Value;
}

/// Everything the move, cascade and repair engines need.
pub trait NestedSetModel: HasParentRef + HasBoundaries {}

impl<M> NestedSetModel for M where M: HasParentRef + HasBoundaries {}
