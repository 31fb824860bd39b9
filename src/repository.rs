use std::fmt;
use std::sync::Arc;

use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    entity::prelude::*, ActiveModelTrait, Condition, ConnectionTrait, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
};
use tracing::{debug, instrument};

use crate::boundary::Interval;
use crate::config::{NestedSetConfig, NestedSetOptions};
use crate::error::NestedSetError;
use crate::lock::LockedTransaction;
use crate::materialize::{to_nested, TreeNode};
use crate::scope::TargetScope;
use crate::traits::NestedSetModel;

/// Nested-set maintenance engine for a given model.
///
/// Construct one per record-type configuration and share it by reference or
/// clone; it holds no per-call state.
pub struct NestedSet<M>
where
    M: NestedSetModel,
{
    config: NestedSetConfig,
    target_scope: Option<Arc<dyn TargetScope<M>>>,
}

impl<M> Clone for NestedSet<M>
where
    M: NestedSetModel,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            target_scope: self.target_scope.clone(),
        }
    }
}

impl<M> fmt::Debug for NestedSet<M>
where
    M: NestedSetModel,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedSet")
            .field("config", &self.config)
            .field("target_scope", &self.target_scope.is_some())
            .finish()
    }
}

impl<M> Default for NestedSet<M>
where
    M: NestedSetModel,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> NestedSet<M>
where
    M: NestedSetModel,
{
    /// Engine using the model's default configuration.
    pub fn new() -> Self {
        Self::with_config(M::nested_set_config())
    }

    pub fn with_config(config: NestedSetConfig) -> Self {
        Self {
            config,
            target_scope: None,
        }
    }

    pub fn with_options(options: NestedSetOptions) -> Self {
        Self::with_config(options.apply(M::nested_set_config()))
    }

    /// Constrain target, root and sibling resolution relative to the moved node.
    pub fn with_target_scope(mut self, scope: impl TargetScope<M> + 'static) -> Self {
        self.target_scope = Some(Arc::new(scope));
        self
    }

    pub fn config(&self) -> &NestedSetConfig {
        &self.config
    }

    pub(crate) fn ensure_supported(conn: &impl ConnectionTrait) -> Result<(), NestedSetError> {
        // MySQL evaluates SET assignments left to right against updated values,
        // which breaks the single-pass interval swap.
        match conn.get_database_backend() {
            DbBackend::Postgres | DbBackend::Sqlite => Ok(()),
            _ => Err(NestedSetError::UnsupportedBackend),
        }
    }

    pub(crate) async fn begin<C>(&self, conn: &C) -> Result<LockedTransaction, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        Self::ensure_supported(conn)?;
        LockedTransaction::acquire(self.config.advisory_lock_strategy(), conn).await
    }

    pub(crate) fn scope_for(&self, node: &M) -> Condition {
        match &self.target_scope {
            Some(scope) => scope.constrain(node),
            None => Condition::all(),
        }
    }

    /// Live rows in hierarchical (preorder) display order.
    pub fn query(&self) -> Select<M::Entity> {
        M::Entity::find()
            .filter(M::visibility())
            .order_by_asc(M::left_column())
    }

    pub fn roots(&self) -> Select<M::Entity> {
        self.query().filter(M::parent_column().is_null())
    }

    pub fn children_of(&self, id: &M::Id) -> Select<M::Entity> {
        self.query()
            .filter(M::parent_column().eq(M::id_to_value(id)))
    }

    pub fn parent_of(&self, id: &M::Id) -> Select<M::Entity> {
        let parent_ids = Query::select()
            .column(M::parent_column())
            .from(M::Entity::default())
            .and_where(M::id_column().eq(M::id_to_value(id)))
            .to_owned();

        self.query().filter(M::id_column().in_subquery(parent_ids))
    }

    pub fn ancestors_of(&self, node: &M) -> Select<M::Entity> {
        self.query()
            .filter(M::left_column().lt(node.left()))
            .filter(M::right_column().gt(node.right()))
    }

    pub fn descendants_of(&self, node: &M) -> Select<M::Entity> {
        self.query()
            .filter(M::left_column().gt(node.left()))
            .filter(M::right_column().lt(node.right()))
    }

    pub fn siblings_of(&self, node: &M) -> Select<M::Entity> {
        let parent = match node.parent_id() {
            Some(parent_id) => M::parent_column().eq(M::id_to_value(&parent_id)),
            None => M::parent_column().is_null(),
        };

        self.query()
            .filter(parent)
            .filter(M::id_column().ne(M::id_to_value(&node.id())))
    }

    pub fn leaves(&self) -> Select<M::Entity> {
        self.query()
            .filter(Expr::col(M::right_column()).eq(Expr::col(M::left_column()).add(1)))
    }

    pub async fn find<C>(&self, conn: &C, id: &M::Id) -> Result<Option<M>, NestedSetError>
    where
        C: ConnectionTrait,
    {
        Ok(self.find_live(conn, id).await?)
    }

    /// Topmost ancestor of `node`, or `None` when the node is top-level.
    pub async fn root_of<C>(&self, conn: &C, node: &M) -> Result<Option<M>, NestedSetError>
    where
        C: ConnectionTrait,
    {
        let root = self
            .ancestors_of(node)
            .filter(M::parent_column().is_null())
            .filter(self.scope_for(node))
            .one(conn)
            .await?;
        Ok(root)
    }

    pub async fn left_sibling<C>(&self, conn: &C, node: &M) -> Result<Option<M>, NestedSetError>
    where
        C: ConnectionTrait,
    {
        let sibling = self
            .query()
            .filter(M::right_column().eq(node.left() - 1))
            .filter(self.scope_for(node))
            .one(conn)
            .await?;
        Ok(sibling)
    }

    pub async fn right_sibling<C>(&self, conn: &C, node: &M) -> Result<Option<M>, NestedSetError>
    where
        C: ConnectionTrait,
    {
        let sibling = self
            .query()
            .filter(M::left_column().eq(node.right() + 1))
            .filter(self.scope_for(node))
            .one(conn)
            .await?;
        Ok(sibling)
    }

    /// Every live node, materialized as a forest.
    pub async fn all_nested<C>(&self, conn: &C) -> Result<Vec<TreeNode<M>>, NestedSetError>
    where
        C: ConnectionTrait,
    {
        let rows = self.query().all(conn).await?;
        Ok(to_nested(rows))
    }

    /// Give a pending record the rightmost leaf slot: `max(right) + 1` and
    /// `max(right) + 2` at depth zero.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config.entity_name()))]
    pub async fn place_as_new_leaf<C>(
        &self,
        conn: &C,
        active: &mut M::ActiveModel,
    ) -> Result<Interval, NestedSetError>
    where
        C: ConnectionTrait,
    {
        Self::ensure_supported(conn)?;
        let max_right = self.max_right(conn).await?;
        let slot = Interval::new(max_right + 1, max_right + 2);
        M::set_boundaries(active, slot.left, slot.right, 0);
        debug!(left = slot.left, right = slot.right, "placed as new leaf");
        Ok(slot)
    }

    /// Persist a new record and nest it under its declared parent.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config.entity_name()))]
    pub async fn insert<C>(&self, conn: &C, active: M::ActiveModel) -> Result<M, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.insert_on(guard.connection(), active).await;
        guard.finish(result).await
    }

    async fn insert_on(
        &self,
        txn: &DatabaseTransaction,
        mut active: M::ActiveModel,
    ) -> Result<M, NestedSetError> {
        self.place_as_new_leaf(txn, &mut active).await?;
        let model = active.insert(txn).await?;

        if model.parent_id().is_some() {
            self.move_to_new_parent(txn, &model).await?;
        }

        self.find_live(txn, &model.id())
            .await?
            .ok_or_else(|| NestedSetError::invariant("inserted node is no longer visible"))
    }

    async fn max_right<C>(&self, conn: &C) -> Result<i32, DbErr>
    where
        C: ConnectionTrait,
    {
        let max_right = M::Entity::find()
            .select_only()
            .column_as(M::right_column().max(), "max_right")
            .filter(M::visibility())
            .into_tuple::<Option<i32>>()
            .one(conn)
            .await?;
        Ok(max_right.flatten().unwrap_or(0))
    }

    pub(crate) async fn find_live<C>(&self, conn: &C, id: &M::Id) -> Result<Option<M>, DbErr>
    where
        C: ConnectionTrait,
    {
        M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .filter(M::visibility())
            .one(conn)
            .await
    }

    /// Lookup ignoring [`visibility`](crate::NodeRecord::visibility).
    pub(crate) async fn find_any<C>(&self, conn: &C, id: &M::Id) -> Result<Option<M>, DbErr>
    where
        C: ConnectionTrait,
    {
        M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await
    }

    pub(crate) async fn find_target<C>(
        &self,
        conn: &C,
        node: &M,
        target_id: &M::Id,
    ) -> Result<Option<M>, DbErr>
    where
        C: ConnectionTrait,
    {
        M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(target_id)))
            .filter(M::visibility())
            .filter(self.scope_for(node))
            .one(conn)
            .await
    }
}
