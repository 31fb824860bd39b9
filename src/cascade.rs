use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
    Value,
};
use tracing::{debug, instrument};

use crate::boundary::Interval;
use crate::error::NestedSetError;
use crate::repository::NestedSet;
use crate::traits::{HasTombstone, NestedSetModel};

impl<M> NestedSet<M>
where
    M: NestedSetModel,
{
    /// Hard-delete every strict descendant of `node` and pull later
    /// boundaries back by the span of `node` itself. Returns the number of
    /// deleted rows.
    ///
    /// Tombstoned descendants are deleted as well, found through their
    /// parent references since their boundaries may be stale. When `node` is
    /// itself tombstoned its slot is already closed and only that sweep runs.
    ///
    /// This is the `BeforeDelete` half of a hard delete: `node` must be
    /// removed next, as [`delete`](Self::delete) does.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn delete_descendants<C>(&self, conn: &C, node: &M) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.delete_descendants_on(guard.connection(), &node.id()).await;
        guard.finish(result).await
    }

    /// Hard-delete `node` together with its subtree, tombstoned rows
    /// included. Returns the number of deleted rows.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn delete<C>(&self, conn: &C, node: &M) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.delete_on(guard.connection(), &node.id()).await;
        guard.finish(result).await
    }

    async fn delete_descendants_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let mut removed = 0;
        if let Some(node) = self.find_live(txn, node_id).await? {
            removed += M::Entity::delete_many()
                .filter(M::left_column().gt(node.left()))
                .filter(M::right_column().lt(node.right()))
                .filter(M::visibility())
                .exec(txn)
                .await?
                .rows_affected;

            self.close_gap(txn, node.interval()).await?;
        } else if self.find_any(txn, node_id).await?.is_none() {
            debug!("node not found, nothing to cascade");
            return Ok(0);
        }

        removed += self.delete_lineage(txn, node_id).await?;
        debug!(removed, "descendants deleted");
        Ok(removed)
    }

    /// Delete every row whose parent chain leads to `node_id`, one level per
    /// statement, regardless of visibility.
    async fn delete_lineage(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let mut removed = 0;
        let mut frontier = vec![M::id_to_value(node_id)];

        loop {
            let level: Vec<Value> = M::Entity::find()
                .filter(M::parent_column().is_in(frontier))
                .all(txn)
                .await?
                .iter()
                .map(|row| M::id_to_value(&row.id()))
                .collect();
            if level.is_empty() {
                break;
            }

            removed += M::Entity::delete_many()
                .filter(M::id_column().is_in(level.clone()))
                .exec(txn)
                .await?
                .rows_affected;
            frontier = level;
        }

        if removed > 0 {
            debug!(removed, "rows below the deleted node swept by parent reference");
        }
        Ok(removed)
    }

    async fn delete_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let descendants = self.delete_descendants_on(txn, node_id).await?;
        let own = M::Entity::delete_many()
            .filter(M::id_column().eq(M::id_to_value(node_id)))
            .exec(txn)
            .await?
            .rows_affected;
        Ok(descendants + own)
    }

    /// Pull every live boundary after `vacated.right` back by its span.
    pub(crate) async fn close_gap(
        &self,
        txn: &DatabaseTransaction,
        vacated: Interval,
    ) -> Result<(), NestedSetError> {
        self.shift_from(txn, vacated.right + 1, -vacated.span())
            .await
            .map(|_| ())
    }

    /// Add `diff` to every live `left` and `right` that is `>= from`.
    /// Returns the number of rows whose `right` moved.
    async fn shift_from(
        &self,
        txn: &DatabaseTransaction,
        from: i32,
        diff: i32,
    ) -> Result<u64, NestedSetError> {
        M::Entity::update_many()
            .col_expr(M::left_column(), Expr::col(M::left_column()).add(diff))
            .filter(M::left_column().gte(from))
            .filter(M::visibility())
            .exec(txn)
            .await?;

        let shifted = M::Entity::update_many()
            .col_expr(M::right_column(), Expr::col(M::right_column()).add(diff))
            .filter(M::right_column().gte(from))
            .filter(M::visibility())
            .exec(txn)
            .await?
            .rows_affected;

        debug!(from, diff, shifted, "boundaries shifted");
        Ok(shifted)
    }
}

impl<M> NestedSet<M>
where
    M: NestedSetModel + HasTombstone,
{
    /// Tombstone every strict descendant of `node` and close the gap among
    /// the remaining live rows. Tombstoned boundaries are kept as they were.
    /// `node` itself must be tombstoned next, as
    /// [`soft_delete`](Self::soft_delete) does.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn soft_delete_descendants<C>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .soft_delete_on(guard.connection(), &node.id(), false)
            .await;
        guard.finish(result).await
    }

    /// Tombstone `node` and its subtree, then close the gap.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn soft_delete<C>(&self, conn: &C, node: &M) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.soft_delete_on(guard.connection(), &node.id(), true).await;
        guard.finish(result).await
    }

    async fn soft_delete_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
        include_self: bool,
    ) -> Result<u64, NestedSetError> {
        let Some(node) = self.find_live(txn, node_id).await? else {
            debug!("node not found or already tombstoned");
            return Ok(0);
        };

        let (left, right) = if include_self {
            (M::left_column().gte(node.left()), M::right_column().lte(node.right()))
        } else {
            (M::left_column().gt(node.left()), M::right_column().lt(node.right()))
        };

        let tombstoned = M::Entity::update_many()
            .col_expr(M::tombstone_column(), Expr::value(M::tombstone_mark()))
            .filter(left)
            .filter(right)
            .filter(M::visibility())
            .exec(txn)
            .await?
            .rows_affected;

        self.close_gap(txn, node.interval()).await?;
        debug!(tombstoned, "subtree tombstoned");
        Ok(tombstoned)
    }

    /// Reserve the slot of a tombstoned `node` before it becomes visible
    /// again: every live boundary from `node.left` on moves up by its span.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn shift_siblings_for_restore<C>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .shift_siblings_for_restore_on(guard.connection(), &node.id())
            .await;
        guard.finish(result).await
    }

    async fn shift_siblings_for_restore_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let Some(node) = self.find_any(txn, node_id).await? else {
            return Ok(0);
        };
        let slot = node.interval();
        self.shift_from(txn, slot.left, slot.span()).await
    }

    /// Clear the tombstone of every still-tombstoned strict descendant of
    /// `node`. Boundaries are left untouched.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn restore_descendants<C>(&self, conn: &C, node: &M) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .restore_descendants_on(guard.connection(), &node.id())
            .await;
        guard.finish(result).await
    }

    async fn restore_descendants_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let Some(node) = self.find_any(txn, node_id).await? else {
            return Ok(0);
        };

        let restored = M::Entity::update_many()
            .col_expr(M::tombstone_column(), Expr::value(M::cleared_tombstone()))
            .filter(M::left_column().gt(node.left()))
            .filter(M::right_column().lt(node.right()))
            .filter(M::tombstone_column().is_not_null())
            .exec(txn)
            .await?
            .rows_affected;

        debug!(restored, "descendants restored");
        Ok(restored)
    }

    /// Reserve the slot, clear `node`'s own tombstone and restore its
    /// descendants. Returns the number of rows made visible.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name(), node = ?node.id()))]
    pub async fn restore<C>(&self, conn: &C, node: &M) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.restore_on(guard.connection(), &node.id()).await;
        guard.finish(result).await
    }

    async fn restore_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        match self.find_any(txn, node_id).await? {
            Some(node) if node.is_tombstoned() => {}
            _ => {
                debug!("node is not tombstoned, nothing to restore");
                return Ok(0);
            }
        }

        self.shift_siblings_for_restore_on(txn, node_id).await?;
        let own = self.clear_tombstone(txn, node_id).await?;
        let descendants = self.restore_descendants_on(txn, node_id).await?;
        Ok(own + descendants)
    }

    pub(crate) async fn clear_tombstone(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let result = M::Entity::update_many()
            .col_expr(M::tombstone_column(), Expr::value(M::cleared_tombstone()))
            .filter(M::id_column().eq(M::id_to_value(node_id)))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }

    pub(crate) async fn tombstone_row(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<u64, NestedSetError> {
        let result = M::Entity::update_many()
            .col_expr(M::tombstone_column(), Expr::value(M::tombstone_mark()))
            .filter(M::id_column().eq(M::id_to_value(node_id)))
            .exec(txn)
            .await?;
        Ok(result.rows_affected)
    }
}
