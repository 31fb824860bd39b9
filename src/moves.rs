use sea_orm::sea_query::{CaseStatement, Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, TransactionTrait,
};
use tracing::{debug, instrument};

use crate::boundary::{self, Boundaries, Position};
use crate::error::{InvalidMove, NestedSetError};
use crate::repository::NestedSet;
use crate::traits::NestedSetModel;

/// Result of a structural move.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MoveOutcome {
    Moved,
    /// The node already sat at the requested position; nothing was written.
    Unchanged,
}

/// How the target of a move is found, inside the move's transaction.
#[derive(Clone, Debug)]
pub(crate) enum Locate<Id> {
    Node(Id),
    Root,
    LeftSibling,
    RightSibling,
}

impl<M> NestedSet<M>
where
    M: NestedSetModel,
{
    /// Reposition `node` and its subtree relative to `target`.
    pub async fn move_to<C>(
        &self,
        conn: &C,
        node: &M,
        target: &M,
        position: Position,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.relocate(conn, node.id(), Locate::Node(target.id()), position)
            .await
    }

    pub async fn move_to_id<C>(
        &self,
        conn: &C,
        node: &M,
        target_id: &M::Id,
        position: Position,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.relocate(conn, node.id(), Locate::Node(target_id.clone()), position)
            .await
    }

    /// Make `node` the last child of `parent`.
    pub async fn make_child_of<C>(
        &self,
        conn: &C,
        node: &M,
        parent: &M,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.move_to(conn, node, parent, Position::Child).await
    }

    pub async fn move_before<C>(
        &self,
        conn: &C,
        node: &M,
        target: &M,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.move_to(conn, node, target, Position::Left).await
    }

    pub async fn move_after<C>(
        &self,
        conn: &C,
        node: &M,
        target: &M,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.move_to(conn, node, target, Position::Right).await
    }

    /// Swap `node` with its left sibling.
    pub async fn move_left<C>(&self, conn: &C, node: &M) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.relocate(conn, node.id(), Locate::LeftSibling, Position::Left)
            .await
    }

    /// Swap `node` with its right sibling.
    pub async fn move_right<C>(&self, conn: &C, node: &M) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.relocate(conn, node.id(), Locate::RightSibling, Position::Right)
            .await
    }

    /// Detach `node` into a tree of its own, placed right after the root of the
    /// tree it currently belongs to. A top-level node is left unchanged.
    pub async fn make_root<C>(&self, conn: &C, node: &M) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.relocate(conn, node.id(), Locate::Root, Position::Right)
            .await
    }

    /// Bring the boundaries in line with the node's stored parent reference.
    pub async fn move_to_new_parent<C>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        match node.parent_id() {
            Some(parent_id) => {
                self.relocate(conn, node.id(), Locate::Node(parent_id), Position::Child)
                    .await
            }
            None => self.make_root(conn, node).await,
        }
    }

    #[instrument(
        level = "debug",
        skip(self, conn, locate),
        fields(entity = %self.config().entity_name())
    )]
    pub(crate) async fn relocate<C>(
        &self,
        conn: &C,
        node_id: M::Id,
        locate: Locate<M::Id>,
        position: Position,
    ) -> Result<MoveOutcome, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self
            .relocate_on(guard.connection(), &node_id, locate, position)
            .await;
        guard.finish(result).await
    }

    async fn relocate_on(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
        locate: Locate<M::Id>,
        position: Position,
    ) -> Result<MoveOutcome, NestedSetError> {
        let node = self
            .find_live(txn, node_id)
            .await?
            .ok_or(InvalidMove::NotPersisted)?;

        let target = match locate {
            Locate::Node(target_id) => self.find_target(txn, &node, &target_id).await?,
            Locate::LeftSibling => self.left_sibling(txn, &node).await?,
            Locate::RightSibling => self.right_sibling(txn, &node).await?,
            Locate::Root => match self.root_of(txn, &node).await? {
                Some(root) => Some(root),
                None => {
                    debug!("node is already top-level");
                    return Ok(MoveOutcome::Unchanged);
                }
            },
        };
        let target = target.ok_or_else(|| NestedSetError::unresolved(position))?;

        if target.id() == node.id() {
            return Err(InvalidMove::ToSelf.into());
        }
        if target.is_inside_subtree(&node) {
            return Err(InvalidMove::IntoOwnSubtree.into());
        }
        if boundary::is_noop(node.interval(), target.interval(), position) {
            debug!(target = ?target.id(), "move skipped, node already in place");
            return Ok(MoveOutcome::Unchanged);
        }

        let bounds = Boundaries::compute(node.interval(), target.interval(), position);
        let new_parent = match position {
            Position::Child => Some(target.id()),
            Position::Left | Position::Right => target.parent_id(),
        };

        self.swap_intervals(txn, &node, &bounds, new_parent).await?;
        self.fix_depth(txn, node_id).await?;
        Ok(MoveOutcome::Moved)
    }

    /// One range update relabelling `[a, b]` and `[c, d]` and rewriting the
    /// moved node's parent reference.
    async fn swap_intervals(
        &self,
        txn: &DatabaseTransaction,
        node: &M,
        bounds: &Boundaries,
        new_parent: Option<M::Id>,
    ) -> Result<(), NestedSetError> {
        let parent = CaseStatement::new()
            .case(
                M::id_column().eq(M::id_to_value(&node.id())),
                Expr::val(M::parent_to_value(new_parent)),
            )
            .finally(Expr::col(M::parent_column()));

        let affected = bounds.affected();
        let result = M::Entity::update_many()
            .col_expr(M::left_column(), remap(M::left_column(), bounds))
            .col_expr(M::right_column(), remap(M::right_column(), bounds))
            .col_expr(M::parent_column(), parent.into())
            .filter(
                Condition::any()
                    .add(M::left_column().between(affected.left, affected.right))
                    .add(M::right_column().between(affected.left, affected.right)),
            )
            .filter(M::visibility())
            .exec(txn)
            .await?;

        debug!(
            a = bounds.a,
            b = bounds.b,
            c = bounds.c,
            d = bounds.d,
            rows = result.rows_affected,
            "swapped intervals"
        );
        Ok(())
    }

    /// Depth is not recoverable from the boundaries alone: count the moved
    /// node's strict ancestors and shift its subtree by the difference.
    async fn fix_depth(
        &self,
        txn: &DatabaseTransaction,
        node_id: &M::Id,
    ) -> Result<(), NestedSetError> {
        let moved = self
            .find_live(txn, node_id)
            .await?
            .ok_or_else(|| NestedSetError::invariant("moved node is no longer visible"))?;

        let ancestors = M::Entity::find()
            .filter(M::left_column().lt(moved.left()))
            .filter(M::right_column().gt(moved.right()))
            .filter(M::visibility())
            .count(txn)
            .await?;
        let depth = i32::try_from(ancestors)
            .map_err(|_| NestedSetError::invariant("ancestor count exceeds depth range"))?;

        let delta = depth - moved.depth();
        if delta == 0 {
            return Ok(());
        }

        let result = M::Entity::update_many()
            .col_expr(M::depth_column(), Expr::col(M::depth_column()).add(delta))
            .filter(M::left_column().between(moved.left(), moved.right()))
            .filter(M::visibility())
            .exec(txn)
            .await?;

        debug!(delta, rows = result.rows_affected, "depth adjusted");
        Ok(())
    }
}

fn remap<C>(column: C, bounds: &Boundaries) -> SimpleExpr
where
    C: ColumnTrait,
{
    CaseStatement::new()
        .case(
            column.between(bounds.a, bounds.b),
            Expr::col(column).add(bounds.lower_shift()),
        )
        .case(
            column.between(bounds.c, bounds.d),
            Expr::col(column).add(bounds.upper_shift()),
        )
        .finally(Expr::col(column))
        .into()
}
