use thiserror::Error;

use crate::boundary::Position;

/// Errors returned by the nested-set maintenance APIs.
#[derive(Debug, Error)]
pub enum NestedSetError {
    #[error("nested-set maintenance supports PostgreSQL and SQLite connections only")]
    UnsupportedBackend,

    /// Any statement failed; the enclosing transaction has been rolled back.
    #[error("storage failure: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("invalid move: {0}")]
    InvalidMove(#[from] InvalidMove),

    #[error("cannot resolve target node")]
    UnresolvedTarget,

    #[error("cannot resolve target node; this node cannot move any further to the {0}")]
    NoFurtherSibling(Position),

    #[error("nested-set invariant violation: {0}")]
    Invariant(String),
}

impl NestedSetError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }

    /// Unresolved target for `position`. Directional moves report that no
    /// sibling exists in that direction.
    pub(crate) fn unresolved(position: Position) -> Self {
        match position {
            Position::Child => Self::UnresolvedTarget,
            Position::Left | Position::Right => Self::NoFurtherSibling(position),
        }
    }
}

/// Reasons a move is rejected before any statement is issued.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InvalidMove {
    #[error("a new node cannot be moved")]
    NotPersisted,

    #[error("unknown position `{0}`; expected child, left or right")]
    UnknownPosition(String),

    #[error("a node cannot be moved to itself")]
    ToSelf,

    #[error("a node cannot be moved to a descendant of itself")]
    IntoOwnSubtree,
}
