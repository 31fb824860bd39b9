//! Pure interval arithmetic behind subtree moves.
//!
//! Relocating a subtree swaps two adjacent intervals of the boundary number
//! line: the subtree's own `[left, right]` and the run of values between it and
//! the insertion point. Four sorted values `a <= b <= c <= d` describe the swap;
//! values in `[a, b]` shift up by `d - b`, values in `[c, d]` shift down by
//! `c - a`, and everything else is left alone.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidMove;

/// Where a node is placed relative to its target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Last child of the target.
    Child,
    /// Sibling immediately before the target.
    Left,
    /// Sibling immediately after the target.
    Right,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Child => "child",
            Position::Left => "left",
            Position::Right => "right",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = InvalidMove;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "child" => Ok(Position::Child),
            "left" => Ok(Position::Left),
            "right" => Ok(Position::Right),
            other => Err(InvalidMove::UnknownPosition(other.to_owned())),
        }
    }
}

/// A node's `[left, right]` boundary pair.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Interval {
    pub left: i32,
    pub right: i32,
}

impl Interval {
    pub fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    /// Number of boundary values covered, `right - left + 1`.
    pub fn span(&self) -> i32 {
        self.right - self.left + 1
    }

    /// Whether `self` lies within `outer`, inclusive of `outer` itself.
    pub fn is_within(&self, outer: &Interval) -> bool {
        self.left >= outer.left && self.right <= outer.right
    }
}

/// Raw insertion point for `position`, pulled back by one when it falls after
/// the node, whose own range is about to vacate that space.
pub fn primary_boundary(node: Interval, target: Interval, position: Position) -> i32 {
    let boundary = match position {
        Position::Child => target.right,
        Position::Left => target.left,
        Position::Right => target.right + 1,
    };

    if boundary > node.right {
        boundary - 1
    } else {
        boundary
    }
}

/// Complementary edge of the swapped interval.
pub fn other_boundary(node: Interval, target: Interval, position: Position) -> i32 {
    if primary_boundary(node, target, position) > node.right {
        node.right + 1
    } else {
        node.left - 1
    }
}

/// `{node.left, node.right, primary, other}` in ascending order.
pub fn sorted_boundaries(node: Interval, target: Interval, position: Position) -> [i32; 4] {
    let mut values = [
        node.left,
        node.right,
        primary_boundary(node, target, position),
        other_boundary(node, target, position),
    ];
    values.sort_unstable();
    values
}

/// A move whose insertion point coincides with one of the node's own edges
/// leaves the tree exactly as it is.
pub fn is_noop(node: Interval, target: Interval, position: Position) -> bool {
    let primary = primary_boundary(node, target, position);
    primary == node.right || primary == node.left
}

/// The two swapping intervals `[a, b]` and `[c, d]`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Boundaries {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
}

impl Boundaries {
    pub fn compute(node: Interval, target: Interval, position: Position) -> Self {
        let [a, b, c, d] = sorted_boundaries(node, target, position);
        Self { a, b, c, d }
    }

    /// Shift applied to values inside `[a, b]`.
    pub fn lower_shift(&self) -> i32 {
        self.d - self.b
    }

    /// Shift applied to values inside `[c, d]`.
    pub fn upper_shift(&self) -> i32 {
        self.a - self.c
    }

    /// The whole affected range `[a, d]`.
    pub fn affected(&self) -> Interval {
        Interval::new(self.a, self.d)
    }

    /// New value of a single boundary. Mirrors the CASE expression issued
    /// by the move engine.
    pub fn remap(&self, value: i32) -> i32 {
        if (self.a..=self.b).contains(&value) {
            value + self.lower_shift()
        } else if (self.c..=self.d).contains(&value) {
            value + self.upper_shift()
        } else {
            value
        }
    }
}
