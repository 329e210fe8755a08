//! Ordered-list reconciliation.
//!
//! A drag-and-drop view reports its new visual order as a list of positions
//! into the backing list. `reorder` commits that order in a single assignment,
//! or rejects it and leaves the backing list untouched.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReorderError {
    #[error("Order has {actual} entries but the list has {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Position {index} is out of range for a list of {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("Position {0} appears more than once")]
    Duplicate(usize),
}

pub type Result<T> = std::result::Result<T, ReorderError>;

/// Check that `order` is a permutation of `0..len`.
pub fn validate_permutation(len: usize, order: &[usize]) -> Result<()> {
    if order.len() != len {
        return Err(ReorderError::LengthMismatch {
            expected: len,
            actual: order.len(),
        });
    }

    let mut seen = vec![false; len];
    for &index in order {
        if index >= len {
            return Err(ReorderError::OutOfRange { index, len });
        }
        if seen[index] {
            return Err(ReorderError::Duplicate(index));
        }
        seen[index] = true;
    }
    Ok(())
}

/// Build `[items[order[0]], items[order[1]], ...]`.
pub fn apply_permutation<T: Clone>(items: &[T], order: &[usize]) -> Result<Vec<T>> {
    validate_permutation(items.len(), order)?;
    Ok(order.iter().map(|&i| items[i].clone()).collect())
}

/// Replace `items` with its reordering. On error `items` is unchanged.
pub fn reorder<T: Clone>(items: &mut Vec<T>, order: &[usize]) -> Result<()> {
    let reordered = apply_permutation(items, order)?;
    *items = reordered;
    Ok(())
}

/// Permutation produced by dragging the item at `from` to position `to`.
pub fn drag_order(len: usize, from: usize, to: usize) -> Result<Vec<usize>> {
    if from >= len {
        return Err(ReorderError::OutOfRange { index: from, len });
    }
    if to >= len {
        return Err(ReorderError::OutOfRange { index: to, len });
    }

    let mut order: Vec<usize> = (0..len).collect();
    let moved = order.remove(from);
    order.insert(to, moved);
    Ok(order)
}
