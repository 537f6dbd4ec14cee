//! Arrays
//!
//! An array is a fixed, ordered list of cells with a directional, stateful
//! iterator. Reversing flips the traversal direction and restarts the
//! iterator from that direction's end.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cell::Cell;
use crate::stack::Operand;

/// Traversal direction of an array iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    direction: Direction,
    visited: usize,
}

/// Named, ordered list of cells with a single-pass directional iterator.
///
/// The cell list is fixed at definition time; only the cursor mutates.
pub struct Arr {
    cells: Vec<Arc<dyn Cell>>,
    cursor: Mutex<Cursor>,
}

impl Arr {
    pub(crate) fn new(cells: Vec<Arc<dyn Cell>>) -> Self {
        Arr {
            cells,
            cursor: Mutex::new(Cursor {
                direction: Direction::Forward,
                visited: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when the array holds no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Current traversal direction.
    pub fn direction(&self) -> Direction {
        self.lock().direction
    }

    /// True while the iterator has unvisited cells.
    pub fn has_next(&self) -> bool {
        self.lock().visited < self.cells.len()
    }

    /// Flip direction and restart the iterator from the new direction's end.
    pub fn reverse(&self) {
        let mut cursor = self.lock();
        cursor.direction = match cursor.direction {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        };
        cursor.visited = 0;
    }

    /// Advance the iterator, returning the next cell in direction order.
    fn next_cell(&self) -> Option<Arc<dyn Cell>> {
        let mut cursor = self.lock();
        if cursor.visited >= self.cells.len() {
            return None;
        }
        let index = match cursor.direction {
            Direction::Forward => cursor.visited,
            Direction::Backward => self.cells.len() - 1 - cursor.visited,
        };
        cursor.visited += 1;
        Some(Arc::clone(&self.cells[index]))
    }
}

impl Cell for Arr {
    /// Delegates to the iterator's current position; an exhausted iterator
    /// delivers nothing.
    fn apply(&self, consumer: &mut dyn FnMut(Operand)) {
        if let Some(cell) = self.next_cell() {
            cell.apply(consumer);
        }
    }
}

impl fmt::Display for Arr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = self.direction();
        write!(f, "[")?;
        for i in 0..self.cells.len() {
            let index = match direction {
                Direction::Forward => i,
                Direction::Backward => self.cells.len() - 1 - i,
            };
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.cells[index])?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{value_of, Lit};

    fn arr_of(values: &[Operand]) -> Arr {
        Arr::new(
            values
                .iter()
                .map(|&v| Arc::new(Lit(v)) as Arc<dyn Cell>)
                .collect(),
        )
    }

    fn drain(arr: &Arr) -> Vec<Operand> {
        let mut out = Vec::new();
        while arr.has_next() {
            arr.apply(&mut |v| out.push(v));
        }
        out
    }

    #[test]
    fn test_forward_iteration_is_in_order() {
        let arr = arr_of(&[1, 2, 3, 4, 5]);
        assert_eq!(drain(&arr), vec![1, 2, 3, 4, 5]);
        assert!(!arr.has_next());
    }

    #[test]
    fn test_reverse_then_iterate_is_backwards() {
        let arr = arr_of(&[1, 2, 3, 4, 5]);
        arr.reverse();
        assert_eq!(arr.direction(), Direction::Backward);
        assert_eq!(drain(&arr), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_reverse_twice_restores_order_and_position() {
        let arr = arr_of(&[1, 2, 3]);
        assert_eq!(value_of(&arr), Some(1));
        arr.reverse();
        arr.reverse();
        assert_eq!(arr.direction(), Direction::Forward);
        assert_eq!(drain(&arr), vec![1, 2, 3]);
    }

    #[test]
    fn test_exhausted_iterator_delivers_nothing() {
        let arr = arr_of(&[1]);
        assert_eq!(value_of(&arr), Some(1));
        assert_eq!(value_of(&arr), None);
    }

    #[test]
    fn test_reverse_resets_a_partial_traversal() {
        let arr = arr_of(&[1, 2, 3]);
        assert_eq!(value_of(&arr), Some(1));
        arr.reverse();
        // Full traversal from the back, not a continuation.
        assert_eq!(drain(&arr), vec![3, 2, 1]);
    }

    #[test]
    fn test_display_follows_direction() {
        let arr = arr_of(&[1, 2, 3]);
        assert_eq!(arr.to_string(), "[1, 2, 3]");
        arr.reverse();
        assert_eq!(arr.to_string(), "[3, 2, 1]");
    }

    #[test]
    fn test_empty_array() {
        let arr = arr_of(&[]);
        assert!(arr.is_empty());
        assert!(!arr.has_next());
        assert_eq!(value_of(&arr), None);
    }
}
