//! Bounded newest-first history.

use serde::Serialize;
use std::collections::VecDeque;

/// A capped buffer that keeps the newest entries at the front.
///
/// Once full, every push evicts exactly one entry: the oldest.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct History<T> {
    #[serde(skip)]
    cap: usize,
    items: VecDeque<T>,
}

impl<T> History<T> {
    /// Creates an empty history holding at most `cap` entries (minimum 1).
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            items: VecDeque::with_capacity(cap.min(4096)),
        }
    }

    /// Pushes to the front, returning the evicted oldest entry if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_front(item);
        if self.items.len() > self.cap {
            self.items.pop_back()
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The `n` newest entries, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().take(n)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> History<T> {
    /// Copies the entries out, newest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
