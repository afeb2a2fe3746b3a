//! Merge heap: k-way 병합용 이진 힙
//!
//! A min-heap (under the configured sort directions) over buffered rows.
//! `std::collections::BinaryHeap` needs a static `Ord`, while the key order
//! here is only known at runtime, so push/pop/sift are written out.

use crate::merge::{SortColumns, SortOrder};
use crate::value::{Value, compare_keys};
use std::cmp::Ordering;

/// A buffered row waiting in the heap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapNode {
    /// Input cursor the row came from
    pub rows_index: usize,
    /// Key projection, only used for comparison
    pub sort_values: Vec<Value>,
    /// Full row, used for output
    pub values: Vec<Value>,
    seq: u64,
}

impl HeapNode {
    pub fn new(rows_index: usize, sort_values: Vec<Value>, values: Vec<Value>) -> Self {
        Self {
            rows_index,
            sort_values,
            values,
            seq: 0,
        }
    }
}

/// Binary min-heap keyed by a multi-column sort key.
#[derive(Debug, Clone, Default)]
pub struct MergeHeap {
    nodes: Vec<HeapNode>,
    orders: Vec<SortOrder>,
    next_seq: u64,
}

impl MergeHeap {
    pub fn new(columns: &SortColumns) -> Self {
        Self::with_orders(columns.orders())
    }

    pub fn with_orders(orders: Vec<SortOrder>) -> Self {
        Self {
            nodes: Vec::new(),
            orders,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    pub fn peek(&self) -> Option<&HeapNode> {
        self.nodes.first()
    }

    pub fn push(&mut self, mut node: HeapNode) {
        node.seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.push(node);
        self.sift_up(self.nodes.len() - 1);
    }

    pub fn pop(&mut self) -> Option<HeapNode> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.swap(0, last);
        let node = self.nodes.pop();
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        node
    }

    /// Compare two key tuples under this heap's directions.
    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        compare_keys(a, b, &self.orders)
    }

    /// Ties fall back to push order, so equal keys pop first-in first-out.
    fn less(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.nodes[i], &self.nodes[j]);
        match self.compare(&a.sort_values, &b.sort_values) {
            Ordering::Equal => a.seq < b.seq,
            ord => ord == Ordering::Less,
        }
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.nodes.swap(i, j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.nodes.len();
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
    }
}
