//! Partitioning of the resolved component list into fixed-size batches.
//!
//! Batch boundaries only bound the size of a generated unit; they carry no
//! semantic meaning and never affect the already-fixed initialization order.

use crate::graph::ResolvedComponent;

/// Components per generated unit in the reference layout.
pub const BATCH_SIZE: usize = 500;

/// A contiguous slice of the initialization order.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub index: usize,
    pub components: &'a [ResolvedComponent],
}

/// Pure partition of an already-ordered component list.
pub fn batches(components: &[ResolvedComponent], size: usize) -> Vec<Batch<'_>> {
    let size = size.max(1);
    components
        .chunks(size)
        .enumerate()
        .map(|(index, components)| Batch { index, components })
        .collect()
}
