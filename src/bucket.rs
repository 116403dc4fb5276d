// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Fixed-capacity buckets of blocks.

use crate::{BucketSize, OramBlock, OramError};

#[derive(Clone, PartialEq)]
/// A Path ORAM bucket: an ordered container of at most `capacity` blocks.
pub struct Bucket<B: OramBlock> {
    blocks: Vec<B>,
    capacity: BucketSize,
}

impl<B: OramBlock> Bucket<B> {
    /// Returns an empty bucket with room for `capacity` blocks.
    pub fn new(capacity: BucketSize) -> Self {
        Self {
            blocks: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `block`, failing with a `CapacityError` if the bucket is already full.
    pub fn add(&mut self, block: B) -> Result<(), OramError> {
        if self.is_full() {
            return Err(OramError::CapacityError {
                capacity: self.capacity,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Removes every block.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    /// Returns a copy of the blocks held by this bucket.
    pub fn contents(&self) -> Vec<B> {
        self.blocks.clone()
    }

    /// The maximum number of blocks this bucket may hold.
    pub fn capacity(&self) -> BucketSize {
        self.capacity
    }

    /// The number of blocks currently held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the bucket holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns `true` if no further block can be added.
    pub fn is_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    pub(crate) fn into_blocks(self) -> Vec<B> {
        self.blocks
    }
}

impl<B: OramBlock> std::fmt::Debug for Bucket<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.blocks.is_empty() {
            write!(f, "Bucket::Empty")
        } else {
            f.debug_struct("Bucket")
                .field("blocks", &self.blocks)
                .finish()
        }
    }
}
