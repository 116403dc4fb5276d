// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Utilities for addressing buckets of a complete binary tree.
//!
//! Leaves are numbered `0..2^height`. The bucket at depth `d` (root = depth 0) on the path to
//! `leaf` has index `leaf >> (height - d)` within its level, and the buckets of the whole tree
//! are laid out in a flat arena where bucket `(d, i)` lives at `2^d - 1 + i`.

use crate::OramError;
use rand::{CryptoRng, Rng, RngCore};

/// The numeric type used to identify a leaf of the tree.
pub type LeafIndex = u64;

/// The numeric type used for depths and heights of the tree.
pub type TreeHeight = u32;

/// Index arithmetic on leaves of a complete binary tree of a given height.
pub(crate) trait CompleteBinaryTreeIndex
where
    Self: Sized,
{
    /// The index, within depth `depth`, of the ancestor of this leaf.
    fn node_on_path(&self, depth: TreeHeight, height: TreeHeight) -> u64;
    /// The position in the flat bucket arena of the ancestor of this leaf at depth `depth`.
    fn flat_node_on_path(&self, depth: TreeHeight, height: TreeHeight)
        -> Result<usize, OramError>;
    /// The depth of the deepest bucket shared by the paths to `self` and `other`.
    fn common_ancestor_depth(&self, other: Self, height: TreeHeight) -> TreeHeight;
    /// The direction taken below depth `depth` on the path to this leaf; `true` means right.
    fn goes_right_below(&self, depth: TreeHeight, height: TreeHeight) -> bool;
    fn random_leaf<R: RngCore + CryptoRng>(height: TreeHeight, rng: &mut R) -> Self;
    fn is_leaf(&self, height: TreeHeight) -> bool;
}

impl CompleteBinaryTreeIndex for LeafIndex {
    fn node_on_path(&self, depth: TreeHeight, height: TreeHeight) -> u64 {
        // We only call this method when the receiver is a leaf and the depth lies on its path.
        debug_assert!(self.is_leaf(height));
        debug_assert!(depth <= height);

        let shift = height - depth;
        self >> shift
    }

    fn flat_node_on_path(
        &self,
        depth: TreeHeight,
        height: TreeHeight,
    ) -> Result<usize, OramError> {
        flat_index(depth, self.node_on_path(depth, height))
    }

    fn common_ancestor_depth(&self, other: Self, height: TreeHeight) -> TreeHeight {
        let differing_bits = LeafIndex::BITS - (self ^ other).leading_zeros();
        height - differing_bits
    }

    fn goes_right_below(&self, depth: TreeHeight, height: TreeHeight) -> bool {
        debug_assert!(depth < height);
        (self >> (height - depth - 1)) & 1 == 1
    }

    fn random_leaf<R: RngCore + CryptoRng>(height: TreeHeight, rng: &mut R) -> Self {
        rng.gen_range(0..leaf_count(height))
    }

    fn is_leaf(&self, height: TreeHeight) -> bool {
        *self < leaf_count(height)
    }
}

/// The number of leaves of a tree of height `height`.
pub fn leaf_count(height: TreeHeight) -> u64 {
    1u64 << height
}

/// The number of buckets of a tree of height `height`.
pub fn bucket_count(height: TreeHeight) -> u64 {
    (1u64 << (height + 1)) - 1
}

/// The position in the flat bucket arena of bucket `index` at depth `depth`.
pub fn flat_index(depth: TreeHeight, index: u64) -> Result<usize, OramError> {
    Ok(usize::try_from((1u64 << depth) - 1 + index)?)
}

/// The smallest height whose tree has at least `block_count` leaves.
pub fn height_for_block_count(block_count: u64) -> Result<TreeHeight, OramError> {
    if block_count == 0 {
        return Err(OramError::InvalidConfigurationError {
            parameter_name: "block_count".to_string(),
            parameter_value: block_count.to_string(),
        });
    }

    block_count
        .checked_next_power_of_two()
        .map(|leaves| leaves.ilog2())
        .ok_or_else(|| OramError::InvalidConfigurationError {
            parameter_name: "block_count".to_string(),
            parameter_value: block_count.to_string(),
        })
}
