// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The client-side Path ORAM stash.

use crate::{
    utils::{CompleteBinaryTreeIndex, LeafIndex, TreeHeight},
    BlockId, BucketSize,
};
use std::cmp::Reverse;
use std::collections::HashMap;

/// A decrypted block waiting in the stash.
#[derive(Clone, PartialEq, Eq)]
pub struct StashEntry {
    /// The leaf currently assigned to the block.
    pub leaf: LeafIndex,
    /// The block's data.
    pub payload: Vec<u8>,
    /// The access counter value when the block entered the stash.
    pub since: u64,
}

impl std::fmt::Debug for StashEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashEntry")
            .field("leaf", &self.leaf)
            .field("payload_len", &self.payload.len())
            .field("since", &self.since)
            .finish()
    }
}

/// Blocks in transit between their old and their new path, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct Stash {
    entries: HashMap<BlockId, StashEntry>,
}

impl Stash {
    /// An empty stash.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of blocks in the stash.
    pub fn occupancy(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if a block with id `id` is stashed.
    pub fn contains(&self, id: BlockId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Mutable access to the stashed block with id `id`.
    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut StashEntry> {
        self.entries.get_mut(&id)
    }

    /// Adds a block fetched from the tree.
    pub fn insert(&mut self, id: BlockId, entry: StashEntry) -> Option<StashEntry> {
        self.entries.insert(id, entry)
    }

    /// Replaces the payload and leaf of block `id` in place, or inserts it if absent.
    pub fn upsert(&mut self, id: BlockId, leaf: LeafIndex, payload: Vec<u8>, since: u64) {
        self.entries
            .entry(id)
            .and_modify(|entry| {
                entry.leaf = leaf;
                entry.payload.clone_from(&payload);
            })
            .or_insert(StashEntry {
                leaf,
                payload,
                since,
            });
    }

    /// Removes block `id`.
    pub fn remove(&mut self, id: BlockId) -> Option<StashEntry> {
        self.entries.remove(&id)
    }

    /// Chooses which stashed blocks to write onto the path to `leaf`.
    ///
    /// Returns, for every depth from the root (index 0) to the leaf (index `height`), the ids to
    /// place in that bucket; no bucket receives more than `bucket_capacity` ids. A block is only
    /// placed in a bucket that lies on both the path to `leaf` and the path to its own leaf.
    /// Blocks go as deep as they can; blocks that have waited longer win ties.
    pub fn select_for_eviction(
        &self,
        leaf: LeafIndex,
        height: TreeHeight,
        bucket_capacity: BucketSize,
    ) -> Vec<Vec<BlockId>> {
        let mut candidates: Vec<(TreeHeight, u64, BlockId)> = self
            .entries
            .iter()
            .map(|(id, entry)| {
                (
                    entry.leaf.common_ancestor_depth(leaf, height),
                    entry.since,
                    *id,
                )
            })
            .collect();
        candidates.sort_by_key(|&(deepest, since, id)| (Reverse(deepest), since, id));

        let mut levels: Vec<Vec<BlockId>> = vec![Vec::new(); height as usize + 1];
        for (deepest, _, id) in candidates {
            if let Some(level) = levels[..=deepest as usize]
                .iter_mut()
                .rev()
                .find(|level| level.len() < bucket_capacity)
            {
                level.push(id);
            }
        }
        levels
    }
}
