// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An experimental, lossy eviction pass that pushes blocks one level down the tree.
//!
//! At every level above the leaves, two distinct buckets are chosen uniformly at random, and in
//! each of them two distinct slots. A dummy in a chosen slot moves to a uniformly random child; a
//! real block moves to the child on the path to its leaf. The moved entry takes a dummy (or free)
//! slot of the child. When the child has none, a real block is discarded.
//!
//! Every touched bucket is decrypted and rewritten in full, re-encrypted and padded with dummies,
//! so the server cannot tell which entries moved.

use crate::{
    block::{Block, EncryptedBlock},
    bucket::Bucket,
    client::Client,
    tree_store::PathServer,
    utils::{CompleteBinaryTreeIndex, TreeHeight},
    BlockId, OramError,
};
use rand::{seq::index::sample, CryptoRng, Rng, RngCore};
use std::collections::BTreeMap;

/// The number of buckets picked at every level of a push-down pass.
const BUCKETS_PER_LEVEL: usize = 2;

/// The number of slots picked in every picked bucket.
const SLOTS_PER_BUCKET: usize = 2;

/// What a push-down pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushDownReport {
    /// Real blocks moved one level down.
    pub moved: usize,
    /// Real blocks discarded because the child on their path had no free slot.
    pub dropped: usize,
}

type TouchedBuckets = BTreeMap<(TreeHeight, u64), Vec<Block>>;

impl Client {
    /// Runs one push-down pass over the tree held by `server`.
    ///
    /// **Lossy**: blocks reported in [`PushDownReport::dropped`] are gone, and their ids are
    /// forgotten. The pass runs automatically after every store in
    /// [`EvictionMode::ExperimentalPushDown`](crate::EvictionMode::ExperimentalPushDown).
    ///
    /// Every touched bucket is staged before the server is written, in a single
    /// [`PathServer::write_buckets`] call. On error the client and the tree are left as they were.
    pub fn push_down<S: PathServer<Block = EncryptedBlock>, R: RngCore + CryptoRng>(
        &mut self,
        server: &mut S,
        rng: &mut R,
    ) -> Result<PushDownReport, OramError> {
        self.check_server(server)?;
        let height = self.config().tree_height();

        let mut touched = TouchedBuckets::new();
        let mut dropped_ids: Vec<BlockId> = Vec::new();
        let mut report = PushDownReport::default();

        for depth in 0..height {
            let width = usize::try_from(1u64 << depth)?;
            for picked in sample(rng, width, BUCKETS_PER_LEVEL.min(width)) {
                let index = u64::try_from(picked)?;
                let children = [(depth + 1, 2 * index), (depth + 1, 2 * index + 1)];
                for (d, i) in [(depth, index), children[0], children[1]] {
                    self.load_bucket(server, &mut touched, d, i)?;
                }

                let source_len = touched.get(&(depth, index)).map_or(0, Vec::len);
                for slot in sample(rng, source_len, SLOTS_PER_BUCKET.min(source_len)) {
                    let Some(block) = touched
                        .get_mut(&(depth, index))
                        .and_then(|blocks| blocks.get_mut(slot))
                        .map(|entry| std::mem::replace(entry, Block::Dummy))
                    else {
                        continue;
                    };

                    let goes_right = match &block {
                        Block::Dummy => rng.gen::<bool>(),
                        Block::Real { leaf, .. } => leaf.goes_right_below(depth, height),
                    };
                    let destination = children[usize::from(goes_right)];

                    if self.place(&mut touched, destination, block.clone()) {
                        if !block.is_dummy() {
                            report.moved += 1;
                        }
                    } else if let Some(id) = block.id() {
                        log::warn!(
                            "Push-down dropped block {} at bucket ({}, {}): child ({}, {}) is full",
                            id,
                            depth,
                            index,
                            destination.0,
                            destination.1
                        );
                        dropped_ids.push(id);
                        report.dropped += 1;
                    }
                }
            }
        }

        let z = self.config().bucket_capacity();
        let mut staged = Vec::with_capacity(touched.len());
        for ((depth, index), blocks) in touched {
            let mut bucket = Bucket::new(z);
            let padding = z - blocks.len();
            for block in blocks {
                bucket.add(self.codec().encrypt(&block, rng)?)?;
            }
            for _ in 0..padding {
                bucket.add(self.codec().encrypt_dummy(rng)?)?;
            }
            staged.push((depth, index, bucket));
        }
        server.write_buckets(staged)?;

        for id in dropped_ids {
            self.position_map_mut().remove(id);
        }
        log::debug!(
            "Push-down moved {} and dropped {} blocks",
            report.moved,
            report.dropped
        );
        Ok(report)
    }

    /// Reads and decrypts bucket `(depth, index)` unless an earlier step of the pass already has.
    fn load_bucket<S: PathServer<Block = EncryptedBlock>>(
        &self,
        server: &mut S,
        touched: &mut TouchedBuckets,
        depth: TreeHeight,
        index: u64,
    ) -> Result<(), OramError> {
        if touched.contains_key(&(depth, index)) {
            return Ok(());
        }

        let height = self.config().tree_height();
        let mut blocks = Vec::new();
        for encrypted in server.read_bucket(depth, index)?.contents() {
            let block = self.codec().decrypt(&encrypted)?;
            if let Block::Real { id, leaf, .. } = &block {
                if self.position_of(*id) != Some(*leaf)
                    || self.is_stashed(*id)
                    || leaf.node_on_path(depth, height) != index
                {
                    return Err(OramError::DesyncError { id: *id });
                }
            }
            blocks.push(block);
        }
        touched.insert((depth, index), blocks);
        Ok(())
    }

    /// Puts `block` into a dummy or free slot of `destination`. Returns `false` if there is none.
    fn place(
        &self,
        touched: &mut TouchedBuckets,
        destination: (TreeHeight, u64),
        block: Block,
    ) -> bool {
        let Some(blocks) = touched.get_mut(&destination) else {
            return false;
        };
        if let Some(slot) = blocks.iter_mut().find(|slot| slot.is_dummy()) {
            *slot = block;
            true
        } else if blocks.len() < self.config().bucket_capacity() {
            blocks.push(block);
            true
        } else {
            false
        }
    }
}
