// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Construction-time parameters shared by a client and the tree it talks to.

use crate::{
    utils::{self, TreeHeight},
    BlockSize, BucketSize, OramError,
};

/// The parameter "Z" from the Path ORAM literature that sets the number of blocks per bucket; typical values are 3 or 4.
/// Here we adopt the more conservative setting of 4.
pub const DEFAULT_BLOCKS_PER_BUCKET: BucketSize = 4;

/// The default maximum payload length of a block, in bytes.
pub const DEFAULT_BLOCK_SIZE: BlockSize = 64;

/// The largest supported tree height. The whole tree is materialized in memory, and an empty
/// tree of this height already takes a few tens of megabytes of bucket headers.
pub const MAXIMUM_TREE_HEIGHT: TreeHeight = 20;

/// How blocks travel back from the stash into the tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionMode {
    /// Path ORAM eviction onto the path that was just read. Never loses a block.
    #[default]
    Path,
    /// Path eviction, followed after every store by a random pairwise push-down pass
    /// (see [`Client::push_down`](crate::Client::push_down)).
    ///
    /// **Lossy**: a real block pushed towards a child bucket with no free slot is discarded.
    /// Intended for experimentation only.
    ExperimentalPushDown,
}

/// Parameters of an ORAM instance. They are fixed for the lifetime of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OramConfig {
    tree_height: TreeHeight,
    bucket_capacity: BucketSize,
    block_size: BlockSize,
    eviction_mode: EvictionMode,
}

impl OramConfig {
    /// A configuration whose tree has at least `block_count` leaves, with default parameters otherwise.
    pub fn for_block_count(block_count: u64) -> Result<Self, OramError> {
        Self::for_tree_height(utils::height_for_block_count(block_count)?)
    }

    /// A configuration whose tree has height `tree_height`, with default parameters otherwise.
    pub fn for_tree_height(tree_height: TreeHeight) -> Result<Self, OramError> {
        let config = Self {
            tree_height,
            bucket_capacity: DEFAULT_BLOCKS_PER_BUCKET,
            block_size: DEFAULT_BLOCK_SIZE,
            eviction_mode: EvictionMode::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the number of blocks per bucket.
    pub fn with_bucket_capacity(mut self, bucket_capacity: BucketSize) -> Self {
        self.bucket_capacity = bucket_capacity;
        self
    }

    /// Sets the maximum payload length in bytes.
    pub fn with_block_size(mut self, block_size: BlockSize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the eviction discipline.
    pub fn with_eviction_mode(mut self, eviction_mode: EvictionMode) -> Self {
        self.eviction_mode = eviction_mode;
        self
    }

    /// Checks that every parameter is in range.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidConfigurationError` in the following cases.
    ///
    /// - The bucket capacity is 0 or 1.
    /// - The block size is 0.
    /// - The tree height exceeds [`MAXIMUM_TREE_HEIGHT`].
    pub fn validate(&self) -> Result<(), OramError> {
        if self.bucket_capacity <= 1 {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "bucket_capacity".to_string(),
                parameter_value: self.bucket_capacity.to_string(),
            });
        }

        if self.block_size == 0 {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "block_size".to_string(),
                parameter_value: self.block_size.to_string(),
            });
        }

        if self.tree_height > MAXIMUM_TREE_HEIGHT {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "tree_height".to_string(),
                parameter_value: self.tree_height.to_string(),
            });
        }

        Ok(())
    }

    /// The height of the tree.
    pub fn tree_height(&self) -> TreeHeight {
        self.tree_height
    }

    /// The number of leaves, `2^tree_height`.
    pub fn leaf_count(&self) -> u64 {
        utils::leaf_count(self.tree_height)
    }

    /// The number of blocks per bucket ("Z").
    pub fn bucket_capacity(&self) -> BucketSize {
        self.bucket_capacity
    }

    /// The maximum payload length in bytes.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// The eviction discipline.
    pub fn eviction_mode(&self) -> EvictionMode {
        self.eviction_mode
    }

    /// The number of blocks a path read returns once the path has been written.
    pub fn path_size(&self) -> usize {
        self.bucket_capacity * (self.tree_height as usize + 1)
    }
}
