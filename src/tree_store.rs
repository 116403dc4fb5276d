// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The untrusted server: a complete binary tree of buckets addressed by path.

use crate::{
    block::EncryptedBlock,
    bucket::Bucket,
    config::{OramConfig, MAXIMUM_TREE_HEIGHT},
    database::{Database, SimpleDatabase},
    utils::{self, CompleteBinaryTreeIndex, LeafIndex, TreeHeight},
    Address, BucketSize, OramBlock, OramError,
};
use std::marker::PhantomData;

/// The calls a client may make on the server. Blocks are opaque to the server.
pub trait PathServer {
    /// The representation of blocks stored by the server.
    type Block: OramBlock;

    /// The height of the tree; leaves are `0..2^height`.
    fn tree_height(&self) -> TreeHeight;

    /// The number of blocks per bucket ("Z").
    fn bucket_capacity(&self) -> BucketSize;

    /// Returns the contents of every bucket on the path to `leaf`, root first.
    fn read_path(&mut self, leaf: LeafIndex) -> Result<Vec<Self::Block>, OramError>;

    /// Overwrites every bucket on the path to `leaf`. `blocks` are taken root first,
    /// `bucket_capacity` at a time per level; deeper buckets receive whatever is left.
    fn write_path(&mut self, leaf: LeafIndex, blocks: Vec<Self::Block>) -> Result<(), OramError>;

    /// Returns a copy of bucket `index` at depth `depth`.
    fn read_bucket(
        &mut self,
        depth: TreeHeight,
        index: u64,
    ) -> Result<Bucket<Self::Block>, OramError>;

    /// Replaces bucket `index` at depth `depth`.
    fn write_bucket(
        &mut self,
        depth: TreeHeight,
        index: u64,
        bucket: Bucket<Self::Block>,
    ) -> Result<(), OramError> {
        self.write_buckets(vec![(depth, index, bucket)])
    }

    /// Replaces every `(depth, index)` bucket of `buckets`. Either all of them are written or,
    /// on error, none is.
    fn write_buckets(&mut self, buckets: Vec<StagedBucket<Self::Block>>) -> Result<(), OramError>;
}

/// A bucket to be written at `(depth, index)`.
pub type StagedBucket<B> = (TreeHeight, u64, Bucket<B>);

/// A server tree held in a flat arena: bucket `(d, i)` lives at address `2^d - 1 + i`.
#[derive(Debug)]
pub struct TreeStore<B: OramBlock, D: Database<Bucket<B>> = SimpleDatabase<Bucket<B>>> {
    physical_memory: D,
    height: TreeHeight,
    bucket_capacity: BucketSize,
    _block: PhantomData<B>,
}

impl TreeStore<EncryptedBlock> {
    /// Returns an empty tree shaped by `config`, ready to serve a [`Client`](crate::Client).
    pub fn from_config(config: &OramConfig) -> Result<Self, OramError> {
        config.validate()?;
        Self::new(config.tree_height(), config.bucket_capacity())
    }
}

impl<B: OramBlock> TreeStore<B> {
    /// Returns a tree of height `height` whose buckets are empty and hold at most `bucket_capacity` blocks.
    pub fn new(height: TreeHeight, bucket_capacity: BucketSize) -> Result<Self, OramError> {
        Self::with_memory(height, bucket_capacity)
    }
}

impl<B: OramBlock, D: Database<Bucket<B>>> TreeStore<B, D> {
    /// Like [`TreeStore::new`], but backed by any `Database` implementation.
    pub fn with_memory(height: TreeHeight, bucket_capacity: BucketSize) -> Result<Self, OramError> {
        if height > MAXIMUM_TREE_HEIGHT {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "tree_height".to_string(),
                parameter_value: height.to_string(),
            });
        }

        if bucket_capacity == 0 {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "bucket_capacity".to_string(),
                parameter_value: bucket_capacity.to_string(),
            });
        }

        log::info!(
            "TreeStore::new(height = {}, Z = {}, buckets = {})",
            height,
            bucket_capacity,
            utils::bucket_count(height)
        );

        let physical_memory = D::new(
            utils::bucket_count(height),
            &Bucket::new(bucket_capacity),
        )?;

        Ok(Self {
            physical_memory,
            height,
            bucket_capacity,
            _block: PhantomData,
        })
    }

    /// The number of leaves.
    pub fn leaf_count(&self) -> u64 {
        utils::leaf_count(self.height)
    }

    /// The total number of buckets.
    pub fn bucket_count(&self) -> u64 {
        utils::bucket_count(self.height)
    }

    /// The number of buckets at depth `depth`.
    pub fn level_width(&self, depth: TreeHeight) -> Result<u64, OramError> {
        if depth > self.height {
            return Err(OramError::NodeOutOfBoundsError { depth, index: 0 });
        }
        Ok(1u64 << depth)
    }

    /// Returns a copy of the root bucket.
    pub fn root(&mut self) -> Result<Bucket<B>, OramError> {
        self.read_bucket(0, 0)
    }

    /// Returns a copy of bucket `index` at depth `depth`.
    pub fn bucket(&mut self, depth: TreeHeight, index: u64) -> Result<Bucket<B>, OramError> {
        self.read_bucket(depth, index)
    }

    /// Returns a copy of the bucket at leaf `leaf`.
    pub fn leaf_bucket(&mut self, leaf: LeafIndex) -> Result<Bucket<B>, OramError> {
        self.check_leaf(leaf)?;
        self.read_bucket(self.height, leaf)
    }

    /// The arena backing the tree.
    pub fn physical_memory(&self) -> &D {
        &self.physical_memory
    }

    /// Mutable access to the arena backing the tree.
    pub fn physical_memory_mut(&mut self) -> &mut D {
        &mut self.physical_memory
    }

    /// Logs the occupancy of every bucket, level by level.
    pub fn log_tree(&mut self) -> Result<(), OramError> {
        log::info!("TreeStore structure:");
        for depth in 0..=self.height {
            let mut occupancies = Vec::new();
            for index in 0..self.level_width(depth)? {
                occupancies.push(self.read_bucket(depth, index)?.len());
            }
            log::info!("Level {}: {:?}", depth, occupancies);
        }
        Ok(())
    }

    fn check_leaf(&self, leaf: LeafIndex) -> Result<(), OramError> {
        if !leaf.is_leaf(self.height) {
            return Err(OramError::LeafOutOfBoundsError {
                leaf,
                leaf_count: self.leaf_count(),
            });
        }
        Ok(())
    }

    fn node_address(&self, depth: TreeHeight, index: u64) -> Result<Address, OramError> {
        if depth > self.height || index >= (1u64 << depth) {
            return Err(OramError::NodeOutOfBoundsError { depth, index });
        }
        Ok(Address::try_from(utils::flat_index(depth, index)?)?)
    }

    fn path_address(&self, leaf: LeafIndex, depth: TreeHeight) -> Result<Address, OramError> {
        Ok(Address::try_from(leaf.flat_node_on_path(depth, self.height)?)?)
    }
}

impl<B: OramBlock, D: Database<Bucket<B>>> PathServer for TreeStore<B, D> {
    type Block = B;

    fn tree_height(&self) -> TreeHeight {
        self.height
    }

    fn bucket_capacity(&self) -> BucketSize {
        self.bucket_capacity
    }

    fn read_path(&mut self, leaf: LeafIndex) -> Result<Vec<B>, OramError> {
        self.check_leaf(leaf)?;

        let mut result = Vec::with_capacity(self.bucket_capacity * (self.height as usize + 1));
        for depth in 0..=self.height {
            let bucket = self.physical_memory.read_db(self.path_address(leaf, depth)?)?;
            result.extend(bucket.into_blocks());
        }
        Ok(result)
    }

    fn write_path(&mut self, leaf: LeafIndex, blocks: Vec<B>) -> Result<(), OramError> {
        self.check_leaf(leaf)?;

        let path_capacity = self.bucket_capacity * (usize::try_from(self.height)? + 1);
        if blocks.len() > path_capacity {
            return Err(OramError::CapacityError {
                capacity: path_capacity,
            });
        }

        // Every bucket is staged before the first one is written, so a failed call leaves the tree untouched.
        let mut remaining = blocks.into_iter();
        let mut staged = Vec::with_capacity(usize::try_from(self.height)? + 1);
        let mut bucket = Bucket::new(self.bucket_capacity);
        for depth in 0..=self.height {
            bucket.reset();
            for block in remaining.by_ref().take(self.bucket_capacity) {
                bucket.add(block)?;
            }
            staged.push((self.path_address(leaf, depth)?, bucket.clone()));
        }

        for (address, bucket) in staged {
            self.physical_memory.write_db(address, bucket)?;
        }
        Ok(())
    }

    fn read_bucket(&mut self, depth: TreeHeight, index: u64) -> Result<Bucket<B>, OramError> {
        let address = self.node_address(depth, index)?;
        self.physical_memory.read_db(address)
    }

    fn write_buckets(&mut self, buckets: Vec<StagedBucket<B>>) -> Result<(), OramError> {
        let mut staged = Vec::with_capacity(buckets.len());
        for (depth, index, bucket) in buckets {
            let address = self.node_address(depth, index)?;
            let mut resized = Bucket::new(self.bucket_capacity);
            for block in bucket.into_blocks() {
                resized.add(block)?;
            }
            staged.push((address, resized));
        }

        for (address, bucket) in staged {
            self.physical_memory.write_db(address, bucket)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::CountAccessesDatabase, test_utils::*};

    fn numbered_path(height: TreeHeight, z: BucketSize) -> Vec<u64> {
        (0..(u64::from(height) + 1) * z as u64).collect()
    }

    #[test]
    fn new_tree_is_empty() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(3, 4).unwrap();
        assert_eq!(tree.leaf_count(), 8);
        assert_eq!(tree.bucket_count(), 15);
        for leaf in 0..8 {
            assert!(tree.read_path(leaf).unwrap().is_empty());
        }
        assert!(tree.root().unwrap().is_empty());
    }

    #[test]
    fn write_path_fills_root_first() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(3, 2).unwrap();
        tree.write_path(5, numbered_path(3, 2)).unwrap();

        assert_eq!(tree.root().unwrap().contents(), vec![0, 1]);
        assert_eq!(tree.bucket(1, 1).unwrap().contents(), vec![2, 3]);
        assert_eq!(tree.bucket(2, 2).unwrap().contents(), vec![4, 5]);
        assert_eq!(tree.leaf_bucket(5).unwrap().contents(), vec![6, 7]);

        // Buckets off the path are untouched.
        assert!(tree.bucket(1, 0).unwrap().is_empty());
        assert!(tree.leaf_bucket(4).unwrap().is_empty());

        assert_eq!(tree.read_path(5).unwrap(), numbered_path(3, 2));
        // Leaf 4 shares the root, the depth-1 and the depth-2 bucket with leaf 5.
        assert_eq!(tree.read_path(4).unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn write_path_replaces_previous_contents() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(2, 2).unwrap();
        tree.write_path(0, numbered_path(2, 2)).unwrap();
        tree.write_path(3, vec![10, 11, 12]).unwrap();

        assert_eq!(tree.root().unwrap().contents(), vec![10, 11]);
        assert_eq!(tree.bucket(1, 1).unwrap().contents(), vec![12]);
        assert!(tree.leaf_bucket(3).unwrap().is_empty());
        assert_eq!(tree.read_path(0).unwrap(), vec![10, 11, 2, 3, 4, 5]);
    }

    #[test]
    fn over_capacity_path_write_is_rejected_without_side_effects() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(2, 2).unwrap();
        tree.write_path(1, numbered_path(2, 2)).unwrap();
        let before = tree.read_path(1).unwrap();

        let too_many: Vec<u64> = (100..107).collect();
        assert_eq!(
            tree.write_path(1, too_many),
            Err(OramError::CapacityError { capacity: 6 })
        );
        assert_eq!(tree.read_path(1).unwrap(), before);
        assert_bucket_capacities(&mut tree);
    }

    #[test]
    fn read_path_has_no_side_effects() {
        init_logger();

        let mut tree = TreeStore::<u8>::new(4, 3).unwrap();
        tree.write_path(9, vec![1, 2, 3, 4, 5]).unwrap();
        let first = tree.read_path(9).unwrap();
        for _ in 0..5 {
            assert_eq!(tree.read_path(9).unwrap(), first);
        }
    }

    #[test]
    fn out_of_bounds_coordinates() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(3, 4).unwrap();
        assert_eq!(
            tree.read_path(8),
            Err(OramError::LeafOutOfBoundsError {
                leaf: 8,
                leaf_count: 8
            })
        );
        assert!(tree.write_path(100, vec![]).is_err());
        assert_eq!(
            tree.bucket(1, 2),
            Err(OramError::NodeOutOfBoundsError { depth: 1, index: 2 })
        );
        assert!(tree.bucket(4, 0).is_err());
        assert!(tree.leaf_bucket(8).is_err());
        assert!(tree.level_width(4).is_err());
        assert_eq!(tree.level_width(3).unwrap(), 8);
    }

    #[test]
    fn write_bucket_enforces_capacity() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(2, 2).unwrap();
        let mut bucket = Bucket::new(5);
        for i in 0..3 {
            bucket.add(i).unwrap();
        }
        assert_eq!(
            tree.write_bucket(1, 0, bucket),
            Err(OramError::CapacityError { capacity: 2 })
        );

        let mut bucket = Bucket::new(5);
        bucket.add(7).unwrap();
        tree.write_bucket(1, 0, bucket).unwrap();
        let stored = tree.bucket(1, 0).unwrap();
        assert_eq!(stored.contents(), vec![7]);
        assert_eq!(stored.capacity(), 2);
    }

    #[test]
    fn failed_bucket_batch_writes_nothing() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(2, 2).unwrap();
        let mut first = Bucket::new(2);
        first.add(1).unwrap();
        let mut second = Bucket::new(2);
        second.add(2).unwrap();
        let mut overfull = Bucket::new(3);
        for i in 3..6 {
            overfull.add(i).unwrap();
        }

        assert_eq!(
            tree.write_buckets(vec![(0, 0, first.clone()), (2, 4, second.clone())]),
            Err(OramError::NodeOutOfBoundsError { depth: 2, index: 4 })
        );
        assert_eq!(
            tree.write_buckets(vec![(0, 0, first.clone()), (1, 1, overfull)]),
            Err(OramError::CapacityError { capacity: 2 })
        );
        assert!(tree.root().unwrap().is_empty());
        assert!(tree.bucket(1, 1).unwrap().is_empty());

        tree.write_buckets(vec![(0, 0, first), (2, 3, second)]).unwrap();
        assert_eq!(tree.root().unwrap().contents(), vec![1]);
        assert_eq!(tree.leaf_bucket(3).unwrap().contents(), vec![2]);
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        assert!(TreeStore::<u64>::new(3, 0).is_err());
        assert!(TreeStore::<u64>::new(MAXIMUM_TREE_HEIGHT + 1, 4).is_err());
    }

    #[test]
    fn path_accesses_touch_one_bucket_per_level() {
        init_logger();

        let mut tree =
            TreeStore::<u64, CountAccessesDatabase<Bucket<u64>>>::with_memory(4, 4).unwrap();
        tree.read_path(3).unwrap();
        tree.write_path(3, vec![1, 2, 3]).unwrap();

        assert_eq!(tree.physical_memory().get_read_count(), 5);
        assert_eq!(tree.physical_memory().get_write_count(), 5);
        for depth in 0..=4 {
            let address = 3u64.flat_node_on_path(depth, 4).unwrap();
            assert_eq!(tree.physical_memory().reads[address], 1);
            assert_eq!(tree.physical_memory().writes[address], 1);
        }
    }

    #[test]
    fn single_bucket_tree() {
        init_logger();

        let mut tree = TreeStore::<u64>::new(0, 2).unwrap();
        tree.write_path(0, vec![1, 2]).unwrap();
        assert_eq!(tree.read_path(0).unwrap(), vec![1, 2]);
        assert!(tree.write_path(0, vec![1, 2, 3]).is_err());
        tree.log_tree().unwrap();
    }
}
