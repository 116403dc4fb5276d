// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! This module contains common test utilities for the client and the tree store.

use crate::{
    block::{Block, EncryptedBlock},
    bucket::Bucket,
    client::Client,
    config::OramConfig,
    database::Database,
    tree_store::{PathServer, StagedBucket, TreeStore},
    utils::{LeafIndex, TreeHeight},
    BlockId, BucketSize, OramBlock, OramError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use simplelog::{Config, WriteLogger};
use std::collections::HashMap;
use std::sync::Once;

static INIT: Once = Once::new();

// For use in manual testing and inspection.
pub(crate) fn init_logger() {
    INIT.call_once(|| {
        WriteLogger::init(log::LevelFilter::Info, Config::default(), std::io::stdout()).unwrap()
    })
}

/// Asserts that no bucket of `tree` holds more blocks than the tree's bucket capacity.
pub(crate) fn assert_bucket_capacities<B: OramBlock, D: Database<Bucket<B>>>(
    tree: &mut TreeStore<B, D>,
) {
    let z = tree.bucket_capacity();
    for depth in 0..=tree.tree_height() {
        for index in 0..tree.level_width(depth).unwrap() {
            let bucket = tree.bucket(depth, index).unwrap();
            assert!(bucket.len() <= z, "bucket ({depth}, {index}) overflows");
            assert_eq!(bucket.capacity(), z);
        }
    }
}

/// Decrypts every bucket of `tree` and returns the real blocks it holds, with their coordinates.
pub(crate) fn real_blocks_in_tree<D: Database<Bucket<EncryptedBlock>>>(
    client: &Client,
    tree: &mut TreeStore<EncryptedBlock, D>,
) -> Vec<(TreeHeight, u64, Block)> {
    let mut result = Vec::new();
    for depth in 0..=tree.tree_height() {
        for index in 0..tree.level_width(depth).unwrap() {
            for encrypted in tree.bucket(depth, index).unwrap().contents() {
                let block = client.codec().decrypt(&encrypted).unwrap();
                if !block.is_dummy() {
                    result.push((depth, index, block));
                }
            }
        }
    }
    result
}

/// Asserts that every tracked id is stored exactly once, either in the stash or on the path to
/// its assigned leaf, and that nothing untracked is stored.
pub(crate) fn assert_reachability<D: Database<Bucket<EncryptedBlock>>>(
    client: &Client,
    tree: &mut TreeStore<EncryptedBlock, D>,
) {
    let height = tree.tree_height();
    let mut copies: HashMap<BlockId, usize> = HashMap::new();

    for (depth, index, block) in real_blocks_in_tree(client, tree) {
        if let Block::Real { id, leaf, .. } = block {
            let assigned = client.position_of(id).expect("stored block is not tracked");
            assert_eq!(leaf, assigned, "block {id} carries a stale leaf");
            assert_eq!(
                assigned >> (height - depth),
                index,
                "block {id} is off the path to its leaf"
            );
            *copies.entry(id).or_default() += 1;
        }
    }

    for id in client.tracked_ids() {
        let in_stash = usize::from(client.is_stashed(id));
        let count = copies.get(&id).copied().unwrap_or_default() + in_stash;
        assert_eq!(count, 1, "block {id} is stored {count} times");
    }
    assert_eq!(
        copies.len() + client.stash_len(),
        client.len()
    );
}

/// A call observed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServerCall {
    ReadPath {
        leaf: LeafIndex,
        stored_lens: Vec<usize>,
    },
    WritePath {
        leaf: LeafIndex,
        stored_lens: Vec<usize>,
    },
    ReadBucket {
        depth: TreeHeight,
        stored_lens: Vec<usize>,
    },
    WriteBucket {
        depth: TreeHeight,
        stored_lens: Vec<usize>,
    },
}

impl ServerCall {
    /// The call with its leaf erased, leaving only what a server could compare across workloads.
    pub(crate) fn shape(&self) -> ServerCall {
        match self {
            ServerCall::ReadPath { stored_lens, .. } => ServerCall::ReadPath {
                leaf: 0,
                stored_lens: stored_lens.clone(),
            },
            ServerCall::WritePath { stored_lens, .. } => ServerCall::WritePath {
                leaf: 0,
                stored_lens: stored_lens.clone(),
            },
            other => other.clone(),
        }
    }
}

/// A `PathServer` wrapper that records the transcript an honest-but-curious server sees.
#[derive(Debug)]
pub(crate) struct RecordingServer<S> {
    pub(crate) inner: S,
    pub(crate) transcript: Vec<ServerCall>,
}

impl<S> RecordingServer<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            transcript: Vec::new(),
        }
    }

    pub(crate) fn leaves_read(&self) -> Vec<LeafIndex> {
        self.transcript
            .iter()
            .filter_map(|call| match call {
                ServerCall::ReadPath { leaf, .. } => Some(*leaf),
                _ => None,
            })
            .collect()
    }
}

fn stored_lens<'a>(blocks: impl IntoIterator<Item = &'a EncryptedBlock>) -> Vec<usize> {
    blocks.into_iter().map(EncryptedBlock::stored_len).collect()
}

impl<S: PathServer<Block = EncryptedBlock>> PathServer for RecordingServer<S> {
    type Block = EncryptedBlock;

    fn tree_height(&self) -> TreeHeight {
        self.inner.tree_height()
    }

    fn bucket_capacity(&self) -> BucketSize {
        self.inner.bucket_capacity()
    }

    fn read_path(&mut self, leaf: LeafIndex) -> Result<Vec<EncryptedBlock>, OramError> {
        let blocks = self.inner.read_path(leaf)?;
        self.transcript.push(ServerCall::ReadPath {
            leaf,
            stored_lens: stored_lens(&blocks),
        });
        Ok(blocks)
    }

    fn write_path(&mut self, leaf: LeafIndex, blocks: Vec<EncryptedBlock>) -> Result<(), OramError> {
        self.transcript.push(ServerCall::WritePath {
            leaf,
            stored_lens: stored_lens(&blocks),
        });
        self.inner.write_path(leaf, blocks)
    }

    fn read_bucket(
        &mut self,
        depth: TreeHeight,
        index: u64,
    ) -> Result<Bucket<EncryptedBlock>, OramError> {
        let bucket = self.inner.read_bucket(depth, index)?;
        self.transcript.push(ServerCall::ReadBucket {
            depth,
            stored_lens: stored_lens(&bucket.contents()),
        });
        Ok(bucket)
    }

    fn write_buckets(
        &mut self,
        buckets: Vec<StagedBucket<EncryptedBlock>>,
    ) -> Result<(), OramError> {
        for (depth, _, bucket) in &buckets {
            self.transcript.push(ServerCall::WriteBucket {
                depth: *depth,
                stored_lens: stored_lens(&bucket.contents()),
            });
        }
        self.inner.write_buckets(buckets)
    }
}

fn random_payload<R: Rng>(block_size: usize, rng: &mut R) -> Vec<u8> {
    let length = rng.gen_range(0..=block_size);
    (0..length).map(|_| rng.gen()).collect()
}

/// Tests the correctness of a client on a workload of random stores, retrieves and deletes
/// against a mirror map, checking bucket capacities and reachability after every operation.
pub(crate) fn test_correctness_random_workload(
    config: OramConfig,
    id_count: BlockId,
    num_operations: u32,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);

    let mut server = TreeStore::from_config(&config).unwrap();
    let mut client = Client::new(config, &mut rng).unwrap();
    let mut mirror: HashMap<BlockId, Vec<u8>> = HashMap::new();

    for _ in 0..num_operations {
        let id = rng.gen_range(0..id_count);
        match rng.gen_range(0..4) {
            0 | 1 => {
                let payload = random_payload(config.block_size(), &mut rng);
                client.store(&mut server, id, &payload, &mut rng).unwrap();
                mirror.insert(id, payload);
            }
            2 => {
                assert_eq!(
                    client.retrieve(&mut server, id, &mut rng).unwrap(),
                    mirror.get(&id).cloned(),
                    "{id}"
                );
            }
            _ => {
                client.delete(&mut server, id, &mut rng).unwrap();
                mirror.remove(&id);
            }
        }
        assert_bucket_capacities(&mut server);
        assert_reachability(&client, &mut server);
        assert_eq!(client.len(), mirror.len());
    }

    assert!(client.max_stash_len() <= config.path_size());

    for id in 0..id_count {
        assert_eq!(
            client.retrieve(&mut server, id, &mut rng).unwrap(),
            mirror.get(&id).cloned(),
            "{id}"
        );
    }
    assert_eq!(client.len(), mirror.len());
}

/// Tests a client on repeated passes of sequential stores and retrieves over ids `0..id_count`,
/// checking reachability after every operation.
pub(crate) fn test_correctness_linear_workload(
    config: OramConfig,
    id_count: BlockId,
    num_operations: u32,
) {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0);

    let mut server = TreeStore::from_config(&config).unwrap();
    let mut client = Client::new(config, &mut rng).unwrap();
    let mut mirror: HashMap<BlockId, Vec<u8>> = HashMap::new();

    let num_passes = u64::from(num_operations) / id_count;
    for _ in 0..num_passes {
        for id in 0..id_count {
            if rng.gen::<bool>() {
                assert_eq!(
                    client.retrieve(&mut server, id, &mut rng).unwrap(),
                    mirror.get(&id).cloned(),
                    "{id}"
                );
            } else {
                let payload = random_payload(config.block_size(), &mut rng);
                client.store(&mut server, id, &payload, &mut rng).unwrap();
                mirror.insert(id, payload);
            }
            assert_reachability(&client, &mut server);
        }
    }

    assert_bucket_capacities(&mut server);
    assert_eq!(client.len(), mirror.len());
}

macro_rules! create_client_correctness_test {
    ($function_name:ident, $height:expr, $bucket_capacity:expr, $block_size:expr, $id_count:expr, $iterations_to_test:expr) => {
        paste::paste! {
            #[test]
            fn [<$function_name _ $height _ $bucket_capacity _ $block_size _ $id_count _ $iterations_to_test>]() {
                let config = crate::config::OramConfig::for_tree_height($height)
                    .unwrap()
                    .with_bucket_capacity($bucket_capacity)
                    .with_block_size($block_size);
                $function_name(config, $id_count, $iterations_to_test);
            }
        }
    };
}

macro_rules! create_client_correctness_tests_for_workload {
    ($function_name:ident) => {
        create_client_correctness_test!($function_name, 0, 2, 4, 2, 50);
        create_client_correctness_test!($function_name, 1, 2, 4, 2, 100);
        create_client_correctness_test!($function_name, 3, 4, 4, 8, 200);
        create_client_correctness_test!($function_name, 3, 2, 8, 8, 200);
        create_client_correctness_test!($function_name, 4, 3, 16, 16, 300);
        // A tree of 32 leaves, Z = 4, 64-byte payloads, 64 ids.
        create_client_correctness_test!($function_name, 5, 4, 64, 64, 500);
        create_client_correctness_test!($function_name, 3, 4, 1, 16, 1000);
    };
}

macro_rules! create_client_correctness_tests {
    () => {
        create_client_correctness_tests_for_workload!(test_correctness_random_workload);
        create_client_correctness_tests_for_workload!(test_correctness_linear_workload);
    };
}

pub(crate) use create_client_correctness_test;
pub(crate) use create_client_correctness_tests;
pub(crate) use create_client_correctness_tests_for_workload;
