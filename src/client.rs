// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! The trusted Path ORAM client.

use crate::{
    block::{Block, EncryptedBlock},
    codec::{BlockCodec, KEY_SIZE},
    config::{EvictionMode, OramConfig},
    position_map::PositionMap,
    stash::{Stash, StashEntry},
    tree_store::PathServer,
    utils::{CompleteBinaryTreeIndex, LeafIndex},
    BlockId, OramError,
};
use rand::{CryptoRng, RngCore};

/// The logical operation carried out by one access.
#[derive(Clone, Copy, Debug)]
enum Operation<'a> {
    Retrieve,
    Store(&'a [u8]),
    Delete,
}

/// The position map change an access commits once its path write has succeeded.
#[derive(Clone, Copy, Debug)]
enum PositionUpdate {
    Assign(LeafIndex),
    Forget,
    Keep,
}

/// A Path ORAM client. It holds the key, the position map and the stash, and talks to any
/// [`PathServer`] storing [`EncryptedBlock`]s.
///
/// Every access reads the whole path of the block's current leaf, remaps the block to a fresh
/// uniformly random leaf, and writes the same path back re-encrypted and padded with dummies.
/// Stores, retrieves and deletes, of present or absent ids, are indistinguishable to the server.
#[derive(Debug)]
pub struct Client {
    config: OramConfig,
    codec: BlockCodec,
    position_map: PositionMap,
    stash: Stash,
    access_count: u64,
    max_stash_len: usize,
}

impl Client {
    /// Returns a client for a tree shaped by `config`, keyed with a fresh key drawn from `rng`.
    pub fn new<R: RngCore + CryptoRng>(config: OramConfig, rng: &mut R) -> Result<Self, OramError> {
        config.validate()?;
        log::info!(
            "Client::new(height = {}, Z = {}, block_size = {}, eviction = {:?})",
            config.tree_height(),
            config.bucket_capacity(),
            config.block_size(),
            config.eviction_mode()
        );
        Ok(Self::from_codec(
            config,
            BlockCodec::random(config.block_size(), rng),
        ))
    }

    /// Returns a client for a tree shaped by `config`, keyed with `key`.
    pub fn with_key(config: OramConfig, key: &[u8; KEY_SIZE]) -> Result<Self, OramError> {
        config.validate()?;
        log::info!(
            "Client::with_key(height = {}, Z = {}, block_size = {})",
            config.tree_height(),
            config.bucket_capacity(),
            config.block_size()
        );
        Ok(Self::from_codec(
            config,
            BlockCodec::new(key, config.block_size()),
        ))
    }

    fn from_codec(config: OramConfig, codec: BlockCodec) -> Self {
        Self {
            config,
            codec,
            position_map: PositionMap::new(),
            stash: Stash::new(),
            access_count: 0,
            max_stash_len: 0,
        }
    }

    /// Stores `payload` under `id`, replacing any previous payload.
    ///
    /// In [`EvictionMode::ExperimentalPushDown`], a failure of the push-down pass that follows
    /// the store is reported as [`OramError::PushDownError`]; the payload is stored regardless.
    pub fn store<S: PathServer<Block = EncryptedBlock>, R: RngCore + CryptoRng>(
        &mut self,
        server: &mut S,
        id: BlockId,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<(), OramError> {
        self.access(server, id, Operation::Store(payload), rng)?;
        if self.config.eviction_mode() == EvictionMode::ExperimentalPushDown {
            self.push_down(server, rng)
                .map_err(|error| OramError::PushDownError {
                    source: Box::new(error),
                })?;
        }
        Ok(())
    }

    /// Returns the payload stored under `id`, or `None` if `id` holds nothing.
    pub fn retrieve<S: PathServer<Block = EncryptedBlock>, R: RngCore + CryptoRng>(
        &mut self,
        server: &mut S,
        id: BlockId,
        rng: &mut R,
    ) -> Result<Option<Vec<u8>>, OramError> {
        self.access(server, id, Operation::Retrieve, rng)
    }

    /// Removes `id`. Deleting an absent id is a no-op as far as the caller can tell.
    pub fn delete<S: PathServer<Block = EncryptedBlock>, R: RngCore + CryptoRng>(
        &mut self,
        server: &mut S,
        id: BlockId,
        rng: &mut R,
    ) -> Result<(), OramError> {
        self.access(server, id, Operation::Delete, rng)?;
        Ok(())
    }

    /// The parameters this client was built with.
    pub fn config(&self) -> &OramConfig {
        &self.config
    }

    /// The number of blocks currently held in the stash.
    pub fn stash_len(&self) -> usize {
        self.stash.occupancy()
    }

    /// The largest stash occupancy observed at the end of an access.
    pub fn max_stash_len(&self) -> usize {
        self.max_stash_len
    }

    /// The number of ids currently holding a payload.
    pub fn len(&self) -> usize {
        self.position_map.len()
    }

    /// Returns `true` if no id holds a payload.
    pub fn is_empty(&self) -> bool {
        self.position_map.is_empty()
    }

    /// The ids currently holding a payload, in ascending order.
    pub fn tracked_ids(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.position_map.iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn position_of(&self, id: BlockId) -> Option<LeafIndex> {
        self.position_map.get(id)
    }

    pub(crate) fn is_stashed(&self, id: BlockId) -> bool {
        self.stash.contains(id)
    }

    pub(crate) fn codec(&self) -> &BlockCodec {
        &self.codec
    }

    pub(crate) fn position_map_mut(&mut self) -> &mut PositionMap {
        &mut self.position_map
    }

    pub(crate) fn check_server<S: PathServer>(&self, server: &S) -> Result<(), OramError> {
        if server.tree_height() != self.config.tree_height() {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "tree_height".to_string(),
                parameter_value: server.tree_height().to_string(),
            });
        }
        if server.bucket_capacity() != self.config.bucket_capacity() {
            return Err(OramError::InvalidConfigurationError {
                parameter_name: "bucket_capacity".to_string(),
                parameter_value: server.bucket_capacity().to_string(),
            });
        }
        Ok(())
    }

    /// Performs one Path ORAM access. Client state is only committed once the path write has
    /// succeeded; on error the client is left exactly as it was.
    fn access<S: PathServer<Block = EncryptedBlock>, R: RngCore + CryptoRng>(
        &mut self,
        server: &mut S,
        id: BlockId,
        operation: Operation,
        rng: &mut R,
    ) -> Result<Option<Vec<u8>>, OramError> {
        self.check_server(server)?;
        if let Operation::Store(payload) = operation {
            self.codec.check_payload(payload)?;
        }

        let height = self.config.tree_height();
        let z = self.config.bucket_capacity();

        // Unknown ids read a fresh random path, like any other access.
        let known_leaf = self.position_map.get(id);
        let old_leaf = match known_leaf {
            Some(leaf) => leaf,
            None => LeafIndex::random_leaf(height, rng),
        };
        let new_leaf = LeafIndex::random_leaf(height, rng);

        let mut stash = self.stash.clone();
        for encrypted in server.read_path(old_leaf)? {
            if let Block::Real {
                id: found,
                leaf,
                payload,
            } = self.codec.decrypt(&encrypted)?
            {
                if self.position_map.get(found) != Some(leaf) || stash.contains(found) {
                    return Err(OramError::DesyncError { id: found });
                }
                let entry = StashEntry {
                    leaf,
                    payload,
                    since: self.access_count,
                };
                stash.insert(found, entry);
            }
        }

        let (result, update) = match operation {
            Operation::Retrieve => match stash.get_mut(id) {
                Some(entry) => {
                    entry.leaf = new_leaf;
                    (Some(entry.payload.clone()), PositionUpdate::Assign(new_leaf))
                }
                None if known_leaf.is_some() => return Err(OramError::DesyncError { id }),
                None => (None, PositionUpdate::Keep),
            },
            Operation::Store(payload) => {
                stash.upsert(id, new_leaf, payload.to_vec(), self.access_count);
                (None, PositionUpdate::Assign(new_leaf))
            }
            Operation::Delete => {
                if stash.remove(id).is_none() && known_leaf.is_some() {
                    return Err(OramError::DesyncError { id });
                }
                (None, PositionUpdate::Forget)
            }
        };

        let mut blocks = Vec::with_capacity(self.config.path_size());
        for level in stash.select_for_eviction(old_leaf, height, z) {
            let padding = z - level.len();
            for evicted in level {
                if let Some(entry) = stash.remove(evicted) {
                    let block = Block::Real {
                        id: evicted,
                        leaf: entry.leaf,
                        payload: entry.payload,
                    };
                    blocks.push(self.codec.encrypt(&block, rng)?);
                }
            }
            for _ in 0..padding {
                blocks.push(self.codec.encrypt_dummy(rng)?);
            }
        }
        server.write_path(old_leaf, blocks)?;

        self.stash = stash;
        match update {
            PositionUpdate::Assign(leaf) => {
                self.position_map.insert(id, leaf);
            }
            PositionUpdate::Forget => {
                self.position_map.remove(id);
            }
            PositionUpdate::Keep => {}
        }
        self.access_count += 1;
        self.max_stash_len = self.max_stash_len.max(self.stash.occupancy());
        log::debug!(
            "Access {} done, stash occupancy {}",
            self.access_count,
            self.stash.occupancy()
        );

        Ok(result)
    }
}
