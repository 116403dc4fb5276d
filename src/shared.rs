// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Thread-safe wrappers around a server and a client.
//!
//! A [`SharedServer`] serializes calls on one tree; each path write is applied in full under the
//! server lock. A [`SyncClient`] holds its client lock for a whole access, so accesses on the same
//! client never interleave.

use crate::{
    block::EncryptedBlock,
    bucket::Bucket,
    client::Client,
    push_down::PushDownReport,
    tree_store::{PathServer, StagedBucket},
    utils::{LeafIndex, TreeHeight},
    BlockId, BucketSize, OramError,
};
use rand::{CryptoRng, RngCore};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, OramError> {
    mutex.lock().map_err(|_| OramError::LockPoisonedError)
}

/// A cloneable handle to a server shared between threads.
#[derive(Debug)]
pub struct SharedServer<S> {
    inner: Arc<Mutex<S>>,
    tree_height: TreeHeight,
    bucket_capacity: BucketSize,
}

impl<S> Clone for SharedServer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            tree_height: self.tree_height,
            bucket_capacity: self.bucket_capacity,
        }
    }
}

impl<S: PathServer> SharedServer<S> {
    /// Wraps `server` for shared use.
    pub fn new(server: S) -> Self {
        Self {
            tree_height: server.tree_height(),
            bucket_capacity: server.bucket_capacity(),
            inner: Arc::new(Mutex::new(server)),
        }
    }

    /// Runs `f` with exclusive access to the wrapped server.
    pub fn with_server<T>(&self, f: impl FnOnce(&mut S) -> T) -> Result<T, OramError> {
        let mut server = lock(&self.inner)?;
        Ok(f(&mut *server))
    }
}

impl<S: PathServer> PathServer for SharedServer<S> {
    type Block = S::Block;

    fn tree_height(&self) -> TreeHeight {
        self.tree_height
    }

    fn bucket_capacity(&self) -> BucketSize {
        self.bucket_capacity
    }

    fn read_path(&mut self, leaf: LeafIndex) -> Result<Vec<S::Block>, OramError> {
        lock(&self.inner)?.read_path(leaf)
    }

    fn write_path(&mut self, leaf: LeafIndex, blocks: Vec<S::Block>) -> Result<(), OramError> {
        lock(&self.inner)?.write_path(leaf, blocks)
    }

    fn read_bucket(
        &mut self,
        depth: TreeHeight,
        index: u64,
    ) -> Result<Bucket<S::Block>, OramError> {
        lock(&self.inner)?.read_bucket(depth, index)
    }

    fn write_buckets(&mut self, buckets: Vec<StagedBucket<S::Block>>) -> Result<(), OramError> {
        lock(&self.inner)?.write_buckets(buckets)
    }
}

/// A client usable from several threads through `&self`, bound to one shared server.
#[derive(Debug)]
pub struct SyncClient<S> {
    client: Mutex<Client>,
    server: SharedServer<S>,
}

impl<S: PathServer<Block = EncryptedBlock>> SyncClient<S> {
    /// Binds `client` to `server`.
    pub fn new(client: Client, server: SharedServer<S>) -> Result<Self, OramError> {
        client.check_server(&server)?;
        Ok(Self {
            client: Mutex::new(client),
            server,
        })
    }

    /// See [`Client::store`].
    pub fn store<R: RngCore + CryptoRng>(
        &self,
        id: BlockId,
        payload: &[u8],
        rng: &mut R,
    ) -> Result<(), OramError> {
        let mut server = self.server.clone();
        lock(&self.client)?.store(&mut server, id, payload, rng)
    }

    /// See [`Client::retrieve`].
    pub fn retrieve<R: RngCore + CryptoRng>(
        &self,
        id: BlockId,
        rng: &mut R,
    ) -> Result<Option<Vec<u8>>, OramError> {
        let mut server = self.server.clone();
        lock(&self.client)?.retrieve(&mut server, id, rng)
    }

    /// See [`Client::delete`].
    pub fn delete<R: RngCore + CryptoRng>(&self, id: BlockId, rng: &mut R) -> Result<(), OramError> {
        let mut server = self.server.clone();
        lock(&self.client)?.delete(&mut server, id, rng)
    }

    /// See [`Client::push_down`].
    pub fn push_down<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<PushDownReport, OramError> {
        let mut server = self.server.clone();
        lock(&self.client)?.push_down(&mut server, rng)
    }

    /// The server this client talks to.
    pub fn server(&self) -> &SharedServer<S> {
        &self.server
    }

    /// Unwraps the client.
    pub fn into_inner(self) -> Result<Client, OramError> {
        self.client
            .into_inner()
            .map_err(|_| OramError::LockPoisonedError)
    }
}
