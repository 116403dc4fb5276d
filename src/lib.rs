// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! An encrypted, client/server implementation of Path ORAM.
//!
//! The untrusted server ([`TreeStore`]) holds a complete binary tree of fixed-capacity
//! buckets of opaque [`EncryptedBlock`]s and answers path reads and path writes by leaf index.
//! The trusted [`Client`] holds the symmetric key, the position map and the stash, and
//! implements `store`, `retrieve` and `delete` so that the server only ever observes
//! uniformly random leaves and freshly re-encrypted, equally sized ciphertexts.
//!
//! ```
//! use encrypted_path_oram::{Client, OramConfig, TreeStore};
//! use rand::rngs::OsRng;
//!
//! let mut rng = OsRng;
//! let config = OramConfig::for_block_count(8)?;
//! let mut server = TreeStore::from_config(&config)?;
//! let mut client = Client::new(config, &mut rng)?;
//!
//! client.store(&mut server, 1, b"AAAA", &mut rng)?;
//! assert_eq!(client.retrieve(&mut server, 1, &mut rng)?, Some(b"AAAA".to_vec()));
//! client.delete(&mut server, 1, &mut rng)?;
//! assert_eq!(client.retrieve(&mut server, 1, &mut rng)?, None);
//! # Ok::<(), encrypted_path_oram::OramError>(())
//! ```

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

use duplicate::duplicate_item;
use std::fmt::Debug;
use std::num::TryFromIntError;
use thiserror::Error;

pub mod block;
pub mod bucket;
pub mod client;
pub mod codec;
pub mod config;
pub mod database;
pub mod position_map;
pub mod push_down;
pub mod shared;
pub mod stash;
pub mod tree_store;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use crate::block::{Block, EncryptedBlock};
pub use crate::bucket::Bucket;
pub use crate::client::Client;
pub use crate::config::{EvictionMode, OramConfig};
pub use crate::push_down::PushDownReport;
pub use crate::shared::{SharedServer, SyncClient};
pub use crate::tree_store::{PathServer, TreeStore};
pub use crate::utils::{LeafIndex, TreeHeight};

/// The numeric type used to index the flat bucket arena.
pub type Address = u64;

/// The numeric type used to identify logical blocks.
pub type BlockId = u64;

/// The numeric type used to specify the size of a block payload in bytes.
pub type BlockSize = usize;

/// The numeric type used to specify the number of blocks per bucket ("Z").
pub type BucketSize = usize;

/// A value that can be held in a bucket of a [`TreeStore`].
pub trait OramBlock: Clone + Debug + PartialEq {}

#[duplicate_item(
    int_type;
    [u8];
    [u16];
    [u32];
    [u64];
)]
impl OramBlock for int_type {}

/// Errors produced by the ORAM client and server.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OramError {
    /// Errors arising from conversions between integer types.
    #[error("Arithmetic error encountered.")]
    IntegerConversionError(#[from] TryFromIntError),
    /// A construction parameter is out of range.
    #[error("Invalid configuration: {parameter_name} = {parameter_value}.")]
    InvalidConfigurationError {
        /// The offending parameter.
        parameter_name: String,
        /// Its rejected value.
        parameter_value: String,
    },
    /// A flat arena index was out of bounds.
    #[error("Address {attempted} is out of bounds for a memory of {capacity} cells.")]
    AddressOutOfBoundsError {
        /// The attempted index.
        attempted: Address,
        /// The number of cells in the memory.
        capacity: Address,
    },
    /// A leaf index was out of bounds.
    #[error("Leaf {leaf} is out of bounds for a tree with {leaf_count} leaves.")]
    LeafOutOfBoundsError {
        /// The attempted leaf.
        leaf: LeafIndex,
        /// The number of leaves in the tree.
        leaf_count: u64,
    },
    /// A `(depth, index)` bucket coordinate was out of bounds.
    #[error("Bucket ({depth}, {index}) does not exist.")]
    NodeOutOfBoundsError {
        /// The attempted depth.
        depth: TreeHeight,
        /// The attempted index within that depth.
        index: u64,
    },
    /// A bucket or path was asked to hold more blocks than it has slots.
    #[error("Bucket capacity of {capacity} blocks exceeded.")]
    CapacityError {
        /// The capacity that was exceeded.
        capacity: usize,
    },
    /// A payload does not fit in a block.
    #[error("Payload of {length} bytes exceeds the block size of {block_size} bytes.")]
    PayloadTooLargeError {
        /// The length of the rejected payload.
        length: usize,
        /// The configured block size.
        block_size: BlockSize,
    },
    /// A block failed authentication, or decrypted to a malformed frame.
    #[error("Block authentication failed.")]
    IntegrityError,
    /// A block authenticated correctly but contradicts the client's position map or stash.
    #[error("Block {id} was found where the position map does not place it.")]
    DesyncError {
        /// The id carried by the offending block.
        id: BlockId,
    },
    /// A store committed, but the push-down pass that follows it in
    /// [`EvictionMode::ExperimentalPushDown`] failed. The stored payload is in place and the
    /// tree holds no bucket written by the failed pass.
    #[error("Store committed, but the push-down pass after it failed: {source}")]
    PushDownError {
        /// Why the push-down pass failed.
        source: Box<OramError>,
    },
    /// A lock guarding client or server state was poisoned by a panicking access.
    #[error("A lock guarding ORAM state was poisoned.")]
    LockPoisonedError,
}
