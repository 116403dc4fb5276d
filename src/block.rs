// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Block structures: the client's plaintext view and the server's opaque view.

use crate::{utils::LeafIndex, BlockId, OramBlock};

/// The length in bytes of an AES-GCM nonce.
pub const NONCE_SIZE: usize = 12;

/// The length in bytes of an AES-GCM authentication tag.
pub const TAG_SIZE: usize = 16;

#[derive(Clone, PartialEq, Eq)]
/// A decrypted block, as only the key holder can see it.
pub enum Block {
    /// A block carrying data for logical block `id`, committed to the path of `leaf`.
    Real {
        /// The logical identifier of the block.
        id: BlockId,
        /// The leaf whose path holds the block.
        leaf: LeafIndex,
        /// The stored data.
        payload: Vec<u8>,
    },
    /// Padding that keeps every bucket looking full.
    Dummy,
}

impl Block {
    /// Returns `true` for padding blocks.
    pub fn is_dummy(&self) -> bool {
        matches!(self, Block::Dummy)
    }

    /// The logical id of a real block.
    pub fn id(&self) -> Option<BlockId> {
        match self {
            Block::Real { id, .. } => Some(*id),
            Block::Dummy => None,
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Block::Dummy => write!(f, "Block::Dummy"),
            Block::Real { id, leaf, payload } => f
                .debug_struct("Block")
                .field("id", id)
                .field("leaf", leaf)
                .field("payload_len", &payload.len())
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
/// An authenticated encryption of a [`Block`]. This is the only form in which blocks reach the server.
pub struct EncryptedBlock {
    pub(crate) nonce: [u8; NONCE_SIZE],
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) tag: [u8; TAG_SIZE],
}

impl EncryptedBlock {
    /// The nonce used for this encryption.
    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// The ciphertext, without the tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// The authentication tag.
    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    /// The number of bytes the server stores for this block.
    pub fn stored_len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len() + TAG_SIZE
    }

    #[cfg(test)]
    pub(crate) fn ciphertext_mut(&mut self) -> &mut Vec<u8> {
        &mut self.ciphertext
    }

    #[cfg(test)]
    pub(crate) fn tag_mut(&mut self) -> &mut [u8; TAG_SIZE] {
        &mut self.tag
    }
}

impl std::fmt::Debug for EncryptedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlock")
            .field("stored_len", &self.stored_len())
            .finish()
    }
}

impl OramBlock for EncryptedBlock {}
