// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Authenticated encryption of blocks.
//!
//! Every block, real or dummy, is serialized into a frame of the same length before being
//! encrypted with AES-128-GCM under a fresh random nonce:
//!
//! ```text
//! marker (1) | id (8, LE) | leaf (8, LE) | payload length (4, LE) | payload, zero padded to block_size
//! ```
//!
//! A dummy frame is all zeroes, marker included. Ciphertexts of dummies and real blocks
//! therefore have identical lengths.

use crate::{
    block::{Block, EncryptedBlock, NONCE_SIZE, TAG_SIZE},
    BlockSize, OramError,
};
use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes128Gcm,
};
use rand::{CryptoRng, RngCore};
use static_assertions::const_assert_eq;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// The length in bytes of a client key.
pub const KEY_SIZE: usize = 16;

/// The length in bytes of the frame preceding the payload.
pub const FRAME_HEADER_SIZE: usize = 1 + 8 + 8 + 4;

const_assert_eq!(FRAME_HEADER_SIZE, 21);

const DUMMY_MARKER: u8 = 0;
const REAL_MARKER: u8 = 1;

/// Encrypts and decrypts blocks under a client-held key.
pub struct BlockCodec {
    cipher: Aes128Gcm,
    block_size: BlockSize,
}

impl BlockCodec {
    /// A codec for payloads of at most `block_size` bytes, keyed with `key`.
    pub fn new(key: &[u8; KEY_SIZE], block_size: BlockSize) -> Self {
        Self {
            cipher: Aes128Gcm::new(GenericArray::from_slice(key)),
            block_size,
        }
    }

    /// A codec keyed with a fresh key drawn from `rng`. The key is never exposed.
    pub fn random<R: RngCore + CryptoRng>(block_size: BlockSize, rng: &mut R) -> Self {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        rng.fill_bytes(&mut key[..]);
        Self::new(&key, block_size)
    }

    /// The maximum payload length in bytes.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// The length of every plaintext frame, and so of every ciphertext.
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.block_size
    }

    /// Fails with a `PayloadTooLargeError` if `payload` does not fit in a block.
    pub fn check_payload(&self, payload: &[u8]) -> Result<(), OramError> {
        if payload.len() > self.block_size {
            return Err(OramError::PayloadTooLargeError {
                length: payload.len(),
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    /// Encrypts `block` under a fresh random nonce.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        block: &Block,
        rng: &mut R,
    ) -> Result<EncryptedBlock, OramError> {
        let frame = self.encode(block)?;
        self.seal(frame, rng)
    }

    /// Encrypts a dummy block under a fresh random nonce.
    pub fn encrypt_dummy<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<EncryptedBlock, OramError> {
        self.encrypt(&Block::Dummy, rng)
    }

    /// Authenticates and decrypts `encrypted`.
    ///
    /// # Errors
    ///
    /// Returns an `IntegrityError` if the tag does not verify under this codec's key, or if the
    /// authenticated plaintext is not a well-formed frame.
    pub fn decrypt(&self, encrypted: &EncryptedBlock) -> Result<Block, OramError> {
        let mut frame = encrypted.ciphertext.clone();
        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&encrypted.nonce),
                b"",
                &mut frame,
                GenericArray::from_slice(&encrypted.tag),
            )
            .map_err(|_| OramError::IntegrityError)?;
        self.decode(&frame)
    }

    fn seal<R: RngCore + CryptoRng>(
        &self,
        mut frame: Vec<u8>,
        rng: &mut R,
    ) -> Result<EncryptedBlock, OramError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);

        // AES-GCM only refuses messages far longer than any frame.
        let tag = self
            .cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut frame)
            .map_err(|_| OramError::PayloadTooLargeError {
                length: frame.len(),
                block_size: self.block_size,
            })?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);

        Ok(EncryptedBlock {
            nonce,
            ciphertext: frame,
            tag: tag_bytes,
        })
    }

    fn encode(&self, block: &Block) -> Result<Vec<u8>, OramError> {
        let mut frame = vec![0u8; self.frame_len()];

        if let Block::Real { id, leaf, payload } = block {
            self.check_payload(payload)?;
            let length = u32::try_from(payload.len())?;

            frame[0] = REAL_MARKER;
            frame[1..9].copy_from_slice(&id.to_le_bytes());
            frame[9..17].copy_from_slice(&leaf.to_le_bytes());
            frame[17..FRAME_HEADER_SIZE].copy_from_slice(&length.to_le_bytes());
            frame[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        }

        Ok(frame)
    }

    fn decode(&self, frame: &[u8]) -> Result<Block, OramError> {
        if frame.len() != self.frame_len() {
            return Err(OramError::IntegrityError);
        }

        let marker = frame[0];
        if marker.ct_eq(&DUMMY_MARKER).into() {
            return Ok(Block::Dummy);
        }
        if !bool::from(marker.ct_eq(&REAL_MARKER)) {
            return Err(OramError::IntegrityError);
        }

        let id = u64::from_le_bytes(fixed_bytes(&frame[1..9])?);
        let leaf = u64::from_le_bytes(fixed_bytes(&frame[9..17])?);
        let length = usize::try_from(u32::from_le_bytes(fixed_bytes(
            &frame[17..FRAME_HEADER_SIZE],
        )?))?;
        if length > self.block_size {
            return Err(OramError::IntegrityError);
        }

        Ok(Block::Real {
            id,
            leaf,
            payload: frame[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + length].to_vec(),
        })
    }
}

fn fixed_bytes<const N: usize>(bytes: &[u8]) -> Result<[u8; N], OramError> {
    bytes.try_into().map_err(|_| OramError::IntegrityError)
}

impl std::fmt::Debug for BlockCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCodec")
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}
