// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! A client-local Path ORAM position map.

use crate::{utils::LeafIndex, BlockId};
use std::collections::HashMap;

/// Maps each stored block id to the leaf whose path currently holds the block.
#[derive(Debug, Default, Clone)]
pub struct PositionMap {
    positions: HashMap<BlockId, LeafIndex>,
}

impl PositionMap {
    /// An empty position map.
    pub fn new() -> Self {
        Self::default()
    }

    /// The leaf currently assigned to `id`, if any.
    pub fn get(&self, id: BlockId) -> Option<LeafIndex> {
        self.positions.get(&id).copied()
    }

    /// Assigns `leaf` to `id`, returning the previous assignment.
    pub fn insert(&mut self, id: BlockId, leaf: LeafIndex) -> Option<LeafIndex> {
        self.positions.insert(id, leaf)
    }

    /// Forgets `id`, returning its last assignment.
    pub fn remove(&mut self, id: BlockId) -> Option<LeafIndex> {
        self.positions.remove(&id)
    }

    /// The number of ids with an assignment.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no id has an assignment.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterates over `(id, leaf)` assignments in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, LeafIndex)> + '_ {
        self.positions.iter().map(|(id, leaf)| (*id, *leaf))
    }
}
