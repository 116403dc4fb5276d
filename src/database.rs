// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Flat memory abstractions backing the server's bucket tree.

use crate::{Address, OramError};

/// A simple Memory trait to model the untrusted storage the server reads and writes.
pub trait Database<V: Clone>
where
    Self: Sized,
{
    /// Returns a new `Database` with every cell set to `initial_value`.
    fn new(number_of_addresses: Address, initial_value: &V) -> Result<Self, OramError>;
    /// Returns the number of values stored by `self`.
    fn capacity(&self) -> Result<Address, OramError>;
    /// Reads (a copy of) the value stored at `index`.
    fn read_db(&mut self, index: Address) -> Result<V, OramError>;
    /// Writes the value stored at `index`, returning the previous value.
    fn write_db(&mut self, index: Address, value: V) -> Result<V, OramError>;
}

/// Allocates `len` copies of `value`, failing instead of aborting when memory runs out.
fn try_filled<V: Clone>(len: Address, value: &V) -> Result<Vec<V>, OramError> {
    let out_of_memory = || OramError::InvalidConfigurationError {
        parameter_name: "number_of_addresses".to_string(),
        parameter_value: len.to_string(),
    };
    let len = usize::try_from(len).map_err(|_| out_of_memory())?;
    let mut values = Vec::new();
    values.try_reserve_exact(len).map_err(|_| out_of_memory())?;
    values.resize(len, value.clone());
    Ok(values)
}

/// A simple Database that stores its data as a Vec.
#[derive(Debug)]
pub struct SimpleDatabase<V>(Vec<V>);

impl<V> SimpleDatabase<V> {
    fn checked_index(&self, index: Address) -> Result<usize, OramError> {
        let capacity = Address::try_from(self.0.len())?;
        if index >= capacity {
            return Err(OramError::AddressOutOfBoundsError {
                attempted: index,
                capacity,
            });
        }
        Ok(usize::try_from(index)?)
    }
}

impl<V: Clone> Database<V> for SimpleDatabase<V> {
    fn new(number_of_addresses: Address, initial_value: &V) -> Result<Self, OramError> {
        Ok(Self(try_filled(number_of_addresses, initial_value)?))
    }

    fn capacity(&self) -> Result<Address, OramError> {
        Ok(self.0.len().try_into()?)
    }

    fn read_db(&mut self, index: Address) -> Result<V, OramError> {
        let index = self.checked_index(index)?;
        Ok(self.0[index].clone())
    }

    fn write_db(&mut self, index: Address, value: V) -> Result<V, OramError> {
        let index = self.checked_index(index)?;
        Ok(std::mem::replace(&mut self.0[index], value))
    }
}

/// A Database that counts reads and writes.
#[derive(Debug)]
pub struct CountAccessesDatabase<V> {
    data: SimpleDatabase<V>,
    /// `reads[i]` tracks the total number of reads made to index `i`.
    pub reads: Vec<u64>,
    /// `writes[i]` tracks the total number of writes made to index `i`.
    pub writes: Vec<u64>,
}

impl<V> CountAccessesDatabase<V> {
    /// Returns the total number of reads to the database.
    pub fn get_read_count(&self) -> u64 {
        self.reads.iter().sum()
    }

    /// Returns the total number of writes to the database.
    pub fn get_write_count(&self) -> u64 {
        self.writes.iter().sum()
    }

    /// Zeroes every counter.
    pub fn reset_counts(&mut self) {
        self.reads.iter_mut().for_each(|count| *count = 0);
        self.writes.iter_mut().for_each(|count| *count = 0);
    }
}

impl<V: Clone> Database<V> for CountAccessesDatabase<V> {
    fn new(number_of_addresses: Address, initial_value: &V) -> Result<Self, OramError> {
        Ok(Self {
            data: Database::new(number_of_addresses, initial_value)?,
            reads: try_filled(number_of_addresses, &0)?,
            writes: try_filled(number_of_addresses, &0)?,
        })
    }

    fn read_db(&mut self, index: Address) -> Result<V, OramError> {
        log::debug!("Physical read -- {}", index);

        let value = self.data.read_db(index)?;
        self.reads[usize::try_from(index)?] += 1;
        Ok(value)
    }

    fn write_db(&mut self, index: Address, value: V) -> Result<V, OramError> {
        log::debug!("Physical write -- {}", index);

        let previous = self.data.write_db(index, value)?;
        self.writes[usize::try_from(index)?] += 1;
        Ok(previous)
    }

    fn capacity(&self) -> Result<Address, OramError> {
        self.data.capacity()
    }
}
