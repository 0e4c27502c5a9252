//! Two-phase consumer registration.
//!
//! Consumers are registered on a mutable [`RegistryBuilder`] before the
//! pipeline starts. Starting the pipeline calls [`RegistryBuilder::freeze`],
//! which consumes the builder and yields an immutable [`ConsumerRegistry`]
//! together with the consumers themselves. Once frozen there is no way to
//! register anything else, so a consumer can never join mid-stream.

use std::fmt;

use crate::errors::{FanoutError, Result};

/// Maximum number of consumers: one bit each in a 32-bit mask, sign bit reserved.
pub const MAX_CONSUMERS: usize = 31;

/// Stable index of a registered consumer, in `[0, MAX_CONSUMERS)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerIndex(u8);

impl ConsumerIndex {
    pub(crate) fn new(index: usize) -> Self {
        debug_assert!(index < MAX_CONSUMERS, "consumer index {index} out of range");
        Self(index as u8)
    }

    /// The index as a plain integer.
    #[must_use]
    pub fn get(self) -> usize {
        usize::from(self.0)
    }

    /// The bit this consumer owns in a record's seen mask.
    #[must_use]
    pub fn bit(self) -> u32 {
        1u32 << self.0
    }
}

impl fmt::Display for ConsumerIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable registration phase.
#[derive(Debug)]
pub struct RegistryBuilder<C> {
    names: Vec<String>,
    consumers: Vec<C>,
}

impl<C> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self { names: Vec::new(), consumers: Vec::new() }
    }
}

impl<C> RegistryBuilder<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer and return the next free index.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::TooManyConsumers`] once [`MAX_CONSUMERS`] are registered.
    pub fn register(&mut self, name: impl Into<String>, consumer: C) -> Result<ConsumerIndex> {
        let next = self.consumers.len();
        if next >= MAX_CONSUMERS {
            return Err(FanoutError::TooManyConsumers { max: MAX_CONSUMERS });
        }
        self.names.push(name.into());
        self.consumers.push(consumer);
        Ok(ConsumerIndex::new(next))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Close registration, computing the full mask once.
    #[must_use]
    pub fn freeze(self) -> (ConsumerRegistry, Vec<(ConsumerIndex, C)>) {
        let full_mask = (0..self.consumers.len()).fold(0u32, |mask, i| mask | (1u32 << i));
        let consumers = self
            .consumers
            .into_iter()
            .enumerate()
            .map(|(i, consumer)| (ConsumerIndex::new(i), consumer))
            .collect();
        (ConsumerRegistry { names: self.names, full_mask }, consumers)
    }
}

/// Frozen registry: the set of consumer indices and the full mask.
#[derive(Debug, Clone)]
pub struct ConsumerRegistry {
    names: Vec<String>,
    full_mask: u32,
}

impl ConsumerRegistry {
    /// OR of the bits of every registered consumer.
    #[must_use]
    pub fn full_mask(&self) -> u32 {
        self.full_mask
    }

    /// Whether `bits` covers every registered consumer.
    #[must_use]
    pub fn is_complete(&self, bits: u32) -> bool {
        bits == self.full_mask
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Display name of a registered consumer.
    #[must_use]
    pub fn name(&self, index: ConsumerIndex) -> &str {
        self.names.get(index.get()).map_or("<unregistered>", String::as_str)
    }
}
