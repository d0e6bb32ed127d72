//! Channel id allocation
//!
//! Each connection owns one [`ChannelIdAllocator`]. Channel 0 is reserved for the connection itself and is
//! never handed out.

use std::collections::BTreeSet;

/// No channel id is available below the negotiated channel-max
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("All channel ids up to {channel_max} are in use")]
pub struct ExhaustedError {
    /// The channel-max in effect
    pub channel_max: u16,
}

/// Allocates the lowest free channel id in `1..=channel_max`
#[derive(Debug, Clone)]
pub struct ChannelIdAllocator {
    in_use: BTreeSet<u16>,
    channel_max: u16,
}

impl Default for ChannelIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelIdAllocator {
    /// Creates an allocator bounded only by the protocol limit. The bound is narrowed after tuning
    pub fn new() -> Self {
        Self::with_channel_max(u16::MAX)
    }

    /// Creates an allocator with an explicit upper bound. Zero means no limit
    pub fn with_channel_max(channel_max: u16) -> Self {
        Self {
            in_use: BTreeSet::new(),
            channel_max: normalize(channel_max),
        }
    }

    /// Current upper bound
    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    /// Applies the negotiated channel-max. Zero means no limit
    ///
    /// Ids already in use above the new bound stay allocated until released.
    pub fn set_channel_max(&mut self, channel_max: u16) {
        self.channel_max = normalize(channel_max);
    }

    /// Takes the lowest unused id
    pub fn allocate(&mut self) -> Result<u16, ExhaustedError> {
        let mut candidate: u32 = 1;
        for &id in self.in_use.iter() {
            match (id as u32).cmp(&candidate) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => candidate += 1,
                std::cmp::Ordering::Greater => break,
            }
        }

        if candidate > self.channel_max as u32 {
            return Err(ExhaustedError {
                channel_max: self.channel_max,
            });
        }

        // candidate <= channel_max <= u16::MAX
        let id = candidate as u16;
        self.in_use.insert(id);
        Ok(id)
    }

    /// Returns an id to the pool. Releasing an id that is not allocated does nothing
    ///
    /// Returns whether the id was allocated.
    pub fn release(&mut self, id: u16) -> bool {
        self.in_use.remove(&id)
    }

    /// Whether the id is currently allocated
    pub fn is_allocated(&self, id: u16) -> bool {
        self.in_use.contains(&id)
    }

    /// Number of allocated ids
    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    /// Whether no id is allocated
    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}

fn normalize(channel_max: u16) -> u16 {
    match channel_max {
        0 => u16::MAX,
        n => n,
    }
}
