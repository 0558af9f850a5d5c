//! Initial send sequence number selection
//!
//! RFC 6528 shape: `ISS = M + F(local, remote)`, where M is a timer that
//! ticks every 4 microseconds and F is a keyed hash of the flow. The key is
//! taken from the standard library's per-process `RandomState`.

use super::FlowKey;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::time::Instant;

/// Chooses the ISS for each new session
#[derive(Debug, Clone)]
pub enum IssGenerator {
    /// Every session starts at the same number
    Fixed(u32),
    /// Keyed hash of the flow plus a 4 microsecond clock
    Keyed { key: RandomState, epoch: Instant },
}

impl IssGenerator {
    /// Generator with a freshly drawn key
    pub fn keyed() -> Self {
        IssGenerator::Keyed {
            key: RandomState::new(),
            epoch: Instant::now(),
        }
    }

    pub fn next(&self, flow: &FlowKey) -> u32 {
        match self {
            IssGenerator::Fixed(iss) => *iss,
            IssGenerator::Keyed { key, epoch } => {
                let mut hasher = key.build_hasher();
                flow.hash(&mut hasher);
                let f = hasher.finish();
                let m = (epoch.elapsed().as_micros() / 4) as u32;
                m.wrapping_add((f ^ (f >> 32)) as u32)
            }
        }
    }
}
