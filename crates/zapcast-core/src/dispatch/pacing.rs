//! Inter-message pacing
//!
//! A fresh random pause between consecutive messages keeps the send
//! pattern from looking machine-generated to the receiving platform.

use super::DispatchError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inclusive range of seconds to wait between two messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayBounds {
    min_secs: u32,
    max_secs: u32,
}

impl DelayBounds {
    pub fn new(min_secs: u32, max_secs: u32) -> Result<Self, DispatchError> {
        if min_secs > max_secs {
            return Err(DispatchError::InvalidDelay {
                min: min_secs.into(),
                max: max_secs.into(),
            });
        }
        Ok(Self { min_secs, max_secs })
    }

    /// From the signed columns stored on a campaign
    pub fn from_secs(min_secs: i64, max_secs: i64) -> Result<Self, DispatchError> {
        let invalid = || DispatchError::InvalidDelay {
            min: min_secs,
            max: max_secs,
        };
        let min = u32::try_from(min_secs).map_err(|_| invalid())?;
        let max = u32::try_from(max_secs).map_err(|_| invalid())?;
        Self::new(min, max)
    }

    pub fn min(&self) -> Duration {
        Duration::from_secs(self.min_secs.into())
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs.into())
    }
}

/// Chooses the pause before the next message
pub trait DelayStrategy: Send + Sync {
    fn next_delay(&self, bounds: DelayBounds) -> Duration;
}

/// Uniform random draw over the bounds, at millisecond resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformDelay;

impl DelayStrategy for UniformDelay {
    fn next_delay(&self, bounds: DelayBounds) -> Duration {
        let min = bounds.min().as_millis() as u64;
        let max = bounds.max().as_millis() as u64;
        let millis = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(millis)
    }
}

/// No pause at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayStrategy for NoDelay {
    fn next_delay(&self, _bounds: DelayBounds) -> Duration {
        Duration::ZERO
    }
}
