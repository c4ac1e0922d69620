use super::BroadcastError;
use std::time::Duration;

/// Fixed-cadence output pacing.
///
/// Output is measured in ticks of a fixed length, each worth `quota` bytes.
/// After writing `n` bytes the pump sleeps `ceil(n / quota)` ticks, which
/// holds the aggregate rate near the target without smoothing bursts shorter
/// than one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    tick: Duration,
    quota: u64,
}

impl Pacer {
    pub fn new(bytes_per_sec: u64, tick: Duration) -> Result<Self, BroadcastError> {
        if tick.is_zero() {
            return Err(BroadcastError::Config("pacing tick must be positive".into()));
        }

        let quota = (bytes_per_sec as u128 * tick.as_millis() / 1000) as u64;
        if quota == 0 {
            return Err(BroadcastError::Config(format!(
                "{bytes_per_sec} bytes/s yields an empty quota per {}ms tick",
                tick.as_millis()
            )));
        }

        Ok(Self { tick, quota })
    }

    /// Bytes allowed per tick.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Ticks to wait after writing `bytes`.
    pub fn ticks_for(&self, bytes: usize) -> u64 {
        (bytes as u64).div_ceil(self.quota)
    }

    /// Time to wait after writing `bytes`.
    pub fn delay_for(&self, bytes: usize) -> Duration {
        let ticks = u32::try_from(self.ticks_for(bytes)).unwrap_or(u32::MAX);
        self.tick.saturating_mul(ticks)
    }
}
