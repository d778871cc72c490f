// clock.rs

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies which clock a millisecond reading was taken from.
///
/// The two bases share no epoch, so a reading from one can never be compared
/// directly with a reading from the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBase {
    /// Monotonic wall clock, available as soon as input is captured.
    Input,
    /// Audio hardware clock, valid only once audio output is initialized.
    Audio,
}

/// A point in time tagged with the clock it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp {
    pub base: TimeBase,
    pub ms: f64,
}

impl Timestamp {
    pub fn new(base: TimeBase, ms: f64) -> Self {
        Self { base, ms }
    }

    pub fn input(ms: f64) -> Self {
        Self::new(TimeBase::Input, ms)
    }

    pub fn audio(ms: f64) -> Self {
        Self::new(TimeBase::Audio, ms)
    }
}

/// A monotonically increasing millisecond reading in a single time base.
pub trait TimeSource: Send + Sync {
    fn base(&self) -> TimeBase;

    fn now_ms(&self) -> f64;

    fn now(&self) -> Timestamp {
        Timestamp::new(self.base(), self.now_ms())
    }
}

/// Wall-clock backed time source counting milliseconds from its own epoch.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    base: TimeBase,
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new(base: TimeBase) -> Self {
        Self::with_epoch(base, Instant::now())
    }

    pub fn with_epoch(base: TimeBase, epoch: Instant) -> Self {
        trace!("Creating {:?} clock", base);
        MonotonicClock { base, epoch }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Converts a reading of this clock back into an `Instant`.
    pub fn instant_at(&self, ms: f64) -> Instant {
        self.epoch + Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }
}

impl TimeSource for MonotonicClock {
    fn base(&self) -> TimeBase {
        self.base
    }

    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven time source for simulations and deterministic tests.
///
/// Clones share the same reading, so a test can keep one handle and give
/// another to the transport.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: TimeBase,
    now_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(base: TimeBase) -> Self {
        ManualClock {
            base,
            now_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now_bits.store(ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, ms: f64) {
        let _ = self
            .now_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + ms).to_bits())
            });
    }
}

impl TimeSource for ManualClock {
    fn base(&self) -> TimeBase {
        self.base
    }

    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}
