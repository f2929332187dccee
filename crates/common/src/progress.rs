//! Generic progress callback trait and percentage step tracking.

use std::marker::PhantomData;
use std::sync::Mutex;

/// Generic progress callback trait.
///
/// Type parameter `T` is the progress data type, allowing different
/// operations to report different progress information while sharing
/// the same callback pattern. Implementations may be called concurrently
/// from several worker tasks.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called with progress updates.
    ///
    /// # Arguments
    /// * `progress` - Progress data for the current operation
    ///
    /// # Returns
    /// - `true` to continue the operation
    /// - `false` to cancel the operation
    fn on_progress(&self, progress: &T) -> bool;
}

/// A no-op progress callback that always continues.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) -> bool {
        true
    }
}

/// A progress callback that wraps a closure.
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<fn(&T)>,
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn on_progress(&self, progress: &T) -> bool {
        (self.callback)(progress)
    }
}

/// Create a progress callback from a closure.
///
/// # Arguments
/// * `f` - Closure that receives progress and returns whether to continue
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) -> bool + Send + Sync,
{
    FnProgress {
        callback: f,
        _marker: PhantomData,
    }
}

/// A percentage threshold crossed by a byte counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStep {
    /// Percentage reached, a multiple of the step size.
    pub percent: u64,
    /// Bytes counted when the step was reported.
    pub bytes: u64,
    /// Total bytes expected.
    pub total: u64,
}

/// Thread-safe byte counter that reports every fixed-percentage step once.
///
/// Updates from concurrent workers are serialized through a mutex so the
/// counter and the next threshold always move together.
#[derive(Debug)]
pub struct StepTracker {
    total: u64,
    step_percent: u64,
    state: Mutex<StepState>,
}

#[derive(Debug)]
struct StepState {
    bytes: u64,
    next_percent: u64,
}

impl StepTracker {
    /// Create a tracker.
    ///
    /// # Arguments
    /// * `total` - Total bytes expected
    /// * `step_percent` - Report granularity in percent (clamped to 1..=100)
    pub fn new(total: u64, step_percent: u64) -> Self {
        let step_percent: u64 = step_percent.clamp(1, 100);
        Self {
            total,
            step_percent,
            state: Mutex::new(StepState {
                bytes: 0,
                next_percent: step_percent,
            }),
        }
    }

    /// Add transferred bytes.
    ///
    /// # Returns
    /// Every step crossed by this update in ascending order, empty if no new
    /// step was reached. Steps passed over by a large update report the
    /// byte count at their threshold; the last one reports the bytes counted.
    pub fn add(&self, bytes: u64) -> Vec<ProgressStep> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.bytes = state.bytes.saturating_add(bytes).min(self.total);
        let percent: u64 = if self.total == 0 {
            // Nothing to move: a single 100% step.
            state.next_percent = state.next_percent.max(100);
            100
        } else {
            ((state.bytes as u128 * 100) / self.total as u128) as u64
        };

        let mut steps: Vec<ProgressStep> = Vec::new();
        while state.next_percent <= percent.min(100) {
            let threshold: u64 = ((self.total as u128 * state.next_percent as u128) / 100) as u64;
            steps.push(ProgressStep {
                percent: state.next_percent,
                bytes: threshold,
                total: self.total,
            });
            state.next_percent += self.step_percent;
        }
        if let Some(last) = steps.last_mut() {
            last.bytes = state.bytes;
        }
        steps
    }

    /// Bytes counted so far.
    pub fn bytes(&self) -> u64 {
        match self.state.lock() {
            Ok(guard) => guard.bytes,
            Err(poisoned) => poisoned.into_inner().bytes,
        }
    }

    /// Total bytes expected.
    pub fn total(&self) -> u64 {
        self.total
    }
}
