//! Last-resort diagnostics for the pipeline itself.
//!
//! Failures inside the write worker cannot be logged through the
//! pipeline (its sinks may be the thing that is failing), so they go to
//! stderr. Under sustained failure the output is sampled.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

const PREFIX: &str = "[log-pipeline]";

/// Reports the first 100 errors, then 10% of errors up to 1000, then 1%.
#[derive(Debug, Default)]
pub struct ErrorSampler {
    seen: AtomicU64,
}

impl ErrorSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one error and decide whether it should be printed.
    pub fn should_report(&self) -> bool {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        match seen {
            0..=100 => true,
            101..=1000 => rand::thread_rng().gen_range(0..100) < 10,
            _ => rand::thread_rng().gen_range(0..100) < 1,
        }
    }

    #[cfg(test)]
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

/// Print a sampled diagnostic line for engine `name`.
pub(crate) fn report(sampler: &ErrorSampler, name: &str, args: std::fmt::Arguments<'_>) {
    if sampler.should_report() {
        eprintln!("{PREFIX} engine[{name}] {args}");
    }
}

/// Print unconditionally. Reserved for events that must always be
/// visible, such as records lost at shutdown.
pub(crate) fn always(name: &str, args: std::fmt::Arguments<'_>) {
    eprintln!("{PREFIX} engine[{name}] {args}");
}
