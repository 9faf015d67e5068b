//! Processing statistics tracking.
//!
//! This module provides thread-safe statistics tracking for provider failures
//! and informational events across bundle requests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::{ErrorType, InfoType};

/// Thread-safe processing statistics tracker.
///
/// Tracks errors and informational events using atomic counters, allowing
/// concurrent updates from every fetch task. All types are initialized to zero
/// on creation.
///
/// # Thread Safety
///
/// This struct is thread-safe and can be shared across tasks using `Arc`.
pub struct ProcessingStats {
    errors: HashMap<ErrorType, AtomicUsize>,
    info: HashMap<InfoType, AtomicUsize>,
}

impl ProcessingStats {
    /// Creates a tracker with every counter at zero.
    pub fn new() -> Self {
        let errors = ErrorType::iter()
            .map(|error| (error, AtomicUsize::new(0)))
            .collect();
        let info = InfoType::iter()
            .map(|info_type| (info_type, AtomicUsize::new(0)))
            .collect();

        ProcessingStats { errors, info }
    }

    /// Increment an error counter.
    pub fn increment_error(&self, error: ErrorType) {
        if let Some(counter) = self.errors.get(&error) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment error counter for {:?} which is not in the map. \
                 This indicates a bug in ProcessingStats initialization.",
                error
            );
        }
    }

    /// Increment an info counter by `n`.
    pub fn add_info(&self, info_type: InfoType, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(counter) = self.info.get(&info_type) {
            counter.fetch_add(n, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment info counter for {:?} which is not in the map. \
                 This indicates a bug in ProcessingStats initialization.",
                info_type
            );
        }
    }

    /// Increment an info counter.
    pub fn increment_info(&self, info_type: InfoType) {
        self.add_info(info_type, 1);
    }

    /// Get the count for an error type.
    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors
            .get(&error)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Get the count for an info type.
    pub fn get_info_count(&self, info_type: InfoType) -> usize {
        self.info
            .get(&info_type)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Sum of all error counters.
    pub fn total_errors(&self) -> usize {
        self.errors.values().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Logs every non-zero counter at info level.
    pub fn log_summary(&self) {
        for error in ErrorType::iter() {
            let count = self.get_error_count(error);
            if count > 0 {
                log::info!("{}: {}", error, count);
            }
        }
        for info_type in InfoType::iter() {
            let count = self.get_info_count(info_type);
            if count > 0 {
                log::info!("{}: {}", info_type, count);
            }
        }
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}
