//! Bag manager bound to one archiver configuration and task logger.

use std::path::Path;
use std::sync::Arc;

use rusty_archival_common::{ArchiverConfig, TaskLogger};

use crate::error::BagError;
use crate::layout;
use crate::verify::BagVerifier;
use crate::wrap::{self, WrapSummary};

/// Wraps, verifies and unwraps bags with a fixed configuration.
///
/// Failures are logged through the task logger before being returned, so
/// callers only need to decide whether to continue.
pub struct BagManager {
    config: ArchiverConfig,
    logger: TaskLogger,
    verifier: Arc<BagVerifier>,
}

impl BagManager {
    /// Create a new bag manager.
    ///
    /// # Arguments
    /// * `config` - Layout, algorithm and hidden-file policy
    /// * `logger` - Parent logger; a `bagit` child is derived from it
    pub fn new(config: ArchiverConfig, logger: &TaskLogger) -> Result<Self, BagError> {
        let verifier: BagVerifier = BagVerifier::new(config.include_hidden_files)?;
        Ok(Self {
            config,
            logger: logger.for_component("bagit"),
            verifier: Arc::new(verifier),
        })
    }

    /// A copy sharing this manager's configuration and verifier that logs
    /// with `logger`'s identifiers.
    pub fn with_logger(&self, logger: &TaskLogger) -> Self {
        Self {
            config: self.config.clone(),
            logger: logger.for_component("bagit"),
            verifier: Arc::clone(&self.verifier),
        }
    }

    /// Logger bound to the `bagit` component.
    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    /// Configuration this manager wraps with.
    pub fn config(&self) -> &ArchiverConfig {
        &self.config
    }

    pub fn is_bag(&self, dir: &Path) -> bool {
        layout::is_bag(dir)
    }

    pub fn is_partial_bag(&self, dir: &Path) -> bool {
        layout::is_partial_bag(dir)
    }

    /// Wrap `dir` in place, unwrapping an existing or partial bag first.
    pub fn wrap(&self, dir: &Path) -> Result<WrapSummary, BagError> {
        self.logger.info(format!(
            "Wrapping {} ({:?} layout, {})",
            dir.display(),
            self.config.bag_layout,
            self.config.hash_algorithm
        ));
        wrap::wrap(dir, &self.config).map_err(|err| {
            self.logger.error(format!("Failed to wrap {}: {}", dir.display(), err));
            err
        })
    }

    /// Verify `dir`, returning the reason on failure.
    pub fn try_verify(&self, dir: &Path) -> Result<(), BagError> {
        self.verifier.verify(dir)
    }

    /// Verify `dir`, logging the reason on failure.
    pub fn verify(&self, dir: &Path) -> bool {
        match self.try_verify(dir) {
            Ok(()) => {
                self.logger.info(format!("Bag {} is valid", dir.display()));
                true
            }
            Err(err) => {
                self.logger
                    .event_error(format!("Bag {} failed verification: {}", dir.display(), err));
                false
            }
        }
    }

    /// Restore `dir` to its unwrapped shape. A plain directory is left untouched.
    pub fn unwrap(&self, dir: &Path) -> Result<(), BagError> {
        wrap::unwrap(dir).map_err(|err| {
            self.logger
                .error(format!("Failed to unwrap {}: {}", dir.display(), err));
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_archival_common::LogContext;

    #[test]
    fn test_with_logger_takes_task_identifiers() {
        let manager: BagManager =
            BagManager::new(ArchiverConfig::default(), &TaskLogger::new("engine")).unwrap();
        assert_eq!(manager.logger().format_message("x"), "x");

        let task: TaskLogger =
            TaskLogger::with_context("engine", LogContext::default().with_task("t-3", "nightly"));
        let scoped: BagManager = manager.with_logger(&task);
        assert_eq!(scoped.logger().component(), "bagit");
        assert_eq!(scoped.logger().format_message("x"), "[T:t-3:nightly] x");
        assert!(Arc::ptr_eq(&manager.verifier, &scoped.verifier));
    }
}
