//! Progress-callback trait for per-artifact rendering events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders each artifact and runs the typesetter.
//!
//! Callers can forward events to a channel, a log, or a terminal progress
//! bar without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use md2pdf::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_artifact_complete(&self, index: usize, total: usize, strategy: &str) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Artifact {}/{} rendered with {}", index, total, strategy);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline as it renders each artifact.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, `on_artifact_start`, `on_artifact_complete` and
/// `on_artifact_error` may be called concurrently. Implementations must
/// protect shared mutable state (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after extraction, before any artifact is rendered.
    ///
    /// # Arguments
    /// * `total` — number of renderable artifacts
    fn on_conversion_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before the first strategy is tried for an artifact.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position in document order
    /// * `total` — renderable artifacts in the document
    /// * `id`    — artifact identifier
    fn on_artifact_start(&self, index: usize, total: usize, id: &str) {
        let _ = (index, total, id);
    }

    /// Called when an artifact has an asset.
    ///
    /// # Arguments
    /// * `strategy` — name of the strategy that produced it, e.g. `"resvg"`
    ///   or `"listing"`
    fn on_artifact_complete(&self, index: usize, total: usize, strategy: &str) {
        let _ = (index, total, strategy);
    }

    /// Called when no asset at all could be written for an artifact.
    fn on_artifact_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every artifact has been attempted.
    ///
    /// # Arguments
    /// * `total`    — renderable artifacts
    /// * `rendered` — artifacts rendered by a strategy other than the listing
    fn on_conversion_complete(&self, total: usize, rendered: usize) {
        let _ = (total, rendered);
    }

    /// Called before each typesetter attempt, with the profile name.
    fn on_typeset_attempt(&self, profile: &str) {
        let _ = profile;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        started_total: AtomicUsize,
        rendered: AtomicUsize,
        profiles: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_conversion_start(&self, total: usize) {
            self.started_total.store(total, Ordering::SeqCst);
        }

        fn on_artifact_start(&self, _index: usize, _total: usize, _id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_artifact_complete(&self, _index: usize, _total: usize, _strategy: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_artifact_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_complete(&self, _total: usize, rendered: usize) {
            self.rendered.store(rendered, Ordering::SeqCst);
        }

        fn on_typeset_attempt(&self, profile: &str) {
            self.profiles.lock().unwrap().push(profile.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(5);
        cb.on_artifact_start(1, 5, "a");
        cb.on_artifact_complete(1, 5, "resvg");
        cb.on_artifact_error(2, 5, "disk full");
        cb.on_conversion_complete(5, 4);
        cb.on_typeset_attempt("full");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_conversion_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_artifact_start(1, 3, "a");
        tracker.on_artifact_complete(1, 3, "inkscape");
        tracker.on_artifact_start(2, 3, "b");
        tracker.on_artifact_complete(2, 3, "listing");
        tracker.on_artifact_start(3, 3, "c");
        tracker.on_artifact_error(3, 3, "permission denied");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_conversion_complete(3, 1);
        assert_eq!(tracker.rendered.load(Ordering::SeqCst), 1);

        tracker.on_typeset_attempt("full");
        tracker.on_typeset_attempt("reduced");
        assert_eq!(*tracker.profiles.lock().unwrap(), vec!["full", "reduced"]);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ConversionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(10);
        cb.on_artifact_start(1, 10, "x");
        cb.on_artifact_complete(1, 10, "embed-svg");
    }
}
