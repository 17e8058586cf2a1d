//! Pivot detection.

mod detector;

pub use detector::{detect_all, DetectorConfig, PivotDetector};
