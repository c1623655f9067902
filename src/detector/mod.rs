//! PXE request detection.
//!
//! Decides, from a decoded option sequence, whether a request came from
//! PXE firmware looking for a boot server.

mod pxe_classifier;

pub use pxe_classifier::{PxeClassifier, RequestClassification, PXE_CLASS_ID};
