//! Utility functions and types

pub mod data_loader;

pub use data_loader::{dataset_from_frame, DataLoader, ManifestEntry, RunManifest};
