//! Output module for harvest reports and exports
//!
//! This module handles:
//! - Recording and printing harvest statistics
//! - Exporting high-quality processed documents as JSONL training data

pub mod stats;
mod training;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};
pub use training::{export_training_data, write_training_data, TrainingRecord};
