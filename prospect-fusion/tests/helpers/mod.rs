//! Test Helper Utilities
//!
//! Shared utilities for testing prospect-fusion

#![allow(dead_code)]

pub mod db_utils;
pub mod fixtures;

pub use db_utils::{create_test_store, table_names};
pub use fixtures::{
    fast_config, flagg_advanced_source, flagg_bio_source, flagg_query, flagg_recruiting_source,
    flagg_registry, flagg_stats_source, pipeline_with, retrieved_at,
};
