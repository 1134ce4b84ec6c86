//! Terminal display utilities for the CLI.

pub mod tables;
pub mod theme;

pub use tables::{create_results_table, create_stats_table};
pub use theme::{THEME, Theme};
