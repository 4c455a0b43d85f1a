pub mod annotation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod correlate;
pub mod diff;
pub mod error;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod telemetry;
pub mod tree;
