//! Sift core library: workspace manager, process adapter, output parsers,
//! rule engine, aggregator, and the analysis engine that ties them together.
//!
//! The main entry point is [`engine::Engine`], which runs every analyzer
//! module selected by an [`types::AnalysisRequest`] and merges their output
//! into one [`types::AnalysisReport`].

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod parse;
pub mod process;
pub mod rules;
pub mod tools;
pub mod types;
pub mod workspace;
