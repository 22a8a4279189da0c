#![doc = "dtc-report-core: core logic library for dtc-report."]

//! This crate turns a vendor diagnostic report page into an explained,
//! rendered HTML report. It holds the data model, the extraction cascade,
//! the analysis with its repair and fallback rules, the template renderer,
//! and the per-report pipeline.
//!
//! Network access goes through the traits in [`contract`]; concrete HTTP
//! clients live in the `dtc-report` binary crate.
//!
//! # Usage
//! Add this as a dependency for extraction, analysis, rendering and pipeline code.

pub mod analyze;
pub mod config;
pub mod contract;
pub mod extract;
pub mod link;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod repair;
pub mod strategy;

pub use extract::{extract, extract_with};
pub use render::render;
