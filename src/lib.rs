//! # aoigen
//!
//! A Rust library for cutting Area-of-Interest (AOI) subsets out of 1D gridded
//! land-model NetCDF datasets while preserving their schema.
//!
//! ## Features
//!
//! - **Three AOI input modes**: grid identifiers (CSV or NetCDF), geographic
//!   lon/lat points and projected x/y points snapped to their nearest cell
//! - **Schema-preserving transcode**: dimensions, variables, datatypes and
//!   attributes are carried over; only the site dimension shrinks
//! - **Bounded memory**: rank-3 variables are copied in windows along their
//!   leading axis
//! - **Task scheduling**: forcing trees run sequentially, on a local worker
//!   pool or split across the ranks of a multi-process launch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aoigen::config::RunConfig;
//! use aoigen::jobs::{RunContext, generate_surfdata};
//! use std::path::Path;
//!
//! let config = RunConfig::default();
//! let ctx = RunContext::new("./AKSP_info", "AKSP_gridID.csv", chrono::Local::now());
//! let points = ctx.load_points(&config)?;
//!
//! let outcome = generate_surfdata(
//!     Path::new("surfdata.TES_SE.4km.1d.nc"),
//!     Path::new("./out"),
//!     &points,
//!     &ctx,
//!     &config,
//! )?;
//! println!("{} sites written", outcome.report.sites);
//! # Ok::<(), aoigen::error::AoiError>(())
//! ```

pub mod chunk;
pub mod cli;
pub mod config;
pub mod error;
pub mod grid;
pub mod input;
pub mod jobs;
pub mod log;
pub mod resolve;
pub mod sample;
pub mod scheduler;
pub mod schema;
pub mod spatial;
pub mod transcode;

#[cfg(test)]
mod tests;
