//! Block-partitioned somatic variant calling orchestration.
//!
//! A job downloads a tumor/normal pair, tiles the reference into fixed-size
//! blocks, runs one external tool invocation per block on a bounded worker
//! pool, merges the per-block VCFs, uploads the result and records a single
//! terminal status for operators.

pub mod cli;
pub mod config;
pub mod executor;
pub mod genome;
pub mod launch;
pub mod migrations;
pub mod models;
pub mod outcome;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod transfer;
pub mod utils;
pub mod vcf;
