//! # Job Scout
//!
//! A local-first job posting ingestion and tracking pipeline.
//!
//! Job Scout crawls applicant tracking system (ATS) boards through a family
//! of adapters, deduplicates postings into canonical job records, accepts
//! single-page captures from a browser extension, and ages old jobs out to
//! an archive table. Everything lives in one SQLite database, served over a
//! CLI and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │   Adapters   │──▶│  Ingestion  │──▶│  SQLite  │
//! │ Ashby/GH/... │   │ dedup+upsert│   │ jobs+runs│
//! └──────────────┘   └──────▲──────┘   └────┬─────┘
//!                           │               │
//!                    ┌──────┴─────┐   ┌─────┴─────┐
//!                    │  Capture   │   │ CLI + HTTP│
//!                    │ (extension)│   │ (jobscout)│
//!                    └────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! jobscout init                            # create database
//! jobscout sources add acme https://jobs.ashbyhq.com/acme --family ashby
//! jobscout crawl                           # crawl all enabled sources
//! jobscout jobs --search engineer
//! jobscout archive --dry-run               # preview retention
//! jobscout serve                           # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`canonical`] | URL canonicalization |
//! | [`adapters`] | ATS adapter trait and registry |
//! | [`ingest`] | Identity-keyed upsert engine |
//! | [`crawl`] | Crawl orchestration and run bookkeeping |
//! | [`capture`] | Browser-extension capture path |
//! | [`retention`] | Archival of stale jobs |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod adapter_ashby;
pub mod adapter_custom;
pub mod adapter_greenhouse;
pub mod adapter_lever;
pub mod adapter_workday;
pub mod adapters;
pub mod canonical;
pub mod capture;
pub mod config;
pub mod crawl;
pub mod db;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod retention;
pub mod server;
pub mod sources;
pub mod stats;
