//! # Skilldex
//!
//! A catalog and popularity pipeline for externally-hosted agent skills.
//!
//! Skilldex indexes skills that live in external GitHub repositories
//! (marked by a `SKILL.md` file), classifies them into a shared category
//! vocabulary, scores them for trending, keeps them fresh through tiered
//! update schedules, and publishes JSON listings. Records that go dormant
//! are archived to blob storage and resurrected when their repositories
//! come back to life.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ Submit / │──▶│    Queues    │──▶│  SQLite  │
//! │ Discover │   │ Ingest+Class.│   │ + Blobs  │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!                    ┌───────────────────┤
//!                    ▼                   ▼
//!               ┌──────────┐       ┌──────────┐
//!               │  Tiers,  │       │ Listings │
//!               │ Arch/Res │       │  (JSON)  │
//!               └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sdx init                      # create database
//! sdx submit anthropics/pdf-skill
//! sdx worker                    # drain queues, fire scheduled passes
//! sdx tick                      # one refresh pass by hand
//! sdx stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ingest`] | Repository fetch, marker detection, indexing |
//! | [`classify`] | Direct, AI, and keyword classification |
//! | [`trending`] | Star history and trending score |
//! | [`tiers`] | Update tiers and the scheduled refresh pass |
//! | [`archive`] | Dormant record archival |
//! | [`resurrect`] | Sweep and on-demand resurrection |
//! | [`listings`] | Public JSON listing publication |
//! | [`blob`] | Blob storage abstraction |
//! | [`queue`] | SQLite-backed job queue |
//! | [`store`] | Catalog persistence |
//! | [`github`] | GitHub metadata and content client |

pub mod archive;
pub mod blob;
pub mod classify;
pub mod config;
pub mod db;
pub mod fingerprint;
pub mod flags;
pub mod frontmatter;
pub mod github;
pub mod ingest;
pub mod listings;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod resurrect;
pub mod stats;
pub mod store;
pub mod tiers;
pub mod trending;
pub mod visit;
pub mod worker;
