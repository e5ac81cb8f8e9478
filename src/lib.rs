//! # Loss Ledger
//!
//! Turns a public, itemized equipment-loss report into a normalized record
//! store and fills in each record's event date from whatever evidence the
//! record links to.
//!
//! Re-running the pipeline against a newer report snapshot never duplicates
//! records, never loses a date found earlier, and never overwrites a date
//! someone corrected by hand.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────────────────┐   ┌──────────┐
//! │  Report    │──▶│  Merge   │──▶│   Resolver chain       │──▶│  Store   │
//! │  snapshot  │   │ by link  │   │ filename│snowflake│ocr │   │  (CSV)   │
//! └────────────┘   └──────────┘   └────────────────────────┘   └──────────┘
//!                        ▲                                          │
//!                        └──────────── previous store ──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ledger extract          # parse the snapshot, merge into the store
//! ledger resolve          # date every unresolved record
//! ledger stats            # coverage per link type and year
//! ledger validate         # check hand-edited dates
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`classify`] | Link host → link type |
//! | [`extract`] | Report HTML → records |
//! | [`resolver`] | Resolver trait and ordered chain |
//! | [`resolver_filename`] | Dates embedded in link filenames |
//! | [`resolver_snowflake`] | Dates decoded from post IDs |
//! | [`ocr`] | Image preprocessing and date text parsing |
//! | [`resolver_ocr`] | Dates read from image pixels |
//! | [`fetch`] | Evidence image retrieval |
//! | [`store`] | CSV record store |
//! | [`merge`] | Reconciliation with the store |
//! | [`pipeline`] | Extraction and batched resolution runs |
//! | [`progress`] | Progress reporting |
//! | [`stats`] | Store statistics |
//! | [`validate`] | Stored date validation |

pub mod classify;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod merge;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod resolver_filename;
pub mod resolver_ocr;
pub mod resolver_snowflake;
pub mod stats;
pub mod store;
pub mod validate;
