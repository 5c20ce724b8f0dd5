//! # Universal Bridge Test Suite
//!
//! Unified test crate for cross-crate scenarios:
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── provisioning_flow.rs   # claim -> bind -> rotate lifecycles
//!     ├── command_flow.rs        # dispatch -> adapter -> ack round trips
//!     └── ingest_flow.rs         # adapter -> security -> bus ingestion
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bridge-tests
//! cargo test -p bridge-tests integration::
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
