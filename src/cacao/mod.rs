// SPDX-License-Identifier: MIT

//! CACAO playbook documents: typed model, validation, ingestion, storage

pub mod ingest;
pub mod loader;
pub mod model;
pub mod schema;
pub mod store;
pub mod types;
