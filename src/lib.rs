// SPDX-License-Identifier: MIT

//! CACAO playbook ingestion: schema validation, flattening into a stored
//! object graph, and the condition language used by branching steps.

pub mod automation;
pub mod cacao;
pub mod config;
pub mod error;
pub mod server;

pub use error::PlaybookError;
