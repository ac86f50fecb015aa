// SPDX-License-Identifier: MIT

//! Document ingestion: validation, flattening and transactional save

mod deserializer;
pub mod fields;
pub mod graph;

pub use deserializer::Deserializer;
pub use graph::{playbook_prefix, StagedGraph};
