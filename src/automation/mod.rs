// SPDX-License-Identifier: MIT

//! Run-time automation: variables, conditions and branch decisions

pub mod branch;
pub mod condition;
pub mod variables;
