//! Query compilation and workflow steps for a low-code data platform.
//!
//! Callers describe finds with [`options::QueryOptions`] whose conditions name
//! fields by id; [`model::ObjectModel`] resolves them against an object's
//! metadata, renders MySQL with sea-query and runs it through a [`storage::Storage`].
//! Process steps ([`workflow::OperationChain`]) and lane participant
//! resolution ([`participant::ParticipantLane`]) sit on the same contracts.

pub mod ast;
pub mod bus;
pub mod condition;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod object;
pub mod options;
pub mod participant;
pub mod reshape;
pub mod retry;
pub mod row_update;
pub mod sql_compiler;
pub mod storage;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

/// A fetched or written row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;
