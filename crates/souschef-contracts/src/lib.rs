//! Data model and persistence contracts for the SousChef assistant: the
//! preference collector, stage-1 candidates and deterministic selection, the
//! history ledger, local/session storage, shopping lists, model registry,
//! error taxonomy and the activity event log.

pub mod candidates;
pub mod chat;
pub mod errors;
pub mod events;
pub mod flow;
pub mod history;
pub mod models;
pub mod preferences;
pub mod selection;
pub mod shopping;
pub mod storage;
