//! SmartWeb CAN bus <-> MQTT broker gateway.
//!
//! See `SPEC_FULL.md` for the full component breakdown; `DESIGN.md` for the
//! grounding ledger and resolved open questions.

pub mod broker;
pub mod bus;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
