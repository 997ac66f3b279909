//! Ingestion
//!
//! Turns bus messages into stored samples.
//!
//! - `rules`: `IngestRule`, mapping a bus topic to a module and topic.
//! - `dispatcher`: applies the rules and writes through a `Storer`.
//! - `lines`: reads `"<topic> <payload>"` lines into the dispatcher's channel.

pub mod dispatcher;
pub mod lines;
pub mod rules;

pub use dispatcher::{Dispatcher, Outcome, Tally};
pub use rules::IngestRule;
