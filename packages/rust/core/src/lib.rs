//! Pipeline stages and orchestration for neuraltheft.
//!
//! This crate wires the collector, the rate-limited [`enricher`], and the
//! batching [`persister`] into a single cancellable run (`pipeline::harvest`).

pub mod enricher;
pub mod persister;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;
