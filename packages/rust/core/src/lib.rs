//! Enrichment pipeline for lexical entry documents.
//!
//! This crate ties the document transformer, the text-generation client, and
//! the record store together into a batch run (e.g., [`run_batch`]).

pub mod batch;
pub mod enrichment;
pub mod pipeline;
pub mod prompt;

pub use batch::{
    BatchProgress, BatchReport, LiveWorkerFactory, SilentProgress, WorkerFactory, run_batch,
};
pub use enrichment::{ChatClient, DescriptionExpander};
pub use pipeline::{DRY_RUN_DESCRIPTION, RecordFailure, RecordOutcome, RecordStore, process_record};
