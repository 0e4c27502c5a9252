//! Integration tests for the wikifan library and binary.
//!
//! These tests drive whole pipelines: the library API with in-memory
//! decoders, and the `wikifan` binary over generated dump files.

mod test_ingest_command;
mod test_pipeline;
