//! pdfrag - Document-grounded question answering
//!
//! Ingests PDF and text documents into a persisted corpus of overlapping word-window
//! chunks, retrieves the chunks nearest to a question by exact Euclidean search, and
//! optionally asks a language model to answer from them.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod retrieval;
pub mod storage;

pub use engine::{AskResponse, RagEngine};
pub use error::{RagError, Result};
