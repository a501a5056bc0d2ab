//! # BidOps
//!
//! A document ingestion and evidence-grounded extraction pipeline for
//! tender management.
//!
//! BidOps walks a project folder of heterogeneous tender documents
//! (PDF, Office, CAD, schedules, images, email), parses them into
//! normalized text with OCR fallback, deduplicates by content hash,
//! chunks and embeds the text into a vector index, and drives
//! LLM-backed extraction: project summaries with evidence citations,
//! requirement checklists, document classification, grounded Q&A, and
//! key-date extraction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌───────────┐
//! │ Project      │──▶│ Hash → Parse →   │──▶│  SQLite   │
//! │ folder walk  │   │ Chunk → Embed →  │   │  + Vector │
//! └──────────────┘   │ Classify         │   │  Index    │
//!                    └──────────────────┘   └────┬──────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                   ┌─────────────┐       ┌─────────────┐
//!                   │   Search    │       │ Extraction  │
//!                   │  (filtered  │       │ (LLM router │
//!                   │   cosine)   │       │  fast/strong)│
//!                   └─────────────┘       └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline failure taxonomy |
//! | [`models`] | Core data types |
//! | [`parsers`] | Multi-format parsers and the extension registry |
//! | [`hash`] | Content hashing for idempotent re-ingestion |
//! | [`chunk`] | Overlapping, page-attributed chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Vector index: filtered search and deletion |
//! | [`classify`] | Keyword classification and language detection |
//! | [`llm`] | Fast/strong model routing |
//! | [`prompts`] | Prompt templates and context builders |
//! | [`extract`] | Summary, checklist, Q&A, key-date extraction |
//! | [`ingest`] | Ingestion orchestration |
//! | [`store`] | SQLite persistence |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`progress`] | Stderr progress reporting |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hash;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod parsers;
pub mod progress;
pub mod prompts;
pub mod store;
pub mod vector;
