//! # doc-intake
//!
//! A multi-format ingestion pipeline that turns uploaded files into plain text
//! for question answering over the resulting corpus.
//!
//! Files are fingerprinted for deduplication, dispatched by extension to a
//! format extractor (media goes through speech transcription), and recorded
//! in a session-scoped registry that previews and answers read from.
//!
//! ## Architecture
//!
//! ```text
//! bytes + filename
//!        │
//!        ▼
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ fingerprint │──▶│   registry   │──▶│     extract      │
//! │  (SHA-256)  │   │ dedup, state │   │ PDF/DOCX/PPTX    │
//! └─────────────┘   └──────┬───────┘   │ transcribe (A/V) │
//!                          │           └──────────────────┘
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!      ┌──────────┐                ┌───────────┐
//!      │ preview  │                │ responder │
//!      └──────────┘                └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! intake ingest ./uploads               # process every supported file
//! intake ask "what is covered?" ./uploads
//! intake preview ./uploads/deck.pptx
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Extraction and preview errors |
//! | [`fingerprint`] | Content fingerprints |
//! | [`extract`] | Format dispatch and document text extraction |
//! | [`transcribe`] | Audio demuxing and transcription |
//! | [`speech`] | Speech-recognition backends |
//! | [`registry`] | Session-scoped corpus and ingestion state machine |
//! | [`preview`] | Preview payloads |
//! | [`responder`] | Answers over the corpus |
//! | [`session`] | Registry, responder, and conversation together |
//! | [`sources`] | Input file collection |
//! | [`progress`] | Progress reporting on stderr |
//! | [`stats`] | Listing and summary rendering |

pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod models;
pub mod preview;
pub mod progress;
pub mod registry;
pub mod responder;
pub mod session;
pub mod sources;
pub mod speech;
pub mod stats;
pub mod transcribe;
