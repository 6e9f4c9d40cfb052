//! # rag-chat
//!
//! Ask questions about your own documents. Uploaded PDF, text and Markdown
//! files are split into overlapping chunks, embedded into an in-memory
//! vector index, and the chunks closest to each question are handed to a
//! hosted language model as context. Answers come back with the source
//! excerpts they were conditioned on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract +   │──▶│ VectorIndex  │
//! │ pdf/txt/ │   │ Split       │   │ (embeddings) │
//! │   md     │   └─────────────┘   └──────┬───────┘
//! └──────────┘                            │ top-K
//!                                         ▼
//!                 ┌──────────┐      ┌───────────┐
//!                 │ Session  │◀─────│  Prompt + │
//!                 │ history  │      │ Generator │
//!                 └────┬─────┘      └───────────┘
//!                      │
//!             ┌────────┴────────┐
//!             ▼                 ▼
//!        ┌──────────┐     ┌──────────┐
//!        │   CLI    │     │   HTTP   │
//!        │(ragchat) │     │ sessions │
//!        └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export HF_TOKEN=hf_...
//! ragchat chunk report.pdf --show          # inspect chunking
//! ragchat ask "What is the deadline?" --file report.pdf
//! ragchat chat --file docs/                # interactive session
//! ragchat serve                            # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`settings`] | Validated per-session settings |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | PDF and text extraction |
//! | [`chunk`] | Recursive character splitting |
//! | [`ingest`] | Upload batches and file reading |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index |
//! | [`prompt`] | Prompt assembly and source excerpts |
//! | [`generation`] | Hosted text generation |
//! | [`session`] | Session state: ingest, ask, reset |
//! | [`services`] | Providers shared across sessions |
//! | [`progress`] | Busy indicators on stderr |
//! | [`chat`] | Terminal rendering and the chat loop |
//! | [`server`] | Multi-session HTTP server |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod services;
pub mod session;
pub mod settings;
