//! # driftcheck
//!
//! A continuity engine for long-form writing.
//!
//! driftcheck indexes a corpus of draft documents at paragraph granularity
//! into an embedding-backed similarity store, then checks newly written
//! passages against that corpus for contradictions and terminology drift,
//! delegating semantic conflict analysis to a language-model collaborator
//! under a strict structured-output contract.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────────┐
//! │  drafts/  │──▶│  Indexing   │──▶│ Embedding Store  │
//! │ (raw text)│   │  Pipeline   │   │ local / remote   │
//! └───────────┘   └────────────┘   └───────┬─────────┘
//!                                          │ top-k query
//!                  ┌────────────┐   ┌──────▼─────────┐
//!                  │  Analyst   │◀──│  Continuity     │
//!                  │ (LLM, JSON)│──▶│  Checker        │
//!                  └────────────┘   └──────┬─────────┘
//!                                          ▼
//!                                   ConsistencyReport → UiSummary
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! drift init                         # create the local store
//! drift index ./drafts               # index the corpus
//! drift check new-section.md         # compact summary
//! drift check new-section.md --json  # full consistency report
//! drift similar new-section.md       # nearest indexed passages
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Paragraph extraction |
//! | [`embed`] | Embedding computation abstraction |
//! | [`store`] | Embedding store trait + local/remote/memory backends |
//! | [`index`] | Corpus indexing pipeline |
//! | [`analyst`] | Language-model collaborator |
//! | [`checker`] | Continuity check pipeline |
//! | [`report`] | UI summary formatting |
//! | [`engine`] | Caller-facing facade |

pub mod analyst;
pub mod checker;
pub mod config;
pub mod embed;
pub mod engine;
pub mod extract;
pub mod index;
pub mod models;
pub mod report;
pub mod store;
