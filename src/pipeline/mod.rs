//! Pipeline stages for menu ingestion.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ tabular ──▶ mapper ──▶ transform ──┐
//!   │                                          ├──▶ validate ──▶ persist
//!   └────▶ document ──▶ extract ───────────────┘
//! ```
//!
//! 1. [`input`]: screen the upload (MIME, extension, size) and pick a path
//! 2. [`tabular`]: parse CSV bytes into header-keyed rows
//! 3. [`mapper`]: resolve raw headers to canonical fields; uses
//!    [`normalize`] and [`synonyms`], with [`suggest`] for what is left over
//! 4. [`transform`]: re-key each row by canonical field
//! 5. [`document`]: pull plain text out of a PDF; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 6. [`extract`]: ask the extraction service for items and check its
//!    JSON; the only stage with network I/O
//! 7. [`validate`]: sanitise and check every row or item, collecting errors
//! 8. [`persist`]: batch insert with per-item failure reconciliation

pub mod document;
pub mod extract;
pub mod input;
pub mod mapper;
pub mod normalize;
pub mod persist;
pub mod suggest;
pub mod synonyms;
pub mod tabular;
pub mod transform;
pub mod validate;
