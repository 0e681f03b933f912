//! # parsedoc
//!
//! Text extraction for uploaded resumes and interview transcripts.
//!
//! Given a filename, a declared MIME type, and the file's bytes, the
//! pipeline returns plain text plus diagnostic metadata, or a hint telling
//! the user what to upload instead. Scanned PDFs and images go through OCR.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────────────────┐
//! │ classify │──▶│ Extractor    │──▶│ txt │ rtf │ docx          │
//! └──────────┘   │ (ordered     │   │ pdf: whole → pages → ocr  │
//!                │  fallback)   │   │ image: ocr                │
//!                └──────┬───────┘   └────────────────────────────┘
//!                       ▼
//!              ┌─────────────────┐
//!              │ CLI │ HTTP API  │
//!              └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`classify`] | Format classification and MIME guessing |
//! | [`text`] | Plain-text decoding |
//! | [`rtf`] | RTF stripping |
//! | [`docx`] | DOCX raw text |
//! | [`pdf`] | PDF backend traits and the text-layer tiers |
//! | [`pdf_content`] | Content-stream scanning for image paints |
//! | [`pdf_image`] | Bounded decoding of PDF image samples |
//! | [`raster`] | RGBA normalization and PNG encoding |
//! | [`pdf_ocr`] | OCR of images embedded in PDF pages |
//! | [`ocr`] | OCR engine contract and language fallback |
//! | [`extract`] | Orchestrator |
//! | [`models`] | Request-scoped data types |
//! | [`server`] | HTTP endpoint |
//! | [`config`] | TOML configuration |
//! | [`error`] | Error types |

pub mod classify;
pub mod config;
pub mod docx;
pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pdf_content;
pub mod pdf_image;
pub mod pdf_ocr;
pub mod raster;
pub mod rtf;
pub mod server;
pub mod text;
