//! Low-level stages shared by the extractor, the gateways and the analysis
//! pipeline.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ encode ──▶ (gateway) ──▶ postprocess
//! (pdfium)   (base64)                 (JSON payload)
//! ```
//!
//! 1. [`render`]: pdfium binding, page text and rasters; `pdftoppm` fallback
//! 2. [`encode`]: page PNG → data URL for the multimodal request body
//! 3. [`postprocess`]: strip code fences from model JSON and parse it

pub mod encode;
pub mod postprocess;
pub mod render;
