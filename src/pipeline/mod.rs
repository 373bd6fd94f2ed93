//! Pipeline stages from an incoming file reference to uploadable items.
//!
//! Each submodule implements one step, so the rendering and conversion
//! backends can be swapped (and faked in tests) without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ allowlist ──▶ download ──┐
//!   └──────▶ inline ─────────────────┴─▶ extract ──▶ office? ──▶ render ──▶ crop? ──▶ encode
//! (FileRef)  (SSRF gate)  (capped)       (PageStream) (soffice)  (pdfium)  (regions)  (PNG)
//! ```
//!
//! 1. [`input`]: resolve a [`input::FileRef`] to bytes, by link or payload
//! 2. [`allowlist`]: exact-host and suffix check, before every request and redirect hop
//! 3. [`download`]: streamed fetch with declared and actual size ceilings
//! 4. [`inline`]: base64 decode with its own ceiling
//! 5. [`extract`]: orchestrates the per-page stream for PDFs and decks
//! 6. [`office`]: headless LibreOffice conversion to PDF
//! 7. [`render`]: rasterise pages; runs in `spawn_blocking` because pdfium
//!    is not async-safe
//! 8. [`crop`]: find diagram-like regions on a rendered page
//! 9. [`encode`]: PNG-encode each page or crop

pub mod allowlist;
pub mod crop;
pub mod download;
pub mod encode;
pub mod extract;
pub mod inline;
pub mod input;
pub mod office;
pub mod render;
