//! Built-in [`crate::components::OcrExtractor`] implementations.
//!
//! ```text
//! DocumentContent ──┬─ Text  ─────────────────────────────────┐
//!                   ├─ Image ─ encode/write ──┐               │
//!                   └─ Pdf ─── render (pdfium)┴─ OCR per page ┴─ clean ─▶ raw_text
//! ```
//!
//! | Module        | Responsibility                                        |
//! |---------------|-------------------------------------------------------|
//! | [`render`]    | PDF bytes → page images (`spawn_blocking`)            |
//! | [`vision`]    | Page images → text via a vision LLM, with retries     |
//! | [`tesseract`] | Page images → text via the local `tesseract` binary   |
//! | [`clean`]     | Deterministic cleanup of transcribed text             |

pub mod clean;
pub mod render;
pub mod tesseract;
pub mod vision;

pub use tesseract::TesseractOcrExtractor;
pub use vision::VisionOcrExtractor;
