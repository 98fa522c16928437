//! Prompts for vision-model transcription.
//!
//! Callers can override the default via
//! [`crate::config::PipelineConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

/// Returned by the model for a page with no legible text. Cleanup maps it
/// to an empty string so a blank scan fails at the OCR stage.
pub const NO_TEXT_MARKER: &str = "[NO TEXT]";

/// Default system prompt for transcribing one page image to plain text.
pub const TRANSCRIPTION_PROMPT: &str = r#"You are an OCR engine. Transcribe every piece of text visible in the document image exactly as printed.

Follow these rules precisely:

1. FIDELITY
   - Copy characters exactly: numbers, dates, currency symbols, identifiers, punctuation
   - Do NOT correct spelling, translate, summarise or reformat values
   - Preserve the original language

2. LAYOUT
   - Follow the natural reading order (top to bottom, left to right)
   - Keep each label on the same line as its value, e.g. "Invoice No: INV-001"
   - Render table rows as one line each, cells separated by " | "
   - Separate visually distinct blocks with one blank line

3. MARKS
   - Transcribe handwritten text when legible; write [illegible] otherwise
   - Write [signature] where a handwritten signature appears
   - Write [stamp] where an official stamp or seal appears

4. OUTPUT FORMAT
   - Output ONLY the transcribed text
   - Do NOT wrap the output in code fences
   - Do NOT add commentary or explanations
   - If the image contains no legible text, output exactly [NO TEXT]"#;

/// User-turn text that accompanies a page image.
pub fn page_instruction(page_num: usize, total_pages: usize) -> String {
    if total_pages <= 1 {
        "Transcribe this document.".to_string()
    } else {
        format!("Transcribe page {page_num} of {total_pages}.")
    }
}
