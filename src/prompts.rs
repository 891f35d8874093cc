//! Prompts for the two model calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing what the models are asked to do
//!    requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    live model, so prompt regressions are easy to catch.
//!
//! Both builders are pure functions with no state.

use crate::types::PageType;

/// Instruction sent with the bill image to the vision model.
pub const OCR_PROMPT: &str = r#"You are an expert OCR system. Transcribe ALL text from this medical bill image.

Follow these rules precisely:

1. FIDELITY
   - Transcribe every piece of visible text exactly as printed
   - Do NOT correct spelling, reword, summarise or translate
   - Keep numbers, decimal points, currency symbols and units exactly as shown

2. LAYOUT
   - Preserve the original line structure: one printed line per output line
   - Keep table rows on a single line with columns separated by " | "
   - Keep headers, line items, quantities, rates, amounts, subtotals and totals

3. OUTPUT FORMAT
   - Output ONLY the transcribed text
   - Do NOT wrap in code fences
   - Do NOT add commentary or explanations"#;

/// Textual description of the output schema embedded in the extraction prompt.
pub const SCHEMA_DESCRIPTION: &str = r#"{
  "pagewise_line_items": [
    {
      "page_no": "1",
      "page_type": "Bill Detail",
      "bill_items": [
        {
          "item_name": "Consultation Fee",
          "item_amount": 500.00,
          "item_rate": 500.00,
          "item_quantity": 1.0
        }
      ]
    }
  ],
  "total_item_count": 1
}

Field types:
- page_no: string, the page number as printed ("1" when unknown)
- page_type: string, one of the allowed page types or a short descriptive label
- item_name: string, the service or product description EXACTLY as in the bill
- item_amount: number, the NET amount after discounts
- item_rate: number, the unit price
- item_quantity: number, the quantity (1 when the bill shows none)
- total_item_count: integer, the number of bill_items across all pages"#;

/// Build the instruction for the JSON-extraction call.
///
/// The transcription is embedded between triple quotes so the model can tell
/// bill text from instructions.
pub fn extraction_prompt(ocr_text: &str) -> String {
    let page_types = PageType::ALL
        .iter()
        .map(|t| format!("\"{}\"", t.label()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a medical bill data extraction expert. Extract the billed line items from the bill text below.

BILL TEXT:
"""
{ocr_text}
"""

Follow these rules precisely:

1. LINE ITEMS
   - ONLY extract monetary line items (services or products with an amount)
   - Keep items in the order they appear in the bill
   - item_amount should equal item_rate x item_quantity, or be close to it after discounts

2. NO DOUBLE COUNTING
   - DO NOT include "Total", "Subtotal", "Grand Total", "Net Payable" or similar rows
   - DO NOT include tax rows, rounding rows or category subtotals whose amounts
     are already reflected in itemised lines
   - DO NOT put dates, invoice numbers or patient IDs in numeric fields

3. PAGES
   - Group items by page; use one entry per page of the bill
   - page_type should be one of: {page_types}
   - If none of those fits, use a short descriptive label such as "Lab Report"

4. OUTPUT FORMAT
   Return ONLY a JSON object matching this schema:
{SCHEMA_DESCRIPTION}

   - Numbers must be JSON numbers without currency symbols or thousands separators
   - Do NOT wrap the JSON in code fences
   - Do NOT add commentary or explanations"#
    )
}
