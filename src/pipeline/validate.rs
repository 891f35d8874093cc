//! Schema validation: untyped model JSON → [`ExtractionData`].
//!
//! The extraction model's reply is decoded into a `serde_json::Value` first
//! and then walked field by field. Deserialising straight into the strict
//! types would reject harmless quirks (amounts as `"1,250.00"`, page numbers
//! as integers) and give poor error messages for real problems; walking the
//! value lets us coerce the former and name the exact field path for the
//! latter.
//!
//! Failures come in two grades:
//!
//! - **Structural** problems (not JSON, no `pagewise_line_items`, a page
//!   that is not an object or lacks `page_no`, `page_type` or `bill_items`)
//!   fail the whole reply with `SchemaValidation`.
//! - **Item-level** problems (missing or non-numeric fields, a negative,
//!   zero or implausibly large `item_amount`) drop that one item with a
//!   warning. The rest of the page is kept.
//!
//! `total_item_count` is always recomputed from the surviving items. The
//! model's own count is compared only to log a warning.

use crate::config::ItemDefaults;
use crate::error::ExtractError;
use crate::pipeline::postprocess::extract_json_text;
use crate::types::{BillItem, ExtractionData, PageLineItems, PageType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

/// Amounts above this are almost always a date, bill number or patient ID
/// read into the amount column.
pub const MAX_PLAUSIBLE_AMOUNT: f64 = 1_000_000.0;

/// Decode and validate the raw text of an extraction reply.
pub fn validate_reply(raw: &str, defaults: ItemDefaults) -> Result<ExtractionData, ExtractError> {
    let candidate = extract_json_text(raw);
    let value: Value =
        serde_json::from_str(&candidate).map_err(|e| ExtractError::MalformedJson(e.to_string()))?;
    validate_value(&value, defaults)
}

/// Validate an already-decoded reply.
pub fn validate_value(value: &Value, defaults: ItemDefaults) -> Result<ExtractionData, ExtractError> {
    let root = value
        .as_object()
        .ok_or_else(|| ExtractError::schema("$", format!("expected an object, got {}", type_name(value))))?;

    let pages = match root.get("pagewise_line_items") {
        Some(Value::Array(pages)) => pages
            .iter()
            .enumerate()
            .map(|(i, page)| validate_page(page, &format!("pagewise_line_items[{i}]"), defaults))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(ExtractError::schema(
                "pagewise_line_items",
                format!("expected an array, got {}", type_name(other)),
            ))
        }
        // A single page object without the wrapper is a common model shortcut.
        None if root.contains_key("bill_items") => {
            debug!("Reply is a bare page object; wrapping it as page 1");
            vec![validate_page(value, "$", defaults)?]
        }
        None => return Err(ExtractError::schema("pagewise_line_items", "missing")),
    };

    let data = ExtractionData::new(pages);
    check_reported_count(root, data.total_item_count);
    Ok(data)
}

fn check_reported_count(root: &Map<String, Value>, actual: usize) {
    match root.get("total_item_count") {
        None => debug!("Reply has no total_item_count; using {}", actual),
        Some(reported) => match reported.as_u64() {
            Some(n) if n as usize == actual => {}
            Some(n) => warn!(
                "Model reported total_item_count={} but pages hold {} items; using {}",
                n, actual, actual
            ),
            None => warn!(
                "Ignoring non-integer total_item_count {}; using {}",
                reported, actual
            ),
        },
    }
}

fn validate_page(value: &Value, path: &str, defaults: ItemDefaults) -> Result<PageLineItems, ExtractError> {
    let page = value
        .as_object()
        .ok_or_else(|| ExtractError::schema(path, format!("expected an object, got {}", type_name(value))))?;

    let page_no = match page.get("page_no") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => page_number(n).ok_or_else(|| {
            ExtractError::schema(format!("{path}.page_no"), format!("{n} is not a whole page number"))
        })?,
        Some(other) => {
            return Err(ExtractError::schema(
                format!("{path}.page_no"),
                format!("expected a non-empty string, got {}", type_name(other)),
            ))
        }
        None => return Err(ExtractError::schema(format!("{path}.page_no"), "missing")),
    };

    let page_type = match page.get("page_type") {
        Some(Value::String(s)) => {
            let page_type = PageType::from_label(s)
                .ok_or_else(|| ExtractError::schema(format!("{path}.page_type"), "empty"))?;
            if !page_type.is_known() {
                debug!("{}: keeping unlisted page type '{}'", path, page_type);
            }
            page_type
        }
        Some(other) => {
            return Err(ExtractError::schema(
                format!("{path}.page_type"),
                format!("expected a string, got {}", type_name(other)),
            ))
        }
        None => return Err(ExtractError::schema(format!("{path}.page_type"), "missing")),
    };

    let bill_items = match page.get("bill_items") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                validate_item(item, &format!("{path}.bill_items[{i}]"), defaults)
                    .map_err(|e| warn!("Dropping bill item: {}", e))
                    .ok()
            })
            .collect(),
        Some(other) => {
            return Err(ExtractError::schema(
                format!("{path}.bill_items"),
                format!("expected an array, got {}", type_name(other)),
            ))
        }
        None => return Err(ExtractError::schema(format!("{path}.bill_items"), "missing")),
    };

    Ok(PageLineItems {
        page_no,
        page_type,
        bill_items,
    })
}

fn validate_item(value: &Value, path: &str, defaults: ItemDefaults) -> Result<BillItem, ExtractError> {
    let item = value
        .as_object()
        .ok_or_else(|| ExtractError::schema(path, format!("expected an object, got {}", type_name(value))))?;

    let item_name = match item.get("item_name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) => {
            return Err(ExtractError::schema(format!("{path}.item_name"), "empty"))
        }
        Some(other) => {
            return Err(ExtractError::schema(
                format!("{path}.item_name"),
                format!("expected a string, got {}", type_name(other)),
            ))
        }
        None => return Err(ExtractError::schema(format!("{path}.item_name"), "missing")),
    };

    let item_amount = required_amount(item, path, "item_amount")?;
    if item_amount == 0.0 {
        return Err(ExtractError::schema(format!("{path}.item_amount"), "zero amount"));
    }
    if item_amount > MAX_PLAUSIBLE_AMOUNT {
        return Err(ExtractError::schema(
            format!("{path}.item_amount"),
            format!("{item_amount} is implausibly large"),
        ));
    }
    let item_rate = defaultable_amount(item, path, "item_rate", defaults)?;
    let item_quantity = defaultable_amount(item, path, "item_quantity", defaults)?;

    Ok(BillItem {
        item_name,
        item_amount,
        item_rate,
        item_quantity,
    })
}

fn required_amount(item: &Map<String, Value>, path: &str, field: &str) -> Result<f64, ExtractError> {
    match item.get(field) {
        None | Some(Value::Null) => Err(ExtractError::schema(format!("{path}.{field}"), "missing")),
        Some(v) => coerce_amount(v).map_err(|reason| ExtractError::schema(format!("{path}.{field}"), reason)),
    }
}

fn defaultable_amount(
    item: &Map<String, Value>,
    path: &str,
    field: &str,
    defaults: ItemDefaults,
) -> Result<f64, ExtractError> {
    match (item.get(field), defaults) {
        (None | Some(Value::Null), ItemDefaults::DefaultToOne) => Ok(1.0),
        _ => required_amount(item, path, field),
    }
}

/// Page numbers arrive as `1`, `1.0` or `"1"`; only whole numbers count.
fn page_number(n: &Number) -> Option<String> {
    if let Some(u) = n.as_u64() {
        return Some(u.to_string());
    }
    match n.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Some((f as u64).to_string()),
        _ => None,
    }
}

static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:rs\.?|inr|usd|eur|gbp|[₹$€£¥])\s*|\s*(?:rs\.?|inr|usd|eur|gbp|[₹$€£¥]|/-)$").unwrap()
});

/// Coerce a JSON number or numeric-looking string to a non-negative `f64`.
///
/// Strings may carry a leading or trailing currency marker, the Indian
/// `/-` suffix and `,` thousands separators: `"₹ 1,250.50"` → `1250.5`,
/// `"500.00/-"` → `500.0`.
pub fn coerce_amount(value: &Value) -> Result<f64, String> {
    let n = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{n} is not representable as a number"))?,
        Value::String(s) => {
            let stripped = RE_CURRENCY.replace_all(s.trim(), "");
            let cleaned: String = stripped.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                return Err(format!("'{s}' is not a number"));
            }
            cleaned
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not a number"))?
        }
        other => return Err(format!("expected a number, got {}", type_name(other))),
    };

    if !n.is_finite() {
        return Err(format!("{n} is not finite"));
    }
    if n < 0.0 {
        return Err(format!("{n} is negative"));
    }
    Ok(n)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
