//! Request, result and response-envelope types.
//!
//! These are the wire shapes of `POST /extract-bill-data`. Everything here
//! is built fresh for one request and dropped with the response.

use crate::error::{ErrorKind, ExtractError};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Body of `POST /extract-bill-data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Absolute http(s) URL of the bill image.
    pub document: String,
}

/// One billed line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillItem {
    pub item_name: String,
    /// Net amount after discounts.
    pub item_amount: f64,
    /// Unit price.
    pub item_rate: f64,
    pub item_quantity: f64,
}

/// Kind of bill page, as labelled by the extraction model.
///
/// The three known labels serialise exactly as written below. Any other
/// non-empty label the model chooses is kept verbatim in [`PageType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Detailed itemised charges.
    BillDetail,
    /// Summary or totals page.
    FinalBill,
    /// Pharmacy or medication items.
    Pharmacy,
    /// A domain label outside the known set, e.g. "Lab Report".
    Other(String),
}

impl PageType {
    pub const ALL: [PageType; 3] = [PageType::BillDetail, PageType::FinalBill, PageType::Pharmacy];

    /// The label used on the wire.
    pub fn label(&self) -> &str {
        match self {
            PageType::BillDetail => "Bill Detail",
            PageType::FinalBill => "Final Bill",
            PageType::Pharmacy => "Pharmacy",
            PageType::Other(label) => label,
        }
    }

    /// Parse a label leniently.
    ///
    /// Case, `_`/`-` separators and repeated whitespace are ignored when
    /// matching the known labels, so `"bill_detail"` and `"FINAL  BILL"`
    /// match. Anything else becomes [`PageType::Other`] with surrounding
    /// whitespace trimmed. Returns `None` only for a blank label.
    pub fn from_label(label: &str) -> Option<PageType> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalised = trimmed
            .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let known = PageType::ALL
            .into_iter()
            .find(|t| t.label().to_lowercase() == normalised);
        Some(known.unwrap_or_else(|| PageType::Other(trimmed.to_string())))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, PageType::Other(_))
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for PageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for PageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        PageType::from_label(&label).ok_or_else(|| de::Error::custom("page_type must not be empty"))
    }
}

/// Items found on a single page, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLineItems {
    pub page_no: String,
    pub page_type: PageType,
    pub bill_items: Vec<BillItem>,
}

/// Validated extraction result.
///
/// Construct through [`ExtractionData::new`] so `total_item_count` always
/// equals the number of items across all pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionData {
    pub pagewise_line_items: Vec<PageLineItems>,
    pub total_item_count: usize,
}

impl ExtractionData {
    pub fn new(pagewise_line_items: Vec<PageLineItems>) -> Self {
        let total_item_count = pagewise_line_items.iter().map(|p| p.bill_items.len()).sum();
        Self {
            pagewise_line_items,
            total_item_count,
        }
    }
}

/// Token accounting for one or more model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            total_tokens: input_tokens + output_tokens,
            input_tokens,
            output_tokens,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage::new(
            self.input_tokens + rhs.input_tokens,
            self.output_tokens + rhs.output_tokens,
        )
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Error indicator carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ExtractError> for ErrorInfo {
    fn from(err: &ExtractError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Response envelope of `POST /extract-bill-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub is_success: bool,
    pub token_usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ExtractionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl ExtractionResponse {
    pub fn success(data: ExtractionData, token_usage: TokenUsage) -> Self {
        Self {
            is_success: true,
            token_usage,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &ExtractError, token_usage: TokenUsage) -> Self {
        Self {
            is_success: false,
            token_usage,
            data: None,
            error: Some(ErrorInfo::from(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(name: &str) -> BillItem {
        BillItem {
            item_name: name.into(),
            item_amount: 10.0,
            item_rate: 10.0,
            item_quantity: 1.0,
        }
    }

    #[test]
    fn total_item_count_sums_pages() {
        let data = ExtractionData::new(vec![
            PageLineItems {
                page_no: "1".into(),
                page_type: PageType::BillDetail,
                bill_items: vec![item("a"), item("b")],
            },
            PageLineItems {
                page_no: "2".into(),
                page_type: PageType::Pharmacy,
                bill_items: vec![item("c")],
            },
        ]);
        assert_eq!(data.total_item_count, 3);
    }

    #[test]
    fn usage_addition_keeps_total_consistent() {
        let mut usage = TokenUsage::new(1200, 300);
        usage += TokenUsage::new(800, 150);
        assert_eq!(usage.input_tokens, 2000);
        assert_eq!(usage.output_tokens, 450);
        assert_eq!(usage.total_tokens, 2450);
    }

    #[test]
    fn page_type_labels_round_trip_through_serde() {
        let json = serde_json::to_value(PageType::FinalBill).unwrap();
        assert_eq!(json, json!("Final Bill"));
        let back: PageType = serde_json::from_value(json!("Bill Detail")).unwrap();
        assert_eq!(back, PageType::BillDetail);
    }

    #[test]
    fn page_type_from_label_is_lenient() {
        assert_eq!(PageType::from_label("bill_detail"), Some(PageType::BillDetail));
        assert_eq!(PageType::from_label("  FINAL   bill "), Some(PageType::FinalBill));
        assert_eq!(PageType::from_label("pharmacy"), Some(PageType::Pharmacy));
        assert_eq!(
            PageType::from_label(" Lab Report "),
            Some(PageType::Other("Lab Report".into()))
        );
        assert_eq!(PageType::from_label(""), None);
        assert_eq!(PageType::from_label("   "), None);
    }

    #[test]
    fn other_page_type_serialises_verbatim() {
        let lab = PageType::Other("Lab Report".into());
        assert!(!lab.is_known());
        assert_eq!(serde_json::to_value(&lab).unwrap(), json!("Lab Report"));
        let back: PageType = serde_json::from_value(json!("Lab Report")).unwrap();
        assert_eq!(back, lab);
        assert!(serde_json::from_value::<PageType>(json!("")).is_err());
    }

    #[test]
    fn failure_envelope_omits_data() {
        let err = ExtractError::InvalidBody("missing field `document`".into());
        let resp = ExtractionResponse::failure(&err, TokenUsage::default());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["is_success"], json!(false));
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["kind"], json!("validation"));
        assert_eq!(json["token_usage"]["total_tokens"], json!(0));
    }

    #[test]
    fn success_envelope_omits_error() {
        let data = ExtractionData::new(vec![]);
        let resp = ExtractionResponse::success(data, TokenUsage::new(10, 5));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["is_success"], json!(true));
        assert!(json.get("error").is_none());
        assert_eq!(json["data"]["total_item_count"], json!(0));
        assert_eq!(json["token_usage"]["total_tokens"], json!(15));
    }
}
