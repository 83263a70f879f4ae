//! Proposal content types and the single normalisation step the composer runs.
//!
//! Wire JSON uses camelCase keys. Scope and deliverable entries arrive either as
//! plain strings (legacy rows) or as `{title, description}` objects; both are
//! folded into [`ListEntry`] once, so layout code only ever sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ContentError {
    #[error("proposal {0} has no generated content yet")]
    NotGenerated(String),

    #[error("proposal is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("investment item {index} ('{name}') has invalid amount {amount}")]
    InvalidAmount { index: usize, name: String, amount: f64 },

    #[error("investment subtotal exceeds the representable range")]
    TotalOutOfRange,
}

/// Largest single line-item amount accepted, in major units.
pub const MAX_LINE_AMOUNT: f64 = 1.0e13;

/// A scope or deliverable entry as it appears in storage or AI output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    PlainTitle(String),
    Titled {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },
    /// Any other JSON shape. Rendered title-only rather than failing the document.
    Unrecognized(Value),
}

pub type ScopeItem = ContentItem;
pub type Deliverable = ContentItem;

/// Canonical list entry consumed by the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub title: String,
    pub description: Option<String>,
}

impl ContentItem {
    pub fn titled(title: &str, description: Option<&str>) -> Self {
        ContentItem::Titled {
            title: title.to_string(),
            description: description.map(str::to_string),
            icon: None,
        }
    }

    /// Folds any accepted shape into a [`ListEntry`]. Empty descriptions are dropped.
    pub fn normalize(&self) -> ListEntry {
        match self {
            ContentItem::PlainTitle(title) => ListEntry {
                title: title.clone(),
                description: None,
            },
            ContentItem::Titled {
                title, description, ..
            } => ListEntry {
                title: title.clone(),
                description: description
                    .as_ref()
                    .filter(|d| !d.trim().is_empty())
                    .cloned(),
            },
            ContentItem::Unrecognized(value) => {
                warn!("Unrecognized content entry shape, rendering title-only: {value}");
                ListEntry {
                    title: fallback_title(value),
                    description: None,
                }
            }
        }
    }

    /// The entry's title text, whatever its shape.
    pub fn title(&self) -> String {
        match self {
            ContentItem::PlainTitle(title) | ContentItem::Titled { title, .. } => title.clone(),
            ContentItem::Unrecognized(value) => fallback_title(value),
        }
    }
}

/// Best-effort title for an unexpected JSON value.
fn fallback_title(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => ["title", "name", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn normalize_items(items: &[ContentItem]) -> Vec<ListEntry> {
    items.iter().map(ContentItem::normalize).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub period: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub amount: f64,
}

impl LineItem {
    /// Amount rounded to minor units (cents). All totals are summed in this domain.
    pub fn amount_minor(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnologyStack {
    #[serde(default)]
    pub frontend: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub infrastructure: String,
}

/// The seven sections of a proposal. Never mutated: a drafting pass yields a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalContent {
    pub executive_summary: String,
    #[serde(default)]
    pub project_scope: Vec<ScopeItem>,
    #[serde(default)]
    pub timeline: Vec<Phase>,
    #[serde(default)]
    pub investment: Vec<LineItem>,
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
    #[serde(default)]
    pub technology_stack: TechnologyStack,
    #[serde(default)]
    pub terms_and_conditions: Vec<String>,
}

/// Investment totals in minor units. Tax is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvestmentTotals {
    pub subtotal_minor: i64,
    pub tax_minor: i64,
    pub total_minor: i64,
}

impl ProposalContent {
    /// Fails fast on content that must never reach export.
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.executive_summary.trim().is_empty() {
            return Err(ContentError::MissingField("executiveSummary"));
        }
        for (index, item) in self.investment.iter().enumerate() {
            if !item.amount.is_finite() || item.amount < 0.0 || item.amount > MAX_LINE_AMOUNT {
                return Err(ContentError::InvalidAmount {
                    index,
                    name: item.name.clone(),
                    amount: item.amount,
                });
            }
        }
        self.checked_subtotal_minor()
            .map(|_| ())
            .ok_or(ContentError::TotalOutOfRange)
    }

    fn checked_subtotal_minor(&self) -> Option<i64> {
        self.investment
            .iter()
            .try_fold(0_i64, |sum, item| sum.checked_add(item.amount_minor()))
    }

    /// Totals of validated content. Saturates rather than wrapping on content
    /// that skipped [`ProposalContent::validate`].
    pub fn totals(&self) -> InvestmentTotals {
        let subtotal_minor = self.checked_subtotal_minor().unwrap_or(i64::MAX);
        let tax_minor = 0;
        InvestmentTotals {
            subtotal_minor,
            tax_minor,
            total_minor: subtotal_minor.saturating_add(tax_minor),
        }
    }
}

/// Input to the composer: one proposal with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDocument {
    pub id: String,
    pub title: String,
    pub client: String,
    /// ISO-8601 timestamp.
    pub created_at: String,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    pub content: ProposalContent,
}

impl ProposalDocument {
    pub fn validate(&self) -> Result<(), ContentError> {
        if self.id.trim().is_empty() {
            return Err(ContentError::MissingField("id"));
        }
        if self.title.trim().is_empty() {
            return Err(ContentError::MissingField("title"));
        }
        self.content.validate()
    }

    pub fn reference_code(&self) -> String {
        reference_code(&self.id)
    }
}

/// Last six characters of `id`, uppercased.
fn id_suffix(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let start = chars.len().saturating_sub(6);
    chars[start..].iter().collect::<String>().to_uppercase()
}

/// Human-facing reference, `PROP-` + last six characters of the id, uppercased.
pub fn reference_code(id: &str) -> String {
    format!("PROP-{}", id_suffix(id))
}

/// Download name: `Proposal-<SUFFIX>-<title with non-alphanumerics as '_', max 50>.pdf`.
pub fn attachment_filename(id: &str, title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(50)
        .collect();
    format!("Proposal-{}-{}.pdf", id_suffix(id), sanitized)
}
