//! Content model for page documents.
//!
//! A page document is an automerge map with two well-known keys:
//!
//! - `content`: a Text object holding the visible page text. Agent writes
//!   append labeled paragraphs here.
//! - `cards`: a List of approval-card maps embedded in the document. Cards
//!   are inserted by the trust resolver with `pending` status and mutated by
//!   an external approver; the server never deletes them.

use automerge::transaction::Transactable;
use automerge::{AutoCommit, ObjId, ObjType, ReadDoc, ROOT};
use marginalia_types::{AgentId, RequestId};
use serde::{Deserialize, Serialize};

use crate::error::DocError;

/// Map key of the page text.
pub const CONTENT_KEY: &str = "content";
/// Map key of the approval-card list.
pub const CARDS_KEY: &str = "cards";

/// Lifecycle state of an embedded approval card.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CardStatus {
    Pending,
    Approved,
    Rejected,
}

/// An approval card as embedded in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCard {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub suggestion: String,
    pub intent: String,
    pub status: CardStatus,
}

impl ApprovalCard {
    /// A freshly issued card awaiting a human decision.
    pub fn pending(
        request_id: RequestId,
        agent_id: AgentId,
        agent_name: impl Into<String>,
        suggestion: impl Into<String>,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            agent_id,
            agent_name: agent_name.into(),
            suggestion: suggestion.into(),
            intent: intent.into(),
            status: CardStatus::Pending,
        }
    }
}

/// Get (or create) the content Text object.
fn content_id(doc: &mut AutoCommit) -> Result<ObjId, DocError> {
    match doc.get(ROOT, CONTENT_KEY)? {
        Some((automerge::Value::Object(ObjType::Text), id)) => Ok(id),
        _ => Ok(doc.put_object(ROOT, CONTENT_KEY, ObjType::Text)?),
    }
}

/// Get (or create) the cards List object.
fn cards_id(doc: &mut AutoCommit) -> Result<ObjId, DocError> {
    match doc.get(ROOT, CARDS_KEY)? {
        Some((automerge::Value::Object(ObjType::List), id)) => Ok(id),
        _ => Ok(doc.put_object(ROOT, CARDS_KEY, ObjType::List)?),
    }
}

/// Append a paragraph to the page text. A newline separates it from existing
/// content.
pub fn append_paragraph(doc: &mut AutoCommit, text: &str) -> Result<(), DocError> {
    let content = content_id(doc)?;
    let len = doc.length(&content);
    if len == 0 {
        doc.splice_text(&content, 0, 0, text)?;
    } else {
        let paragraph = format!("\n{text}");
        doc.splice_text(&content, len, 0, &paragraph)?;
    }
    Ok(())
}

/// Current visible page text. Empty string when the page has no content yet.
pub fn extract_text(doc: &AutoCommit) -> Result<String, DocError> {
    match doc.get(ROOT, CONTENT_KEY)? {
        Some((automerge::Value::Object(ObjType::Text), id)) => Ok(doc.text(&id)?),
        _ => Ok(String::new()),
    }
}

/// Embed an approval card at the end of the card list.
pub fn insert_card(doc: &mut AutoCommit, card: &ApprovalCard) -> Result<(), DocError> {
    let cards = cards_id(doc)?;
    let idx = doc.length(&cards);
    let node = doc.insert_object(&cards, idx, ObjType::Map)?;
    doc.put(&node, "requestId", card.request_id.to_string())?;
    doc.put(&node, "agentId", card.agent_id.to_string())?;
    doc.put(&node, "agentName", card.agent_name.as_str())?;
    doc.put(&node, "suggestion", card.suggestion.as_str())?;
    doc.put(&node, "intent", card.intent.as_str())?;
    doc.put(&node, "status", card.status.to_string())?;
    Ok(())
}

/// All embedded cards as `(request_id, status)` pairs, in insertion order.
/// Cards with unparseable fields are skipped.
pub fn card_statuses(doc: &AutoCommit) -> Result<Vec<(RequestId, CardStatus)>, DocError> {
    let cards = match doc.get(ROOT, CARDS_KEY)? {
        Some((automerge::Value::Object(ObjType::List), id)) => id,
        _ => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    for i in 0..doc.length(&cards) {
        let Some((automerge::Value::Object(ObjType::Map), node)) = doc.get(&cards, i)? else {
            continue;
        };
        let request_id = doc
            .get(&node, "requestId")?
            .and_then(|(v, _)| v.to_str().map(str::to_string))
            .and_then(|s| RequestId::parse(&s).ok());
        let status = doc
            .get(&node, "status")?
            .and_then(|(v, _)| v.to_str().map(str::to_string))
            .and_then(|s| s.parse::<CardStatus>().ok());
        if let (Some(request_id), Some(status)) = (request_id, status) {
            out.push((request_id, status));
        }
    }
    Ok(out)
}
