//! Chat exchange with the completion backend: request payloads, response
//! interpretation, and bookkeeping for requests in flight.
//!
//! Every submission ends in exactly one assistant transcript entry. Failures
//! never escape as errors; they become tagged text in the transcript.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::node_store::NodeId;
use crate::persistence::settings::ChatSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

/// Body sent to the completion backend for one user message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    pub top_p: f32,
}

impl ChatRequest {
    pub fn single_turn(settings: &ChatSettings, content: &str) -> Self {
        Self {
            model: settings.model.clone(),
            messages: vec![RequestMessage { role: "user".into(), content: content.to_string() }],
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            stream: false,
            top_p: settings.top_p,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

/// Whatever the backend proxy answered with. All fields are optional; the
/// interpretation below decides what the shape means.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub generated_text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CompletionResponse {
    pub fn text(content: &str) -> Self {
        Self {
            success: true,
            choices: vec![Choice { message: Some(ChoiceMessage { content: Some(content.to_string()) }) }],
            ..Default::default()
        }
    }

    pub fn failure(error: &str, status: Option<&str>) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            status: status.map(str::to_string),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("backend answered with HTTP {0}")]
    HttpStatus(u16),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// The chat-completion collaborator. Implementations do the transport.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, BackendError>;
}

/// Stand-in used when no transport is wired up; every request fails as a
/// network error so the conversation still gets its tagged reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

impl CompletionBackend for OfflineBackend {
    fn complete(&self, _request: &ChatRequest) -> Result<CompletionResponse, BackendError> {
        Err(BackendError::Network("no completion backend configured".to_string()))
    }
}

/// Turn a backend outcome into the assistant's transcript text.
pub fn transcript_entry(outcome: &Result<CompletionResponse, BackendError>) -> String {
    let retry = "Try again in a moment.";
    match outcome {
        Ok(resp) => {
            let text = if resp.success {
                let from_choice = resp
                    .choices
                    .first()
                    .and_then(|c| c.message.as_ref())
                    .and_then(|m| m.content.as_deref())
                    .map(str::trim)
                    .filter(|t| !t.is_empty());
                let from_generated = resp.generated_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
                match from_choice.or(from_generated) {
                    Some(t) => t.to_string(),
                    None => "[EMPTY RESPONSE] The model returned an empty response. Try rephrasing your message.".to_string(),
                }
            } else if let Some(err) = &resp.error {
                match resp.status.as_deref() {
                    Some(s) if s.contains("404") => {
                        "[MODEL UNAVAILABLE] The model seems to be temporarily unavailable (404).".to_string()
                    }
                    status => format!("[API ERROR] {} (Status: {})", err, status.unwrap_or("unknown")),
                }
            } else {
                "[CONNECTION ISSUE] Unable to get a response from the AI service right now.".to_string()
            };
            if text.is_empty() {
                "[EMPTY RESPONSE] The model returned an empty response. Try rephrasing your message.".to_string()
            } else {
                text
            }
        }
        Err(BackendError::Timeout) => format!("[TIMEOUT ERROR] Request timed out. The server may be busy. {}", retry),
        Err(BackendError::Network(e)) => {
            log::warn!("completion request failed: {}", e);
            format!("[NETWORK ERROR] Could not connect to the AI service. {}", retry)
        }
        Err(BackendError::HttpStatus(code)) => {
            format!("[NETWORK ERROR] The AI service answered with status {}. {}", code, retry)
        }
        Err(BackendError::MalformedPayload(e)) => {
            log::warn!("completion payload could not be read: {}", e);
            format!("[CONNECTION ISSUE] The AI service sent a response that could not be read. {}", retry)
        }
    }
}

/// Identifies one submission from send to completion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestTicket(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct PendingRequest {
    pub ticket: RequestTicket,
    pub node: NodeId,
    pub submitted_at: Instant,
}

/// A request ready to hand to the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingRequest {
    pub ticket: RequestTicket,
    pub node: NodeId,
    pub request: ChatRequest,
}

/// Requests in flight. Nodes are independent: any number may wait at once,
/// but a node only ever has one outstanding submission.
#[derive(Clone, Debug)]
pub struct ChatDispatcher {
    settings: ChatSettings,
    next_ticket: u64,
    pending: BTreeMap<RequestTicket, PendingRequest>,
}

impl ChatDispatcher {
    pub fn new(settings: ChatSettings) -> Self {
        Self { settings, next_ticket: 1, pending: BTreeMap::new() }
    }

    pub fn settings(&self) -> &ChatSettings { &self.settings }

    pub fn timeout(&self) -> Duration { Duration::from_secs(self.settings.request_timeout_secs) }

    pub fn register(&mut self, node: NodeId, content: &str, now: Instant) -> OutgoingRequest {
        let ticket = RequestTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.insert(ticket, PendingRequest { ticket, node, submitted_at: now });
        OutgoingRequest { ticket, node, request: ChatRequest::single_turn(&self.settings, content) }
    }

    /// Claim a pending request. `None` means it already finished or expired.
    pub fn take(&mut self, ticket: RequestTicket) -> Option<PendingRequest> {
        self.pending.remove(&ticket)
    }

    pub fn is_pending(&self, ticket: RequestTicket) -> bool { self.pending.contains_key(&ticket) }

    pub fn in_flight(&self) -> usize { self.pending.len() }

    /// Tickets that have waited longer than the timeout at `now`.
    pub fn overdue(&self, now: Instant) -> Vec<RequestTicket> {
        let limit = self.timeout();
        self.pending
            .values()
            .filter(|p| now.saturating_duration_since(p.submitted_at) >= limit)
            .map(|p| p.ticket)
            .collect()
    }

    /// Forget everything in flight; late answers will be dropped.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_text_is_trimmed() {
        let out = transcript_entry(&Ok(CompletionResponse::text("  Recursion is...  ")));
        assert_eq!(out, "Recursion is...");
    }

    #[test]
    fn generated_text_is_a_fallback() {
        let resp = CompletionResponse { success: true, generated_text: Some("hi".into()), ..Default::default() };
        assert_eq!(transcript_entry(&Ok(resp)), "hi");
    }

    #[test]
    fn failures_are_tagged() {
        let empty = transcript_entry(&Ok(CompletionResponse::text("   ")));
        assert!(empty.starts_with("[EMPTY RESPONSE]"));

        let missing = transcript_entry(&Ok(CompletionResponse::failure("no such model", Some("HTTP 404"))));
        assert!(missing.starts_with("[MODEL UNAVAILABLE]"));

        let api = transcript_entry(&Ok(CompletionResponse::failure("quota", None)));
        assert_eq!(api, "[API ERROR] quota (Status: unknown)");

        let shapeless = transcript_entry(&Ok(CompletionResponse::default()));
        assert!(shapeless.starts_with("[CONNECTION ISSUE]"));

        assert!(transcript_entry(&Err(BackendError::Timeout)).starts_with("[TIMEOUT ERROR]"));
        assert!(transcript_entry(&Err(BackendError::Network("refused".into()))).starts_with("[NETWORK ERROR]"));
        assert!(transcript_entry(&Err(BackendError::HttpStatus(502))).starts_with("[NETWORK ERROR]"));
    }

    #[test]
    fn request_payload_matches_the_wire_shape() {
        let req = ChatRequest::single_turn(&ChatSettings::default(), "Explain recursion");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model"], "deepseek-chat");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "Explain recursion");
        assert_eq!(v["max_tokens"], 1000);
        assert_eq!(v["stream"], false);
    }

    #[test]
    fn overdue_requests_are_reported() {
        let mut d = ChatDispatcher::new(ChatSettings { request_timeout_secs: 5, ..Default::default() });
        let t0 = Instant::now();
        let a = d.register(1, "a", t0);
        let b = d.register(2, "b", t0 + Duration::from_secs(3));
        assert_eq!(d.overdue(t0 + Duration::from_secs(6)), vec![a.ticket]);
        assert!(d.take(a.ticket).is_some());
        assert!(d.take(a.ticket).is_none());
        assert!(d.is_pending(b.ticket));
    }
}
