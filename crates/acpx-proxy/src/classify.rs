//! Agent error classification.
//!
//! Raw agent error text is mapped deterministically onto a small taxonomy
//! (`quota`, `auth`, `model`, `network`, `unknown`) plus a recoverability
//! flag and a user-facing message. Classification is a pure function of
//! the input text; first match wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

lazy_static! {
    static ref ANSI_RE: Regex = Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap();

    // Usage-limit phrasing and its extractable details.
    static ref USAGE_LIMIT_RE: Regex = Regex::new(r"(?i)usage[ -]limit").unwrap();
    static ref SAVINGS_RE: Regex = Regex::new(r"\$\d[\d,]*(?:\.\d+)?").unwrap();
    static ref RESET_DATE_RE: Regex = Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").unwrap();

    static ref AUTH_RE: Regex =
        Regex::new(r"(?i)not logged in|login required|please (?:log|sign) ?in|unauthenticated|authentication (?:failed|required)").unwrap();

    static ref MODEL_RE: Regex = Regex::new(r"(?i)cannot use this model").unwrap();
    static ref REQUESTED_MODEL_RE: Regex =
        Regex::new(r"(?i)model[:\s]+['\x22]?([A-Za-z0-9._/-]+)['\x22]?").unwrap();
    static ref AVAILABLE_MODELS_RE: Regex =
        Regex::new(r"(?i)available(?: models)?[:\s]+([A-Za-z0-9._/, -]+)").unwrap();

    static ref TIMEOUT_RE: Regex = Regex::new(r"(?i)\btimeout\b|timed out|ETIMEDOUT").unwrap();
}

// Connection-failure markers; ETIMEDOUT is deliberately absent (it
// classifies as a recoverable unknown, not network).
const NETWORK_MARKERS: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOTFOUND",
    "EAI_AGAIN",
    "fetch failed",
    "socket hang up",
    "network error",
];

/// Error taxonomy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Quota,
    Auth,
    Network,
    Model,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Quota => "quota",
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::Model => "model",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// A classified agent error.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub recoverable: bool,
    pub user_message: String,
    pub details: BTreeMap<String, String>,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, recoverable: bool, user_message: &str) -> Self {
        Self {
            kind,
            recoverable,
            user_message: user_message.to_string(),
            details: BTreeMap::new(),
        }
    }

    pub fn unknown(recoverable: bool) -> Self {
        Self::new(
            ErrorKind::Unknown,
            recoverable,
            "An unexpected agent error occurred.",
        )
    }

    /// OpenAI-style HTTP error body. Carries the user message, never raw
    /// agent output.
    pub fn http_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.user_message,
                "type": self.kind.as_str(),
                "recoverable": self.recoverable,
            }
        })
    }
}

/// Model ids may contain dots, so the capture classes admit `.` and the
/// match can swallow sentence-final punctuation; strip it here.
fn trim_punctuation(s: &str) -> String {
    s.trim_end_matches(['.', ',', ';', ':']).to_string()
}

/// Remove terminal escape sequences from raw agent output.
pub fn strip_ansi(input: &str) -> String {
    ANSI_RE.replace_all(input, "").into_owned()
}

/// Classify raw agent error text. Total: `None`/empty input classifies as
/// `unknown`, non-recoverable.
pub fn classify(raw: Option<&str>) -> ClassifiedError {
    let Some(raw) = raw else {
        return ClassifiedError::unknown(false);
    };
    let text = strip_ansi(raw);
    let text = text.trim();
    if text.is_empty() {
        return ClassifiedError::unknown(false);
    }

    if USAGE_LIMIT_RE.is_match(text) {
        let mut err = ClassifiedError::new(
            ErrorKind::Quota,
            false,
            "You have hit the agent usage limit.",
        );
        if let Some(m) = SAVINGS_RE.find(text) {
            err.details
                .insert("savings".to_string(), m.as_str().to_string());
        }
        if let Some(m) = RESET_DATE_RE.find(text) {
            err.details
                .insert("resetDate".to_string(), m.as_str().to_string());
        }
        return err;
    }

    if AUTH_RE.is_match(text) {
        return ClassifiedError::new(
            ErrorKind::Auth,
            false,
            "You are not logged in to the agent CLI.",
        );
    }

    if MODEL_RE.is_match(text) {
        let mut err = ClassifiedError::new(
            ErrorKind::Model,
            false,
            "The requested model is not available to this account.",
        );
        if let Some(caps) = REQUESTED_MODEL_RE.captures(text) {
            err.details
                .insert("requested".to_string(), trim_punctuation(&caps[1]));
        }
        if let Some(caps) = AVAILABLE_MODELS_RE.captures(text) {
            err.details
                .insert("available".to_string(), trim_punctuation(caps[1].trim()));
        }
        return err;
    }

    if NETWORK_MARKERS.iter().any(|marker| text.contains(marker)) {
        return ClassifiedError::new(
            ErrorKind::Network,
            true,
            "Could not reach the agent service.",
        );
    }

    ClassifiedError::unknown(TIMEOUT_RE.is_match(text))
}

/// Direct projection of the classified `recoverable` field.
pub fn is_recoverable_error(raw: Option<&str>) -> bool {
    classify(raw).recoverable
}

fn suggestion(err: &ClassifiedError) -> &'static str {
    match err.kind {
        ErrorKind::Quota => "Wait for the limit to reset or upgrade your plan.",
        ErrorKind::Auth => "Run the agent CLI login flow, then retry.",
        ErrorKind::Model => "Pick one of the models available to this account.",
        ErrorKind::Network => "Check connectivity to the agent service and retry.",
        ErrorKind::Unknown if err.recoverable => "Retry the request.",
        ErrorKind::Unknown => "Inspect the raw agent output for details.",
    }
}

/// Render a classified error for the end user: title line, message, any
/// extracted details, and a kind-keyed suggestion.
pub fn format_error_for_user(err: &ClassifiedError) -> String {
    let mut out = format!("Agent error ({})\n{}\n", err.kind.as_str(), err.user_message);
    for (key, value) in &err.details {
        out.push_str(&format!("  {key}: {value}\n"));
    }
    out.push_str(&format!("Suggestion: {}", suggestion(err)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_limit_extracts_savings_and_reset_date() {
        let err = classify(Some(
            "You've hit your usage limit. You saved $5.50. Reset on 02/15/2026.",
        ));
        assert_eq!(err.kind, ErrorKind::Quota);
        assert!(!err.recoverable);
        assert_eq!(err.details.get("savings").map(String::as_str), Some("$5.50"));
        assert_eq!(
            err.details.get("resetDate").map(String::as_str),
            Some("02/15/2026")
        );
    }

    #[test]
    fn auth_phrasing_is_non_recoverable_auth() {
        let err = classify(Some("Error: you are not logged in"));
        assert_eq!(err.kind, ErrorKind::Auth);
        assert!(!err.recoverable);
    }

    #[test]
    fn model_rejection_extracts_details() {
        let err = classify(Some(
            "You cannot use this model: gpt-5-max. Available models: gpt-5, gpt-5-mini",
        ));
        assert_eq!(err.kind, ErrorKind::Model);
        assert!(!err.recoverable);
        assert_eq!(
            err.details.get("requested").map(String::as_str),
            Some("gpt-5-max")
        );
        assert_eq!(
            err.details.get("available").map(String::as_str),
            Some("gpt-5, gpt-5-mini")
        );
    }

    #[test]
    fn extracted_model_ids_keep_dots_but_not_sentence_punctuation() {
        let err = classify(Some("You cannot use this model: gpt-4.1."));
        assert_eq!(
            err.details.get("requested").map(String::as_str),
            Some("gpt-4.1")
        );

        let err = classify(Some(
            "You cannot use this model: o3. Available models: gpt-5, gpt-5-mini.",
        ));
        assert_eq!(err.details.get("requested").map(String::as_str), Some("o3"));
        assert_eq!(
            err.details.get("available").map(String::as_str),
            Some("gpt-5, gpt-5-mini")
        );
    }

    #[test]
    fn connection_markers_are_recoverable_network() {
        let err = classify(Some("connect ECONNREFUSED 127.0.0.1:8787"));
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(err.recoverable);

        let err = classify(Some("fetch failed"));
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn etimedout_is_recoverable_unknown() {
        let err = classify(Some("connect ETIMEDOUT 1.2.3.4:443"));
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(err.recoverable);
    }

    #[test]
    fn null_and_empty_input_are_non_recoverable_unknown() {
        let err = classify(None);
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.recoverable);

        let err = classify(Some("   "));
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.recoverable);
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m text"), "red text");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn classification_sees_through_ansi_codes() {
        let err = classify(Some("\x1b[1mYou've hit your usage limit\x1b[0m"));
        assert_eq!(err.kind, ErrorKind::Quota);
    }

    #[test]
    fn recoverable_projection_matches_classify() {
        assert!(is_recoverable_error(Some("request timeout")));
        assert!(!is_recoverable_error(Some("something odd happened")));
        assert!(!is_recoverable_error(None));
    }

    #[test]
    fn http_body_is_openai_shaped() {
        let err = classify(Some("fetch failed"));
        let body = err.http_body();
        assert_eq!(body["error"]["type"], "network");
        assert_eq!(body["error"]["recoverable"], true);
        assert!(body["error"]["message"].is_string());
    }

    #[test]
    fn formatted_error_carries_details_and_suggestion() {
        let err = classify(Some(
            "You've hit your usage limit. You saved $5.50. Reset on 02/15/2026.",
        ));
        let rendered = format_error_for_user(&err);
        assert!(rendered.starts_with("Agent error (quota)"));
        assert!(rendered.contains("savings: $5.50"));
        assert!(rendered.contains("resetDate: 02/15/2026"));
        assert!(rendered.contains("Suggestion:"));
    }
}
