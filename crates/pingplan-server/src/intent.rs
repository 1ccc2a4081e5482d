use once_cell::sync::Lazy;
use regex::Regex;

/// What an inbound message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Empty,
    ListTasks,
    /// Everything after the `delete` keyword, trimmed.
    Delete { args: String },
    Acknowledgment,
    FreeText { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntentKind {
    Empty,
    ListTasks,
    Delete,
    Acknowledgment,
}

const LIST_VERBS: &[&str] = &["show", "list"];
const LIST_NOUN: &str = "task";
const GRATITUDE: &[&str] = &["thanks", "thank you", "thx", "ty"];

static DELETE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^delete(?:\s+(.*))?$").expect("delete regex"));

fn is_empty(text: &str, _lower: &str) -> bool {
    text.is_empty()
}

fn is_list_request(_text: &str, lower: &str) -> bool {
    LIST_VERBS.iter().any(|v| lower.contains(v)) && lower.contains(LIST_NOUN)
}

fn is_delete_request(text: &str, _lower: &str) -> bool {
    DELETE_RE.is_match(text)
}

fn is_acknowledgment(_text: &str, lower: &str) -> bool {
    GRATITUDE.iter().any(|t| lower.contains(t))
}

/// Evaluated top to bottom; the first predicate that holds decides the intent.
const RULES: &[(fn(&str, &str) -> bool, IntentKind)] = &[
    (is_empty, IntentKind::Empty),
    (is_list_request, IntentKind::ListTasks),
    (is_delete_request, IntentKind::Delete),
    (is_acknowledgment, IntentKind::Acknowledgment),
];

pub fn classify(raw: &str) -> Intent {
    let text = raw.trim();
    let lower = text.to_lowercase();

    let kind = RULES
        .iter()
        .find(|(matches, _)| matches(text, &lower))
        .map(|(_, kind)| *kind);

    match kind {
        Some(IntentKind::Empty) => Intent::Empty,
        Some(IntentKind::ListTasks) => Intent::ListTasks,
        Some(IntentKind::Delete) => Intent::Delete {
            args: delete_args(text).to_string(),
        },
        Some(IntentKind::Acknowledgment) => Intent::Acknowledgment,
        None => Intent::FreeText {
            text: text.to_string(),
        },
    }
}

fn delete_args(text: &str) -> &str {
    DELETE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("")
}
