use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single turn in a conversation session.
///
/// Role alternation is not required and duplicates are permitted; the
/// session window is a plain ordered list of whatever was appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Request mode selected by the caller.
///
/// `Structured` routes the whole request through the text-to-SQL path;
/// `Thinking` enables the longer, citation-annotated generation profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Conversational,
    Thinking,
    Structured,
}

impl Mode {
    /// Parse from a string slug.  Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversational" => Some(Mode::Conversational),
            "thinking" => Some(Mode::Thinking),
            "structured" => Some(Mode::Structured),
            _ => None,
        }
    }
}

/// Domain classification outcome for one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainClass {
    InDomain,
    OutOfDomain,
    SmallTalk,
}

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub class: DomainClass,
    pub reason: Option<String>,
}

impl ClassificationResult {
    pub fn new(class: DomainClass) -> Self {
        Self {
            class,
            reason: None,
        }
    }

    pub fn with_reason(class: DomainClass, reason: impl Into<String>) -> Self {
        Self {
            class,
            reason: Some(reason.into()),
        }
    }
}

/// What the current utterance does with the conversation so far.
///
/// `MetaOp` means the query operates on the last assistant answer
/// (summarize / translate / reformat) rather than introducing a new data need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAction {
    TopicSwitch,
    DataRequest,
    MetaOp,
    Continuation,
}

/// Decision about how much prior history to carry into this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextDecision {
    pub action: ContextAction,
    /// How many trailing history messages to include, clamped to the
    /// session window by the producer.
    pub messages_to_include: usize,
}

impl ContextDecision {
    pub fn topic_switch() -> Self {
        Self {
            action: ContextAction::TopicSwitch,
            messages_to_include: 0,
        }
    }

    pub fn meta_op() -> Self {
        Self {
            action: ContextAction::MetaOp,
            messages_to_include: 1,
        }
    }

    /// A zero-message decision forces standalone handling downstream,
    /// whatever the intent classifier said.
    pub fn is_standalone(&self) -> bool {
        self.messages_to_include == 0
    }
}

/// Does the query rely on prior turns to be understood?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentResult {
    Standalone,
    ContextDependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityQueryType {
    Single,
    Multi,
    None,
}

/// First-class entities detected in the query (e.g. customer names for
/// chat-log sources). Empty for non-entity sources.
#[derive(Debug, Clone)]
pub struct EntitySet {
    pub entities: Vec<String>,
    pub query_type: EntityQueryType,
}

impl EntitySet {
    pub fn empty() -> Self {
        Self {
            entities: Vec::new(),
            query_type: EntityQueryType::None,
        }
    }

    /// Tag the set from its cardinality.
    pub fn from_entities(entities: Vec<String>) -> Self {
        let query_type = match entities.len() {
            0 => EntityQueryType::None,
            1 => EntityQueryType::Single,
            _ => EntityQueryType::Multi,
        };
        Self {
            entities,
            query_type,
        }
    }

    pub fn single(&self) -> Option<&str> {
        if self.query_type == EntityQueryType::Single {
            self.entities.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// A user-imposed output-format directive, captured verbatim
/// (e.g. "in 200 words", "as a bulleted list"). `None` when absent.
pub type FormatDirective = Option<String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(Mode::parse("Structured"), Some(Mode::Structured));
        assert_eq!(Mode::parse("THINKING"), Some(Mode::Thinking));
        assert_eq!(Mode::parse("chat"), None);
    }

    #[test]
    fn entity_set_tags_by_cardinality() {
        let single = EntitySet::from_entities(vec!["Ali Raza".into()]);
        assert_eq!(single.query_type, EntityQueryType::Single);
        assert_eq!(single.single(), Some("Ali Raza"));

        let multi = EntitySet::from_entities(vec!["Ali".into(), "Sara".into()]);
        assert_eq!(multi.query_type, EntityQueryType::Multi);
        assert!(multi.single().is_none());

        assert_eq!(EntitySet::empty().query_type, EntityQueryType::None);
    }

    #[test]
    fn zero_message_decision_is_standalone() {
        assert!(ContextDecision::topic_switch().is_standalone());
        assert!(!ContextDecision::meta_op().is_standalone());
    }
}
