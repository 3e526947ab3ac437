use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Curriculum subject. Closed set; every subject-dependent branch matches
/// exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Subject {
    Math,
    English,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Math => "MATH",
            Self::English => "ENGLISH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MATH" => Some(Self::Math),
            "ENGLISH" | "ELA" => Some(Self::English),
            _ => None,
        }
    }
}

/// Discrete mastery level, always derived from the belief probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MasteryLevel {
    Novice,
    Developing,
    Proficient,
    Advanced,
    Mastered,
}

impl MasteryLevel {
    pub fn from_probability(p: f64) -> Self {
        if p < 0.40 {
            Self::Novice
        } else if p < 0.60 {
            Self::Developing
        } else if p < 0.80 {
            Self::Proficient
        } else if p < 0.95 {
            Self::Advanced
        } else {
            Self::Mastered
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "NOVICE",
            Self::Developing => "DEVELOPING",
            Self::Proficient => "PROFICIENT",
            Self::Advanced => "ADVANCED",
            Self::Mastered => "MASTERED",
        }
    }
}

/// Per (learner, concept) mastery belief. Mutated only through
/// [`crate::mastery::update`]; callers persist the returned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryBelief {
    pub probability: f64,
    pub practice_count: i32,
    pub correct_count: i32,
    pub level: MasteryLevel,
    pub last_updated_at: DateTime<Utc>,
}

impl MasteryBelief {
    /// A fresh belief before any evidence, at the configured initial prior.
    pub fn new(p_init: f64, now: DateTime<Utc>) -> Self {
        Self {
            probability: p_init,
            practice_count: 0,
            correct_count: 0,
            level: MasteryLevel::from_probability(p_init),
            last_updated_at: now,
        }
    }
}

/// A node in the prerequisite graph. Owned by the curriculum collaborator;
/// the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub code: String,
    pub title: String,
    pub subject: Subject,
    pub difficulty: f64,
    pub grade_band: f64,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// Structured question from the content-generation collaborator. The engine
/// inspects only `correct_option_id`; text is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: String,
    pub explanation: String,
}

/// Opaque emotional-state tag from the emotion collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmotionalState {
    Engaged,
    Neutral,
    Frustrated,
    Bored,
    Anxious,
}

impl EmotionalState {
    /// States that, sustained, should interrupt practice.
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Frustrated | Self::Bored)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalSignal {
    pub state: EmotionalState,
    pub confidence: f64,
}

/// Coarse priority of pending reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    None,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(MasteryLevel::from_probability(0.0), MasteryLevel::Novice);
        assert_eq!(MasteryLevel::from_probability(0.3999), MasteryLevel::Novice);
        assert_eq!(MasteryLevel::from_probability(0.40), MasteryLevel::Developing);
        assert_eq!(MasteryLevel::from_probability(0.5999), MasteryLevel::Developing);
        assert_eq!(MasteryLevel::from_probability(0.60), MasteryLevel::Proficient);
        assert_eq!(MasteryLevel::from_probability(0.7999), MasteryLevel::Proficient);
        assert_eq!(MasteryLevel::from_probability(0.80), MasteryLevel::Advanced);
        assert_eq!(MasteryLevel::from_probability(0.9499), MasteryLevel::Advanced);
        assert_eq!(MasteryLevel::from_probability(0.95), MasteryLevel::Mastered);
        assert_eq!(MasteryLevel::from_probability(1.0), MasteryLevel::Mastered);
    }

    #[test]
    fn test_subject_parse() {
        assert_eq!(Subject::parse("math"), Some(Subject::Math));
        assert_eq!(Subject::parse("ELA"), Some(Subject::English));
        assert_eq!(Subject::parse("science"), None);
    }

    #[test]
    fn test_wire_format() {
        let belief = MasteryBelief::new(0.30, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        let json = serde_json::to_value(&belief).unwrap();
        assert_eq!(json["probability"], 0.30);
        assert_eq!(json["practiceCount"], 0);
        assert_eq!(json["level"], "NOVICE");

        let subject = serde_json::to_string(&Subject::English).unwrap();
        assert_eq!(subject, "\"ENGLISH\"");
    }

    #[test]
    fn test_negative_emotions() {
        assert!(EmotionalState::Frustrated.is_negative());
        assert!(EmotionalState::Bored.is_negative());
        assert!(!EmotionalState::Engaged.is_negative());
        assert!(!EmotionalState::Anxious.is_negative());
    }
}
