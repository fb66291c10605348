use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Scheduling,
    Information,
    TechnicalSupport,
    Escalation,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::Information => "information",
            Self::TechnicalSupport => "technical_support",
            Self::Escalation => "escalation",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Pattern,
    ExternalModel,
}

/// Post-disambiguation score per pattern category. Each score is the maximum
/// weight among matched rules, never a sum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub scheduling: f64,
    pub technical: f64,
    pub information: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreference {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportType {
    Sso,
    Api,
    Configuration,
    Connectivity,
    Unknown,
}

/// Intent-specific signals extracted alongside the category decision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub urgent: bool,
    pub time_preference: Option<TimePreference>,
    pub slot_selection: Option<u32>,
    pub support_type: Option<SupportType>,
    pub info_category: Option<String>,
}

/// Output of classification. Created once per message, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub scores: CategoryScores,
    pub method: ClassificationMethod,
    pub metadata: IntentMetadata,
}

impl IntentResult {
    /// Degraded default used whenever classification cannot commit to a
    /// category: empty input, all-low scores, or internal failure.
    pub fn default_information(confidence: f64) -> Self {
        Self {
            intent: Intent::Information,
            confidence,
            scores: CategoryScores::default(),
            method: ClassificationMethod::Pattern,
            metadata: IntentMetadata::default(),
        }
    }
}
