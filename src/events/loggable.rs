use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an activity record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Kept indefinitely (deletions, role changes)
    Critical,
    #[default]
    Important,
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Entities that can be published as activity.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. "member" in "member.updated"
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" => Severity::Critical,
            "login" => Severity::Noise,
            "created" | "updated" | "registered" => self.severity(),
            _ => Severity::Important,
        }
    }
}
