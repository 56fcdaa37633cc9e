use crate::utils::error::{PlannerError, Result};
use crate::utils::validation::{check_non_negative, check_not_blank};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Creation and modification timestamps, owned by the persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuditMetadata {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A project that can be selected with `required_capital` and pays back `profit`.
///
/// Identity is the `id`: two projects are equal when their identifiers are,
/// regardless of audit data or version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub required_capital: Decimal,
    pub profit: Decimal,
    pub audit: AuditMetadata,
    /// Optimistic-lock version; `None` until first persisted.
    pub version: Option<u64>,
}

impl Project {
    /// Builds an unsaved project with a fresh identifier.
    pub fn create_new(
        name: impl Into<String>,
        required_capital: Decimal,
        profit: Decimal,
    ) -> Result<Self> {
        let project = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            required_capital,
            profit,
            audit: AuditMetadata::empty(),
            version: None,
        };
        project.validate()?;
        Ok(project)
    }

    pub fn validate(&self) -> Result<()> {
        check_not_blank("Project name", &self.name)
            .and_then(|_| check_non_negative("Required capital", self.required_capital))
            .and_then(|_| check_non_negative("Profit", self.profit))
            .map_err(|message| PlannerError::InvalidProject { message })
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Project {}

impl std::hash::Hash for Project {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Input to one optimization run. Validated on construction and immutable after.
#[derive(Debug, Clone)]
pub struct OptimizationQuery {
    projects: Vec<Project>,
    max_selections: usize,
    initial_capital: Decimal,
}

impl OptimizationQuery {
    pub fn new(
        projects: Vec<Project>,
        max_selections: usize,
        initial_capital: Decimal,
    ) -> Result<Self> {
        check_non_negative("Initial capital", initial_capital)
            .map_err(|message| PlannerError::InvalidQuery { message })?;

        for (index, project) in projects.iter().enumerate() {
            project.validate().map_err(|e| PlannerError::InvalidQuery {
                message: format!("Available project #{} is invalid: {}", index, e),
            })?;
        }

        Ok(Self {
            projects,
            max_selections,
            initial_capital,
        })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn max_selections(&self) -> usize {
        self.max_selections
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }
}

/// Projects picked by one optimization run, in selection order.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub selected_projects: Vec<Project>,
    pub final_capital: Decimal,
}

impl OptimizationResult {
    pub fn selected_names(&self) -> Vec<&str> {
        self.selected_projects
            .iter()
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Wire payload asking for an optimization against the catalog as it is at
/// consumption time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequestEvent {
    pub max_selections: i64,
    /// Read and written as a JSON number without passing through `f64`.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub initial_capital: Decimal,
}

impl OptimizationRequestEvent {
    pub fn new(max_selections: i64, initial_capital: Decimal) -> Result<Self> {
        let event = Self {
            max_selections,
            initial_capital,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_selections <= 0 {
            return Err(PlannerError::InvalidEvent {
                message: format!(
                    "maxSelections must be positive, got {}",
                    self.max_selections
                ),
            });
        }
        check_non_negative("initialCapital", self.initial_capital)
            .map_err(|message| PlannerError::InvalidEvent { message })
    }

    /// Deserializes and validates a broker payload.
    pub fn from_json(payload: &str) -> Result<Self> {
        if payload.trim().is_empty() {
            return Err(PlannerError::InvalidEvent {
                message: "JSON event should not be empty".to_string(),
            });
        }
        let event: Self =
            serde_json::from_str(payload).map_err(|e| PlannerError::InvalidEvent {
                message: format!("Invalid JSON format: {}", e),
            })?;
        event.validate()?;
        Ok(event)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A message as handed to or received from a broker topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub headers: HashMap<String, String>,
    pub payload: String,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            headers: HashMap::new(),
            payload: payload.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_new_project_has_fresh_identity() {
        let a = Project::create_new("Alpha", dec!(10), dec!(5)).unwrap();
        let b = Project::create_new("Alpha", dec!(10), dec!(5)).unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a, b);
        assert_eq!(a.version, None);
        assert_eq!(a.audit, AuditMetadata::empty());
    }

    #[test]
    fn test_project_equality_uses_identifier_only() {
        let a = Project::create_new("Alpha", dec!(10), dec!(5)).unwrap();
        let mut renamed = a.clone();
        renamed.name = "Beta".to_string();
        renamed.version = Some(3);
        assert_eq!(a, renamed);
    }

    #[test]
    fn test_create_new_rejects_invalid_fields() {
        assert!(matches!(
            Project::create_new("  ", dec!(1), dec!(1)),
            Err(PlannerError::InvalidProject { .. })
        ));
        assert!(Project::create_new("Alpha", dec!(-1), dec!(1)).is_err());
        assert!(Project::create_new("Alpha", dec!(1), dec!(-0.5)).is_err());
    }

    #[test]
    fn test_query_rejects_negative_capital_and_invalid_projects() {
        assert!(matches!(
            OptimizationQuery::new(vec![], 1, dec!(-1)),
            Err(PlannerError::InvalidQuery { .. })
        ));

        let mut broken = Project::create_new("Alpha", dec!(1), dec!(1)).unwrap();
        broken.profit = dec!(-3);
        assert!(matches!(
            OptimizationQuery::new(vec![broken], 1, dec!(0)),
            Err(PlannerError::InvalidQuery { .. })
        ));

        let query = OptimizationQuery::new(vec![], 0, dec!(0)).unwrap();
        assert!(query.projects().is_empty());
        assert_eq!(query.max_selections(), 0);
    }

    #[test]
    fn test_event_validation() {
        assert!(OptimizationRequestEvent::new(1, dec!(0)).is_ok());
        assert!(matches!(
            OptimizationRequestEvent::new(0, dec!(10)),
            Err(PlannerError::InvalidEvent { .. })
        ));
        assert!(OptimizationRequestEvent::new(2, dec!(-10)).is_err());
    }

    #[test]
    fn test_event_from_json() {
        let event =
            OptimizationRequestEvent::from_json(r#"{"maxSelections":2,"initialCapital":100.25}"#)
                .unwrap();
        assert_eq!(event.max_selections, 2);
        assert_eq!(event.initial_capital, dec!(100.25));

        let event =
            OptimizationRequestEvent::from_json(r#"{"maxSelections":3,"initialCapital":"7.5"}"#)
                .unwrap();
        assert_eq!(event.initial_capital, dec!(7.5));

        assert!(OptimizationRequestEvent::from_json("").is_err());
        assert!(OptimizationRequestEvent::from_json("{not json").is_err());
        assert!(OptimizationRequestEvent::from_json(r#"{"maxSelections":-1,"initialCapital":1}"#)
            .is_err());
        assert!(OptimizationRequestEvent::from_json(r#"{"initialCapital":1}"#).is_err());
    }

    #[test]
    fn test_event_json_uses_camel_case_numbers() {
        let event = OptimizationRequestEvent::new(4, dec!(12.5)).unwrap();
        let json = event.to_json().unwrap();
        assert_eq!(json, r#"{"maxSelections":4,"initialCapital":12.5}"#);
        assert_eq!(OptimizationRequestEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_event_capital_keeps_every_digit() {
        let large = OptimizationRequestEvent::from_json(
            r#"{"maxSelections":1,"initialCapital":12345678901234567.89}"#,
        )
        .unwrap();
        assert_eq!(large.initial_capital, dec!(12345678901234567.89));

        let fine = OptimizationRequestEvent::from_json(
            r#"{"maxSelections":1,"initialCapital":0.1234567890123456789}"#,
        )
        .unwrap();
        assert_eq!(fine.initial_capital, dec!(0.1234567890123456789));
        assert_eq!(
            fine.to_json().unwrap(),
            r#"{"maxSelections":1,"initialCapital":0.1234567890123456789}"#
        );

        let scaled = OptimizationRequestEvent::new(2, dec!(100.00)).unwrap();
        assert_eq!(
            scaled.to_json().unwrap(),
            r#"{"maxSelections":2,"initialCapital":100.00}"#
        );
    }

    #[test]
    fn test_broker_message_headers() {
        let message = BrokerMessage::new("topic", "{}").with_header("PARTITION_KEY", "7");
        assert_eq!(message.header("PARTITION_KEY"), Some("7"));
        assert_eq!(message.header("missing"), None);
    }
}
