//! Admission rules for new schedule-change requests.
//!
//! Validators run in a fixed order through [`ValidationChain::evaluate`]; the first failure
//! wins and later validators are never consulted. The standard order is faculty, calendar,
//! then capacity.

mod rules;

pub use rules::{CalendarValidator, CapacityValidator, FacultyValidator};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::capacity::{CapacityError, CapacityTracker};
use super::domain::{AcademicPeriod, AcademicStanding, RequestDraft, Resource, ResourceId};
use super::repository::{RepositoryError, ResourceDirectory};

/// Everything a validator may read. Assembled once per creation attempt.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub draft: &'a RequestDraft,
    pub standing: &'a AcademicStanding,
    pub current: &'a Resource,
    pub requested: &'a Resource,
    pub period: Option<&'a AcademicPeriod>,
    pub submitted_at: DateTime<Utc>,
}

/// One admission rule.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, input: &ValidationInput<'_>) -> Result<ValidationOutcome, ValidationError>;
}

/// A validator could not reach a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CapacityError> for ValidationError {
    fn from(value: CapacityError) -> Self {
        match value {
            CapacityError::UnknownResource(id) => Self::UnknownResource(id),
            CapacityError::Repository(err) => Self::Repository(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Pass,
    Fail(ValidationFailure),
}

impl ValidationOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationOutcome::Pass)
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            ValidationOutcome::Fail(failure) => Some(failure),
            ValidationOutcome::Pass => None,
        }
    }
}

/// Human-readable rejection reasons. Every variant is recoverable by resubmitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationFailure {
    #[error("faculty mismatch: group belongs to {resource_faculty}, student is enrolled in {student_faculty}")]
    FacultyMismatch {
        student_faculty: String,
        resource_faculty: String,
    },
    #[error("faculty mismatch: group is reserved for program {resource_program}, student is in {student_program}")]
    ProgramMismatch {
        student_program: String,
        resource_program: String,
    },
    #[error("outside allowed calendar window: no academic period is accepting changes")]
    NoActivePeriod,
    #[error("outside allowed calendar window for {period} ({window_start} to {window_end})")]
    OutsideChangeWindow {
        period: String,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    #[error("no available seats in group {resource_id} ({enrolled}/{capacity})")]
    NoAvailableSeats {
        resource_id: ResourceId,
        enrolled: u32,
        capacity: u32,
    },
    #[error("a reason for the change is required")]
    MissingReason,
    #[error("requested group matches the current group")]
    SameResource,
    #[error("an open request for group {resource_id} already exists")]
    DuplicateRequest { resource_id: ResourceId },
}

/// Ordered validators evaluated by a single driver loop.
#[derive(Default)]
pub struct ValidationChain {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faculty, calendar, capacity.
    pub fn standard<D>(tracker: CapacityTracker<D>) -> Self
    where
        D: ResourceDirectory + 'static,
    {
        Self::new()
            .with(FacultyValidator)
            .with(CalendarValidator)
            .with(CapacityValidator::new(tracker))
    }

    pub fn with<V>(mut self, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|validator| validator.name()).collect()
    }

    /// An empty chain passes.
    pub fn evaluate(
        &self,
        input: &ValidationInput<'_>,
    ) -> Result<ValidationOutcome, ValidationError> {
        for validator in &self.validators {
            let outcome = validator.evaluate(input)?;
            if let ValidationOutcome::Fail(failure) = outcome {
                debug!(
                    validator = validator.name(),
                    student = %input.draft.student_id,
                    reason = %failure,
                    "schedule change draft rejected"
                );
                return Ok(ValidationOutcome::Fail(failure));
            }
        }
        Ok(ValidationOutcome::Pass)
    }
}
