use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AcademicPeriod, AcademicStanding, CourseId, RequestId, RequestStatus, Resource, ResourceId,
    ScheduleChangeRequest, Student, StudentId,
};

/// Request store. Implementations own persistence; the engine never caches what they return.
pub trait RequestRepository: Send + Sync {
    fn find_by_id(&self, id: &RequestId) -> Result<Option<ScheduleChangeRequest>, RepositoryError>;
    fn find_by_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError>;
    fn find_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError>;
    fn find_by_requested_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError>;
    fn count_pending_by_student(&self, student_id: &StudentId) -> Result<usize, RepositoryError>;
    /// Store a new request. An existing id fails with [`RepositoryError::Conflict`] and leaves
    /// the stored record untouched.
    fn insert(
        &self,
        request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError>;
    /// Insert or replace by id.
    fn save(&self, request: ScheduleChangeRequest)
        -> Result<ScheduleChangeRequest, RepositoryError>;
    fn delete(&self, id: &RequestId) -> Result<(), RepositoryError>;
}

/// Student and academic-progress lookups.
pub trait StudentDirectory: Send + Sync {
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    fn academic_standing(
        &self,
        id: &StudentId,
    ) -> Result<Option<AcademicStanding>, RepositoryError>;
    fn standings_for_program(
        &self,
        faculty: &str,
        program: &str,
    ) -> Result<Vec<AcademicStanding>, RepositoryError>;
}

/// Group, course, and enrollment lookups. Enrollment is owned by the directory.
pub trait ResourceDirectory: Send + Sync {
    fn fetch_resource(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError>;
    fn resources_for_course(&self, course_id: &CourseId) -> Result<Vec<Resource>, RepositoryError>;
    fn enrolled_count(&self, id: &ResourceId) -> Result<u32, RepositoryError>;
    /// Move a student between groups once their request is approved.
    fn apply_reassignment(
        &self,
        student_id: &StudentId,
        from: &ResourceId,
        to: &ResourceId,
    ) -> Result<(), RepositoryError>;
}

/// Source of the active academic period.
pub trait AcademicCalendar: Send + Sync {
    fn active_period(&self) -> Result<Option<AcademicPeriod>, RepositoryError>;
}

/// Everything the engine reads about the institution, usually one adapter.
pub trait InstitutionDirectory: StudentDirectory + ResourceDirectory + AcademicCalendar {}

impl<T> InstitutionDirectory for T where T: StudentDirectory + ResourceDirectory + AcademicCalendar {}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Time source so ranking and windows never read the wall clock directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Outbound alert hook (e-mail or student-portal adapters).
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: ReviewAlert) -> Result<(), AlertError>;
}

/// Alert payload produced from a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewAlert {
    pub template: String,
    pub request_id: RequestId,
    pub recipient: StudentId,
    pub details: BTreeMap<String, String>,
}

/// Alert dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}
