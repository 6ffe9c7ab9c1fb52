use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for schedule-change requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for students.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for groups (the resource a request targets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

/// Identifier wrapper for courses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for StudentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Student record as exposed by the institutional directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
}

/// Read-only academic progress snapshot used by faculty validation and ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicStanding {
    pub student_id: StudentId,
    pub faculty: String,
    pub program: String,
    pub current_semester: u8,
    pub cumulative_gpa: f32,
}

/// Physical room backing a group; its capacity bounds enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: String,
    pub capacity: u32,
}

/// A group of a course, the unit students are reassigned between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub course_id: CourseId,
    pub course_name: String,
    pub faculty: String,
    /// Restricts the group to one program when set.
    pub program: Option<String>,
    pub classroom: Classroom,
}

impl Resource {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            resource_id: self.id.clone(),
            course_id: self.course_id.clone(),
            faculty: self.faculty.clone(),
        }
    }
}

/// Snapshot of a group captured on the request at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_id: ResourceId,
    pub course_id: CourseId,
    pub faculty: String,
}

/// Academic period with the window in which change requests are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicPeriod {
    pub id: String,
    pub name: String,
    pub change_window_start: DateTime<Utc>,
    pub change_window_end: DateTime<Utc>,
}

impl AcademicPeriod {
    /// Both window bounds are inclusive.
    pub fn accepts(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.change_window_start && instant <= self.change_window_end
    }
}

/// Inbound request from a student before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub student_id: StudentId,
    pub current_resource: ResourceId,
    pub requested_resource: ResourceId,
    pub reason: String,
}

/// Canonical request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::UnderReview => "UNDER_REVIEW",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    pub fn ordered() -> [RequestStatus; 5] {
        [
            RequestStatus::Pending,
            RequestStatus::UnderReview,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Role an actor holds when acting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Student,
    Reviewer,
    Administrator,
}

impl ActorRole {
    pub const fn label(self) -> &'static str {
        match self {
            ActorRole::Student => "STUDENT",
            ActorRole::Reviewer => "REVIEWER",
            ActorRole::Administrator => "ADMINISTRATOR",
        }
    }

    pub const fn can_review(self) -> bool {
        matches!(self, ActorRole::Reviewer | ActorRole::Administrator)
    }
}

/// Identity of whoever triggers a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn student(id: &StudentId) -> Self {
        Self {
            id: id.0.clone(),
            role: ActorRole::Student,
        }
    }

    pub fn reviewer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Reviewer,
        }
    }
}

/// Closed vocabulary of audit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewAction {
    #[serde(rename = "INFORMACION_ADICIONAL_SOLICITADA")]
    AdditionalInformationRequested,
    #[serde(rename = "SOLICITUD_APROBADA")]
    Approved,
    #[serde(rename = "SOLICITUD_RECHAZADA")]
    Rejected,
    #[serde(rename = "CASO_ESPECIAL_APROBADO")]
    SpecialCaseApproved,
    #[serde(rename = "SOLICITUD_CANCELADA")]
    Cancelled,
}

impl ReviewAction {
    pub const fn tag(self) -> &'static str {
        match self {
            ReviewAction::AdditionalInformationRequested => "INFORMACION_ADICIONAL_SOLICITADA",
            ReviewAction::Approved => "SOLICITUD_APROBADA",
            ReviewAction::Rejected => "SOLICITUD_RECHAZADA",
            ReviewAction::SpecialCaseApproved => "CASO_ESPECIAL_APROBADO",
            ReviewAction::Cancelled => "SOLICITUD_CANCELADA",
        }
    }
}

/// One immutable entry of a request's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStep {
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub action: ReviewAction,
    pub comments: String,
    pub recorded_at: DateTime<Utc>,
}

/// The request aggregate. Status, resolution date, and audit trail only change through
/// [`RequestLifecycle`](super::lifecycle::RequestLifecycle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleChangeRequest {
    id: RequestId,
    student_id: StudentId,
    current_resource: ResourceRef,
    requested_resource: ResourceRef,
    reason: String,
    status: RequestStatus,
    submitted_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    /// Oldest first.
    review_steps: Vec<ReviewStep>,
}

impl ScheduleChangeRequest {
    pub(crate) fn pending(
        id: RequestId,
        student_id: StudentId,
        current_resource: ResourceRef,
        requested_resource: ResourceRef,
        reason: String,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            current_resource,
            requested_resource,
            reason,
            status: RequestStatus::Pending,
            submitted_at,
            resolved_at: None,
            review_steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }

    pub fn current_resource(&self) -> &ResourceRef {
        &self.current_resource
    }

    pub fn requested_resource(&self) -> &ResourceRef {
        &self.requested_resource
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn review_steps(&self) -> &[ReviewStep] {
        &self.review_steps
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_step(&self) -> Option<&ReviewStep> {
        self.review_steps.last()
    }

    /// Hours between submission and resolution, when resolved.
    pub fn resolution_hours(&self) -> Option<f64> {
        self.resolved_at.map(|resolved| {
            let elapsed = resolved.signed_duration_since(self.submitted_at);
            elapsed.num_seconds().max(0) as f64 / 3600.0
        })
    }

    pub(crate) fn commit(&mut self, status: RequestStatus, step: ReviewStep) {
        self.resolved_at = if status.is_terminal() {
            Some(step.recorded_at)
        } else {
            None
        };
        self.status = status;
        self.review_steps.push(step);
    }

    pub fn status_view(&self) -> RequestStatusView {
        RequestStatusView {
            request_id: self.id.clone(),
            student_id: self.student_id.clone(),
            current_resource: self.current_resource.resource_id.clone(),
            requested_resource: self.requested_resource.resource_id.clone(),
            status: self.status.label(),
            submitted_at: self.submitted_at,
            resolved_at: self.resolved_at,
            last_action: self.last_step().map(|step| step.action.tag()),
            review_steps: self.review_steps.len(),
        }
    }
}

/// Sanitized representation of a request for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatusView {
    pub request_id: RequestId,
    pub student_id: StudentId,
    pub current_resource: ResourceId,
    pub requested_resource: ResourceId,
    pub status: &'static str,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<&'static str>,
    pub review_steps: usize,
}
