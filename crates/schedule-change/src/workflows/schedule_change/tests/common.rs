use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::schedule_change::domain::{
    AcademicPeriod, AcademicStanding, Classroom, CourseId, RequestDraft, RequestId, RequestStatus,
    Resource, ResourceId, ScheduleChangeRequest, Student, StudentId,
};
use crate::workflows::schedule_change::notifications::{
    ListenerError, StatusChangeEvent, StatusListener,
};
use crate::workflows::schedule_change::repository::{
    AcademicCalendar, AlertError, AlertPublisher, Clock, RepositoryError, RequestRepository,
    ResourceDirectory, ReviewAlert, StudentDirectory,
};
use crate::workflows::schedule_change::{ChangePolicy, ScheduleChangeService};

pub(super) const ENGINEERING: &str = "Engineering";
pub(super) const SYSTEMS: &str = "Systems";

/// Calculus group one seat short of full.
pub(super) const TARGET: &str = "G-CALC-01";
/// Where the seeded students currently sit.
pub(super) const CURRENT: &str = "G-CALC-02";
pub(super) const OPEN: &str = "G-CALC-03";
pub(super) const FULL: &str = "G-CALC-04";
pub(super) const PHYSICS: &str = "G-PHYS-01";
pub(super) const SYSTEMS_ONLY: &str = "G-PROG-01";
pub(super) const MEDICINE: &str = "G-ANAT-01";

pub(super) fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, hour, minute, 0)
        .single()
        .expect("valid instant")
}

pub(super) fn period() -> AcademicPeriod {
    AcademicPeriod {
        id: "2025-1".to_string(),
        name: "Spring 2025".to_string(),
        change_window_start: at(6, 0, 0),
        change_window_end: at(31, 23, 59),
    }
}

pub(super) fn rid(id: &str) -> ResourceId {
    ResourceId(id.to_string())
}

pub(super) fn sid(id: &str) -> StudentId {
    StudentId(id.to_string())
}

pub(super) fn group(
    id: &str,
    course: &str,
    faculty: &str,
    program: Option<&str>,
    capacity: u32,
) -> Resource {
    Resource {
        id: rid(id),
        course_id: CourseId(course.to_string()),
        course_name: format!("{course} lecture"),
        faculty: faculty.to_string(),
        program: program.map(str::to_string),
        classroom: Classroom {
            id: format!("room-{id}"),
            capacity,
        },
    }
}

pub(super) fn standing(student: &str, gpa: f32, semester: u8) -> AcademicStanding {
    AcademicStanding {
        student_id: sid(student),
        faculty: ENGINEERING.to_string(),
        program: SYSTEMS.to_string(),
        current_semester: semester,
        cumulative_gpa: gpa,
    }
}

pub(super) fn draft(student: &str, from: &str, to: &str) -> RequestDraft {
    RequestDraft {
        student_id: sid(student),
        current_resource: rid(from),
        requested_resource: rid(to),
        reason: "Work shift overlaps the current group".to_string(),
    }
}

/// A PENDING request built without the service, for ranking and statistics tests.
pub(super) fn pending_request(
    id: &str,
    student: &str,
    target: &Resource,
    submitted_at: DateTime<Utc>,
) -> ScheduleChangeRequest {
    let current = group(CURRENT, "CALC-1", ENGINEERING, None, 30);
    ScheduleChangeRequest::pending(
        RequestId(id.to_string()),
        sid(student),
        current.reference(),
        target.reference(),
        "Work shift overlaps the current group".to_string(),
        submitted_at,
    )
}

/// Clock tests can move by hand.
pub(super) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(super) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }

    pub(super) fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

#[derive(Default)]
pub(super) struct MemoryRequests {
    records: Mutex<HashMap<RequestId, ScheduleChangeRequest>>,
    failing_saves: AtomicBool,
}

impl MemoryRequests {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }

    pub(super) fn fail_saves(&self, failing: bool) {
        self.failing_saves.store(failing, Ordering::SeqCst);
    }

    pub(super) fn stored(&self, id: &RequestId) -> ScheduleChangeRequest {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
            .expect("request stored")
    }

    fn matching<F>(&self, predicate: F) -> Vec<ScheduleChangeRequest>
    where
        F: Fn(&ScheduleChangeRequest) -> bool,
    {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .filter(|request| predicate(request))
            .cloned()
            .collect()
    }
}

impl RequestRepository for MemoryRequests {
    fn find_by_id(&self, id: &RequestId) -> Result<Option<ScheduleChangeRequest>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Ok(self.matching(|request| request.student_id() == student_id))
    }

    fn find_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Ok(self.matching(|request| request.status() == status))
    }

    fn find_by_requested_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Ok(self.matching(|request| &request.requested_resource().resource_id == resource_id))
    }

    fn count_pending_by_student(&self, student_id: &StudentId) -> Result<usize, RepositoryError> {
        Ok(self
            .matching(|request| {
                request.student_id() == student_id && request.status() == RequestStatus::Pending
            })
            .len())
    }

    fn insert(
        &self,
        request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError> {
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(request.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id().clone(), request.clone());
        Ok(request)
    }

    fn save(
        &self,
        request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError> {
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(request.id().clone(), request.clone());
        Ok(request)
    }

    fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

/// Every call fails; drives the 500 paths.
pub(super) struct UnavailableRequests;

impl RequestRepository for UnavailableRequests {
    fn find_by_id(&self, _id: &RequestId) -> Result<Option<ScheduleChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_student(
        &self,
        _student_id: &StudentId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_status(
        &self,
        _status: RequestStatus,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_requested_resource(
        &self,
        _resource_id: &ResourceId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn count_pending_by_student(&self, _student_id: &StudentId) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert(
        &self,
        _request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(
        &self,
        _request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &RequestId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    students: Mutex<HashMap<StudentId, (Student, AcademicStanding)>>,
    resources: Mutex<HashMap<ResourceId, Resource>>,
    enrollment: Mutex<HashMap<ResourceId, u32>>,
    period: Mutex<Option<AcademicPeriod>>,
    capacity_reads: Mutex<usize>,
}

impl MemoryDirectory {
    pub(super) fn add_student(&self, standing: AcademicStanding) {
        let student = Student {
            id: standing.student_id.clone(),
            name: format!("Student {}", standing.student_id),
            email: format!("{}@campus.example.edu", standing.student_id.0.to_lowercase()),
        };
        self.students
            .lock()
            .expect("directory mutex poisoned")
            .insert(standing.student_id.clone(), (student, standing));
    }

    pub(super) fn add_group(&self, resource: Resource, enrolled: u32) {
        self.enrollment
            .lock()
            .expect("directory mutex poisoned")
            .insert(resource.id.clone(), enrolled);
        self.resources
            .lock()
            .expect("directory mutex poisoned")
            .insert(resource.id.clone(), resource);
    }

    pub(super) fn set_period(&self, period: Option<AcademicPeriod>) {
        *self.period.lock().expect("directory mutex poisoned") = period;
    }

    pub(super) fn set_enrolled(&self, id: &str, enrolled: u32) {
        self.enrollment
            .lock()
            .expect("directory mutex poisoned")
            .insert(rid(id), enrolled);
    }

    pub(super) fn enrolled(&self, id: &str) -> u32 {
        self.enrollment
            .lock()
            .expect("directory mutex poisoned")
            .get(&rid(id))
            .copied()
            .unwrap_or_default()
    }

    /// How often enrollment was read; zero means capacity was never consulted.
    pub(super) fn capacity_reads(&self) -> usize {
        *self.capacity_reads.lock().expect("directory mutex poisoned")
    }
}

impl StudentDirectory for MemoryDirectory {
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        let guard = self.students.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).map(|(student, _)| student.clone()))
    }

    fn academic_standing(
        &self,
        id: &StudentId,
    ) -> Result<Option<AcademicStanding>, RepositoryError> {
        let guard = self.students.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).map(|(_, standing)| standing.clone()))
    }

    fn standings_for_program(
        &self,
        faculty: &str,
        program: &str,
    ) -> Result<Vec<AcademicStanding>, RepositoryError> {
        let guard = self.students.lock().expect("directory mutex poisoned");
        Ok(guard
            .values()
            .map(|(_, standing)| standing)
            .filter(|standing| standing.faculty == faculty && standing.program == program)
            .cloned()
            .collect())
    }
}

impl ResourceDirectory for MemoryDirectory {
    fn fetch_resource(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError> {
        let guard = self.resources.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn resources_for_course(&self, course_id: &CourseId) -> Result<Vec<Resource>, RepositoryError> {
        let guard = self.resources.lock().expect("directory mutex poisoned");
        Ok(guard
            .values()
            .filter(|resource| &resource.course_id == course_id)
            .cloned()
            .collect())
    }

    fn enrolled_count(&self, id: &ResourceId) -> Result<u32, RepositoryError> {
        *self.capacity_reads.lock().expect("directory mutex poisoned") += 1;
        let guard = self.enrollment.lock().expect("directory mutex poisoned");
        guard.get(id).copied().ok_or(RepositoryError::NotFound)
    }

    fn apply_reassignment(
        &self,
        _student_id: &StudentId,
        from: &ResourceId,
        to: &ResourceId,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.enrollment.lock().expect("directory mutex poisoned");
        if let Some(count) = guard.get_mut(from) {
            *count = count.saturating_sub(1);
        }
        *guard.entry(to.clone()).or_default() += 1;
        Ok(())
    }
}

impl AcademicCalendar for MemoryDirectory {
    fn active_period(&self) -> Result<Option<AcademicPeriod>, RepositoryError> {
        Ok(self.period.lock().expect("directory mutex poisoned").clone())
    }
}

/// Directory seeded with three Systems students and a handful of Engineering groups.
pub(super) fn seeded_directory() -> MemoryDirectory {
    let directory = MemoryDirectory::default();
    directory.add_student(standing("S1", 4.2, 5));
    directory.add_student(standing("S2", 3.0, 2));
    directory.add_student(standing("S3", 3.6, 7));

    directory.add_group(group(TARGET, "CALC-1", ENGINEERING, None, 30), 29);
    directory.add_group(group(CURRENT, "CALC-1", ENGINEERING, None, 30), 24);
    directory.add_group(group(OPEN, "CALC-1", ENGINEERING, None, 30), 10);
    directory.add_group(group(FULL, "CALC-1", ENGINEERING, None, 20), 20);
    directory.add_group(group(PHYSICS, "PHYS-1", ENGINEERING, None, 40), 12);
    directory.add_group(
        group(SYSTEMS_ONLY, "PROG-1", ENGINEERING, Some("Mechatronics"), 25),
        3,
    );
    directory.add_group(group(MEDICINE, "ANAT-1", "Medicine", None, 30), 0);
    directory.set_period(Some(period()));
    directory
}

pub(super) struct Campus {
    pub(super) service: ScheduleChangeService<MemoryRequests, MemoryDirectory>,
    pub(super) requests: Arc<MemoryRequests>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn campus() -> Campus {
    campus_with_policy(ChangePolicy::default())
}

pub(super) fn campus_with_policy(policy: ChangePolicy) -> Campus {
    let requests = Arc::new(MemoryRequests::default());
    let directory = Arc::new(seeded_directory());
    let clock = Arc::new(ManualClock::starting_at(at(15, 9, 0)));
    let service = ScheduleChangeService::new(requests.clone(), directory.clone(), policy)
        .with_clock(clock.clone());
    Campus {
        service,
        requests,
        directory,
        clock,
    }
}

#[derive(Default)]
pub(super) struct RecordingListener {
    events: Mutex<Vec<StatusChangeEvent>>,
}

impl RecordingListener {
    pub(super) fn events(&self) -> Vec<StatusChangeEvent> {
        self.events.lock().expect("listener mutex poisoned").clone()
    }
}

impl StatusListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_status_change(&self, event: &StatusChangeEvent) -> Result<(), ListenerError> {
        self.events
            .lock()
            .expect("listener mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) struct FailingListener;

impl StatusListener for FailingListener {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_status_change(&self, _event: &StatusChangeEvent) -> Result<(), ListenerError> {
        Err(ListenerError("smtp relay refused connection".to_string()))
    }
}

pub(super) struct PanickingListener;

impl StatusListener for PanickingListener {
    fn name(&self) -> &str {
        "panicking"
    }

    fn on_status_change(&self, _event: &StatusChangeEvent) -> Result<(), ListenerError> {
        panic!("dashboard widget exploded");
    }
}

#[derive(Default)]
pub(super) struct MemoryAlerts {
    alerts: Mutex<Vec<ReviewAlert>>,
}

impl MemoryAlerts {
    pub(super) fn alerts(&self) -> Vec<ReviewAlert> {
        self.alerts.lock().expect("alert mutex poisoned").clone()
    }
}

impl AlertPublisher for MemoryAlerts {
    fn publish(&self, alert: ReviewAlert) -> Result<(), AlertError> {
        self.alerts.lock().expect("alert mutex poisoned").push(alert);
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
