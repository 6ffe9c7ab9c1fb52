use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use schedule_change::error::AppError;
use schedule_change::workflows::roster::{Roster, RosterImportError, RosterImporter};
use schedule_change::workflows::schedule_change::{
    AcademicCalendar, AcademicPeriod, AcademicStanding, AlertError, AlertListener,
    AlertPublisher, ChangePolicy, CourseId, ListenerError, RepositoryError, RequestId,
    RequestRepository, RequestStatus, Resource, ResourceDirectory, ResourceId, ReviewAlert,
    ScheduleChangeRequest, ScheduleChangeService, StatusChangeEvent, StatusListener, Student,
    StudentDirectory, StudentId,
};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::info;

use crate::cli::RosterArgs;

pub(crate) type AppService = ScheduleChangeService<InMemoryRequestRepository, InMemoryDirectory>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const SAMPLE_STUDENTS: &str = "\
student_id,name,email,faculty,program,semester,gpa,current_group
S1,Ana Ruiz,ana.ruiz@campus.example.edu,Engineering,Systems,5,4.2,G-CALC-02
S2,Luis Mora,luis.mora@campus.example.edu,Engineering,Systems,2,3.0,G-CALC-02
S3,Marta Gil,marta.gil@campus.example.edu,Engineering,Systems,7,3.6,G-CALC-02
";

pub(crate) const SAMPLE_GROUPS: &str = "\
group_id,course_id,course_name,faculty,program,classroom_id,capacity,enrolled
G-CALC-01,CALC-1,Calculus I,Engineering,,A-101,30,29
G-CALC-02,CALC-1,Calculus I,Engineering,,A-102,30,24
G-CALC-03,CALC-1,Calculus I,Engineering,,A-103,30,10
G-ANAT-01,ANAT-1,Human Anatomy,Medicine,,M-201,30,12
";

#[derive(Default)]
pub(crate) struct InMemoryRequestRepository {
    records: RwLock<HashMap<RequestId, ScheduleChangeRequest>>,
}

impl InMemoryRequestRepository {
    fn matching<F>(&self, predicate: F) -> Result<Vec<ScheduleChangeRequest>, RepositoryError>
    where
        F: Fn(&ScheduleChangeRequest) -> bool,
    {
        let guard = self.records.read().map_err(|_| poisoned("request store"))?;
        Ok(guard
            .values()
            .filter(|request| predicate(request))
            .cloned()
            .collect())
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn find_by_id(&self, id: &RequestId) -> Result<Option<ScheduleChangeRequest>, RepositoryError> {
        let guard = self.records.read().map_err(|_| poisoned("request store"))?;
        Ok(guard.get(id).cloned())
    }

    fn find_by_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        self.matching(|request| request.student_id() == student_id)
    }

    fn find_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        self.matching(|request| request.status() == status)
    }

    fn find_by_requested_resource(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<ScheduleChangeRequest>, RepositoryError> {
        self.matching(|request| &request.requested_resource().resource_id == resource_id)
    }

    fn count_pending_by_student(&self, student_id: &StudentId) -> Result<usize, RepositoryError> {
        let guard = self.records.read().map_err(|_| poisoned("request store"))?;
        Ok(guard
            .values()
            .filter(|request| {
                request.student_id() == student_id && request.status() == RequestStatus::Pending
            })
            .count())
    }

    fn insert(
        &self,
        request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, RepositoryError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| poisoned("request store"))?;
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
        let mut guard = self
            .records
            .write()
            .map_err(|_| poisoned("request store"))?;
        guard.insert(request.id().clone(), request.clone());
        Ok(request)
    }

    fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut guard = self
            .records
            .write()
            .map_err(|_| poisoned("request store"))?;
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

/// Students, groups, enrollment, and the change window, seeded from a roster import.
pub(crate) struct InMemoryDirectory {
    students: HashMap<StudentId, (Student, AcademicStanding)>,
    resources: HashMap<ResourceId, Resource>,
    enrollment: Mutex<Enrollment>,
    period: AcademicPeriod,
}

#[derive(Default)]
struct Enrollment {
    counts: HashMap<ResourceId, u32>,
    placements: HashMap<StudentId, ResourceId>,
}

impl InMemoryDirectory {
    pub(crate) fn from_roster(roster: Roster, period: AcademicPeriod) -> Self {
        let mut enrollment = Enrollment::default();
        let mut resources = HashMap::new();
        for group in roster.groups {
            enrollment
                .counts
                .insert(group.resource.id.clone(), group.enrolled);
            resources.insert(group.resource.id.clone(), group.resource);
        }

        let mut students = HashMap::new();
        for entry in roster.students {
            if let Some(group) = entry.current_group {
                enrollment
                    .placements
                    .insert(entry.student.id.clone(), group);
            }
            students.insert(entry.student.id.clone(), (entry.student, entry.standing));
        }

        Self {
            students,
            resources,
            enrollment: Mutex::new(enrollment),
            period,
        }
    }

    pub(crate) fn placement(&self, student_id: &StudentId) -> Option<ResourceId> {
        self.enrollment().ok()?.placements.get(student_id).cloned()
    }

    fn enrollment(&self) -> Result<MutexGuard<'_, Enrollment>, RepositoryError> {
        self.enrollment.lock().map_err(|_| poisoned("enrollment"))
    }
}

impl StudentDirectory for InMemoryDirectory {
    fn fetch_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        Ok(self.students.get(id).map(|(student, _)| student.clone()))
    }

    fn academic_standing(
        &self,
        id: &StudentId,
    ) -> Result<Option<AcademicStanding>, RepositoryError> {
        Ok(self.students.get(id).map(|(_, standing)| standing.clone()))
    }

    fn standings_for_program(
        &self,
        faculty: &str,
        program: &str,
    ) -> Result<Vec<AcademicStanding>, RepositoryError> {
        Ok(self
            .students
            .values()
            .map(|(_, standing)| standing)
            .filter(|standing| {
                standing.faculty.eq_ignore_ascii_case(faculty)
                    && standing.program.eq_ignore_ascii_case(program)
            })
            .cloned()
            .collect())
    }
}

impl ResourceDirectory for InMemoryDirectory {
    fn fetch_resource(&self, id: &ResourceId) -> Result<Option<Resource>, RepositoryError> {
        Ok(self.resources.get(id).cloned())
    }

    fn resources_for_course(&self, course_id: &CourseId) -> Result<Vec<Resource>, RepositoryError> {
        let mut resources: Vec<Resource> = self
            .resources
            .values()
            .filter(|resource| &resource.course_id == course_id)
            .cloned()
            .collect();
        resources.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(resources)
    }

    fn enrolled_count(&self, id: &ResourceId) -> Result<u32, RepositoryError> {
        self.enrollment()?
            .counts
            .get(id)
            .copied()
            .ok_or(RepositoryError::NotFound)
    }

    fn apply_reassignment(
        &self,
        student_id: &StudentId,
        from: &ResourceId,
        to: &ResourceId,
    ) -> Result<(), RepositoryError> {
        let mut enrollment = self.enrollment()?;
        if !enrollment.counts.contains_key(to) {
            return Err(RepositoryError::NotFound);
        }
        if let Some(count) = enrollment.counts.get_mut(from) {
            *count = count.saturating_sub(1);
        }
        if let Some(count) = enrollment.counts.get_mut(to) {
            *count += 1;
        }
        enrollment.placements.insert(student_id.clone(), to.clone());
        info!(student = %student_id, %from, %to, "student reassigned");
        Ok(())
    }
}

impl AcademicCalendar for InMemoryDirectory {
    fn active_period(&self) -> Result<Option<AcademicPeriod>, RepositoryError> {
        Ok(Some(self.period.clone()))
    }
}

fn poisoned(store: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{store} lock poisoned"))
}

/// Logs outbound alerts and keeps them for inspection.
#[derive(Default)]
pub(crate) struct InMemoryAlertPublisher {
    alerts: Mutex<Vec<ReviewAlert>>,
}

impl AlertPublisher for InMemoryAlertPublisher {
    fn publish(&self, alert: ReviewAlert) -> Result<(), AlertError> {
        info!(
            template = %alert.template,
            request = %alert.request_id,
            recipient = %alert.recipient,
            "review alert queued"
        );
        self.alerts
            .lock()
            .map_err(|_| AlertError::Transport("alert outbox lock poisoned".to_string()))?
            .push(alert);
        Ok(())
    }
}

impl InMemoryAlertPublisher {
    pub(crate) fn alerts(&self) -> Vec<ReviewAlert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

/// Bounded, newest-first record of status changes for dashboards.
pub(crate) struct DashboardFeed {
    capacity: usize,
    events: Mutex<VecDeque<StatusChangeEvent>>,
}

impl DashboardFeed {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub(crate) fn recent(&self, limit: usize) -> Vec<StatusChangeEvent> {
        self.events
            .lock()
            .map(|events| events.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

impl StatusListener for DashboardFeed {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn on_status_change(&self, event: &StatusChangeEvent) -> Result<(), ListenerError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| ListenerError("dashboard feed lock poisoned".to_string()))?;
        events.push_front(event.clone());
        events.truncate(self.capacity);
        Ok(())
    }
}

/// Everything the HTTP layer and the demo share.
pub(crate) struct Backend {
    pub(crate) service: Arc<AppService>,
    pub(crate) directory: Arc<InMemoryDirectory>,
    pub(crate) alerts: Arc<InMemoryAlertPublisher>,
    pub(crate) feed: Arc<DashboardFeed>,
}

pub(crate) fn build_backend(roster: Roster, period: AcademicPeriod, policy: ChangePolicy) -> Backend {
    let directory = Arc::new(InMemoryDirectory::from_roster(roster, period));
    let alerts = Arc::new(InMemoryAlertPublisher::default());
    let feed = Arc::new(DashboardFeed::new(200));
    let service = ScheduleChangeService::new(
        Arc::new(InMemoryRequestRepository::default()),
        directory.clone(),
        policy,
    );
    service.subscribe(feed.clone());
    service.subscribe(Arc::new(AlertListener::new(alerts.clone())));

    Backend {
        service: Arc::new(service),
        directory,
        alerts,
        feed,
    }
}

pub(crate) fn sample_roster() -> Result<Roster, RosterImportError> {
    RosterImporter::from_readers(
        Cursor::new(SAMPLE_STUDENTS.as_bytes()),
        Cursor::new(SAMPLE_GROUPS.as_bytes()),
    )
}

pub(crate) fn load_roster(args: &RosterArgs) -> Result<Roster, AppError> {
    match (&args.students_csv, &args.groups_csv) {
        (Some(students), Some(groups)) => {
            let roster = RosterImporter::from_paths(students, groups)?;
            info!(
                students = roster.students.len(),
                groups = roster.groups.len(),
                "roster imported"
            );
            Ok(roster)
        }
        _ => Ok(sample_roster()?),
    }
}

/// Change window spanning whole days in UTC. Defaults to a week back and thirty days ahead.
pub(crate) fn change_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> AcademicPeriod {
    let start = start.unwrap_or(today - Duration::days(7));
    let end = end.unwrap_or(today + Duration::days(30));
    let closes = (end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc() - Duration::seconds(1);

    AcademicPeriod {
        id: format!("{}-{}", start.format("%Y%m%d"), end.format("%Y%m%d")),
        name: format!("Change window {} to {}", start, end),
        change_window_start: start.and_time(NaiveTime::MIN).and_utc(),
        change_window_end: closes,
    }
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedule_change::workflows::schedule_change::RequestDraft;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn change_window_covers_whole_days() {
        let period = change_window(Some(date(2025, 1, 6)), Some(date(2025, 1, 31)), date(2025, 1, 15));
        assert_eq!(
            period.change_window_start.to_rfc3339(),
            "2025-01-06T00:00:00+00:00"
        );
        assert_eq!(
            period.change_window_end.to_rfc3339(),
            "2025-01-31T23:59:59+00:00"
        );
    }

    #[test]
    fn change_window_defaults_around_today() {
        let period = change_window(None, None, date(2025, 3, 10));
        assert_eq!(period.change_window_start.date_naive(), date(2025, 3, 3));
        assert_eq!(period.change_window_end.date_naive(), date(2025, 4, 9));
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert_eq!(parse_date(" 2025-02-01 "), Ok(date(2025, 2, 1)));
        assert!(parse_date("02/01/2025").is_err());
    }

    #[test]
    fn reassignment_moves_counts_and_placement() {
        let roster = sample_roster().expect("sample roster parses");
        let directory = InMemoryDirectory::from_roster(roster, change_window(None, None, today()));
        let student = StudentId("S1".to_string());
        let from = ResourceId("G-CALC-02".to_string());
        let to = ResourceId("G-CALC-03".to_string());

        directory
            .apply_reassignment(&student, &from, &to)
            .expect("reassignment succeeds");

        assert_eq!(directory.enrolled_count(&from).expect("count"), 23);
        assert_eq!(directory.enrolled_count(&to).expect("count"), 11);
        assert_eq!(directory.placement(&student), Some(to));
        assert!(matches!(
            directory.apply_reassignment(&student, &from, &ResourceId("G-NOPE".to_string())),
            Err(RepositoryError::NotFound)
        ));
    }

    #[test]
    fn request_store_refuses_duplicate_inserts() {
        let backend = build_backend(
            sample_roster().expect("sample roster parses"),
            change_window(None, None, today()),
            ChangePolicy::default(),
        );
        let store = InMemoryRequestRepository::default();
        let created = backend
            .service
            .create_request(RequestDraft {
                student_id: StudentId("S1".to_string()),
                current_resource: ResourceId("G-CALC-02".to_string()),
                requested_resource: ResourceId("G-CALC-03".to_string()),
                reason: "Lab overlaps lecture".to_string(),
            })
            .expect("admitted");

        store.insert(created.clone()).expect("first insert");
        assert!(matches!(
            store.insert(created.clone()),
            Err(RepositoryError::Conflict)
        ));
        store.save(created.clone()).expect("updates replace");
        assert_eq!(
            store.find_by_status(RequestStatus::Pending).expect("read").len(),
            1
        );
    }

    #[test]
    fn dashboard_feed_is_bounded_and_newest_first() {
        let backend = build_backend(
            sample_roster().expect("sample roster parses"),
            change_window(None, None, today()),
            ChangePolicy::default(),
        );
        let draft = |student: &str| RequestDraft {
            student_id: StudentId(student.to_string()),
            current_resource: ResourceId("G-CALC-02".to_string()),
            requested_resource: ResourceId("G-CALC-03".to_string()),
            reason: "Lab overlaps lecture".to_string(),
        };

        let first = backend.service.create_request(draft("S1")).expect("admitted");
        let second = backend.service.create_request(draft("S2")).expect("admitted");
        backend
            .service
            .cancel(first.id(), &StudentId("S1".to_string()))
            .expect("cancel");
        backend
            .service
            .cancel(second.id(), &StudentId("S2".to_string()))
            .expect("cancel");

        let recent = backend.feed.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(&recent[0].request_id, second.id());
        assert_eq!(backend.feed.recent(1).len(), 1);
        assert!(backend.alerts.alerts().is_empty());

        let narrow = DashboardFeed::new(1);
        for event in recent.iter().rev() {
            narrow.on_status_change(event).expect("recorded");
        }
        let kept = narrow.recent(10);
        assert_eq!(kept.len(), 1);
        assert_eq!(&kept[0].request_id, second.id());
    }
}
