use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::capacity::{CapacityError, CapacityTracker, Occupancy, SeatOutlook};
use super::domain::{
    AcademicStanding, Actor, RequestDraft, RequestId, RequestStatus, Resource, ResourceId,
    ScheduleChangeRequest, StudentId,
};
use super::lifecycle::{LifecycleError, RequestLifecycle, Transition};
use super::locks::{hold, KeyedLocks};
use super::notifications::{NotificationHub, StatusChangeEvent, StatusListener, SubscriptionId};
use super::ranking::{PriorityRanker, RankedRequest, RankingConfig, ResolutionThroughput, WaitEstimate};
use super::repository::{
    Clock, InstitutionDirectory, RepositoryError, RequestRepository, SystemClock,
};
use super::statistics::{self, ApprovalStatistics, StatisticsGrouping, StatisticsScope};
use super::validation::{
    ValidationChain, ValidationError, ValidationFailure, ValidationInput, ValidationOutcome,
};

pub const DEFAULT_MAX_PENDING_PER_STUDENT: usize = 3;

/// Tunable policy for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePolicy {
    pub max_pending_per_student: usize,
    pub ranking: RankingConfig,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            max_pending_per_student: DEFAULT_MAX_PENDING_PER_STUDENT,
            ranking: RankingConfig::default(),
        }
    }
}

/// Queue snapshot for one pending request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatusView {
    pub request_id: RequestId,
    pub requested_resource: ResourceId,
    pub position: usize,
    pub queue_length: usize,
    pub estimated_wait: WaitEstimate,
    pub occupancy: Occupancy,
    pub seat_outlook: SeatOutlook,
}

/// Service composing validation, lifecycle, ranking, capacity, and notification.
pub struct ScheduleChangeService<R, D> {
    requests: Arc<R>,
    directory: Arc<D>,
    tracker: CapacityTracker<D>,
    chain: ValidationChain,
    ranker: PriorityRanker,
    hub: Arc<NotificationHub>,
    clock: Arc<dyn Clock>,
    policy: ChangePolicy,
    student_locks: KeyedLocks,
    request_locks: KeyedLocks,
    resource_locks: KeyedLocks,
    sequence: AtomicU64,
}

/// Ids already held by the store are skipped; this bounds how many are tried per creation.
const MAX_ID_ATTEMPTS: usize = 1024;

impl<R, D> ScheduleChangeService<R, D>
where
    R: RequestRepository + 'static,
    D: InstitutionDirectory + 'static,
{
    pub fn new(requests: Arc<R>, directory: Arc<D>, policy: ChangePolicy) -> Self {
        let tracker = CapacityTracker::new(directory.clone());
        let chain = ValidationChain::standard(tracker.clone());
        let ranker = PriorityRanker::new(policy.ranking.clone());

        Self {
            requests,
            directory,
            tracker,
            chain,
            ranker,
            hub: Arc::new(NotificationHub::new()),
            clock: Arc::new(SystemClock),
            policy,
            student_locks: KeyedLocks::default(),
            request_locks: KeyedLocks::default(),
            resource_locks: KeyedLocks::default(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_chain(mut self, chain: ValidationChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_hub(mut self, hub: Arc<NotificationHub>) -> Self {
        self.hub = hub;
        self
    }

    pub fn policy(&self) -> &ChangePolicy {
        &self.policy
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn tracker(&self) -> &CapacityTracker<D> {
        &self.tracker
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) -> SubscriptionId {
        self.hub.subscribe(listener)
    }

    /// Validate a draft and store it as PENDING.
    ///
    /// Creation is serialized per student and the pending count is read from the store under
    /// that lock, so concurrent drafts cannot push a student past the limit.
    pub fn create_request(
        &self,
        draft: RequestDraft,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        if draft.reason.trim().is_empty() {
            return Err(ScheduleChangeError::ValidationFailed(
                ValidationFailure::MissingReason,
            ));
        }
        if draft.current_resource == draft.requested_resource {
            return Err(ScheduleChangeError::ValidationFailed(
                ValidationFailure::SameResource,
            ));
        }

        self.directory
            .fetch_student(&draft.student_id)?
            .ok_or_else(|| ScheduleChangeError::not_found("student", &draft.student_id.0))?;
        let standing = self
            .directory
            .academic_standing(&draft.student_id)?
            .ok_or_else(|| {
                ScheduleChangeError::not_found("academic standing", &draft.student_id.0)
            })?;
        let current = self.resource(&draft.current_resource)?;
        let requested = self.resource(&draft.requested_resource)?;

        let slot = self.student_locks.slot(&draft.student_id.0);
        let _guard = hold(&slot);

        let pending = self.requests.count_pending_by_student(&draft.student_id)?;
        if pending >= self.policy.max_pending_per_student {
            info!(
                student = %draft.student_id,
                pending,
                limit = self.policy.max_pending_per_student,
                "pending request limit reached"
            );
            return Err(ScheduleChangeError::PendingLimitExceeded {
                student_id: draft.student_id.clone(),
                limit: self.policy.max_pending_per_student,
            });
        }

        let duplicate = self
            .requests
            .find_by_student(&draft.student_id)?
            .into_iter()
            .any(|existing| {
                !existing.is_terminal()
                    && existing.requested_resource().resource_id == draft.requested_resource
            });
        if duplicate {
            return Err(ScheduleChangeError::ValidationFailed(
                ValidationFailure::DuplicateRequest {
                    resource_id: draft.requested_resource.clone(),
                },
            ));
        }

        let period = self.directory.active_period()?;
        let submitted_at = self.clock.now();
        let input = ValidationInput {
            draft: &draft,
            standing: &standing,
            current: &current,
            requested: &requested,
            period: period.as_ref(),
            submitted_at,
        };
        if let ValidationOutcome::Fail(failure) = self.chain.evaluate(&input)? {
            return Err(ScheduleChangeError::ValidationFailed(failure));
        }

        let reason = draft.reason.trim().to_string();
        let stored = self.insert_pending(|id| {
            ScheduleChangeRequest::pending(
                id,
                draft.student_id.clone(),
                current.reference(),
                requested.reference(),
                reason.clone(),
                submitted_at,
            )
        })?;

        info!(
            request = %stored.id(),
            student = %stored.student_id(),
            from = %stored.current_resource().resource_id,
            to = %stored.requested_resource().resource_id,
            "schedule change request created"
        );
        Ok(stored)
    }

    /// Apply a transition on behalf of `actor`.
    ///
    /// Transitions on one request are serialized; a second caller sees the committed state.
    /// Approvals additionally hold the target group's lock while re-checking capacity and
    /// moving the student. Listeners run after every lock is released.
    pub fn transition(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        transition: Transition,
        comments: &str,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        let (stored, event) = {
            let slot = self.request_locks.slot(&request_id.0);
            let _guard = hold(&slot);

            let mut request = self
                .requests
                .find_by_id(request_id)?
                .ok_or_else(|| ScheduleChangeError::not_found("request", &request_id.0))?;

            RequestLifecycle::check(&request, actor, transition, comments)?;

            if transition.requires_capacity() {
                let target = request.requested_resource().resource_id.clone();
                let resource_slot = self.resource_locks.slot(&target.0);
                let _resource_guard = hold(&resource_slot);

                let occupancy = self.tracker.occupancy(&target)?;
                if !occupancy.has_available_seat() {
                    info!(
                        request = %request_id,
                        resource = %target,
                        enrolled = occupancy.enrolled,
                        capacity = occupancy.capacity,
                        "approval blocked by capacity"
                    );
                    return Err(ScheduleChangeError::CapacityExhausted {
                        resource_id: target,
                        enrolled: occupancy.enrolled,
                        capacity: occupancy.capacity,
                    });
                }

                let event = RequestLifecycle::apply(
                    &mut request,
                    actor,
                    transition,
                    comments,
                    self.clock.now(),
                )?;
                let stored = self.commit_approval(request)?;
                (stored, event)
            } else {
                let event = RequestLifecycle::apply(
                    &mut request,
                    actor,
                    transition,
                    comments,
                    self.clock.now(),
                )?;
                let stored = self.requests.save(request)?;
                (stored, event)
            }
        };

        info!(
            request = %stored.id(),
            actor = %actor.id,
            from = %event.previous,
            to = %event.current,
            action = event.action.tag(),
            "schedule change request transitioned"
        );
        self.publish(&event);
        Ok(stored)
    }

    /// Reviewer approve/reject entry point. Any decision other than APPROVED or REJECTED is
    /// rejected.
    pub fn resolve(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        decision: RequestStatus,
        comments: &str,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        let transition = Transition::from_decision(decision)?;
        self.transition(request_id, actor, transition, comments)
    }

    /// Exception/appeal approval; same guards as [`resolve`](Self::resolve), distinct audit tag.
    pub fn approve_special_case(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        comments: &str,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        self.transition(request_id, actor, Transition::ApproveSpecialCase, comments)
    }

    pub fn request_information(
        &self,
        request_id: &RequestId,
        actor: &Actor,
        comments: &str,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        self.transition(request_id, actor, Transition::RequestInformation, comments)
    }

    /// Only the owning student may cancel, and only while PENDING.
    pub fn cancel(
        &self,
        request_id: &RequestId,
        requesting_student: &StudentId,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        self.transition(
            request_id,
            &Actor::student(requesting_student),
            Transition::Cancel,
            "cancelled by student",
        )
    }

    pub fn get(&self, request_id: &RequestId) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        self.requests
            .find_by_id(request_id)?
            .ok_or_else(|| ScheduleChangeError::not_found("request", &request_id.0))
    }

    pub fn requests_for_student(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ScheduleChangeRequest>, ScheduleChangeError> {
        let mut requests = self.requests.find_by_student(student_id)?;
        requests.sort_by(|left, right| {
            left.submitted_at()
                .cmp(&right.submitted_at())
                .then_with(|| left.id().cmp(right.id()))
        });
        Ok(requests)
    }

    /// Ranked pending queue for one group.
    pub fn ranked_queue(
        &self,
        resource_id: &ResourceId,
    ) -> Result<Vec<RankedRequest>, ScheduleChangeError> {
        let competitors = self.requests.find_by_requested_resource(resource_id)?;
        let standings = self.standings_for(&competitors)?;
        Ok(self.ranker.rank(&competitors, &standings))
    }

    /// 1-based position among pending requests for the same group.
    pub fn queue_position(&self, request_id: &RequestId) -> Result<usize, ScheduleChangeError> {
        let request = self.queued(request_id)?;
        let queue = self.ranked_queue(&request.requested_resource().resource_id)?;
        position_in(&queue, &request)
    }

    /// Best-effort bucket from queue position and the group's recent resolution rate.
    pub fn estimated_wait(&self, request_id: &RequestId) -> Result<WaitEstimate, ScheduleChangeError> {
        Ok(self.queue_status(request_id)?.estimated_wait)
    }

    pub fn queue_status(
        &self,
        request_id: &RequestId,
    ) -> Result<QueueStatusView, ScheduleChangeError> {
        let request = self.queued(request_id)?;
        let target = request.requested_resource().resource_id.clone();

        let competitors = self.requests.find_by_requested_resource(&target)?;
        let standings = self.standings_for(&competitors)?;
        let queue = self.ranker.rank(&competitors, &standings);
        let position = position_in(&queue, &request)?;

        let throughput = ResolutionThroughput::measure(
            &competitors,
            self.clock.now(),
            self.policy.ranking.throughput_window_days,
        );
        let occupancy = self.tracker.occupancy(&target)?;

        Ok(QueueStatusView {
            request_id: request.id().clone(),
            requested_resource: target,
            position,
            queue_length: queue.len(),
            estimated_wait: WaitEstimate::from_queue(position, throughput),
            occupancy,
            seat_outlook: occupancy.arbitrate(position),
        })
    }

    pub fn statistics(
        &self,
        scope: &StatisticsScope,
    ) -> Result<ApprovalStatistics, ScheduleChangeError> {
        let requests = self.all_requests()?;
        Ok(statistics::summarize(&requests, scope))
    }

    /// Statistics inside `scope`, one entry per faculty, course, or group.
    pub fn grouped_statistics(
        &self,
        scope: &StatisticsScope,
        grouping: StatisticsGrouping,
    ) -> Result<BTreeMap<String, ApprovalStatistics>, ScheduleChangeError> {
        let requests = self.all_requests()?;
        Ok(statistics::grouped(&requests, scope, grouping))
    }

    fn all_requests(&self) -> Result<Vec<ScheduleChangeRequest>, ScheduleChangeError> {
        let mut requests = Vec::new();
        for status in RequestStatus::ordered() {
            requests.extend(self.requests.find_by_status(status)?);
        }
        Ok(requests)
    }

    fn resource(&self, id: &ResourceId) -> Result<Resource, ScheduleChangeError> {
        self.directory
            .fetch_resource(id)?
            .ok_or_else(|| ScheduleChangeError::not_found("resource", &id.0))
    }

    fn queued(&self, request_id: &RequestId) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        let request = self.get(request_id)?;
        if request.status() != RequestStatus::Pending {
            return Err(ScheduleChangeError::NotQueued {
                request_id: request_id.clone(),
                status: request.status(),
            });
        }
        Ok(request)
    }

    fn standings_for(
        &self,
        requests: &[ScheduleChangeRequest],
    ) -> Result<HashMap<StudentId, AcademicStanding>, ScheduleChangeError> {
        let mut standings = HashMap::new();
        for request in requests
            .iter()
            .filter(|request| request.status() == RequestStatus::Pending)
        {
            if standings.contains_key(request.student_id()) {
                continue;
            }
            if let Some(standing) = self.directory.academic_standing(request.student_id())? {
                standings.insert(request.student_id().clone(), standing);
            }
        }
        Ok(standings)
    }

    /// Move the student, then persist. A failed save moves the student back.
    fn next_request_id(&self) -> RequestId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        RequestId(format!("scr-{id:06}"))
    }

    /// Insert under a fresh id. Stored requests are never replaced; taken ids are skipped.
    fn insert_pending<F>(&self, build: F) -> Result<ScheduleChangeRequest, ScheduleChangeError>
    where
        F: Fn(RequestId) -> ScheduleChangeRequest,
    {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.next_request_id();
            match self.requests.insert(build(id.clone())) {
                Ok(stored) => return Ok(stored),
                Err(RepositoryError::Conflict) => {
                    warn!(request = %id, "request id already stored, allocating the next one");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(RepositoryError::Conflict.into())
    }

    fn commit_approval(
        &self,
        request: ScheduleChangeRequest,
    ) -> Result<ScheduleChangeRequest, ScheduleChangeError> {
        let student = request.student_id().clone();
        let from = request.current_resource().resource_id.clone();
        let to = request.requested_resource().resource_id.clone();

        self.directory.apply_reassignment(&student, &from, &to)?;
        match self.requests.save(request) {
            Ok(stored) => Ok(stored),
            Err(err) => {
                if let Err(revert) = self.directory.apply_reassignment(&student, &to, &from) {
                    error!(
                        student = %student,
                        from = %to,
                        to = %from,
                        error = %revert,
                        "failed to revert reassignment after save failure"
                    );
                }
                Err(err.into())
            }
        }
    }

    fn publish(&self, event: &StatusChangeEvent) {
        let report = self.hub.publish(event);
        if report.failed > 0 {
            info!(
                request = %event.request_id,
                delivered = report.delivered,
                failed = report.failed,
                "status change delivered with listener failures"
            );
        }
    }
}

fn position_in(
    queue: &[RankedRequest],
    request: &ScheduleChangeRequest,
) -> Result<usize, ScheduleChangeError> {
    queue
        .iter()
        .find(|entry| &entry.request_id == request.id())
        .map(|entry| entry.position)
        .ok_or_else(|| ScheduleChangeError::NotQueued {
            request_id: request.id().clone(),
            status: request.status(),
        })
}

/// Error raised by the schedule-change service.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleChangeError {
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationFailure),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(LifecycleError),
    #[error("student {student_id} already has {limit} pending requests")]
    PendingLimitExceeded { student_id: StudentId, limit: usize },
    #[error("unauthorized: {0}")]
    Unauthorized(LifecycleError),
    #[error("no available seats in group {resource_id} ({enrolled}/{capacity})")]
    CapacityExhausted {
        resource_id: ResourceId,
        enrolled: u32,
        capacity: u32,
    },
    #[error("request {request_id} is {status} and not queued")]
    NotQueued {
        request_id: RequestId,
        status: RequestStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ScheduleChangeError {
    fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<LifecycleError> for ScheduleChangeError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Unauthorized { .. } => Self::Unauthorized(value),
            other => Self::InvalidStateTransition(other),
        }
    }
}

impl From<ValidationError> for ScheduleChangeError {
    fn from(value: ValidationError) -> Self {
        match value {
            ValidationError::UnknownResource(id) => Self::not_found("resource", &id.0),
            ValidationError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<CapacityError> for ScheduleChangeError {
    fn from(value: CapacityError) -> Self {
        match value {
            CapacityError::UnknownResource(id) => Self::not_found("resource", &id.0),
            CapacityError::Repository(err) => Self::Repository(err),
        }
    }
}
