//! Schedule-change request intake, review, and resolution.
//!
//! Drafts pass through the [`ValidationChain`] before they are stored as PENDING. Reviewer and
//! student actions move requests through [`RequestLifecycle`]; every committed transition is
//! published on the [`NotificationHub`]. Pending requests for the same group are ordered by
//! [`PriorityRanker`].

pub mod capacity;
pub mod domain;
pub mod lifecycle;
mod locks;
pub mod notifications;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod service;
pub mod statistics;
pub mod validation;

#[cfg(test)]
mod tests;

pub use capacity::{CapacityError, CapacityTracker, Occupancy, SeatOutlook};
pub use domain::{
    AcademicPeriod, AcademicStanding, Actor, ActorRole, Classroom, CourseId, RequestDraft,
    RequestId, RequestStatus, RequestStatusView, Resource, ResourceId, ResourceRef, ReviewAction,
    ReviewStep, ScheduleChangeRequest, Student, StudentId,
};
pub use lifecycle::{LifecycleError, RequestLifecycle, Transition};
pub use notifications::{
    AlertListener, DeliveryReport, ListenerError, NotificationHub, StatusChangeEvent,
    StatusListener, SubscriptionId,
};
pub use ranking::{
    PriorityRanker, RankedRequest, RankingConfig, ResolutionThroughput, WaitEstimate,
    MAX_THROUGHPUT_WINDOW_DAYS,
};
pub use repository::{
    AcademicCalendar, AlertError, AlertPublisher, Clock, InstitutionDirectory, RepositoryError,
    RequestRepository, ResourceDirectory, ReviewAlert, StudentDirectory, SystemClock,
};
pub use router::schedule_change_router;
pub use service::{
    ChangePolicy, QueueStatusView, ScheduleChangeError, ScheduleChangeService,
    DEFAULT_MAX_PENDING_PER_STUDENT,
};
pub use statistics::{ApprovalStatistics, StatisticsGrouping, StatisticsScope};
pub use validation::{
    CalendarValidator, CapacityValidator, FacultyValidator, ValidationChain, ValidationError,
    ValidationFailure, ValidationInput, ValidationOutcome, Validator,
};
