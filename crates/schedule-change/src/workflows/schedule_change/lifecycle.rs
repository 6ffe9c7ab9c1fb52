//! Request status state machine.
//!
//! ```text
//! PENDING ──request_information──> UNDER_REVIEW
//!    │                                  │
//!    ├──approve / approve_special_case──┼──> APPROVED
//!    ├──reject──────────────────────────┴──> REJECTED
//!    └──cancel (owner only)────────────────> CANCELLED
//! ```
//!
//! Every successful transition appends exactly one [`ReviewStep`] and sets the resolution date
//! when the target status is terminal. Terminal requests accept nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ActorRole, RequestId, RequestStatus, ReviewAction, ReviewStep, ScheduleChangeRequest,
};
use super::notifications::StatusChangeEvent;

/// Transitions a caller may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    RequestInformation,
    Approve,
    ApproveSpecialCase,
    Reject,
    Cancel,
}

impl Transition {
    pub const fn label(self) -> &'static str {
        match self {
            Transition::RequestInformation => "request_information",
            Transition::Approve => "approve",
            Transition::ApproveSpecialCase => "approve_special_case",
            Transition::Reject => "reject",
            Transition::Cancel => "cancel",
        }
    }

    pub const fn target(self) -> RequestStatus {
        match self {
            Transition::RequestInformation => RequestStatus::UnderReview,
            Transition::Approve | Transition::ApproveSpecialCase => RequestStatus::Approved,
            Transition::Reject => RequestStatus::Rejected,
            Transition::Cancel => RequestStatus::Cancelled,
        }
    }

    pub const fn action(self) -> ReviewAction {
        match self {
            Transition::RequestInformation => ReviewAction::AdditionalInformationRequested,
            Transition::Approve => ReviewAction::Approved,
            Transition::ApproveSpecialCase => ReviewAction::SpecialCaseApproved,
            Transition::Reject => ReviewAction::Rejected,
            Transition::Cancel => ReviewAction::Cancelled,
        }
    }

    /// Statuses the transition may start from.
    pub const fn sources(self) -> &'static [RequestStatus] {
        match self {
            Transition::RequestInformation | Transition::Cancel => &[RequestStatus::Pending],
            Transition::Approve | Transition::ApproveSpecialCase | Transition::Reject => {
                &[RequestStatus::Pending, RequestStatus::UnderReview]
            }
        }
    }

    pub const fn requires_capacity(self) -> bool {
        matches!(self, Transition::Approve | Transition::ApproveSpecialCase)
    }

    /// Map a reviewer decision onto the approve/reject entry point.
    pub fn from_decision(decision: RequestStatus) -> Result<Self, LifecycleError> {
        match decision {
            RequestStatus::Approved => Ok(Transition::Approve),
            RequestStatus::Rejected => Ok(Transition::Reject),
            other => Err(LifecycleError::UnsupportedDecision(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("request {request_id} is {from}; cannot {transition}")]
    InvalidTransition {
        request_id: RequestId,
        from: RequestStatus,
        transition: &'static str,
    },
    #[error("decision must be APPROVED or REJECTED, got {0}")]
    UnsupportedDecision(RequestStatus),
    #[error("comments are required to {0}")]
    MissingComments(&'static str),
    #[error("{role} {actor_id} may not {transition} this request")]
    Unauthorized {
        actor_id: String,
        role: &'static str,
        transition: &'static str,
    },
}

/// Stateless guard and mutator for request status.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLifecycle;

impl RequestLifecycle {
    pub fn can_transition(from: RequestStatus, transition: Transition) -> bool {
        transition.sources().contains(&from)
    }

    /// Role and ownership checks. Runs before the state guard so a stranger learns nothing
    /// about the request's status.
    pub fn authorize(
        request: &ScheduleChangeRequest,
        actor: &Actor,
        transition: Transition,
    ) -> Result<(), LifecycleError> {
        let permitted = match transition {
            Transition::Cancel => {
                actor.role == ActorRole::Student && actor.id == request.student_id().0
            }
            _ => actor.role.can_review(),
        };

        if permitted {
            Ok(())
        } else {
            Err(LifecycleError::Unauthorized {
                actor_id: actor.id.clone(),
                role: actor.role.label(),
                transition: transition.label(),
            })
        }
    }

    /// All guards, without mutating.
    pub fn check(
        request: &ScheduleChangeRequest,
        actor: &Actor,
        transition: Transition,
        comments: &str,
    ) -> Result<(), LifecycleError> {
        Self::authorize(request, actor, transition)?;

        if !Self::can_transition(request.status(), transition) {
            return Err(LifecycleError::InvalidTransition {
                request_id: request.id().clone(),
                from: request.status(),
                transition: transition.label(),
            });
        }

        if transition == Transition::RequestInformation && comments.trim().is_empty() {
            return Err(LifecycleError::MissingComments(transition.label()));
        }

        Ok(())
    }

    /// Guard, then commit the new status with one audit step.
    pub fn apply(
        request: &mut ScheduleChangeRequest,
        actor: &Actor,
        transition: Transition,
        comments: &str,
        at: DateTime<Utc>,
    ) -> Result<StatusChangeEvent, LifecycleError> {
        Self::check(request, actor, transition, comments)?;

        let previous = request.status();
        let step = ReviewStep {
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            action: transition.action(),
            comments: comments.trim().to_string(),
            recorded_at: at,
        };
        request.commit(transition.target(), step);

        Ok(StatusChangeEvent {
            request_id: request.id().clone(),
            student_id: request.student_id().clone(),
            requested_resource: request.requested_resource().resource_id.clone(),
            previous,
            current: request.status(),
            action: transition.action(),
            actor: actor.clone(),
            occurred_at: at,
        })
    }
}
