use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{CourseId, RequestStatus, ResourceId, ScheduleChangeRequest};

/// Grouping applied before aggregation. Requests are grouped by their requested group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum StatisticsScope {
    Global,
    Faculty(String),
    Course(CourseId),
    Resource(ResourceId),
}

impl StatisticsScope {
    pub fn includes(&self, request: &ScheduleChangeRequest) -> bool {
        let target = request.requested_resource();
        match self {
            StatisticsScope::Global => true,
            StatisticsScope::Faculty(faculty) => target.faculty.eq_ignore_ascii_case(faculty),
            StatisticsScope::Course(course) => &target.course_id == course,
            StatisticsScope::Resource(resource) => &target.resource_id == resource,
        }
    }
}

/// Read-only aggregate over a set of requests. Empty input yields all zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApprovalStatistics {
    pub total: usize,
    pub pending: usize,
    pub under_review: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    /// approved / (approved + rejected)
    pub approval_rate: f64,
    /// Mean hours from submission to resolution across terminal requests.
    pub mean_resolution_hours: f64,
}

impl ApprovalStatistics {
    pub fn from_requests<'a, I>(requests: I) -> Self
    where
        I: IntoIterator<Item = &'a ScheduleChangeRequest>,
    {
        let mut stats = Self::default();
        let mut resolution_hours = 0.0;
        let mut resolved = 0usize;

        for request in requests {
            stats.total += 1;
            match request.status() {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::UnderReview => stats.under_review += 1,
                RequestStatus::Approved => stats.approved += 1,
                RequestStatus::Rejected => stats.rejected += 1,
                RequestStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(hours) = request.resolution_hours() {
                resolution_hours += hours;
                resolved += 1;
            }
        }

        let decided = stats.approved + stats.rejected;
        if decided > 0 {
            stats.approval_rate = stats.approved as f64 / decided as f64;
        }
        if resolved > 0 {
            stats.mean_resolution_hours = resolution_hours / resolved as f64;
        }
        stats
    }

    pub fn count(&self, status: RequestStatus) -> usize {
        match status {
            RequestStatus::Pending => self.pending,
            RequestStatus::UnderReview => self.under_review,
            RequestStatus::Approved => self.approved,
            RequestStatus::Rejected => self.rejected,
            RequestStatus::Cancelled => self.cancelled,
        }
    }
}

pub fn summarize(requests: &[ScheduleChangeRequest], scope: &StatisticsScope) -> ApprovalStatistics {
    ApprovalStatistics::from_requests(requests.iter().filter(|request| scope.includes(request)))
}

/// Dimension used to split statistics into one entry per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticsGrouping {
    Faculty,
    Course,
    Resource,
}

impl StatisticsGrouping {
    fn key(self, request: &ScheduleChangeRequest) -> String {
        let target = request.requested_resource();
        match self {
            StatisticsGrouping::Faculty => target.faculty.clone(),
            StatisticsGrouping::Course => target.course_id.0.clone(),
            StatisticsGrouping::Resource => target.resource_id.0.clone(),
        }
    }
}

/// Requests inside `scope`, split by `grouping`. Keys are sorted.
pub fn grouped(
    requests: &[ScheduleChangeRequest],
    scope: &StatisticsScope,
    grouping: StatisticsGrouping,
) -> BTreeMap<String, ApprovalStatistics> {
    let mut groups: BTreeMap<String, Vec<&ScheduleChangeRequest>> = BTreeMap::new();
    for request in requests.iter().filter(|request| scope.includes(request)) {
        groups.entry(grouping.key(request)).or_default().push(request);
    }

    groups
        .into_iter()
        .map(|(group, members)| (group, ApprovalStatistics::from_requests(members)))
        .collect()
}
