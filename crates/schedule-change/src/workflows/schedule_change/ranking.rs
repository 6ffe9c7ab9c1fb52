//! Queue ordering for pending requests competing for the same group.
//!
//! Ordering key, in precedence:
//! 1. standing weight, descending
//! 2. submission time, ascending
//! 3. request id, ascending
//!
//! The weight is integer points so comparisons never touch floats:
//!
//! ```text
//! gpa_points      = round(gpa_weight * clamp(gpa / gpa_scale, 0, 1) * 1000)
//! semester_points = round(semester_weight * min(semester, semester_cap) / semester_cap * 1000)
//! bonus           = round(compliant_gpa_bonus * 1000) when gpa >= minimum_compliant_gpa
//! ```
//!
//! A student without a standing snapshot weighs 0.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AcademicStanding, RequestId, RequestStatus, ScheduleChangeRequest, StudentId,
};

/// Longest throughput window accepted from configuration, roughly ten years.
pub const MAX_THROUGHPUT_WINDOW_DAYS: u32 = 3_650;

/// Ranking coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    pub gpa_weight: f32,
    pub semester_weight: f32,
    pub gpa_scale: f32,
    pub semester_cap: u8,
    pub minimum_compliant_gpa: f32,
    pub compliant_gpa_bonus: f32,
    /// Trailing window used to measure resolution throughput.
    pub throughput_window_days: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            gpa_weight: 0.6,
            semester_weight: 0.4,
            gpa_scale: 5.0,
            semester_cap: 10,
            minimum_compliant_gpa: 3.0,
            compliant_gpa_bonus: 0.1,
            throughput_window_days: 14,
        }
    }
}

/// A pending request with its place in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRequest {
    pub request_id: RequestId,
    pub student_id: StudentId,
    pub position: usize,
    pub weight: i64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PriorityRanker {
    config: RankingConfig,
}

impl Default for PriorityRanker {
    fn default() -> Self {
        Self::new(RankingConfig::default())
    }
}

impl PriorityRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn weight(&self, standing: Option<&AcademicStanding>) -> i64 {
        let Some(standing) = standing else {
            return 0;
        };
        let config = &self.config;

        let gpa = if standing.cumulative_gpa.is_finite() {
            standing.cumulative_gpa
        } else {
            0.0
        };
        let gpa_ratio = if config.gpa_scale > 0.0 {
            (gpa / config.gpa_scale).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let gpa_points = (config.gpa_weight as f64 * gpa_ratio as f64 * 1000.0).round() as i64;

        let semester_points = if config.semester_cap == 0 {
            0
        } else {
            let capped = standing.current_semester.min(config.semester_cap) as f64;
            (config.semester_weight as f64 * capped / config.semester_cap as f64 * 1000.0).round()
                as i64
        };

        let bonus = if gpa >= config.minimum_compliant_gpa {
            (config.compliant_gpa_bonus as f64 * 1000.0).round() as i64
        } else {
            0
        };

        gpa_points + semester_points + bonus
    }

    /// Total order over the PENDING members of `requests`; anything else is ignored.
    pub fn rank(
        &self,
        requests: &[ScheduleChangeRequest],
        standings: &HashMap<StudentId, AcademicStanding>,
    ) -> Vec<RankedRequest> {
        let mut ranked: Vec<RankedRequest> = requests
            .iter()
            .filter(|request| request.status() == RequestStatus::Pending)
            .map(|request| RankedRequest {
                request_id: request.id().clone(),
                student_id: request.student_id().clone(),
                position: 0,
                weight: self.weight(standings.get(request.student_id())),
                submitted_at: request.submitted_at(),
            })
            .collect();

        ranked.sort_by(compare);
        for (index, entry) in ranked.iter_mut().enumerate() {
            entry.position = index + 1;
        }
        ranked
    }

    /// 1-based position of `request_id`, if it is pending in `requests`.
    pub fn position_of(
        &self,
        request_id: &RequestId,
        requests: &[ScheduleChangeRequest],
        standings: &HashMap<StudentId, AcademicStanding>,
    ) -> Option<usize> {
        self.rank(requests, standings)
            .into_iter()
            .find(|entry| &entry.request_id == request_id)
            .map(|entry| entry.position)
    }
}

fn compare(left: &RankedRequest, right: &RankedRequest) -> Ordering {
    right
        .weight
        .cmp(&left.weight)
        .then_with(|| left.submitted_at.cmp(&right.submitted_at))
        .then_with(|| left.request_id.cmp(&right.request_id))
}

/// Coarse wait estimate. Best effort from recent throughput, never a promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitEstimate {
    #[serde(rename = "<1 day")]
    UnderOneDay,
    #[serde(rename = "1-3 days")]
    OneToThreeDays,
    #[serde(rename = "3-7 days")]
    ThreeToSevenDays,
    #[serde(rename = ">1 week")]
    OverOneWeek,
}

impl WaitEstimate {
    pub const fn label(self) -> &'static str {
        match self {
            WaitEstimate::UnderOneDay => "<1 day",
            WaitEstimate::OneToThreeDays => "1-3 days",
            WaitEstimate::ThreeToSevenDays => "3-7 days",
            WaitEstimate::OverOneWeek => ">1 week",
        }
    }

    /// Days until the request at `position` is reached at `throughput` resolutions per day.
    pub fn from_queue(position: usize, throughput: ResolutionThroughput) -> Self {
        if throughput.per_day <= 0.0 || !throughput.per_day.is_finite() {
            return WaitEstimate::OverOneWeek;
        }

        let days = position as f64 / throughput.per_day;
        if days < 1.0 {
            WaitEstimate::UnderOneDay
        } else if days <= 3.0 {
            WaitEstimate::OneToThreeDays
        } else if days <= 7.0 {
            WaitEstimate::ThreeToSevenDays
        } else {
            WaitEstimate::OverOneWeek
        }
    }
}

/// Reviewer-driven resolutions per day over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolutionThroughput {
    pub resolved: usize,
    pub window_days: u32,
    pub per_day: f64,
}

impl ResolutionThroughput {
    /// Counts approvals and rejections resolved within `window_days` before `reference`.
    /// Cancellations do not count.
    pub fn measure(
        requests: &[ScheduleChangeRequest],
        reference: DateTime<Utc>,
        window_days: u32,
    ) -> Self {
        if window_days == 0 {
            return Self {
                resolved: 0,
                window_days,
                per_day: 0.0,
            };
        }

        // A window reaching past the representable range counts every resolution.
        let since = reference.checked_sub_signed(Duration::days(i64::from(window_days)));
        let resolved = requests
            .iter()
            .filter(|request| {
                matches!(
                    request.status(),
                    RequestStatus::Approved | RequestStatus::Rejected
                )
            })
            .filter_map(ScheduleChangeRequest::resolved_at)
            .filter(|resolved_at| {
                since.map_or(true, |since| *resolved_at > since) && *resolved_at <= reference
            })
            .count();

        Self {
            resolved,
            window_days,
            per_day: resolved as f64 / f64::from(window_days),
        }
    }
}
