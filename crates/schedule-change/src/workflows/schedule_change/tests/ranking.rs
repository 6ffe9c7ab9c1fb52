use super::common::*;
use std::collections::HashMap;

use chrono::Duration;

use crate::workflows::schedule_change::domain::{
    AcademicStanding, Actor, RequestId, StudentId,
};
use crate::workflows::schedule_change::lifecycle::{RequestLifecycle, Transition};
use crate::workflows::schedule_change::ranking::{
    PriorityRanker, RankingConfig, ResolutionThroughput, WaitEstimate,
};

fn standings(entries: &[AcademicStanding]) -> HashMap<StudentId, AcademicStanding> {
    entries
        .iter()
        .map(|standing| (standing.student_id.clone(), standing.clone()))
        .collect()
}

#[test]
fn default_weights_follow_documented_formula() {
    let ranker = PriorityRanker::default();

    // 0.6 * 4.2/5 + 0.4 * 5/10 + compliant bonus
    assert_eq!(ranker.weight(Some(&standing("S1", 4.2, 5))), 804);
    // 0.6 * 3.0/5 + 0.4 * 2/10 + compliant bonus at the threshold
    assert_eq!(ranker.weight(Some(&standing("S2", 3.0, 2))), 540);
    assert_eq!(ranker.weight(Some(&standing("S4", 2.9, 2))), 428);
    assert_eq!(ranker.weight(None), 0);
}

#[test]
fn semesters_beyond_the_cap_and_gpa_beyond_scale_saturate() {
    let ranker = PriorityRanker::default();
    let capped = ranker.weight(Some(&standing("S1", 5.0, 10)));
    assert_eq!(ranker.weight(Some(&standing("S1", 7.5, 14))), capped);
    assert_eq!(capped, 1100);
}

#[test]
fn stronger_standing_outranks_earlier_submission() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let requests = vec![
        pending_request("scr-2", "S2", &target, at(15, 9, 0)),
        pending_request("scr-1", "S1", &target, at(15, 9, 1)),
    ];
    let standings = standings(&[standing("S1", 4.2, 5), standing("S2", 3.0, 2)]);

    let ranked = PriorityRanker::default().rank(&requests, &standings);

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].student_id, sid("S1"));
    assert_eq!(ranked[0].position, 1);
    assert_eq!(ranked[1].student_id, sid("S2"));
    assert_eq!(ranked[1].position, 2);
}

#[test]
fn equal_weights_break_ties_by_submission_then_id() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let requests = vec![
        pending_request("scr-c", "S3", &target, at(15, 9, 5)),
        pending_request("scr-b", "S2", &target, at(15, 9, 0)),
        pending_request("scr-a", "S1", &target, at(15, 9, 0)),
    ];
    let standings = standings(&[
        standing("S1", 3.5, 4),
        standing("S2", 3.5, 4),
        standing("S3", 3.5, 4),
    ]);

    let order: Vec<String> = PriorityRanker::default()
        .rank(&requests, &standings)
        .into_iter()
        .map(|entry| entry.request_id.0)
        .collect();

    assert_eq!(order, vec!["scr-a", "scr-b", "scr-c"]);
}

#[test]
fn ranking_is_independent_of_input_order() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let mut requests = vec![
        pending_request("scr-1", "S1", &target, at(15, 9, 0)),
        pending_request("scr-2", "S2", &target, at(15, 9, 0)),
        pending_request("scr-3", "S3", &target, at(15, 8, 0)),
    ];
    let standings = standings(&[
        standing("S1", 4.2, 5),
        standing("S2", 3.0, 2),
        standing("S3", 3.6, 7),
    ]);
    let ranker = PriorityRanker::default();

    let forward = ranker.rank(&requests, &standings);
    requests.reverse();
    let backward = ranker.rank(&requests, &standings);

    assert_eq!(forward, backward);
}

#[test]
fn only_pending_requests_are_ranked() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let mut reviewed = pending_request("scr-1", "S1", &target, at(15, 9, 0));
    RequestLifecycle::apply(
        &mut reviewed,
        &Actor::reviewer("rev-1"),
        Transition::RequestInformation,
        "Need proof of schedule",
        at(15, 10, 0),
    )
    .expect("information requested");
    let requests = vec![
        reviewed,
        pending_request("scr-2", "S2", &target, at(15, 9, 30)),
    ];
    let standings = standings(&[standing("S1", 4.2, 5), standing("S2", 3.0, 2)]);
    let ranker = PriorityRanker::default();

    let ranked = ranker.rank(&requests, &standings);
    assert_eq!(ranked.len(), 1);
    assert_eq!(
        ranker.position_of(&RequestId("scr-2".to_string()), &requests, &standings),
        Some(1)
    );
    assert_eq!(
        ranker.position_of(&RequestId("scr-1".to_string()), &requests, &standings),
        None
    );
}

#[test]
fn custom_coefficients_can_flip_the_order() {
    let ranker = PriorityRanker::new(RankingConfig {
        gpa_weight: 0.0,
        semester_weight: 1.0,
        compliant_gpa_bonus: 0.0,
        ..RankingConfig::default()
    });
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let requests = vec![
        pending_request("scr-1", "S1", &target, at(15, 9, 0)),
        pending_request("scr-3", "S3", &target, at(15, 9, 30)),
    ];
    let standings = standings(&[standing("S1", 4.2, 5), standing("S3", 2.0, 7)]);

    let ranked = ranker.rank(&requests, &standings);
    assert_eq!(ranked[0].student_id, sid("S3"));
}

#[test]
fn wait_buckets_follow_throughput() {
    let throughput = |per_day: f64| ResolutionThroughput {
        resolved: 0,
        window_days: 14,
        per_day,
    };

    assert_eq!(WaitEstimate::from_queue(1, throughput(2.0)), WaitEstimate::UnderOneDay);
    assert_eq!(WaitEstimate::from_queue(2, throughput(1.0)), WaitEstimate::OneToThreeDays);
    assert_eq!(WaitEstimate::from_queue(3, throughput(1.0)), WaitEstimate::OneToThreeDays);
    assert_eq!(WaitEstimate::from_queue(6, throughput(1.0)), WaitEstimate::ThreeToSevenDays);
    assert_eq!(WaitEstimate::from_queue(8, throughput(1.0)), WaitEstimate::OverOneWeek);
    assert_eq!(WaitEstimate::from_queue(1, throughput(0.0)), WaitEstimate::OverOneWeek);
}

#[test]
fn wait_labels_serialize_as_buckets() {
    assert_eq!(WaitEstimate::ThreeToSevenDays.label(), "3-7 days");
    assert_eq!(
        serde_json::to_value(WaitEstimate::UnderOneDay).expect("serialize"),
        serde_json::json!("<1 day")
    );
}

#[test]
fn throughput_counts_recent_reviewer_resolutions_only() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let reviewer = Actor::reviewer("rev-1");
    let reference = at(20, 12, 0);

    let mut recent = pending_request("scr-1", "S1", &target, at(10, 9, 0));
    RequestLifecycle::apply(&mut recent, &reviewer, Transition::Approve, "", at(19, 9, 0))
        .expect("approve");
    let mut rejected = pending_request("scr-2", "S2", &target, at(10, 9, 0));
    RequestLifecycle::apply(&mut rejected, &reviewer, Transition::Reject, "no", at(18, 9, 0))
        .expect("reject");
    let mut stale = pending_request("scr-3", "S3", &target, at(1, 9, 0));
    RequestLifecycle::apply(
        &mut stale,
        &reviewer,
        Transition::Approve,
        "",
        reference - Duration::days(15),
    )
    .expect("approve");
    let mut cancelled = pending_request("scr-4", "S4", &target, at(10, 9, 0));
    RequestLifecycle::apply(
        &mut cancelled,
        &Actor::student(&sid("S4")),
        Transition::Cancel,
        "",
        at(19, 9, 0),
    )
    .expect("cancel");
    let waiting = pending_request("scr-5", "S5", &target, at(19, 9, 0));

    let throughput = ResolutionThroughput::measure(
        &[recent, rejected, stale, cancelled, waiting],
        reference,
        14,
    );

    assert_eq!(throughput.resolved, 2);
    assert!((throughput.per_day - 2.0 / 14.0).abs() < f64::EPSILON);
    assert_eq!(
        ResolutionThroughput::measure(&[], reference, 0).per_day,
        0.0
    );
}

#[test]
fn unbounded_window_counts_every_resolution() {
    let target = group(TARGET, "CALC-1", ENGINEERING, None, 30);
    let reviewer = Actor::reviewer("rev-1");
    let mut ancient = pending_request("scr-1", "S1", &target, at(1, 9, 0));
    RequestLifecycle::apply(&mut ancient, &reviewer, Transition::Approve, "", at(2, 9, 0))
        .expect("approve");

    let throughput = ResolutionThroughput::measure(&[ancient], at(20, 12, 0), u32::MAX);

    assert_eq!(throughput.resolved, 1);
    assert_eq!(throughput.window_days, u32::MAX);
    assert!(throughput.per_day > 0.0);
}
