use crate::cli::RosterArgs;
use crate::infra::{build_backend, change_window, load_roster, today, Backend};
use clap::Args;
use schedule_change::config::AppConfig;
use schedule_change::error::AppError;
use schedule_change::workflows::schedule_change::{
    Actor, ApprovalStatistics, RequestDraft, RequestStatus, ResourceId, ScheduleChangeError,
    ScheduleChangeRequest, SeatOutlook, StatisticsScope, StudentId,
};

const CONTESTED_GROUP: &str = "G-CALC-01";
const HOME_GROUP: &str = "G-CALC-02";
const OTHER_FACULTY_GROUP: &str = "G-ANAT-01";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    #[command(flatten)]
    pub(crate) roster: RosterArgs,
    /// Skip the cross-faculty validation walkthrough.
    #[arg(long)]
    pub(crate) skip_validation: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        roster,
        skip_validation,
    } = args;

    let policy = AppConfig::load()?.policy;
    let period = change_window(roster.window_start, roster.window_end, today());
    let backend = build_backend(load_roster(&roster)?, period.clone(), policy);

    println!("Schedule change demo");
    println!(
        "Change window {} -> {}",
        period.change_window_start, period.change_window_end
    );

    let contested = ResourceId(CONTESTED_GROUP.to_string());
    report_occupancy(&backend, &contested);

    let senior = submit(&backend, "S1", CONTESTED_GROUP, "Lecture clashes with lab shift");
    let junior = submit(&backend, "S2", CONTESTED_GROUP, "Commute conflicts with early slot");
    let (Some(senior), Some(junior)) = (senior, junior) else {
        println!("Sample roster does not contain the contested-seat students; stopping.");
        return Ok(());
    };

    println!("\nRanked queue for {}", contested);
    match backend.service.ranked_queue(&contested) {
        Ok(queue) => {
            for entry in queue {
                println!(
                    "  #{} {} (weight {}, submitted {})",
                    entry.position, entry.student_id, entry.weight, entry.submitted_at
                );
            }
        }
        Err(error) => println!("  queue unavailable: {error}"),
    }
    for request in [&senior, &junior] {
        match backend.service.queue_status(request.id()) {
            Ok(view) => println!(
                "  {} -> position {}/{} | wait {} | {}",
                request.student_id(),
                view.position,
                view.queue_length,
                view.estimated_wait.label(),
                outlook_label(view.seat_outlook)
            ),
            Err(error) => println!("  {} -> {error}", request.student_id()),
        }
    }

    let reviewer = Actor::reviewer("reviewer-demo");
    println!("\nResolutions");
    print_outcome(
        "approve top-ranked",
        backend
            .service
            .resolve(senior.id(), &reviewer, RequestStatus::Approved, "Seat available"),
    );
    print_outcome(
        "approve runner-up",
        backend
            .service
            .resolve(junior.id(), &reviewer, RequestStatus::Approved, "Seat available"),
    );
    print_outcome(
        "reject runner-up",
        backend.service.resolve(
            junior.id(),
            &reviewer,
            RequestStatus::Rejected,
            "Group is at capacity",
        ),
    );
    report_occupancy(&backend, &contested);
    if let Some(placement) = backend.directory.placement(senior.student_id()) {
        println!("{} now attends {}", senior.student_id(), placement);
    }

    if !skip_validation {
        println!("\nCross-faculty request");
        if let Err(error) = backend.service.create_request(draft(
            "S3",
            OTHER_FACULTY_GROUP,
            "Prefer the anatomy timetable",
        )) {
            println!("  rejected at intake: {error}");
        }
    }

    println!("\nApproval statistics");
    match backend.service.statistics(&StatisticsScope::Global) {
        Ok(stats) => print_statistics(&stats),
        Err(error) => println!("  unavailable: {error}"),
    }

    println!("\nAlerts sent");
    for alert in backend.alerts.alerts() {
        println!(
            "  {} -> {} ({})",
            alert.template, alert.recipient, alert.request_id
        );
    }

    println!("\nDashboard feed (newest first)");
    for event in backend.feed.recent(10) {
        println!(
            "  {} {} -> {} by {} [{}]",
            event.request_id,
            event.previous,
            event.current,
            event.actor.id,
            event.action.tag()
        );
    }

    Ok(())
}

fn draft(student: &str, requested: &str, reason: &str) -> RequestDraft {
    RequestDraft {
        student_id: StudentId(student.to_string()),
        current_resource: ResourceId(HOME_GROUP.to_string()),
        requested_resource: ResourceId(requested.to_string()),
        reason: reason.to_string(),
    }
}

fn submit(
    backend: &Backend,
    student: &str,
    requested: &str,
    reason: &str,
) -> Option<ScheduleChangeRequest> {
    match backend
        .service
        .create_request(draft(student, requested, reason))
    {
        Ok(request) => {
            println!("Submitted {} for {} -> {}", request.id(), student, requested);
            Some(request)
        }
        Err(error) => {
            println!("Submission for {student} failed: {error}");
            None
        }
    }
}

fn print_outcome(label: &str, outcome: Result<ScheduleChangeRequest, ScheduleChangeError>) {
    match outcome {
        Ok(request) => println!(
            "- {label}: {} is {} ({} review steps)",
            request.id(),
            request.status(),
            request.review_steps().len()
        ),
        Err(error) => println!("- {label}: {error}"),
    }
}

fn report_occupancy(backend: &Backend, group: &ResourceId) {
    match backend.service.tracker().occupancy(group) {
        Ok(occupancy) => println!(
            "Group {group}: {}/{} seats taken ({:.0}%)",
            occupancy.enrolled,
            occupancy.capacity,
            occupancy.percentage()
        ),
        Err(error) => println!("Group {group}: {error}"),
    }
}

fn outlook_label(outlook: SeatOutlook) -> String {
    match outlook {
        SeatOutlook::WithinCapacity => "within capacity".to_string(),
        SeatOutlook::Waitlisted { ahead, free_seats } => {
            format!("waitlisted ({ahead} ahead, {free_seats} free)")
        }
    }
}

fn print_statistics(stats: &ApprovalStatistics) {
    println!(
        "- {} requests | {} pending | {} under review | {} approved | {} rejected | {} cancelled",
        stats.total,
        stats.pending,
        stats.under_review,
        stats.approved,
        stats.rejected,
        stats.cancelled
    );
    println!(
        "- approval rate {:.0}% | mean resolution {:.2} h",
        stats.approval_rate * 100.0,
        stats.mean_resolution_hours
    );
}
