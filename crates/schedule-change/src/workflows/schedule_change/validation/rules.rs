use super::super::capacity::CapacityTracker;
use super::super::repository::ResourceDirectory;
use super::{ValidationError, ValidationFailure, ValidationInput, ValidationOutcome, Validator};

/// The requested group must belong to the student's faculty, and to their program when the
/// group is program-restricted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacultyValidator;

impl Validator for FacultyValidator {
    fn name(&self) -> &'static str {
        "faculty"
    }

    fn evaluate(&self, input: &ValidationInput<'_>) -> Result<ValidationOutcome, ValidationError> {
        let standing = input.standing;
        let requested = input.requested;

        if !requested
            .faculty
            .trim()
            .eq_ignore_ascii_case(standing.faculty.trim())
        {
            return Ok(ValidationOutcome::Fail(ValidationFailure::FacultyMismatch {
                student_faculty: standing.faculty.clone(),
                resource_faculty: requested.faculty.clone(),
            }));
        }

        if let Some(program) = &requested.program {
            if !program.trim().eq_ignore_ascii_case(standing.program.trim()) {
                return Ok(ValidationOutcome::Fail(ValidationFailure::ProgramMismatch {
                    student_program: standing.program.clone(),
                    resource_program: program.clone(),
                }));
            }
        }

        Ok(ValidationOutcome::Pass)
    }
}

/// Submission must fall inside the active period's change window.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarValidator;

impl Validator for CalendarValidator {
    fn name(&self) -> &'static str {
        "calendar"
    }

    fn evaluate(&self, input: &ValidationInput<'_>) -> Result<ValidationOutcome, ValidationError> {
        let Some(period) = input.period else {
            return Ok(ValidationOutcome::Fail(ValidationFailure::NoActivePeriod));
        };

        if period.accepts(input.submitted_at) {
            Ok(ValidationOutcome::Pass)
        } else {
            Ok(ValidationOutcome::Fail(
                ValidationFailure::OutsideChangeWindow {
                    period: period.name.clone(),
                    window_start: period.change_window_start,
                    window_end: period.change_window_end,
                },
            ))
        }
    }
}

/// Fails when the requested group is at or above capacity.
pub struct CapacityValidator<D> {
    tracker: CapacityTracker<D>,
}

impl<D> CapacityValidator<D>
where
    D: ResourceDirectory,
{
    pub fn new(tracker: CapacityTracker<D>) -> Self {
        Self { tracker }
    }
}

impl<D> Validator for CapacityValidator<D>
where
    D: ResourceDirectory,
{
    fn name(&self) -> &'static str {
        "capacity"
    }

    fn evaluate(&self, input: &ValidationInput<'_>) -> Result<ValidationOutcome, ValidationError> {
        let occupancy = self.tracker.occupancy(&input.requested.id)?;

        if occupancy.has_available_seat() {
            Ok(ValidationOutcome::Pass)
        } else {
            Ok(ValidationOutcome::Fail(ValidationFailure::NoAvailableSeats {
                resource_id: input.requested.id.clone(),
                enrolled: occupancy.enrolled,
                capacity: occupancy.capacity,
            }))
        }
    }
}
