//! CSV roster import used to seed student and group directories.
//!
//! Students: `student_id,name,email,faculty,program,semester,gpa,current_group`
//! Groups: `group_id,course_id,course_name,faculty,program,classroom_id,capacity,enrolled`

mod parser;

use std::io::Read;
use std::path::Path;

use crate::workflows::schedule_change::domain::{AcademicStanding, Resource, ResourceId, Student};

/// One student row with its standing snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterStudent {
    pub student: Student,
    pub standing: AcademicStanding,
    pub current_group: Option<ResourceId>,
}

/// One group row with its current enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterGroup {
    pub resource: Resource,
    pub enrolled: u32,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Roster {
    pub students: Vec<RosterStudent>,
    pub groups: Vec<RosterGroup>,
}

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    UnknownGroup { student: String, group: String },
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster export: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::UnknownGroup { student, group } => write!(
                f,
                "student {} is assigned to unknown group {}",
                student, group
            ),
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::UnknownGroup { .. } => None,
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        students: P,
        groups: Q,
    ) -> Result<Roster, RosterImportError> {
        let students = std::fs::File::open(students)?;
        let groups = std::fs::File::open(groups)?;
        Self::from_readers(students, groups)
    }

    /// Every student's `current_group` must name a group in the same import.
    pub fn from_readers<S: Read, G: Read>(
        students: S,
        groups: G,
    ) -> Result<Roster, RosterImportError> {
        let groups = parser::parse_groups(groups)?;
        let students = parser::parse_students(students)?;

        for entry in &students {
            if let Some(group) = &entry.current_group {
                if !groups.iter().any(|candidate| &candidate.resource.id == group) {
                    return Err(RosterImportError::UnknownGroup {
                        student: entry.student.id.0.clone(),
                        group: group.0.clone(),
                    });
                }
            }
        }

        Ok(Roster { students, groups })
    }
}
