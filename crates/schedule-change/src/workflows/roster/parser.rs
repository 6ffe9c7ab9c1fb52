use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::workflows::schedule_change::domain::{
    AcademicStanding, Classroom, CourseId, Resource, ResourceId, Student, StudentId,
};

use super::{RosterGroup, RosterStudent};

pub(crate) fn parse_students<R: Read>(reader: R) -> Result<Vec<RosterStudent>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut students = Vec::new();

    for record in csv_reader.deserialize::<StudentRow>() {
        let row = record?;
        let id = StudentId(row.student_id);
        students.push(RosterStudent {
            student: Student {
                id: id.clone(),
                name: row.name,
                email: row.email,
            },
            standing: AcademicStanding {
                student_id: id,
                faculty: row.faculty,
                program: row.program,
                current_semester: row.semester,
                cumulative_gpa: row.gpa,
            },
            current_group: row.current_group.map(ResourceId),
        });
    }

    Ok(students)
}

pub(crate) fn parse_groups<R: Read>(reader: R) -> Result<Vec<RosterGroup>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut groups = Vec::new();

    for record in csv_reader.deserialize::<GroupRow>() {
        let row = record?;
        groups.push(RosterGroup {
            resource: Resource {
                id: ResourceId(row.group_id),
                course_id: CourseId(row.course_id),
                course_name: row.course_name,
                faculty: row.faculty,
                program: row.program,
                classroom: Classroom {
                    id: row.classroom_id,
                    capacity: row.capacity,
                },
            },
            enrolled: row.enrolled,
        });
    }

    Ok(groups)
}

#[derive(Debug, Deserialize)]
struct StudentRow {
    student_id: String,
    name: String,
    email: String,
    faculty: String,
    program: String,
    semester: u8,
    gpa: f32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    current_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupRow {
    group_id: String,
    course_id: String,
    course_name: String,
    faculty: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    program: Option<String>,
    classroom_id: String,
    capacity: u32,
    #[serde(default)]
    enrolled: u32,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
