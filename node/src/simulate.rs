//! In-process run of the reference exchange: one Authority, five students,
//! every protocol step in order.

use anyhow::{Context, Result};
use std::path::Path;

use shroud_protocol::{Authority, Participant, RealId};

use crate::report::{self, SimulationReport};

const STUDENTS: [(&str, &str, &str); 5] = [
    ("Alice", "S12345", "This is Alice's essay on cryptography."),
    ("Bob", "S23456", "Bob's analysis of the RSA algorithm and its applications."),
    ("Charlie", "S34567", "Charlie's research on quantum-resistant cryptographic methods."),
    ("David", "S45678", "David's implementation of a secure communication protocol."),
    ("Eve", "S56789", "Eve's study on side-channel attacks in modern cryptosystems."),
];

const GRADES: [u32; 5] = [85, 92, 78, 95, 88];

/// Tables produced by one run.
pub struct SimulationOutcome {
    pub assignments: String,
    pub published: String,
    pub final_records: String,
    /// `(name, grade seen by the student)` in roster order.
    pub observed: Vec<(String, Option<u32>)>,
}

/// Run the exchange against `authority`.
pub fn run(authority: &Authority) -> Result<SimulationOutcome> {
    let mut students: Vec<Participant> = STUDENTS
        .iter()
        .map(|(name, id, _)| Participant::new(*name, RealId::new(*id), authority.public_key()))
        .collect();

    tracing::info!(count = students.len(), "registering students");
    for student in &students {
        student
            .register(authority)
            .with_context(|| format!("registering {}", student.name()))?;
    }

    for student in &mut students {
        student
            .request_pseudonym(authority)
            .with_context(|| format!("pseudonym for {}", student.name()))?;
    }

    for (student, (_, _, content)) in students.iter_mut().zip(STUDENTS.iter()) {
        student
            .submit_work(authority, content)
            .with_context(|| format!("submission from {}", student.name()))?;
    }

    // Grading works from the Authority's pseudonym list only.
    for (pseudonym, grade) in authority.submission_pseudonyms().iter().zip(GRADES) {
        authority.grade_submission(pseudonym, grade)?;
    }
    let published = authority.publish_grades();

    let mut observed = Vec::with_capacity(students.len());
    for student in &mut students {
        let grade = student.check_grade(authority)?;
        observed.push((student.name().to_string(), grade));
    }

    let final_records = authority.final_records();
    let name_of = |real_id: &RealId| {
        students
            .iter()
            .find(|s| s.real_id() == real_id)
            .map(|s| s.name().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    Ok(SimulationOutcome {
        assignments: report::assignments_table(&authority.pseudonym_assignments()),
        published: report::published_table(&published),
        final_records: report::final_table(&final_records, name_of),
        observed,
    })
}

/// Print the outcome and optionally write the report file.
pub fn present(outcome: &SimulationOutcome, report_path: Option<&Path>) -> Result<()> {
    println!("Grades seen by students:");
    for (name, grade) in &outcome.observed {
        match grade {
            Some(g) => println!("  {name:<8} {g}"),
            None => println!("  {name:<8} not yet graded"),
        }
    }
    println!();
    println!("Published grades (public):");
    print!("{}", outcome.published);
    println!();
    println!("Final records (Authority only):");
    print!("{}", outcome.final_records);

    if let Some(path) = report_path {
        let text = SimulationReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            assignments: &outcome.assignments,
            published: &outcome.published,
            final_records: &outcome.final_records,
        }
        .render();
        std::fs::write(path, text)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!();
        println!("Report saved to {}", path.display());
    }
    Ok(())
}
