//! Plain-text grid tables and the simulation report.
//!
//! ```text
//! +------------+----------------------------------+
//! | Real ID    | Pseudonym                        |
//! +============+==================================+
//! | S12345     | 3f9c...                          |
//! +------------+----------------------------------+
//! ```

use std::fmt::Write as _;

use shroud_protocol::{FinalRecord, Grade, Pseudonym, RealId};

/// Render `rows` under `headers` as a grid table.
///
/// Column widths follow the widest cell by character count. Rows shorter
/// than the header are padded with empty cells.
pub fn grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&rule_line(&widths, '-'));
    out.push('\n');
    out.push_str(&row_line(&widths, headers.iter().copied()));
    out.push('\n');
    out.push_str(&rule_line(&widths, '='));
    out.push('\n');
    for row in rows {
        out.push_str(&row_line(&widths, row.iter().map(String::as_str)));
        out.push('\n');
        out.push_str(&rule_line(&widths, '-'));
        out.push('\n');
    }
    if rows.is_empty() {
        out.push_str(&rule_line(&widths, '-'));
        out.push('\n');
    }
    out
}

fn rule_line(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.extend(std::iter::repeat(fill).take(w + 2));
        line.push('+');
    }
    line
}

fn row_line<'a>(widths: &[usize], mut cells: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::from("|");
    for w in widths {
        let cell = cells.next().unwrap_or("");
        let pad = w - cell.chars().count();
        let _ = write!(out, " {cell}{} |", " ".repeat(pad));
    }
    out
}

pub fn assignments_table(assignments: &[(RealId, Pseudonym)]) -> String {
    let rows: Vec<Vec<String>> = assignments
        .iter()
        .map(|(r, p)| vec![r.to_string(), p.to_string()])
        .collect();
    grid(&["Real ID", "Pseudonym"], &rows)
}

pub fn published_table<'a>(
    published: impl IntoIterator<Item = (&'a Pseudonym, &'a Grade)>,
) -> String {
    let rows: Vec<Vec<String>> = published
        .into_iter()
        .map(|(p, g)| vec![p.to_string(), g.to_string()])
        .collect();
    grid(&["Pseudonym", "Grade"], &rows)
}

/// Final records, with a display name looked up per real id.
pub fn final_table(records: &[FinalRecord], name_of: impl Fn(&RealId) -> String) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                name_of(&r.real_id),
                r.real_id.to_string(),
                r.pseudonym.to_string(),
                r.grade.to_string(),
            ]
        })
        .collect();
    grid(&["Name", "Real ID", "Pseudonym", "Grade"], &rows)
}

/// Everything `simulate --report` writes.
pub struct SimulationReport<'a> {
    pub generated_at: String,
    pub assignments: &'a str,
    pub published: &'a str,
    pub final_records: &'a str,
}

impl SimulationReport<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "SHROUD ANONYMOUS SUBMISSION REPORT");
        let _ = writeln!(out, "==================================");
        let _ = writeln!(out, "Generated {}\n", self.generated_at);

        let _ = writeln!(out, "Protocol steps");
        let _ = writeln!(out, "--------------");
        for step in [
            "1. Registration: principals register their real id and public key.",
            "2. Pseudonym issuance: the Authority seals a fresh pseudonym to each principal.",
            "3. Submission: work is signed and sent under the pseudonym only.",
            "4. Grading: the Authority grades by pseudonym.",
            "5. Publishing: grades are published by pseudonym.",
            "6. Final mapping: the Authority alone resolves pseudonyms to real ids.",
        ] {
            let _ = writeln!(out, "{step}");
        }
        out.push('\n');

        let _ = writeln!(out, "Pseudonym assignments (Authority only):");
        out.push_str(self.assignments);
        out.push('\n');
        let _ = writeln!(out, "Published grades (public):");
        out.push_str(self.published);
        out.push('\n');
        let _ = writeln!(out, "Final records (Authority only):");
        out.push_str(self.final_records);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_layout() {
        let table = grid(
            &["Name", "Grade"],
            &[vec!["Alice".into(), "85".into()], vec!["Bo".into(), "100".into()]],
        );
        let expected = "\
+-------+-------+
| Name  | Grade |
+=======+=======+
| Alice | 85    |
+-------+-------+
| Bo    | 100   |
+-------+-------+
";
        assert_eq!(table, expected);
    }

    #[test]
    fn empty_grid_still_closes() {
        let table = grid(&["A"], &[]);
        assert_eq!(table, "+---+\n| A |\n+===+\n+---+\n");
    }

    #[test]
    fn final_table_uses_names() {
        let p = Pseudonym::mint();
        let records = vec![FinalRecord {
            real_id: RealId::new("S1"),
            pseudonym: p.clone(),
            grade: 90,
        }];
        let table = final_table(&records, |_| "Alice".to_string());
        assert!(table.contains("| Alice |"));
        assert!(table.contains(p.as_str()));
    }
}
