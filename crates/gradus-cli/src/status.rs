use std::fmt::Write as _;

use gradus_db::StepStatus;

/// Render the status table: one line per step, current position last.
pub fn render_status(statuses: &[StepStatus], current: Option<&str>) -> String {
    let width = statuses
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max(4);

    let mut out = String::new();
    for status in statuses {
        let state = match (&status.applied_at, status.declared) {
            (Some(at), true) => format!("applied  {}", at.format("%Y-%m-%d %H:%M:%S")),
            (Some(at), false) => format!("applied  {} (not declared)", at.format("%Y-%m-%d %H:%M:%S")),
            (None, true) => "pending".to_string(),
            (None, false) => "reverted (not declared)".to_string(),
        };
        let _ = writeln!(out, "  {:<width$}  {state}", status.name);
    }

    let pending = statuses
        .iter()
        .filter(|s| s.declared && s.applied_at.is_none())
        .count();
    let _ = writeln!(out);
    let _ = writeln!(out, "  Position:  {}", current.unwrap_or("none"));
    let _ = writeln!(out, "  Pending:   {pending}");
    out
}
