//! Markdown rendering of a [`ValidationResult`].

use std::fmt::Write;

use super::{CheckResult, ValidationResult};

/// Items listed per check before the rest are summarised.
const MAX_ITEMS_PER_CHECK: usize = 50;

/// Render the operational review report: summary counts, a check table and
/// the issues of every failing check.
pub fn render_markdown(result: &ValidationResult) -> String {
    let mut out = String::new();
    let s = &result.summary;

    let _ = writeln!(out, "# Validation report: {}", result.contract_id);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "**Status:** {}",
        if result.is_valid { "valid" } else { "INVALID" }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "| | count |");
    let _ = writeln!(out, "|---|---|");
    let _ = writeln!(out, "| documents | {} |", s.documents);
    let _ = writeln!(out, "| chunks | {} |", s.chunks);
    let _ = writeln!(out, "| references | {} |", s.references);
    let _ = writeln!(out, "| overrides | {} |", s.overrides);
    let _ = writeln!(out, "| checks passed | {}/{} |", s.checks_passed, s.checks_run);
    let _ = writeln!(out, "| error items | {} |", s.error_items);
    let _ = writeln!(out, "| warning items | {} |", s.warning_items);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Checks");
    let _ = writeln!(out);
    let _ = writeln!(out, "| # | check | severity | result |");
    let _ = writeln!(out, "|---|---|---|---|");
    for (i, check) in result.checks.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            i + 1,
            check.title,
            check.severity.as_str(),
            if check.passed() {
                "pass".to_string()
            } else {
                format!("{} item(s)", check.items.len())
            }
        );
    }

    if !result.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Errors");
        for check in &result.errors {
            write_check(&mut out, check);
        }
    }
    if !result.warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Warnings");
        for check in &result.warnings {
            write_check(&mut out, check);
        }
    }
    out
}

fn write_check(out: &mut String, check: &CheckResult) {
    let _ = writeln!(out);
    let _ = writeln!(out, "### {} (`{}`)", check.title, check.code);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", check.message);
    let _ = writeln!(out);
    for item in check.items.iter().take(MAX_ITEMS_PER_CHECK) {
        let _ = write!(out, "- {}", item.message);
        if let Some(suggestion) = &item.suggestion {
            let _ = write!(out, " (suggested: {})", suggestion);
        }
        let _ = writeln!(out);
    }
    if check.items.len() > MAX_ITEMS_PER_CHECK {
        let _ = writeln!(
            out,
            "- ... and {} more",
            check.items.len() - MAX_ITEMS_PER_CHECK
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractDocument, DocumentGroup};
    use crate::snapshot::ContractSnapshot;
    use crate::validation::ValidationEngine;

    #[test]
    fn test_report_lists_summary_and_issues() {
        let doc = ContractDocument::new("c7", DocumentGroup::Addendum, "Appendix D", 1)
            .with_file_name("Appendix_D_Schedule.pdf");
        let mut snapshot = ContractSnapshot::new("c7");
        snapshot.documents = vec![doc];
        let result = ValidationEngine::default().validate(&snapshot);
        let md = render_markdown(&result);

        assert!(md.starts_with("# Validation report: c7"));
        assert!(md.contains("**Status:** valid"));
        assert!(md.contains("| documents | 1 |"));
        assert!(md.contains("## Warnings"));
        assert!(md.contains("(suggested: schedule)"));
        assert!(!md.contains("## Errors"));
    }
}
