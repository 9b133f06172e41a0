use talon_core::ValidationReport;

use crate::classify::RepairInstruction;

/// Render one consolidated repair prompt: skill identity, iteration budget,
/// the severity-sorted instruction list, bounded output excerpts, and the
/// task statement. Instructions must already be sorted by the classifier.
pub fn build_repair_prompt(
    report: &ValidationReport,
    instructions: &[RepairInstruction],
    iteration: u32,
    max_iterations: u32,
    excerpt_bytes: usize,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "The skill '{}' at {} failed validation (repair attempt {} of {}).\n\n",
        report.skill_name,
        report.script_path,
        iteration + 1,
        max_iterations
    ));

    prompt.push_str("Issues, most severe first:\n");
    for (i, instr) in instructions.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{:?}/{:?}] {}\n   Fix: {}\n",
            i + 1,
            instr.severity,
            instr.issue_type,
            instr.description,
            instr.suggested_fix
        ));
        if let Some(loc) = &instr.code_location {
            prompt.push_str(&format!("   Location: {loc}\n"));
        }
    }

    if !report.stdout.trim().is_empty() {
        prompt.push_str(&format!(
            "\nCaptured stdout (excerpt):\n{}\n",
            excerpt(&report.stdout, excerpt_bytes)
        ));
    }
    if !report.stderr.trim().is_empty() {
        prompt.push_str(&format!(
            "\nCaptured stderr (excerpt):\n{}\n",
            excerpt(&report.stderr, excerpt_bytes)
        ));
    }

    prompt.push_str(
        "\nTask: rewrite the skill script to resolve the issues above, fixing the most \
         severe classes first. Return the complete corrected source file. The skill must \
         remain independently executable with the same invocation and keep printing its \
         results to standard output.\n",
    );

    prompt
}

fn excerpt(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.trim_end().to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\n[... {} more bytes]", &text[..cut].trim_end(), text.len() - cut)
}
