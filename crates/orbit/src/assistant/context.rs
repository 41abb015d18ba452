use orbit_protocol::DocumentKind;

/// Characters of the current document included in a prompt.
const PREVIEW_CHARS: usize = 500;

/// Build the prompt preamble handed to the assistant CLI.
pub fn build_context(kind: DocumentKind, project: Option<&str>, snapshot: &str) -> String {
    let mut context = format!(
        "You're helping refine a {} using DH guide structure.",
        kind.label()
    );

    if let Some(project) = project.filter(|p| !p.trim().is_empty()) {
        context.push_str("\nProject: ");
        context.push_str(project);
    }

    if !snapshot.trim().is_empty() {
        context.push_str("\nCurrent content:\n");
        context.push_str(&preview(snapshot));
    }

    context.push_str(
        "\nTask: Ask clarifying multiple-choice questions to improve specificity. \
         Use DH structure. Be token-efficient.",
    );
    context
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
