use flowstate_stream::{StepEvent, StepKind};

/// Formats one step as a single terminal line.
///
/// Steps without a backend timestamp are stamped with `fallback_time`.
pub fn format_step(step: &StepEvent, fallback_time: &str) -> String {
    let time = step.timestamp().unwrap_or(fallback_time);
    let marker = match step.kind {
        StepKind::Routing => "->",
        StepKind::Action => "..",
        StepKind::Tool => "##",
        StepKind::Completion => "ok",
    };
    let mut line = format!("[{time}] {marker} {}: {}", step.agent(), step.message());
    if let Some(tool) = step.tool_name().filter(|tool| *tool != step.message()) {
        line.push_str(&format!(" (tool: {tool})"));
    }
    line
}

/// Local wall-clock time in the same shape as backend step timestamps.
pub fn local_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
