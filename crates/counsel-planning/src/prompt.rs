//! Planner prompt rendering

use counsel_core::{ExecutorId, HistoryMessage, Profile};

/// Longest history message shown to the planner, in characters
pub const HISTORY_MESSAGE_LIMIT: usize = 200;

const ADVISOR_ROLE: &str = "You are the COORDINATOR of a multi-agent academic advising system.

Your job is to understand what the student really needs, decide which \
specialized agents can help, and plan the order in which they are consulted. \
Think like an advisor, not a router: the student should finish their degree \
on time while staying in good health.";

/// Render the last `window` history messages, each cut to the display limit
pub fn format_history(history: &[HistoryMessage], window: usize) -> String {
    if history.is_empty() || window == 0 {
        return "(no previous conversation)".to_string();
    }
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role, truncate(&m.content, HISTORY_MESSAGE_LIMIT)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_profile(profile: &Profile) -> String {
    if profile.is_empty() {
        return "(no profile information)".to_string();
    }
    profile
        .iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("- {}: {}", key, s),
            other => format!("- {}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

pub fn render_planner_prompt(
    query: &str,
    profile: &Profile,
    history: &[HistoryMessage],
    history_window: usize,
    executors: &[ExecutorId],
) -> String {
    let mut agents = counsel_agent::capability::describe_all(executors);
    for id in executors {
        if counsel_agent::capability::lookup(id).is_none() {
            agents.push_str(&format!("\nAgent: {}\n", id));
        }
    }

    format!(
        r#"{role}

AVAILABLE AGENTS AND THEIR CAPABILITIES:

{agents}

STUDENT CONTEXT:
{profile}

CONVERSATION HISTORY:
{history}

CURRENT QUERY:
"{query}"

Decide which agents to consult and in what order. Agents listed together in
one parallel stage must not depend on each other's results. Use an empty
execution_order when the question can be answered without any agent. Ask for
clarification only when the query is genuinely ambiguous, and never ask about
something the student context already answers.

RESPOND IN JSON FORMAT:
{{
    "understanding": {{
        "student_goal": "What the student is trying to achieve",
        "underlying_concern": "The deeper concern"
    }},
    "workflow_plan": {{
        "goal": "Clear statement of what we're trying to achieve",
        "reasoning": "Why this workflow makes sense",
        "execution_order": ["agent1", "agent2"],
        "parallel_stages": [["agent1", "agent2"]],
        "expected_challenges": ["What might go wrong"],
        "success_criteria": "How we know we succeeded"
    }},
    "confidence": 0.0-1.0,
    "needs_clarification": false,
    "clarification_questions": [
        {{"question": "...", "why": "...", "type": "major", "options": ["..."]}}
    ]
}}
"#,
        role = ADVISOR_ROLE,
        agents = agents,
        profile = format_profile(profile),
        history = format_history(history, history_window),
        query = query,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_window_and_truncation() {
        let history = vec![
            HistoryMessage::user("first"),
            HistoryMessage::assistant("x".repeat(300)),
            HistoryMessage::user("third"),
        ];
        let text = format_history(&history, 2);
        assert!(!text.contains("first"));
        assert!(text.contains(&format!("assistant: {}...", "x".repeat(200))));
        assert!(text.ends_with("user: third"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("é".repeat(3).as_str(), 2), "éé...");
        assert_eq!(truncate("short", 200), "short");
    }

    #[test]
    fn test_prompt_lists_registered_agents_only() {
        let prompt = render_planner_prompt(
            "Can I add a minor?",
            &Profile::new(),
            &[],
            10,
            &[ExecutorId::from("policy_compliance"), ExecutorId::from("custom")],
        );
        assert!(prompt.contains("(policy_compliance)"));
        assert!(prompt.contains("Agent: custom"));
        assert!(!prompt.contains("(academic_planning)"));
        assert!(prompt.contains("\"Can I add a minor?\""));
    }
}
