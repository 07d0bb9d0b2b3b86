use crate::messages::Message;

/// Where the loop goes after a model step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    InvokeTools,
    Terminate,
    /// The history does not end in an assistant message. Terminates the run as an error.
    Violation(String),
}

/// Decide from the last message alone. The `FINAL ANSWER` marker plays no part here.
pub fn decide(last: Option<&Message>) -> Decision {
    match last {
        Some(Message::Assistant { tool_calls, .. }) if !tool_calls.is_empty() => {
            Decision::InvokeTools
        }
        Some(Message::Assistant { .. }) => Decision::Terminate,
        Some(other) => Decision::Violation(format!(
            "expected an assistant message, found a {} message",
            other.role()
        )),
        None => Decision::Violation("history is empty".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCallRequest;
    use serde_json::json;

    #[test]
    fn routes_on_tool_calls_only() {
        let call = ToolCallRequest {
            id: "c1".to_string(),
            name: "employee_lookup".to_string(),
            arguments: json!({ "query": "Jane" }),
        };

        let marked = Message::assistant_with_calls("FINAL ANSWER: soon", vec![call]);
        assert_eq!(decide(Some(&marked)), Decision::InvokeTools);
        let plain = Message::assistant("no marker here");
        assert_eq!(decide(Some(&plain)), Decision::Terminate);
        assert_eq!(decide(Some(&Message::assistant(""))), Decision::Terminate);
    }

    #[test]
    fn non_assistant_tail_is_a_violation() {
        assert!(matches!(
            decide(Some(&Message::user("hello"))),
            Decision::Violation(reason) if reason.contains("user")
        ));
        assert!(matches!(decide(None), Decision::Violation(_)));
    }
}
