use serde::{Deserialize, Deserializer, Serialize};

/// Kind of agent progress a step reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// The supervisor routed the request to a sub-agent.
    Routing,
    /// A sub-agent started an action.
    Action,
    /// A sub-agent invoked a tool.
    Tool,
    /// A sub-agent finished its part of the work.
    Completion,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Action => "action",
            Self::Tool => "tool",
            Self::Completion => "completion",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every step record on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBody {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agent: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One increment of agent progress, handed to the step callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(flatten)]
    pub body: StepBody,
}

impl StepEvent {
    pub fn new(kind: StepKind, agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            body: StepBody {
                agent: agent.into(),
                message: message.into(),
                tool: None,
                timestamp: None,
            },
        }
    }

    /// Builds a `tool` step; the tool name doubles as the message.
    pub fn tool(agent: impl Into<String>, tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let mut step = Self::new(StepKind::Tool, agent, tool.clone());
        step.body.tool = Some(tool);
        step
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.body.tool = Some(tool.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.body.timestamp = Some(timestamp.into());
        self
    }

    pub fn agent(&self) -> &str {
        &self.body.agent
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.body.tool.as_deref()
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.body.timestamp.as_deref()
    }

    /// Encodes this step as one `data: <json>\n` line.
    pub fn to_wire_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n", serde_json::to_string(self)?))
    }
}
