/// Conversation items the client can create.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Item {
    #[serde(rename = "function_call_output")]
    FunctionCallOutput(FunctionCallOutputItem),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallOutputItem {
    /// The ID of the function call this output answers.
    call_id: String,

    /// The result payload, JSON serialized to a string.
    output: String,
}

impl FunctionCallOutputItem {
    pub fn new(call_id: &str, output: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            output: output.to_string(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

/// A conversation item as reported by the service. Only the fields the
/// session manager reads are kept.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ItemResource {
    id: Option<String>,

    #[serde(rename = "type")]
    item_type: Option<String>,

    role: Option<String>,
}

impl ItemResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}
