use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// How the assistant picks functions: one of the `"auto"`/`"none"`/
/// `"required"` literals, or the name of a specific function.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Specific(String),
}

impl ToolChoice {
    pub fn as_str(&self) -> &str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Required => "required",
            ToolChoice::Specific(s) => s.as_str(),
        }
    }
}

impl Serialize for ToolChoice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for ToolChoice {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "auto" => ToolChoice::Auto,
            "none" => ToolChoice::None,
            "required" => ToolChoice::Required,
            _ => ToolChoice::Specific(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for ToolChoice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ToolChoice::from_str(&s).unwrap())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Tool {
    #[serde(rename = "function")]
    Function(FunctionTool),
}

impl Tool {
    pub fn function(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Tool::Function(FunctionTool::new(name, description, parameters))
    }
}

/// A function declaration advertised to the assistant, with JSON Schema
/// parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl FunctionTool {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::ToolChoice;

    #[test]
    fn serialize_tool_choice_as_string_literals() {
        assert_eq!(
            serde_json::to_value(ToolChoice::Auto).unwrap(),
            serde_json::json!("auto")
        );
        assert_eq!(
            serde_json::to_value(ToolChoice::None).unwrap(),
            serde_json::json!("none")
        );
        assert_eq!(
            serde_json::to_value(ToolChoice::Required).unwrap(),
            serde_json::json!("required")
        );
        assert_eq!(
            serde_json::to_value(ToolChoice::Specific("play".to_string())).unwrap(),
            serde_json::json!("play")
        );
    }

    #[test]
    fn deserialize_tool_choice() {
        let choice: ToolChoice = serde_json::from_str(r#""auto""#).unwrap();
        assert_eq!(choice, ToolChoice::Auto);

        let choice: ToolChoice = serde_json::from_str(r#""set_volume""#).unwrap();
        assert_eq!(choice, ToolChoice::Specific("set_volume".to_string()));
    }
}
