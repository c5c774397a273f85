// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Tool definition and invocation types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON type of a tool parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
	String,
	Number,
	Integer,
	Boolean,
	Array,
	Object,
}

impl ParameterKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ParameterKind::String => "string",
			ParameterKind::Number => "number",
			ParameterKind::Integer => "integer",
			ParameterKind::Boolean => "boolean",
			ParameterKind::Array => "array",
			ParameterKind::Object => "object",
		}
	}
}

/// A named parameter of a tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolParameter {
	pub name: String,
	pub kind: ParameterKind,
	pub description: String,
	pub required: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub enum_values: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<Value>,
}

impl ToolParameter {
	pub fn new(name: impl Into<String>, kind: ParameterKind, description: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			kind,
			description: description.into(),
			required: false,
			enum_values: Vec::new(),
			default: None,
		}
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	pub fn with_enum_values(mut self, values: Vec<String>) -> Self {
		self.enum_values = values;
		self
	}

	pub fn with_default(mut self, default: Value) -> Self {
		self.default = Some(default);
		self
	}
}

/// Definition of a tool the model may invoke.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
	pub name: String,
	pub description: String,
	#[serde(default)]
	pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
	pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
		let name = name.into();
		tracing::debug!(tool_name = %name, "creating tool definition");
		Self {
			name,
			description: description.into(),
			parameters: Vec::new(),
		}
	}

	pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
		self.parameters.push(parameter);
		self
	}

	/// Renders the parameter list as a JSON-schema object for vendor
	/// request adapters.
	pub fn to_input_schema(&self) -> Value {
		let mut properties = serde_json::Map::new();
		let mut required = Vec::new();
		for param in &self.parameters {
			let mut schema = serde_json::Map::new();
			schema.insert("type".to_string(), Value::String(param.kind.as_str().to_string()));
			schema.insert(
				"description".to_string(),
				Value::String(param.description.clone()),
			);
			if !param.enum_values.is_empty() {
				schema.insert(
					"enum".to_string(),
					Value::Array(
						param
							.enum_values
							.iter()
							.map(|v| Value::String(v.clone()))
							.collect(),
					),
				);
			}
			if let Some(default) = &param.default {
				schema.insert("default".to_string(), default.clone());
			}
			properties.insert(param.name.clone(), Value::Object(schema));
			if param.required {
				required.push(Value::String(param.name.clone()));
			}
		}
		serde_json::json!({
				"type": "object",
				"properties": properties,
				"required": required,
		})
	}
}

/// A tool invocation parsed out of model output. Not persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
	pub name: String,
	pub arguments: serde_json::Map<String, Value>,
}

impl ToolInvocation {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			arguments: serde_json::Map::new(),
		}
	}

	pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
		self.arguments.insert(key.into(), value);
		self
	}
}

/// Lifecycle phase of a tool call within a streaming response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallPhase {
	Pending,
	Executing,
	Success,
	Error,
}

/// A tool lifecycle event, interleaved with text deltas on a stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallEvent {
	pub phase: ToolCallPhase,
	pub invocation: ToolInvocation,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl ToolCallEvent {
	pub fn pending(invocation: ToolInvocation) -> Self {
		Self {
			phase: ToolCallPhase::Pending,
			invocation,
			result: None,
			error: None,
		}
	}

	pub fn executing(invocation: ToolInvocation) -> Self {
		Self {
			phase: ToolCallPhase::Executing,
			invocation,
			result: None,
			error: None,
		}
	}

	pub fn success(invocation: ToolInvocation, result: Value) -> Self {
		Self {
			phase: ToolCallPhase::Success,
			invocation,
			result: Some(result),
			error: None,
		}
	}

	pub fn error(invocation: ToolInvocation, error: impl Into<String>) -> Self {
		Self {
			phase: ToolCallPhase::Error,
			invocation,
			result: None,
			error: Some(error.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn weather_tool() -> ToolDefinition {
		ToolDefinition::new("get_weather", "Look up current weather for a city")
			.with_parameter(
				ToolParameter::new("city", ParameterKind::String, "City name").required(),
			)
			.with_parameter(
				ToolParameter::new("units", ParameterKind::String, "Unit system")
					.with_enum_values(vec!["metric".to_string(), "imperial".to_string()])
					.with_default(serde_json::json!("metric")),
			)
	}

	#[test]
	fn input_schema_includes_required_and_enum() {
		let schema = weather_tool().to_input_schema();
		assert_eq!(schema["type"], "object");
		assert_eq!(schema["properties"]["city"]["type"], "string");
		assert_eq!(schema["required"], serde_json::json!(["city"]));
		assert_eq!(
			schema["properties"]["units"]["enum"],
			serde_json::json!(["metric", "imperial"])
		);
		assert_eq!(schema["properties"]["units"]["default"], "metric");
	}

	#[test]
	fn tool_call_event_constructors_set_phase() {
		let inv = ToolInvocation::new("get_weather")
			.with_argument("city", serde_json::json!("Tokyo"));
		assert_eq!(ToolCallEvent::pending(inv.clone()).phase, ToolCallPhase::Pending);
		assert_eq!(ToolCallEvent::executing(inv.clone()).phase, ToolCallPhase::Executing);
		let ok = ToolCallEvent::success(inv.clone(), serde_json::json!({"temp": 21}));
		assert_eq!(ok.phase, ToolCallPhase::Success);
		assert!(ok.result.is_some());
		let failed = ToolCallEvent::error(inv, "boom");
		assert_eq!(failed.phase, ToolCallPhase::Error);
		assert_eq!(failed.error.as_deref(), Some("boom"));
	}

	#[test]
	fn phase_serializes_lowercase() {
		assert_eq!(
			serde_json::to_string(&ToolCallPhase::Executing).unwrap(),
			"\"executing\""
		);
	}
}
