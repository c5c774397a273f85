// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The tool capability and its registry.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use weft_common_core::{ToolDefinition, ToolError, ToolParameter};

/// A tool the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
	fn name(&self) -> &str;

	fn description(&self) -> &str;

	fn parameters(&self) -> Vec<ToolParameter> {
		Vec::new()
	}

	fn to_definition(&self) -> ToolDefinition {
		ToolDefinition {
			name: self.name().to_string(),
			description: self.description().to_string(),
			parameters: self.parameters(),
		}
	}

	async fn invoke(&self, args: serde_json::Map<String, Value>) -> Result<Value, ToolError>;
}

/// The external execution capability consumed by the tool loop. Passed
/// into the loop's configuration as a value, never a global handler.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
	async fn execute(
		&self,
		name: &str,
		args: serde_json::Map<String, Value>,
	) -> Result<Value, ToolError>;
}

/// Name-indexed collection of tools.
pub struct ToolRegistry {
	tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
	pub fn new() -> Self {
		Self {
			tools: HashMap::new(),
		}
	}

	pub fn register(&mut self, tool: Box<dyn Tool>) {
		let name = tool.name().to_string();
		tracing::debug!(tool_name = %name, "registering tool");
		self.tools.insert(name, tool);
	}

	pub fn get(&self, name: &str) -> Option<&dyn Tool> {
		self.tools.get(name).map(|t| t.as_ref())
	}

	pub fn definitions(&self) -> Vec<ToolDefinition> {
		self.tools.values().map(|t| t.to_definition()).collect()
	}
}

impl Default for ToolRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
	async fn execute(
		&self,
		name: &str,
		args: serde_json::Map<String, Value>,
	) -> Result<Value, ToolError> {
		let tool = self
			.get(name)
			.ok_or_else(|| ToolError::NotFound(name.to_string()))?;
		tool.invoke(args).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	struct MockTool {
		name: String,
	}

	#[async_trait]
	impl Tool for MockTool {
		fn name(&self) -> &str {
			&self.name
		}

		fn description(&self) -> &str {
			"A mock tool for testing"
		}

		async fn invoke(&self, args: serde_json::Map<String, Value>) -> Result<Value, ToolError> {
			Ok(serde_json::json!({"echo": args}))
		}
	}

	#[tokio::test]
	async fn executor_dispatches_to_registered_tool() {
		let mut registry = ToolRegistry::new();
		registry.register(Box::new(MockTool {
			name: "echo".to_string(),
		}));

		let mut args = serde_json::Map::new();
		args.insert("k".to_string(), serde_json::json!("v"));
		let result = registry.execute("echo", args).await.unwrap();
		assert_eq!(result["echo"]["k"], "v");
	}

	#[tokio::test]
	async fn executor_reports_unknown_tool() {
		let registry = ToolRegistry::new();
		let result = registry.execute("nope", serde_json::Map::new()).await;
		assert!(matches!(result, Err(ToolError::NotFound(_))));
	}

	proptest! {
			/// Any registered tool is retrievable by its exact name, and
			/// definitions() yields one entry per tool.
			#[test]
			fn registry_roundtrips_names(
					names in prop::collection::hash_set("[a-zA-Z][a-zA-Z0-9_]{0,20}", 0..8)
			) {
					let mut registry = ToolRegistry::new();
					for name in &names {
							registry.register(Box::new(MockTool { name: name.clone() }));
					}

					for name in &names {
							prop_assert!(registry.get(name).is_some());
					}
					prop_assert_eq!(registry.definitions().len(), names.len());
			}
	}
}
