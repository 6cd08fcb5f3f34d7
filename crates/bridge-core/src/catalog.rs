//! Tool catalog: the server's tools, looked up by name and rendered as
//! function definitions for the model.

use bridge_types::{CatalogError, ToolDefinition, ToolDescriptor, ToolError};
use std::collections::HashMap;

/// Immutable set of tools discovered from the server at session start.
///
/// Keeps the server's listing order so the definitions sent to the model
/// are stable across requests.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build a catalog, rejecting empty or duplicate names.
    pub fn build(descriptors: Vec<ToolDescriptor>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (i, tool) in descriptors.iter().enumerate() {
            if tool.name.trim().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if index.insert(tool.name.clone(), i).is_some() {
                return Err(CatalogError::DuplicateTool {
                    name: tool.name.clone(),
                });
            }
        }
        Ok(Self {
            tools: descriptors,
            index,
        })
    }

    fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Parameter schema of the named tool.
    pub fn schema_for(&self, name: &str) -> Result<&serde_json::Value, ToolError> {
        self.get(name)
            .map(|t| &t.input_schema)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Tool names in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions for the chat-completions `tools` array.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| {
                ToolDefinition::function(
                    t.name.clone(),
                    t.description.clone(),
                    normalize_schema(&t.input_schema),
                )
            })
            .collect()
    }
}

/// Function parameters must be an object schema; servers that declare
/// nothing get an empty one.
fn normalize_schema(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Object(map) if !map.is_empty() => schema.clone(),
        _ => serde_json::json!({ "type": "object", "properties": {} }),
    }
}
