//! Tool dispatch table. Unknown tool names and execution failures both
//! become tool-error messages, never a fatal turn failure (spec.md §4.8).

use crate::llm::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.spec().name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".to_string(),
                description: "echoes its input".to_string(),
                parameters_schema: json!({}),
            }
        }

        async fn execute(&self, args: Value) -> Result<Value, String> {
            Ok(args)
        }
    }

    #[test]
    fn unregistered_tool_is_absent() {
        let registry = ToolRegistry::new();
        assert!(registry.get("echo").is_none());
    }

    #[tokio::test]
    async fn registered_tool_executes() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        let tool = registry.get("echo").unwrap();
        let result = tool.execute(json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }
}
