//! Name to (spec, handler) table.

use super::{ToolArguments, ToolContext, ToolError, ToolHandler, ToolSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of tools the model may call.
///
/// Built once at startup and shared read-only with the dispatch loop.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    handlers: Vec<ToolHandler>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register<F>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(&ToolArguments, &ToolContext) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        let handler: ToolHandler = Arc::new(handler);
        match self.index.get(&spec.name) {
            Some(&slot) => {
                tracing::warn!(tool = %spec.name, "replacing registered tool");
                self.specs[slot] = spec;
                self.handlers[slot] = handler;
            }
            None => {
                self.index.insert(spec.name.clone(), self.specs.len());
                self.specs.push(spec);
                self.handlers.push(handler);
            }
        }
    }

    /// Look up a handler by name, falling back to a case-insensitive match.
    pub fn resolve(&self, name: &str) -> Option<ToolHandler> {
        self.slot(name).map(|slot| Arc::clone(&self.handlers[slot]))
    }

    /// Look up a spec by name, with the same matching as [`ToolRegistry::resolve`].
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.slot(name).map(|slot| &self.specs[slot])
    }

    /// Registered specs in registration order.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn slot(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied().or_else(|| {
            self.specs
                .iter()
                .position(|spec| spec.name.eq_ignore_ascii_case(name))
        })
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ParamType;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new(), Duration::from_secs(5))
    }

    fn echo_spec(name: &str) -> ToolSpec {
        ToolSpec::new(name, "Echo the input").param("text", ParamType::String, true, "Text")
    }

    #[test]
    fn resolve_missing_is_none() {
        let registry = ToolRegistry::new();
        assert!(registry.resolve("Nope").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("Echo"), |args, _| args.require_string("text"));

        let handler = registry.resolve("Echo").unwrap();
        let args = crate::tools::extract(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(handler(&args, &ctx()).unwrap(), "hi");
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("Echo"), |_, _| Ok("first".into()));
        registry.register(echo_spec("Other"), |_, _| Ok("other".into()));
        registry.register(echo_spec("Echo"), |_, _| Ok("second".into()));

        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Echo", "Other"]);

        let handler = registry.resolve("Echo").unwrap();
        assert_eq!(handler(&ToolArguments::new(), &ctx()).unwrap(), "second");
    }

    #[test]
    fn resolve_falls_back_to_case_insensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("SendSms"), |_, _| Ok("sent".into()));

        assert!(registry.resolve("sendsms").is_some());
        assert_eq!(registry.spec("SENDSMS").map(|s| s.name.as_str()), Some("SendSms"));
    }
}
