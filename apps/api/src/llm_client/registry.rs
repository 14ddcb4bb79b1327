//! Per-client model registry for providers that require explicit model
//! registration before generation calls are routed to them.

use std::collections::HashMap;

/// Request-shaping capabilities of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Accepts a `system` role message.
    pub system_role: bool,
    /// Accepts `response_format: {"type": "json_object"}`.
    pub json_output: bool,
}

impl ModelCapabilities {
    pub const BASIC_TEXT: Self = Self {
        system_role: true,
        json_output: false,
    };

    /// Assumed for providers that route any model name.
    pub const OPEN: Self = Self {
        system_role: true,
        json_output: true,
    };

    pub const fn with_json_output(self) -> Self {
        Self {
            json_output: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub supports: ModelCapabilities,
}

pub const DEEPSEEK_MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        name: "deepseek-chat",
        label: "DeepSeek Chat",
        supports: ModelCapabilities::BASIC_TEXT.with_json_output(),
    },
    ModelDescriptor {
        name: "deepseek-reasoner",
        label: "DeepSeek Reasoner",
        supports: ModelCapabilities::BASIC_TEXT,
    },
];

/// Models known to one client, keyed by `<prefix>/<name>`.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn define(&mut self, prefix: &str, descriptor: ModelDescriptor) {
        self.models
            .insert(format!("{prefix}/{}", descriptor.name), descriptor);
    }

    pub fn is_defined(&self, qualified: &str) -> bool {
        self.models.contains_key(qualified)
    }

    pub fn lookup(&self, qualified: &str) -> Option<&ModelDescriptor> {
        self.models.get(qualified)
    }
}
