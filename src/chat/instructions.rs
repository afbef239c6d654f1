// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! System instructions and named presets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Resolves preset names to instruction text.
#[cfg_attr(test, mockall::automock)]
pub trait InstructionRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;

    /// Names of all presets, sorted.
    fn names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// System instruction given when a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SystemInstruction {
    /// Literal instruction text.
    Text(String),
    /// Name of a registered preset.
    Preset(String),
}

impl SystemInstruction {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn preset(name: impl Into<String>) -> Self {
        Self::Preset(name.into())
    }

    /// Resolve to instruction text. Empty text resolves to `None`.
    pub fn resolve(&self, registry: &dyn InstructionRegistry) -> Result<Option<String>, ChatError> {
        match self {
            Self::Text(text) => {
                let text = text.trim();
                Ok((!text.is_empty()).then(|| text.to_string()))
            }
            Self::Preset(name) => registry
                .resolve(name)
                .map(Some)
                .ok_or_else(|| {
                    ChatError::Validation(format!(
                        "Unknown system instruction preset '{}'. Available: {}",
                        name,
                        registry.names().join(", ")
                    ))
                }),
        }
    }
}

/// Built-in presets, extendable at runtime.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: HashMap<String, String>,
}

impl PresetRegistry {
    /// Registry containing the built-in presets.
    pub fn new() -> Self {
        let presets = [
            ("default", "You are a helpful assistant."),
            ("concise", "You are a helpful assistant. Be concise and answer in as few words as the question allows."),
            (
                "tutor",
                "You are a patient tutor. Explain concepts step by step and check understanding with short questions.",
            ),
            (
                "code_reviewer",
                "You are a careful code reviewer. Point out bugs, unclear naming and missing tests, most important first.",
            ),
            (
                "translator",
                "You translate the user's text. Preserve meaning and tone; reply with the translation only.",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { presets }
    }

    /// Registry with no presets.
    pub fn empty() -> Self {
        Self {
            presets: HashMap::new(),
        }
    }

    /// Add or replace a preset.
    pub fn register(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.presets.insert(name.into(), text.into());
    }

    pub fn with_preset(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.register(name, text);
        self
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionRegistry for PresetRegistry {
    fn resolve(&self, name: &str) -> Option<String> {
        self.presets.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.presets.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_text_instruction() {
        let registry = PresetRegistry::empty();
        assert_eq!(
            SystemInstruction::text(" Be concise ").resolve(&registry).unwrap(),
            Some("Be concise".to_string())
        );
        assert_eq!(SystemInstruction::text("  ").resolve(&registry).unwrap(), None);
    }

    #[test]
    fn test_builtin_preset() {
        let registry = PresetRegistry::new();
        let text = SystemInstruction::preset("concise").resolve(&registry).unwrap().unwrap();
        assert!(text.contains("concise"));
        assert!(registry.names().contains(&"tutor".to_string()));
    }

    #[test]
    fn test_unknown_preset_is_validation_error() {
        let registry = PresetRegistry::new();
        let err = SystemInstruction::preset("pirate").resolve(&registry).unwrap_err();
        match err {
            ChatError::Validation(msg) => {
                assert!(msg.contains("pirate"));
                assert!(msg.contains("concise"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_through_mock_registry() {
        let mut registry = MockInstructionRegistry::new();
        registry
            .expect_resolve()
            .with(eq("house_style"))
            .times(1)
            .returning(|_| Some("Answer in British English.".to_string()));

        let text = SystemInstruction::preset("house_style").resolve(&registry).unwrap();
        assert_eq!(text.as_deref(), Some("Answer in British English."));
    }

    #[test]
    fn test_mock_registry_miss_lists_names() {
        let mut registry = MockInstructionRegistry::new();
        registry.expect_resolve().returning(|_| None);
        registry
            .expect_names()
            .returning(|| vec!["a".to_string(), "b".to_string()]);

        let err = SystemInstruction::preset("c").resolve(&registry).unwrap_err();
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn test_register_preset() {
        let registry = PresetRegistry::empty().with_preset("pirate", "Talk like a pirate.");
        assert_eq!(registry.resolve("pirate").as_deref(), Some("Talk like a pirate."));
    }

    #[test]
    fn test_instruction_serde() {
        let json = serde_json::to_string(&SystemInstruction::preset("tutor")).unwrap();
        assert_eq!(json, r#"{"kind":"preset","value":"tutor"}"#);
    }
}
