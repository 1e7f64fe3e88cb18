use pipecore::{
    Arguments, ConstructError, Parameter, ResourceFactory, ResourceMetadata, ResourceObject,
};
use std::sync::{Arc, Mutex};

pub const MODEL_CONFIG_TYPE: &str = "pipeops.ModelConfig";
pub const PROMPT_TEMPLATE_TYPE: &str = "pipeops.PromptTemplate";
pub const LLM_CLIENT_TYPE: &str = "pipeops.LlmClient";
pub const CHAT_CLIENT_TYPE: &str = "pipeops.ChatClient";
pub const HISTORY_TYPE: &str = "pipeops.InMemoryHistory";

/// Model selection shared by clients
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f64,
}

pub struct ModelConfigFactory;

impl ResourceFactory for ModelConfigFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("model_config", "llm", MODEL_CONFIG_TYPE)
            .with_label("Model Config")
            .with_description("Model name and sampling temperature")
            .with_parameter(Parameter::common("model", "str").with_label("Model"))
            .with_parameter(
                Parameter::common("temperature", "float")
                    .with_label("Temperature")
                    .with_default(0.7),
            )
    }

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        let model = args.require_str("model")?;
        if model.trim().is_empty() {
            return Err(ConstructError::Configuration("model must not be empty".into()));
        }
        let temperature = args.f64_or("temperature", 0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConstructError::InvalidArgument {
                name: "temperature".into(),
                expected: "a value between 0 and 2".into(),
                actual: temperature.to_string(),
            });
        }
        Ok(Arc::new(ModelConfig {
            model: model.to_string(),
            temperature,
        }))
    }
}

/// Prompt text with `{name}` placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub template: String,
}

impl PromptTemplate {
    /// Replaces each `{key}` with its value; unknown placeholders stay as they are
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        vars.iter().fold(self.template.clone(), |text, (key, value)| {
            text.replace(&format!("{{{key}}}"), value)
        })
    }
}

pub struct PromptTemplateFactory;

impl ResourceFactory for PromptTemplateFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("prompt_template", "prompt", PROMPT_TEMPLATE_TYPE)
            .with_label("Prompt Template")
            .with_parameter(Parameter::common("template", "str").with_label("Template"))
    }

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(PromptTemplate {
            template: args.require_str("template")?.to_string(),
        }))
    }
}

/// Client that answers chat requests with the configured model
#[derive(Debug)]
pub struct ChatClient {
    pub config: Arc<ModelConfig>,
}

pub struct ChatClientFactory;

impl ResourceFactory for ChatClientFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("chat_client", "llm", CHAT_CLIENT_TYPE)
            .with_label("Chat Client")
            .with_ancestor(LLM_CLIENT_TYPE)
            .with_parameter(Parameter::resource("config", MODEL_CONFIG_TYPE).with_label("Config"))
    }

    fn create(&self, args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(ChatClient {
            config: args.require_resource::<ModelConfig>("config")?,
        }))
    }
}

/// Conversation memory. Passed to operators as a class so each one keeps
/// its own history.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    messages: Mutex<Vec<String>>,
}

impl InMemoryHistory {
    pub fn push(&self, message: impl Into<String>) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.into());
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

pub struct InMemoryHistoryFactory;

impl ResourceFactory for InMemoryHistoryFactory {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata::new("in_memory_history", "memory", HISTORY_TYPE)
            .with_label("In-Memory History")
            .class_kind()
    }

    fn create(&self, _args: &Arguments) -> Result<ResourceObject, ConstructError> {
        Ok(Arc::new(InMemoryHistory::default()))
    }
}
