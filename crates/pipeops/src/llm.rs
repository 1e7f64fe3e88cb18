use crate::resources::{
    ChatClient, InMemoryHistory, PromptTemplate, HISTORY_TYPE, LLM_CLIENT_TYPE,
    PROMPT_TEMPLATE_TYPE,
};
use pipecore::{
    Arguments, ConstructError, IOField, Operator, OperatorFactory, OperatorKind, OperatorMetadata,
    Parameter, CHAT_REQUEST_TYPE, CHAT_RESPONSE_TYPE,
};
use std::any::Any;
use std::sync::Arc;

/// Renders the prompt template with the incoming user text
#[derive(Debug)]
pub struct PromptBuild {
    name: String,
    prompt: Arc<PromptTemplate>,
    input_key: String,
}

impl PromptBuild {
    pub fn build(&self, user_input: &str) -> String {
        self.prompt.render(&[(self.input_key.as_str(), user_input)])
    }
}

impl Operator for PromptBuild {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Map
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct PromptBuildFactory;

impl OperatorFactory for PromptBuildFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("prompt_build", "prompt", "pipeops.PromptBuild", OperatorKind::Map)
            .with_label("Prompt Build")
            .with_input(IOField::new("request", "ChatRequest", CHAT_REQUEST_TYPE))
            .with_output(IOField::new("prompt", "str", "str"))
            .with_parameter(Parameter::resource("prompt", PROMPT_TEMPLATE_TYPE).with_label("Prompt"))
            .with_parameter(Parameter::common("input_key", "str").with_default("input"))
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        Ok(Box::new(PromptBuild {
            name: task_name.to_string(),
            prompt: args.require_resource::<PromptTemplate>("prompt")?,
            input_key: args.str_or("input_key", "input").to_string(),
        }))
    }
}

/// Request an [`LlmCall`] sends to its client
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f64,
    pub messages: Vec<String>,
}

/// Sends the prompt to the bound client, prefixed by the conversation so far
#[derive(Debug)]
pub struct LlmCall {
    name: String,
    client: Arc<ChatClient>,
    history: Option<Arc<InMemoryHistory>>,
}

impl LlmCall {
    pub fn request(&self, prompt: &str) -> ChatRequest {
        let mut messages = self
            .history
            .as_ref()
            .map(|h| h.messages())
            .unwrap_or_default();
        messages.push(prompt.to_string());
        if let Some(history) = &self.history {
            history.push(prompt);
        }
        ChatRequest {
            model: self.client.config.model.clone(),
            temperature: self.client.config.temperature,
            messages,
        }
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }
}

impl Operator for LlmCall {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Map
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct LlmCallFactory;

impl OperatorFactory for LlmCallFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("llm_call", "llm", "pipeops.LlmCall", OperatorKind::Map)
            .with_label("LLM Call")
            .with_input(IOField::new("prompt", "str", "str"))
            .with_output(IOField::new("response", "ChatResponse", CHAT_RESPONSE_TYPE))
            .with_parameter(Parameter::resource("client", LLM_CLIENT_TYPE).with_label("Client"))
            .with_parameter(
                Parameter::resource("history", HISTORY_TYPE)
                    .with_label("History")
                    .class_kind()
                    .nullable(),
            )
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        // Each call owns a fresh history built from the bound class
        let history = match args.class("history") {
            Some(class) => Some(
                class
                    .instantiate(&Arguments::new())?
                    .downcast::<InMemoryHistory>()
                    .map_err(|_| ConstructError::InvalidArgument {
                        name: "history".into(),
                        expected: HISTORY_TYPE.into(),
                        actual: class.type_identifier.to_string(),
                    })?,
            ),
            None => None,
        };
        Ok(Box::new(LlmCall {
            name: task_name.to_string(),
            client: args.require_resource::<ChatClient>("client")?,
            history,
        }))
    }
}
