use pipecore::{
    Arguments, ConstructError, IOField, Operator, OperatorFactory, OperatorKind, OperatorMetadata,
    Parameter, CHAT_REQUEST_TYPE, CHAT_RESPONSE_TYPE,
};
use std::any::Any;

/// Entry point of a flow: receives the user's text as a chat request
#[derive(Debug)]
pub struct TextInput {
    name: String,
    pub default_text: Option<String>,
}

impl Operator for TextInput {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Input
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct TextInputFactory;

impl OperatorFactory for TextInputFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("text_input", "trigger", "pipeops.TextInput", OperatorKind::Input)
            .with_label("Text Input")
            .with_description("Receives the user's message")
            .with_output(IOField::new("request", "ChatRequest", CHAT_REQUEST_TYPE))
            .with_parameter(Parameter::common("default_text", "str").nullable())
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        Ok(Box::new(TextInput {
            name: task_name.to_string(),
            default_text: args.literal("default_text").and_then(|v| v.as_str()).map(String::from),
        }))
    }
}

/// Collects every upstream result into the final answer
#[derive(Debug)]
pub struct CollectOutput {
    name: String,
}

impl CollectOutput {
    pub fn collect<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> String {
        parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join("\n")
    }
}

impl Operator for CollectOutput {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Reduce
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CollectOutputFactory;

impl OperatorFactory for CollectOutputFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("collect_output", "output", "pipeops.CollectOutput", OperatorKind::Reduce)
            .with_label("Collect Output")
            .with_input(IOField::new("text", "str", "str").list())
            .with_output(IOField::new("response", "ChatResponse", CHAT_RESPONSE_TYPE))
    }

    fn create(&self, task_name: &str, _args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        Ok(Box::new(CollectOutput {
            name: task_name.to_string(),
        }))
    }
}
