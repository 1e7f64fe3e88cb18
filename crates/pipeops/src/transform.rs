use pipecore::{
    Arguments, ConstructError, IOField, Operator, OperatorFactory, OperatorKind, OperatorMetadata,
    Parameter,
};
use std::any::Any;

/// Joins the outputs of its upstream operators
#[derive(Debug)]
pub struct JoinTexts {
    name: String,
    separator: String,
}

impl JoinTexts {
    pub fn join(&self, parts: &[&str]) -> String {
        parts.join(&self.separator)
    }
}

impl Operator for JoinTexts {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Join
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct JoinTextsFactory;

impl OperatorFactory for JoinTextsFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("join_texts", "common", "pipeops.JoinTexts", OperatorKind::Join)
            .with_label("Join Texts")
            .with_input(IOField::new("left", "str", "str"))
            .with_input(IOField::new("right", "str", "str"))
            .with_output(IOField::new("text", "str", "str"))
            .with_parameter(
                Parameter::common("separator", "str")
                    .with_label("Separator")
                    .with_default("\n"),
            )
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        Ok(Box::new(JoinTexts {
            name: task_name.to_string(),
            separator: args.str_or("separator", "\n").to_string(),
        }))
    }
}
