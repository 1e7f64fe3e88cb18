use pipecore::{
    Arguments, ConstructError, IOField, Operator, OperatorFactory, OperatorKind, OperatorMetadata,
    Parameter,
};
use std::any::Any;

/// Routes text to one of two downstream operators depending on whether it
/// is blank. The builder fills both parameters with the downstream
/// operators' names.
#[derive(Debug)]
pub struct NonEmptyBranch {
    name: String,
    has_text: String,
    no_text: String,
}

impl NonEmptyBranch {
    /// Name of the downstream operator `text` goes to
    pub fn route(&self, text: &str) -> &str {
        if text.trim().is_empty() {
            &self.no_text
        } else {
            &self.has_text
        }
    }
}

impl Operator for NonEmptyBranch {
    fn task_name(&self) -> &str {
        &self.name
    }

    fn operator_kind(&self) -> OperatorKind {
        OperatorKind::Branch
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct NonEmptyBranchFactory;

impl OperatorFactory for NonEmptyBranchFactory {
    fn metadata(&self) -> OperatorMetadata {
        OperatorMetadata::new("non_empty_branch", "common", "pipeops.NonEmptyBranch", OperatorKind::Branch)
            .with_label("Non-Empty Branch")
            .with_input(IOField::new("text", "str", "str"))
            .with_parameter(Parameter::common("has_text", "str"))
            .with_parameter(Parameter::common("no_text", "str"))
    }

    fn create(&self, task_name: &str, args: &Arguments) -> Result<Box<dyn Operator>, ConstructError> {
        Ok(Box::new(NonEmptyBranch {
            name: task_name.to_string(),
            has_text: args.require_str("has_text")?.to_string(),
            no_text: args.require_str("no_text")?.to_string(),
        }))
    }
}
