//! Standard operator and resource library
//!
//! Implementations are not registered on load; call [`register_all`] once
//! while the registry is being initialized.

mod branch;
mod io;
mod llm;
mod resources;
mod transform;

pub use branch::{NonEmptyBranch, NonEmptyBranchFactory};
pub use io::{CollectOutput, CollectOutputFactory, TextInput, TextInputFactory};
pub use llm::{ChatRequest, LlmCall, LlmCallFactory, PromptBuild, PromptBuildFactory};
pub use resources::{
    ChatClient, ChatClientFactory, InMemoryHistory, InMemoryHistoryFactory, ModelConfig,
    ModelConfigFactory, PromptTemplate, PromptTemplateFactory, CHAT_CLIENT_TYPE, HISTORY_TYPE,
    LLM_CLIENT_TYPE, MODEL_CONFIG_TYPE, PROMPT_TEMPLATE_TYPE,
};
pub use transform::{JoinTexts, JoinTextsFactory};

use pipebuild::Registrar;
use pipecore::RegistryError;

/// Register every standard operator and resource
pub fn register_all<R: Registrar>(registry: &mut R) -> Result<(), RegistryError> {
    registry.register_resource(ModelConfigFactory)?;
    registry.register_resource(PromptTemplateFactory)?;
    registry.register_resource(ChatClientFactory)?;
    registry.register_resource(InMemoryHistoryFactory)?;

    registry.register_operator(TextInputFactory)?;
    registry.register_operator(PromptBuildFactory)?;
    registry.register_operator(LlmCallFactory)?;
    registry.register_operator(NonEmptyBranchFactory)?;
    registry.register_operator(JoinTextsFactory)?;
    registry.register_operator(CollectOutputFactory)?;
    tracing::debug!("Registered standard operators");
    Ok(())
}
