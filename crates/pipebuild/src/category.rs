use crate::binding::BuildPlan;
use pipecore::{
    FlowCategory, GraphNode, OperatorMetadata, CHAT_REQUEST_TYPE, CHAT_RESPONSE_TYPE,
    CHAT_STREAM_TYPE,
};

/// Classifies a planned graph. It is a chat flow when every source operator
/// accepts or produces a chat request and every sink produces a chat
/// response or a chat stream.
pub fn infer_category(plan: &BuildPlan<'_>) -> FlowCategory {
    let operators: Vec<(&GraphNode, &OperatorMetadata)> = plan
        .operators()
        .iter()
        .filter_map(|node| node.data.as_operator().map(|meta| (*node, meta)))
        .collect();
    if operators.is_empty() {
        return FlowCategory::Common;
    }

    let sources_accept_chat = operators
        .iter()
        .filter(|(node, _)| plan.upstream(&node.id).next().is_none())
        .all(|(_, meta)| {
            meta.inputs
                .iter()
                .chain(&meta.outputs)
                .any(|field| field.type_identifier.as_str() == CHAT_REQUEST_TYPE)
        });
    let sinks_answer_chat = operators
        .iter()
        .filter(|(node, _)| plan.downstream(&node.id).next().is_none())
        .all(|(_, meta)| {
            meta.outputs.iter().any(|field| {
                let ty = field.type_identifier.as_str();
                ty == CHAT_RESPONSE_TYPE || ty == CHAT_STREAM_TYPE
            })
        });

    if sources_accept_chat && sinks_answer_chat {
        FlowCategory::ChatFlow
    } else {
        FlowCategory::Common
    }
}
