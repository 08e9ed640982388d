use std::fmt::Write;

use common::{
    llm::{ChatMessage, ChatRole},
    storage::types::session::{Session, TranscriptTurn, TurnRole},
};
use retrieval_pipeline::RetrievedChunk;

/// The persona contract: the model plays the customer, not the seller.
pub fn persona_system_prompt(session: &Session) -> String {
    let payload = &session.context_payload;

    let mut prompt = String::from(
        "You are role-playing as the prospective customer in a sales rehearsal. \
         Stay in character for the entire conversation. Ask realistic, \
         evidence-aware questions, push back the way a real buyer would, and \
         never coach the salesperson or break character.",
    );

    if let Some(name) = payload.customer_name.as_deref() {
        let _ = write!(prompt, "\nCustomer: {name}.");
    }
    if let Some(persona) = payload.customer_persona.as_deref() {
        let _ = write!(prompt, "\nPersona: {persona}.");
    }
    if let Some(stage) = payload.deal_stage {
        let _ = write!(
            prompt,
            "\nThe deal is at the {stage} stage; keep your questions appropriate to it."
        );
    }

    prompt.push_str(
        "\nReference excerpts from the seller's materials may follow. Use them \
         only where a customer could plausibly know or probe that information.",
    );

    prompt
}

/// Enumerate retrieved excerpts into a context block.
fn context_block(chunks: &[RetrievedChunk]) -> String {
    let mut block = String::from("Reference excerpts:\n");
    for (position, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(
            block,
            "[{index}] (document {document}, part {ordinal}) {text}",
            index = position + 1,
            document = chunk.document_id,
            ordinal = chunk.ordinal,
            text = chunk.text
        );
    }
    block
}

fn turn_to_message(turn: &TranscriptTurn) -> ChatMessage {
    match turn.role {
        TurnRole::User => ChatMessage {
            role: ChatRole::User,
            content: turn.text.clone(),
        },
        TurnRole::Assistant => ChatMessage {
            role: ChatRole::Assistant,
            content: turn.text.clone(),
        },
    }
}

/// Assemble the full prompt for one turn: persona contract, context block,
/// the trailing transcript window, then the new user text.
pub fn assemble_turn_messages(
    session: &Session,
    retrieved: &[RetrievedChunk],
    user_text: &str,
    history_turns: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(persona_system_prompt(session))];

    if !retrieved.is_empty() {
        messages.push(ChatMessage::system(context_block(retrieved)));
    }

    let start = session.transcript.len().saturating_sub(history_turns);
    messages.extend(
        session
            .transcript
            .iter()
            .skip(start)
            .map(turn_to_message),
    );

    messages.push(ChatMessage::user(user_text));
    messages
}
