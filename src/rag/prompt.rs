//! Grounded prompt composition.

use serde::{Deserialize, Serialize};

use super::store::Chunk;

const KNOWLEDGE_HEADER: &str = "Contexto de conocimiento:";
const CONVERSATION_HEADER: &str = "Contexto de la conversación:";
const QUESTION_LABEL: &str = "Pregunta actual del usuario:";
const USER_LABEL: &str = "Usuario";
const ASSISTANT_LABEL: &str = "Asistente";

const ANSWER_INSTRUCTIONS: &str = "\
Instrucciones:
- Responde usando tanto el contexto de conocimiento como el contexto de la conversación.
- Mantén la coherencia con las respuestas anteriores de la conversación.
- Si no sabes la respuesta, indícalo claramente.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Role::User => USER_LABEL,
            Role::Assistant => ASSISTANT_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bodies of the retrieved chunks, best match first, separated by blank lines.
pub fn knowledge_context<'a, I>(chunks: I) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    chunks
        .into_iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The last `window` turns, oldest first.
pub fn conversation_tail(history: &[ConversationTurn], window: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(window)..]
}

/// Builds the final prompt; `history` must already be trimmed to the tail.
pub fn compose(
    system_prompt: &str,
    chunks: &[&Chunk],
    history: &[ConversationTurn],
    question: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");

    prompt.push_str(KNOWLEDGE_HEADER);
    prompt.push('\n');
    prompt.push_str(&knowledge_context(chunks.iter().copied()));
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str(CONVERSATION_HEADER);
        prompt.push('\n');
        for turn in history {
            prompt.push_str(turn.role.label());
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(QUESTION_LABEL);
    prompt.push(' ');
    prompt.push_str(question);
    prompt.push_str("\n\n");

    prompt.push_str(ANSWER_INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            id: None,
            text: text.to_string(),
            images: vec![],
            videos: vec![],
            embedding: vec![],
        }
    }

    #[test]
    fn layout_follows_fixed_order() {
        let a = chunk("Paris is the capital of France");
        let b = chunk("Lyon is in France");
        let history = vec![
            ConversationTurn::user("hola"),
            ConversationTurn::assistant("¡Hola! ¿En qué te ayudo?"),
        ];

        let prompt = compose("Eres un asistente experto", &[&a, &b], &history, "capital?");

        let expected = "Eres un asistente experto\n\n\
            Contexto de conocimiento:\n\
            Paris is the capital of France\n\nLyon is in France\n\n\
            Contexto de la conversación:\n\
            Usuario: hola\n\
            Asistente: ¡Hola! ¿En qué te ayudo?\n\n\
            Pregunta actual del usuario: capital?\n\n";
        assert!(prompt.starts_with(expected), "prompt was:\n{}", prompt);
        assert!(prompt.ends_with(ANSWER_INSTRUCTIONS));
    }

    #[test]
    fn empty_contexts_still_produce_a_prompt() {
        let prompt = compose("sys", &[], &[], "hola");

        assert!(prompt.starts_with("sys\n\nContexto de conocimiento:\n\n\n"));
        assert!(!prompt.contains(CONVERSATION_HEADER));
        assert!(prompt.contains("Pregunta actual del usuario: hola"));
        assert!(prompt.contains("indícalo claramente"));
    }

    #[test]
    fn tail_keeps_the_most_recent_turns() {
        let history: Vec<ConversationTurn> = (0..12)
            .map(|i| ConversationTurn::user(format!("turn {}", i)))
            .collect();

        let tail = conversation_tail(&history, 10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].content, "turn 2");
        assert_eq!(tail[9].content, "turn 11");

        assert_eq!(conversation_tail(&history[..3], 10).len(), 3);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"role": "assistant", "content": "ok"}"#).unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(Role::User.as_str(), "user");
    }
}
