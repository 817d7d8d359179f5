use serde::Deserialize;

pub const DIRECT_PERSONA: &str = "Be concise, practical, and direct. No fluff.";

pub const NOVA_PERSONA: &str = "You are Nova, a helpful and intelligent AI assistant.
Your job is to support the user by providing clear, accurate, and friendly answers through conversation. You respond using your own reasoning and knowledge, without relying on any external systems or automation.
Always aim to be thoughtful, informative, and easy to understand. Focus on being genuinely useful and kind in every response.";

/// System instruction prepended to every model call.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Nova,
    Direct,
    Custom(String),
}

impl Persona {
    pub fn prompt(&self) -> &str {
        match self {
            Persona::Nova => NOVA_PERSONA,
            Persona::Direct => DIRECT_PERSONA,
            Persona::Custom(text) => text,
        }
    }
}
