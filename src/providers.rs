/// Separator between provider and model in a stored base model.
pub const MODEL_SEPARATOR: &str = " > ";

/// Provider assumed when the base model is a bare model id.
pub const DEFAULT_PROVIDER: &str = "Google";

/// Model used when nothing has been chosen yet.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Provider {
    pub name: &'static str,
    pub models: &'static [&'static str],
}

pub const CATALOG: &[Provider] = &[
    Provider {
        name: "OpenAI",
        models: &[
            "gpt-4.1",
            "gpt-4.1-mini",
            "gpt-4.1-nano",
            "o3",
            "o4-mini",
            "o3-pro",
            "gpt-5",
            "gpt-5-mini",
            "gpt-5-nano",
        ],
    },
    Provider {
        name: "Anthropic",
        models: &[
            "claude-opus-4.1",
            "claude-opus-4",
            "claude-sonnet-4",
            "claude-3.7-sonnet",
            "claude-3.5-sonnet-v2",
            "claude-3.5-haiku",
            "claude-3-haiku",
        ],
    },
    Provider {
        name: "Gemini",
        models: &[
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            "gemini-2.5-flash-lite",
            "gemini-2.0-flash",
            "gemini-2.0-flash-lite",
        ],
    },
];

pub fn find(name: &str) -> Option<&'static Provider> {
    CATALOG.iter().find(|p| p.name == name)
}

/// Default model list for a provider, empty for unknown names.
pub fn default_models(name: &str) -> Vec<String> {
    find(name)
        .map(|p| p.models.iter().map(|m| m.to_string()).collect())
        .unwrap_or_default()
}

/// Splits a stored base model into `(provider, model)`.
///
/// Anything that does not split into exactly two parts is treated as a bare
/// model id for the default provider.
pub fn parse_base_model(base_model: Option<&str>) -> (String, String) {
    let base = base_model.unwrap_or("");
    let parts: Vec<&str> = base.split(MODEL_SEPARATOR).collect();
    if parts.len() == 2 {
        return (parts[0].to_string(), parts[1].to_string());
    }

    let model = if base.is_empty() { DEFAULT_MODEL } else { base };
    (DEFAULT_PROVIDER.to_string(), model.to_string())
}

pub fn format_base_model(provider: &str, model: &str) -> String {
    format!("{}{}{}", provider, MODEL_SEPARATOR, model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_and_model() {
        let (provider, model) = parse_base_model(Some("Gemini > gemini-2.5-pro"));
        assert_eq!(provider, "Gemini");
        assert_eq!(model, "gemini-2.5-pro");
    }

    #[test]
    fn test_parse_bare_model_defaults_provider() {
        let (provider, model) = parse_base_model(Some("gemini-2.0-flash"));
        assert_eq!(provider, "Google");
        assert_eq!(model, "gemini-2.0-flash");
    }

    #[test]
    fn test_parse_missing_model_falls_back() {
        assert_eq!(
            parse_base_model(None),
            ("Google".to_string(), "gemini-2.5-flash".to_string())
        );
        assert_eq!(
            parse_base_model(Some("")),
            ("Google".to_string(), "gemini-2.5-flash".to_string())
        );
    }

    #[test]
    fn test_parse_too_many_separators_is_bare() {
        let (provider, model) = parse_base_model(Some("a > b > c"));
        assert_eq!(provider, "Google");
        assert_eq!(model, "a > b > c");
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let stored = format_base_model("OpenAI", "gpt-5");
        assert_eq!(stored, "OpenAI > gpt-5");
        assert_eq!(
            parse_base_model(Some(&stored)),
            ("OpenAI".to_string(), "gpt-5".to_string())
        );
    }

    #[test]
    fn test_default_models_for_unknown_provider() {
        assert!(default_models("Nope").is_empty());
        assert!(default_models("Gemini").contains(&"gemini-2.5-flash".to_string()));
    }
}
