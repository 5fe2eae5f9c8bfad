//! Chat template rendering
//!
//! Renders HuggingFace-style Jinja chat templates the way `transformers`
//! does: lstrip/trim blocks enabled, a `raise_exception` helper, and the
//! Python `.strip()` idiom mapped to the `trim` filter.

use indexmap::IndexMap;
use minijinja::{context, Environment, ErrorKind};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors from template resolution and rendering
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template render failed: {0}")]
    Render(#[from] minijinja::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tokenizer config: {0}")]
    Config(#[from] serde_json::Error),
}

/// One role-tagged message handed to a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A special-token entry in `tokenizer_config.json`: either a bare literal or
/// an added-token object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TokenEntry {
    Literal(String),
    Added { content: String },
}

impl TokenEntry {
    pub fn as_str(&self) -> &str {
        match self {
            TokenEntry::Literal(literal) => literal,
            TokenEntry::Added { content } => content,
        }
    }
}

/// The slice of `tokenizer_config.json` the prompt builders need
#[derive(Debug, Clone, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub chat_template: Option<String>,
    #[serde(default)]
    pub bos_token: Option<TokenEntry>,
    #[serde(default)]
    pub eos_token: Option<TokenEntry>,
}

impl TokenizerConfig {
    /// Read a downloaded `tokenizer_config.json`
    pub fn from_json_file(path: &Path) -> Result<Self, TemplateError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn bos(&self) -> &str {
        self.bos_token.as_ref().map(TokenEntry::as_str).unwrap_or("")
    }

    pub fn eos(&self) -> &str {
        self.eos_token.as_ref().map(TokenEntry::as_str).unwrap_or("")
    }
}

fn raise_exception(msg: String) -> Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
}

/// Render a chat template over role-tagged messages.
pub fn apply_chat_template(
    template: &str,
    messages: &[ChatMessage],
    bos_token: &str,
    eos_token: &str,
    add_generation_prompt: bool,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    // transformers renders with these block modes
    env.set_lstrip_blocks(true);
    env.set_trim_blocks(true);

    let template = template.replace(".strip()", "|trim");
    env.add_template("chat_template", template.as_str())?;
    env.add_function("raise_exception", raise_exception);

    let maps: Vec<IndexMap<&str, &str>> = messages
        .iter()
        .map(|m| {
            let mut map = IndexMap::new();
            map.insert("role", m.role.as_str());
            map.insert("content", m.content.as_str());
            map
        })
        .collect();

    let tmpl = env.get_template("chat_template")?;
    Ok(tmpl.render(context! {
        messages => maps,
        add_generation_prompt => add_generation_prompt,
        bos_token => bos_token,
        eos_token => eos_token,
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHATML_TEMPLATE: &str = "{% for message in messages %}{{'<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n'}}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}";

    #[test]
    fn test_chatml_render() {
        let prompt = apply_chat_template(
            CHATML_TEMPLATE,
            &[ChatMessage::user("What is 1+1?")],
            "",
            "",
            true,
        )
        .unwrap();
        assert_eq!(
            prompt,
            "<|im_start|>user\nWhat is 1+1?<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn test_no_generation_prompt() {
        let prompt = apply_chat_template(
            CHATML_TEMPLATE,
            &[ChatMessage::user("hello")],
            "",
            "",
            false,
        )
        .unwrap();
        assert!(!prompt.contains("<|im_start|>assistant"));
    }

    #[test]
    fn test_bos_token_is_exposed() {
        let template = "{{ bos_token }}{% for message in messages %}{{ message['content'] }}{% endfor %}";
        let prompt =
            apply_chat_template(template, &[ChatMessage::user("hi")], "<s>", "</s>", false)
                .unwrap();
        assert_eq!(prompt, "<s>hi");
    }

    #[test]
    fn test_strip_idiom_is_mapped() {
        let template = "{{ messages[0]['content'].strip() }}";
        let prompt =
            apply_chat_template(template, &[ChatMessage::user("  padded  ")], "", "", false)
                .unwrap();
        assert_eq!(prompt, "padded");
    }

    #[test]
    fn test_raise_exception_surfaces_as_error() {
        let template = "{{ raise_exception('unsupported role') }}";
        let result = apply_chat_template(template, &[], "", "", false);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_entry_forms() {
        let literal: TokenEntry = serde_json::from_str("\"<s>\"").unwrap();
        assert_eq!(literal.as_str(), "<s>");

        let added: TokenEntry =
            serde_json::from_str(r#"{"content": "<|im_end|>", "special": true}"#).unwrap();
        assert_eq!(added.as_str(), "<|im_end|>");
    }
}
