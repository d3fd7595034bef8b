//! Chat completion seam.

use kgprobe_core::Result;

/// A single-turn request to a chat model.
#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// Ask the backend to constrain output to a JSON object.
    pub json: bool,
}

impl<'a> Prompt<'a> {
    pub fn text(system: &'a str, user: &'a str) -> Self {
        Self { system, user, json: false }
    }

    pub fn json(system: &'a str, user: &'a str) -> Self {
        Self { system, user, json: true }
    }
}

#[allow(async_fn_in_trait)]
pub trait LanguageModel: Send + Sync {
    /// Return the assistant's reply text.
    async fn complete(&self, prompt: Prompt<'_>) -> Result<String>;

    /// Model name, for logs.
    fn model_name(&self) -> &str;
}
