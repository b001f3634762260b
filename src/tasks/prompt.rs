//! Prompt construction for the task invokers.

/// Wrap a caller's prompt with the code-generation framing.
///
/// Only the outbound prompt changes; the model's answer is returned as-is.
pub fn code_prompt(prompt: &str) -> String {
    format!(
        r#"You are a helpful coding assistant. Produce clean, well-commented, working code.
Include a short example showing how to use it.

Request: {prompt}"#
    )
}

/// Build the classification instruction for `text` over `categories`.
///
/// Categories are listed in the caller's order, and the model is told to
/// answer with the category name and nothing else.
pub fn classification_prompt(text: &str, categories: &[String]) -> String {
    let list = categories
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Classify the following text into exactly one of the categories below.

Text: '{text}'

Categories:
{list}

Respond with only the category name."#
    )
}
