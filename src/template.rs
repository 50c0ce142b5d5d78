use crate::chat::Turn;

/// Chat template format for different models
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatTemplateFormat {
    /// Use the template embedded in the model, or [`ChatTemplateFormat::Default`]
    /// if it has none
    #[default]
    ModelDefault,
    /// Use a simple default template
    Default,
    /// Custom template with `{N_role}` and `{N_content}` placeholders
    Custom(String),
}

/// Render turns with the plain `<|role|>` markup and open an assistant turn
pub fn render_default(turns: &[Turn]) -> String {
    let mut prompt = String::new();
    for turn in turns {
        prompt.push_str(&format!("<|{}|>\n{}", turn.role().as_str(), turn.content()));
        prompt.push('\n');
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

/// Fill `{i_role}` / `{i_content}` placeholders, `i` being the turn index
pub fn render_custom(template: &str, turns: &[Turn]) -> String {
    let mut prompt = template.to_string();
    for (i, turn) in turns.iter().enumerate() {
        let role_placeholder = format!("{{{}_role}}", i);
        let content_placeholder = format!("{{{}_content}}", i);

        prompt = prompt.replace(&role_placeholder, turn.role().as_str());
        prompt = prompt.replace(&content_placeholder, turn.content());
    }
    prompt
}
