use crate::history::ConversationHistory;
use crate::models::SearchHit;

pub const HISTORY_WINDOW: usize = 5;
pub const FOOTER_PAGE_MARKER: &str = "✓";

const INSTRUCTIONS: &str = "You are a helpful financial policy assistant. You answer questions about financial policies, budgets, debt, infrastructure, and related topics based on the provided financial policy document.

IMPORTANT GUIDELINES:
1. Only use information from the provided document excerpts below
2. Do not use your general knowledge about finance or policies
3. If the information is not in the provided excerpts, say \"I don't have that information in the policy document\"
4. Reference page numbers when available
5. Consider the conversation history to provide contextual responses
6. Be precise and cite specific sections when possible";

const CLOSING: &str = "Please provide a clear, helpful answer based on the financial policy document provided above.";

pub fn render_history(history: &ConversationHistory) -> Option<String> {
    if history.is_empty() {
        return None;
    }

    let mut block = String::from("Recent conversation history:\n");
    for (position, exchange) in history.recent(HISTORY_WINDOW).enumerate() {
        block.push_str(&format!(
            "{}. User: {}\n   Assistant: {}\n",
            position + 1,
            exchange.user,
            exchange.assistant
        ));
    }
    Some(block)
}

pub fn render_excerpts(hits: &[SearchHit]) -> Option<String> {
    if hits.is_empty() {
        return None;
    }

    let mut block = String::from("Relevant information from the financial policy document:\n");
    for (position, hit) in hits.iter().enumerate() {
        let page = hit.metadata.display_page();
        let mut label = if page != 0 {
            format!(" (Page {page})")
        } else {
            String::new()
        };
        if hit.metadata.is_footer_derived() {
            label.push(' ');
            label.push_str(FOOTER_PAGE_MARKER);
        }
        block.push_str(&format!(
            "\n--- Excerpt {}{} ---\n{}\n",
            position + 1,
            label,
            hit.text
        ));
    }
    Some(block)
}

/// Builds the system prompt: instructions, recent history, excerpts, then the
/// current question. Absent sections are left out entirely.
pub fn build_system_prompt(
    question: &str,
    history: &ConversationHistory,
    hits: &[SearchHit],
) -> String {
    let mut sections = vec![INSTRUCTIONS.to_string()];
    sections.extend(render_history(history));
    sections.extend(render_excerpts(hits));
    sections.push(format!("Current question: {question}"));
    sections.push(CLOSING.to_string());
    sections.join("\n\n")
}
