use crate::model::ScoredDocument;

/// Fixed instructions for every assistant answer: brand tone, mission, plan rules.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant for Farm2Table, a platform connecting local farms to customers.
Brand tone: friendly, sustainable, community-focused.
Mission: We pledge to donate 30% of our net income or equivalent food to local community partners like food banks.
Plan rules:
- Basic plan: Weekly fixed bundle, users can remove items before cutoff but cannot add
- Premium plan: Build your own weekly box, choose delivery date and time, can skip weeks
Only use information from the provided context. If you don't know something, say so.";

/// Render ranked documents as `[title]: text` blocks separated by a blank line.
pub fn render_context(docs: &[ScoredDocument<'_>]) -> String {
    docs.iter()
        .map(|s| format!("[{}]: {}", s.doc.title, s.doc.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn user_prompt(context: &str, message: &str) -> String {
    format!(
        "Context:\n{context}\n\nUser question: {message}\n\n\
Provide a concise, helpful answer based on the context above. \
Include source titles when referencing specific information."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::doc;

    #[test]
    fn context_blocks_are_title_prefixed_and_blank_line_separated() {
        let a = doc("delivery", None, vec![]);
        let b = doc("plans", None, vec![]);
        let ranked = [
            ScoredDocument { doc: &a, similarity: 0.9 },
            ScoredDocument { doc: &b, similarity: 0.4 },
        ];
        assert_eq!(
            render_context(&ranked),
            "[DELIVERY]: about delivery\n\n[PLANS]: about plans"
        );
    }

    #[test]
    fn empty_context_still_asks_the_question() {
        let prompt = user_prompt(&render_context(&[]), "Can I skip a week?");
        assert!(prompt.starts_with("Context:\n\n\nUser question: Can I skip a week?"));
        assert!(prompt.ends_with("Include source titles when referencing specific information."));
    }

    #[test]
    fn system_prompt_carries_plan_rules_and_pledge() {
        assert!(SYSTEM_PROMPT.contains("30% of our net income"));
        assert!(SYSTEM_PROMPT.contains("Basic plan"));
        assert!(SYSTEM_PROMPT.contains("Premium plan"));
    }
}
