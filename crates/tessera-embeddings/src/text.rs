//! Input text formatting.

/// Task used by the default retrieval fixtures.
pub const WEB_SEARCH_TASK: &str =
    "Given a web search query, retrieve relevant passages that answer the query";

/// Wrap a query with an instruction prefix for instruction-tuned models.
///
/// Documents are embedded as-is; only queries carry the prefix.
pub fn instruct_query(task: &str, query: &str) -> String {
    format!("Instruct: {task}\nQuery: {query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruct_format() {
        assert_eq!(
            instruct_query("Classify the sentiment of this text", "I love this product!"),
            "Instruct: Classify the sentiment of this text\nQuery: I love this product!"
        );
    }

    #[test]
    fn instruct_empty_query() {
        assert_eq!(instruct_query("t", ""), "Instruct: t\nQuery: ");
    }

    #[test]
    fn web_search_task_prefix() {
        let text = instruct_query(WEB_SEARCH_TASK, "how much protein should a female eat");
        assert!(text.starts_with("Instruct: Given a web search query"));
        assert!(text.ends_with("\nQuery: how much protein should a female eat"));
    }
}
