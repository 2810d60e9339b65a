use ab_core::{ArticleRecord, GenerationParams};

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Both parts as one message, for providers without a system role.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }

    /// Asks the provider to flag articles outside the blog's topics.
    pub fn with_relevance_check(mut self, niche: &str) -> Self {
        self.system.push_str(&format!(
            "\n- Decide whether the article is relevant to our niche ({}). If it is not, \
             return the JSON with empty strings and arrays and \"relevant_to_niche\": false.",
            niche
        ));
        self.user = self
            .user
            .replace("\"categories\": [\"category1\", \"category2\"]", "\"categories\": [\"category1\", \"category2\"],\n  \"relevant_to_niche\": true");
        self
    }
}

/// Cuts `text` to at most `budget` characters without splitting a code point.
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(article: &ArticleRecord, params: &GenerationParams, budget: usize) -> Prompt {
    let system = format!(
        "You are a professional tech blog writer. Rewrite the article you are given into a \
         well-structured, {style} blog post.\n\
         - Aim for around {words} words.\n\
         - Use markdown headings, short paragraphs and lists where they help.\n\
         - Write in your own words while keeping the facts accurate.\n\
         - Include an introduction and a conclusion.\n\
         - Suggest 5-7 tags and a meta description of 150-160 characters.",
        style = params.style,
        words = params.max_words,
    );

    let categories = if article.categories.is_empty() {
        "Not provided".to_string()
    } else {
        article.categories.join(", ")
    };

    let user = format!(
        "Original Title: {title}\n\
         Source: {source}\n\
         Original URL: {url}\n\
         Original Description: {summary}\n\
         Categories/Tags: {categories}\n\
         Original Content:\n{content}\n\n\
         Return only valid JSON with this structure and no other text:\n\
         {{\n  \"title\": \"Your suggested title\",\n  \
         \"content\": \"The full blog post in markdown\",\n  \
         \"tags\": [\"tag1\", \"tag2\", \"tag3\", \"tag4\", \"tag5\"],\n  \
         \"meta_description\": \"A concise meta description\",\n  \
         \"keywords\": [\"keyword1\", \"keyword2\", \"keyword3\"],\n  \
         \"categories\": [\"category1\", \"category2\"]\n}}",
        title = article.title,
        source = article.source,
        url = article.url,
        summary = truncate_chars(&article.summary, 500),
        categories = categories,
        content = truncate_chars(article.body_text(), budget),
    );

    Prompt { system, user }
}
