use crate::oracle::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub fn user_classify_post(post: &str) -> String {
    format!(r#"You are a political discourse analyst.

Classify the following social media post based on:

1. Narrative Frame (e.g., corruption, persecution, legal justice, media bias, systemic inequality, etc.)
2. Main Subject (e.g., a politician, an outlet, an institution)
3. Stance toward main subject (e.g., supportive, critical, neutral, unclear)
4. Topic Focus (e.g., legal, cultural, institutional, personal attack)

Return in JSON format with the keys "narrative_frame", "main_subject", "stance", "topic_focus".

Post:
{post}"#, post = post)
}

pub fn user_reply_chain(root_post: &str, replies_json: &str) -> String {
    format!(r#"You are analyzing an online conversation.

Root Post:
{root}

Replies:
{replies}

Instructions:
Identify whether the replies reinforce, challenge, or shift the narrative of the root post.

- Reinforce: the replies support the root post and echo its central claim or framing.

- Challenge: the replies dispute the root post's claim, defend its target, or reject its framing.

- Shift: the replies introduce a new perspective or topic not directly related to the root post's claim, such as broader commentary or unrelated issues.

ONLY output one category from: ["reinforce", "challenge", "shift"]."#,
        root = root_post,
        replies = replies_json
    )
}

/// Role-tagged message list sent for every prompt.
pub fn messages_for(user: String) -> Vec<ChatMessage> {
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}
