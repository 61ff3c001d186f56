use serde_json::Value;

use desklink_ai::{ChatMessage, ChatRequest, LlmClient};

use crate::context::{truncate_chars, ConversationContext};

const PROMPT_TURNS: usize = 10;
const PROMPT_CHARS_PER_TURN: usize = 300;
const MANUAL_EXCERPT_CHARS: usize = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `IssueContent` used across DeskLink components.
pub struct IssueContent {
    pub title: String,
    pub body: String,
}

/// AI-backed title/body synthesis with a deterministic manual template.
///
/// AI failures of any kind (transport, status, malformed JSON, missing
/// fields) degrade to the manual template; generation itself never fails.
pub struct ContentGenerator<'a> {
    ai: Option<&'a dyn LlmClient>,
    ai_model: String,
    helpdesk_base_url: String,
}

impl<'a> ContentGenerator<'a> {
    pub fn new(
        ai: Option<&'a dyn LlmClient>,
        ai_model: String,
        helpdesk_base_url: String,
    ) -> Self {
        Self {
            ai,
            ai_model,
            helpdesk_base_url,
        }
    }

    pub async fn generate(&self, ctx: &ConversationContext) -> IssueContent {
        if let Some(ai) = self.ai {
            match self.generate_with_ai(ai, ctx).await {
                Some(content) => return content,
                None => {
                    tracing::warn!(
                        conversation = ctx.number,
                        "ai content generation failed, using manual template"
                    );
                }
            }
        }
        self.manual_template(ctx)
    }

    async fn generate_with_ai(
        &self,
        ai: &dyn LlmClient,
        ctx: &ConversationContext,
    ) -> Option<IssueContent> {
        let prompt = format!(
            "Helpdesk conversation #{number}\nSubject: {subject}\nCustomer: {name} <{email}>\n\
             Status: {status}\n\nTranscript:\n{transcript}\n\nWrite a GitHub issue for the \
             underlying problem. Reply with a JSON object with exactly two string fields, \
             \"title\" and \"body\".",
            number = ctx.number,
            subject = ctx.subject,
            name = ctx.customer_name,
            email = ctx.customer_email,
            status = ctx.status,
            transcript = ctx.transcript_excerpt(PROMPT_TURNS, PROMPT_CHARS_PER_TURN),
        );
        let request = ChatRequest {
            model: self.ai_model.clone(),
            system: Some(
                "You turn helpdesk conversations into concise issue-tracker reports.".to_string(),
            ),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: Some(800),
            temperature: Some(0.3),
        };

        let reply = match ai.complete(request).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(%error, "ai content request failed");
                return None;
            }
        };
        parse_issue_content(&reply)
    }

    fn manual_template(&self, ctx: &ConversationContext) -> IssueContent {
        let subject = ctx.subject.trim();
        let title = if subject.is_empty() {
            format!("Support request from {}", customer_display(ctx))
        } else {
            subject.to_string()
        };

        let excerpt = ctx
            .first_customer_message()
            .map(|message| truncate_chars(message.body.trim(), MANUAL_EXCERPT_CHARS))
            .unwrap_or_else(|| "(no customer message)".to_string());
        let conversation_url = if ctx.url.trim().is_empty() {
            format!(
                "{}/conversation/{}",
                self.helpdesk_base_url.trim_end_matches('/'),
                ctx.number
            )
        } else {
            ctx.url.clone()
        };

        let body = format!(
            "## Customer report\n\n{excerpt}\n\n---\n\nReported by: {customer}\nConversation \
             status: {status}\nHelpdesk conversation: {url}",
            excerpt = excerpt,
            customer = customer_display(ctx),
            status = ctx.status,
            url = conversation_url,
        );
        IssueContent { title, body }
    }
}

fn customer_display(ctx: &ConversationContext) -> String {
    let name = ctx.customer_name.trim();
    let email = ctx.customer_email.trim();
    match (name.is_empty(), email.is_empty()) {
        (false, false) => format!("{name} <{email}>"),
        (false, true) => name.to_string(),
        (true, false) => email.to_string(),
        (true, true) => "unknown customer".to_string(),
    }
}

/// Requires a JSON object with exactly non-empty `title` and `body` string
/// fields, tolerating prose around the outermost `{` ... `}` span.
fn parse_issue_content(reply: &str) -> Option<IssueContent> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    let parsed: Value = serde_json::from_str(&reply[start..=end]).ok()?;
    let title = parsed.get("title")?.as_str()?.trim().to_string();
    let body = parsed.get("body")?.as_str()?.trim().to_string();
    if title.is_empty() || body.is_empty() {
        return None;
    }
    Some(IssueContent { title, body })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use desklink_ai::{AiError, ChatRequest, LlmClient};

    use crate::context::{ConversationContext, ConversationMessage, MessageAuthor};

    use super::{parse_issue_content, ContentGenerator};

    struct ScriptedAi(Result<String, ()>);

    #[async_trait]
    impl LlmClient for ScriptedAi {
        async fn complete(&self, _request: ChatRequest) -> Result<String, AiError> {
            match &self.0 {
                Ok(reply) => Ok(reply.clone()),
                Err(()) => Err(AiError::HttpStatus {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    fn sample_context(subject: &str) -> ConversationContext {
        ConversationContext {
            id: 1,
            number: 12,
            subject: subject.to_string(),
            customer_name: "Dana".to_string(),
            customer_email: "dana@example.com".to_string(),
            status: "active".to_string(),
            created_at: None,
            tags: Vec::new(),
            url: "https://desk.example.com/conversation/12".to_string(),
            messages: vec![ConversationMessage {
                author: MessageAuthor::Customer,
                body: "saving a draft loses my changes".to_string(),
                created_at: None,
            }],
        }
    }

    #[tokio::test]
    async fn functional_manual_template_without_ai() {
        let generator = ContentGenerator::new(None, String::new(), String::new());
        let content = generator.generate(&sample_context("Draft loss")).await;
        assert_eq!(content.title, "Draft loss");
        assert!(content.body.contains("saving a draft loses my changes"));
        assert!(content.body.contains("Dana <dana@example.com>"));
        assert!(content.body.contains("https://desk.example.com/conversation/12"));
    }

    #[tokio::test]
    async fn unit_blank_subject_uses_customer_fallback_title() {
        let generator = ContentGenerator::new(None, String::new(), String::new());
        let content = generator.generate(&sample_context("  ")).await;
        assert_eq!(content.title, "Support request from Dana <dana@example.com>");
    }

    #[tokio::test]
    async fn functional_ai_reply_is_used_when_well_formed() {
        let ai = ScriptedAi(Ok(
            r#"{"title": "Draft save loses edits", "body": "Steps: save a draft."}"#.to_string(),
        ));
        let generator =
            ContentGenerator::new(Some(&ai), "gpt-4o-mini".to_string(), String::new());
        let content = generator.generate(&sample_context("Draft loss")).await;
        assert_eq!(content.title, "Draft save loses edits");
        assert_eq!(content.body, "Steps: save a draft.");
    }

    #[tokio::test]
    async fn regression_ai_failure_falls_back_to_manual_template() {
        let ai = ScriptedAi(Err(()));
        let generator =
            ContentGenerator::new(Some(&ai), "gpt-4o-mini".to_string(), String::new());
        let content = generator.generate(&sample_context("Draft loss")).await;
        assert_eq!(content.title, "Draft loss");
        assert!(content.body.contains("Customer report"));
    }

    #[tokio::test]
    async fn regression_malformed_ai_json_falls_back() {
        let ai = ScriptedAi(Ok(r#"{"title": "only a title"}"#.to_string()));
        let generator =
            ContentGenerator::new(Some(&ai), "gpt-4o-mini".to_string(), String::new());
        let content = generator.generate(&sample_context("Draft loss")).await;
        assert_eq!(content.title, "Draft loss");
    }

    #[test]
    fn unit_parse_issue_content_requires_both_fields() {
        assert!(parse_issue_content(r#"{"title": "t", "body": "b"}"#).is_some());
        assert!(parse_issue_content(r#"note {"title": "t", "body": "b"} end"#).is_some());
        assert!(parse_issue_content(r#"{"title": " ", "body": "b"}"#).is_none());
        assert!(parse_issue_content("no json").is_none());
    }
}
