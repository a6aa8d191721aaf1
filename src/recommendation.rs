//! Recommendation requests against a chat-completion service.

use std::fmt;
use std::time::Duration;

use log::{debug, error, info};
use serde_json::{json, Value};

use crate::config::GenerationConfig;

const PROMPT_LOG_PREVIEW_CHARS: usize = 500;
const APPROX_CHARS_PER_TOKEN: usize = 4;

const SYSTEM_INSTRUCTION: &str = "You are a music expert with deep knowledge of genres, \
artists, record labels and musical eras. Your recommendations are well reasoned and formatted \
in markdown. Always cite the ORIGINAL release year of an album, never the year of a reissue \
or later pressing.";

/// API key for the generation service. Passed explicitly to every call.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationKey(String);

impl GenerationKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GenerationKey(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service rejected the API key: {0}")]
    Unauthorized(String),
    #[error("generation service is rate limiting requests: {0}")]
    RateLimited(String),
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecommendationError {
    #[error("an API key for the generation service is required")]
    MissingCredential,
    #[error("the collection summary is empty; load a collection first")]
    EmptySummary,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Single-turn text generation: one system instruction and one user prompt in,
/// one text out.
pub trait TextGenerator {
    fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &GenerationKey,
    ) -> Result<String, GenerationError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionGenerator {
    http_client: ureq::Agent,
    base_url: String,
    model: String,
}

impl ChatCompletionGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(config.request_timeout())
            .build();
        Self {
            http_client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }

    fn classify_ureq_failure(error: ureq::Error) -> GenerationError {
        match error {
            ureq::Error::Status(code, response) => {
                let message = response
                    .into_json::<Value>()
                    .ok()
                    .and_then(|body| {
                        body.pointer("/error/message")
                            .and_then(Value::as_str)
                            .map(ToOwned::to_owned)
                    })
                    .unwrap_or_else(|| format!("status {code}"));
                match code {
                    401 | 403 => GenerationError::Unauthorized(message),
                    429 => GenerationError::RateLimited(message),
                    _ => GenerationError::Request(message),
                }
            }
            ureq::Error::Transport(transport) => GenerationError::Request(transport.to_string()),
        }
    }
}

impl TextGenerator for ChatCompletionGenerator {
    fn generate(
        &self,
        request: &GenerationRequest,
        api_key: &GenerationKey,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        });
        let response = self
            .http_client
            .post(&url)
            .set("Authorization", &format!("Bearer {}", api_key.as_str()))
            .send_json(body)
            .map_err(Self::classify_ureq_failure)?;
        let payload = response
            .into_json::<Value>()
            .map_err(|err| GenerationError::InvalidResponse(err.to_string()))?;
        first_choice_content(&payload)
    }
}

fn first_choice_content(payload: &Value) -> Result<String, GenerationError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(ToOwned::to_owned)
        .ok_or_else(|| GenerationError::InvalidResponse("no message content".to_string()))
}

/// Fills the fixed instruction template with the summary and the listener's context.
pub fn build_prompt(summary: &str, mood: &str, interests: &str) -> String {
    let mood = non_blank_or(mood, "open to anything");
    let interests = non_blank_or(interests, "nothing in particular");
    format!(
        "As a music expert, recommend albums from my personal vinyl collection.

My collection:
{summary}

Consider that:
- My current mood is: {mood}
- My current interests are: {interests}

Recommend exactly 3 albums from this collection that suit my situation.

Take into account:
- Genre and style and how they relate to my mood
- The era or decade of release when it matters for my interests
- Distinctive traits of the album (instrumentation, themes, and so on)
- How the artist or album connects to my stated interests

IMPORTANT: always give the ORIGINAL release year of each album, not the year of the copy \
in my collection. For example, Led Zeppelin IV was released in 1971 even if my copy is a \
2022 reissue. Do not mention numeric ratings.

Format the answer in markdown exactly like this:

## Recommendations for your {mood} moment

### 1. [Artist] - [Title] ([ORIGINAL year])
**Why it's a good choice:** A detailed explanation covering genre, style, what makes the \
album special, and why it fits my mood and interests.

### 2. [Artist] - [Title] ([ORIGINAL year])
**Why it's a good choice:** ...

### 3. [Artist] - [Title] ([ORIGINAL year])
**Why it's a good choice:** ...

#### Enjoy your music!

Make sure every recommendation is grounded in specific details from the collection."
    )
}

fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

fn prompt_preview(prompt: &str) -> &str {
    match prompt.char_indices().nth(PROMPT_LOG_PREVIEW_CHARS) {
        Some((end, _)) => &prompt[..end],
        None => prompt,
    }
}

pub struct RecommendationService<G> {
    generator: G,
}

impl<G: TextGenerator> RecommendationService<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn recommend(
        &self,
        summary: &str,
        mood: &str,
        interests: &str,
        api_key: Option<&GenerationKey>,
    ) -> Result<String, RecommendationError> {
        let api_key = api_key.ok_or(RecommendationError::MissingCredential)?;
        if summary.trim().is_empty() {
            return Err(RecommendationError::EmptySummary);
        }
        let prompt = build_prompt(summary, mood, interests);
        debug!(
            "Recommendation: prompt preview={:?} chars={} approx_tokens={}",
            prompt_preview(&prompt),
            prompt.len(),
            prompt.len() / APPROX_CHARS_PER_TOKEN
        );
        let request = GenerationRequest {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: prompt,
        };
        let text = self.generator.generate(&request, api_key)?;
        info!("Recommendation: generated {} chars", text.len());
        Ok(text)
    }

    /// Never fails: a failure comes back as a readable message instead.
    pub fn recommend_or_message(
        &self,
        summary: &str,
        mood: &str,
        interests: &str,
        api_key: Option<&GenerationKey>,
    ) -> String {
        self.recommend(summary, mood, interests, api_key)
            .unwrap_or_else(|err| {
                error!("Recommendation: failed: {}", err);
                format!("Error generating recommendations: {err}")
            })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::{
        build_prompt, first_choice_content, prompt_preview, GenerationError, GenerationKey,
        GenerationRequest, RecommendationError, RecommendationService, TextGenerator,
    };

    struct CannedGenerator {
        reply: Result<String, GenerationError>,
        seen: RefCell<Vec<GenerationRequest>>,
    }

    impl CannedGenerator {
        fn replying(reply: Result<String, GenerationError>) -> Self {
            Self {
                reply,
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for CannedGenerator {
        fn generate(
            &self,
            request: &GenerationRequest,
            api_key: &GenerationKey,
        ) -> Result<String, GenerationError> {
            assert_eq!(api_key.as_str(), "sk-test");
            self.seen.borrow_mut().push(request.clone());
            self.reply.clone()
        }
    }

    fn key() -> GenerationKey {
        GenerationKey::new("sk-test").expect("key")
    }

    #[test]
    fn test_prompt_carries_summary_mood_and_original_year_instruction() {
        let prompt = build_prompt("Can - Tago Mago (1971)", "rainy", "krautrock");
        assert!(prompt.contains("Can - Tago Mago (1971)"));
        assert!(prompt.contains("My current mood is: rainy"));
        assert!(prompt.contains("My current interests are: krautrock"));
        assert!(prompt.contains("## Recommendations for your rainy moment"));
        assert!(prompt.contains("exactly 3 albums"));
        assert!(prompt.contains("ORIGINAL release year"));
        assert!(prompt.contains("#### Enjoy your music!"));
    }

    #[test]
    fn test_blank_mood_and_interests_use_fallbacks() {
        let prompt = build_prompt("x", "  ", "");
        assert!(prompt.contains("My current mood is: open to anything"));
        assert!(prompt.contains("My current interests are: nothing in particular"));
    }

    #[test]
    fn test_recommend_sends_system_instruction_and_returns_text() {
        let service = RecommendationService::new(CannedGenerator::replying(Ok(
            "## Recommendations".to_string()
        )));
        let text = service
            .recommend("Can - Tago Mago (1971)", "calm", "", Some(&key()))
            .expect("recommendation");
        assert_eq!(text, "## Recommendations");
        let seen = service.generator.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].system.contains("ORIGINAL release year"));
        assert!(seen[0].user.contains("Can - Tago Mago (1971)"));
    }

    #[test]
    fn test_missing_key_fails_without_calling_generator() {
        let service = RecommendationService::new(CannedGenerator::replying(Ok(String::new())));
        assert_eq!(
            service.recommend("summary", "calm", "", None),
            Err(RecommendationError::MissingCredential)
        );
        assert!(service.generator.seen.borrow().is_empty());
    }

    #[test]
    fn test_recommend_or_message_turns_failures_into_text() {
        let service = RecommendationService::new(CannedGenerator::replying(Err(
            GenerationError::RateLimited("slow down".to_string()),
        )));
        let message = service.recommend_or_message("summary", "calm", "", Some(&key()));
        assert!(message.starts_with("Error generating recommendations:"));
        assert!(message.contains("slow down"));

        let empty = service.recommend_or_message("  ", "calm", "", Some(&key()));
        assert!(empty.contains("summary is empty"));
    }

    #[test]
    fn test_first_choice_content_requires_text() {
        assert_eq!(
            first_choice_content(&json!({"choices": [{"message": {"content": " hi "}}]})),
            Ok("hi".to_string())
        );
        assert!(first_choice_content(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_prompt_preview_is_char_safe() {
        let long = "é".repeat(600);
        assert_eq!(prompt_preview(&long).chars().count(), 500);
        assert_eq!(prompt_preview("short"), "short");
    }

    #[test]
    fn test_blank_key_is_rejected() {
        assert_eq!(GenerationKey::new("   "), None);
        assert_eq!(format!("{:?}", key()), "GenerationKey(***)");
    }
}
