use crate::config::LlmConfig;
use crate::error::{InsightError, Result};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, info};

/// Incrementally delivered pieces of generated text, in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// External text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream>;
}

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const DUMMY_RESPONSE: &str = "1. Export volumes tracked global demand over the selected years.\n\
2. Trade agreements shifted the main destination markets.\n\
3. Disease outbreaks caused short-lived drops in shipments.\n\
4. Exchange rates affected price competitiveness abroad.\n\
5. Recent years show a recovery towards the long-run trend.";

/// OpenAI-compatible chat completions client.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.api_key == crate::config::DUMMY_API_KEY
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "stream": stream
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, stream))
            .send()
            .await
            .map_err(|e| InsightError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InsightError::Llm(format!(
                "LLM API returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.is_dummy() {
            debug!("Dummy API key, returning canned insights");
            return Ok(DUMMY_RESPONSE.to_string());
        }

        info!("🤖 Requesting insights from {}", self.model);
        let response_json: serde_json::Value = self
            .send(prompt, false)
            .await?
            .json()
            .await
            .map_err(|e| InsightError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InsightError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        if self.is_dummy() {
            let fragments: Vec<Result<String>> = DUMMY_RESPONSE
                .split_inclusive(' ')
                .map(|piece| Ok(piece.to_string()))
                .collect();
            return Ok(Box::pin(stream::iter(fragments)));
        }

        info!("🤖 Streaming insights from {}", self.model);
        let response = self.send(prompt, true).await?;
        Ok(sse_fragments(Box::pin(response.bytes_stream())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Fragment(String),
    Done,
    Skip,
}

/// Interpret one line of a chat-completions event stream.
pub fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| InsightError::Llm(format!("Malformed stream chunk: {}", e)))?;
    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(SseEvent::Fragment(content.to_string())),
        _ => Ok(SseEvent::Skip),
    }
}

struct SseState<S> {
    body: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> SseState<S> {
    fn take_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            Ok(SseEvent::Fragment(text)) => self.pending.push_back(Ok(text)),
            Ok(SseEvent::Done) => self.finished = true,
            Ok(SseEvent::Skip) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
            }
        }
    }

    fn drain_complete_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.take_line(&String::from_utf8_lossy(&line));
        }
    }
}

/// Turn a raw event-stream body into content fragments.
///
/// Lines may be split across chunks. The stream ends at `[DONE]`, at the end of the
/// body, or after the first error.
pub fn sse_fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_complete_lines();
                }
                Some(Err(e)) => {
                    state
                        .pending
                        .push_back(Err(InsightError::Llm(format!("Stream read failed: {}", e))));
                    state.finished = true;
                }
                None => {
                    let rest = std::mem::take(&mut state.buffer);
                    state.take_line(&String::from_utf8_lossy(&rest));
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(chunk("Hi").trim()).unwrap(),
            SseEvent::Fragment("Hi".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseEvent::Skip
        );
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[tokio::test]
    async fn test_sse_fragments_across_chunk_boundaries() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("Hello"), chunk(", world"));
        let (a, b) = body.split_at(body.len() / 2);
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
            vec![Ok(a.as_bytes().to_vec()), Ok(b.as_bytes().to_vec())];

        let fragments: Vec<String> = sse_fragments(stream::iter(chunks))
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hello", ", world"]);
    }

    #[tokio::test]
    async fn test_sse_fragments_stop_at_error() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(chunk("partial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
            Ok(chunk("never").into_bytes()),
        ];
        let items: Vec<Result<String>> = sse_fragments(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_dummy_client_generates_without_network() {
        let client = LlmClient::new(LlmConfig {
            api_key: crate::config::DUMMY_API_KEY.to_string(),
            model: "gpt-4".to_string(),
            base_url: "http://localhost:1".to_string(),
        });
        let text = client.generate("anything").await.unwrap();
        let streamed: Vec<String> = client
            .generate_stream("anything")
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(streamed.concat(), text);
    }
}
