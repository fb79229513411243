// file: src/captioner/client.rs
// description: OpenAI-compatible chat completions client for image captioning
// reference: https://platform.openai.com/docs/guides/vision

use super::Captioner;
use super::encoding::data_url;
use crate::config::CaptionerConfig;
use crate::error::{PipelineError, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiCaptionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    instruction: String,
    max_tokens: u32,
}

impl OpenAiCaptionClient {
    pub fn new(config: &CaptionerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config(
                    "No captioner API key configured (set OPENAI_API_KEY or captioner.api_key)"
                        .to_string(),
                )
            })?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            instruction: config.instruction.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn describe(&self, image_b64: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &self.instruction,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image_b64),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        };

        debug!(
            "Requesting caption from {} for {} base64 chars",
            self.model,
            image_b64.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(PipelineError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let chat: ChatResponse = response.json().await?;

        let caption = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if caption.is_empty() {
            return Err(PipelineError::Api {
                status: status.as_u16(),
                message: "Response contained no caption".to_string(),
            });
        }

        debug!("Received caption of {} chars", caption.len());
        Ok(caption)
    }
}

impl Captioner for OpenAiCaptionClient {
    async fn caption(&self, image_b64: &str) -> Result<String> {
        self.describe(image_b64).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.trim()
                            .eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);

                if buffer.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&buffer).to_string()
    }

    async fn serve_once(
        status_line: &'static str,
        extra_headers: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                status_line,
                body.len(),
                extra_headers,
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{}/v1/chat/completions", addr), handle)
    }

    fn client_for(endpoint: String) -> OpenAiCaptionClient {
        let mut config = Config::default_config().captioner;
        config.endpoint = endpoint;
        config.api_key = Some("test-key".to_string());
        config.timeout_secs = 5;
        OpenAiCaptionClient::new(&config).unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let mut config = Config::default_config().captioner;
        config.api_key = None;
        assert!(matches!(
            OpenAiCaptionClient::new(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_caption_success_sends_vision_payload() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  A red fox in snow.  "}}]}"#;
        let (endpoint, server) = serve_once("200 OK", "", body.to_string()).await;
        let client = client_for(endpoint);

        let caption = client.caption("QUJD").await.unwrap();
        assert_eq!(caption, "A red fox in snow.");

        let request = server.await.unwrap();
        let lower = request.to_lowercase();
        assert!(lower.contains("authorization: bearer test-key"));

        let json_start = request.find("\r\n\r\n").unwrap() + 4;
        let payload: serde_json::Value = serde_json::from_str(&request[json_start..]).unwrap();
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["max_tokens"], 100);
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"][0]["type"], "text");
        assert_eq!(payload["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            payload["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,QUJD"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let (endpoint, server) = serve_once(
            "429 Too Many Requests",
            "Retry-After: 7\r\n",
            r#"{"error":{"message":"slow down"}}"#.to_string(),
        )
        .await;
        let client = client_for(endpoint);

        let err = client.caption("QUJD").await.unwrap_err();
        match err {
            PipelineError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_api_error() {
        let (endpoint, server) =
            serve_once("503 Service Unavailable", "", "{}".to_string()).await;
        let client = client_for(endpoint);

        let err = client.caption("QUJD").await.unwrap_err();
        assert!(matches!(err, PipelineError::Api { status: 503, .. }));
        assert!(err.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_choices_is_error() {
        let (endpoint, server) =
            serve_once("200 OK", "", r#"{"choices":[]}"#.to_string()).await;
        let client = client_for(endpoint);

        let err = client.caption("QUJD").await.unwrap_err();
        assert!(matches!(err, PipelineError::Api { status: 200, .. }));
        assert!(!err.is_retryable());
        server.await.unwrap();
    }
}
