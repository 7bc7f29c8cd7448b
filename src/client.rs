use crate::conversation::ConversationRequest;
use crate::error::ClientError;
use crate::protocol::Frame;
use crate::translate::LineReframer;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::future::Future;

pub struct ClientConfig {
    pub base_url: String,
}

/// Talks to a running translator's `/api/chat`.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    http: HttpClient,
}

type ClientResult<T> = Result<T, ClientError>;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            base_url: normalize_base_url(&config.base_url),
            http: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submits one turn and hands every decoded frame to `on_frame` in arrival order.
    pub async fn stream_chat<F, Fut>(
        &self,
        request: &ConversationRequest,
        mut on_frame: F,
    ) -> ClientResult<()>
    where
        F: FnMut(Frame) -> Fut,
        Fut: Future<Output = ()>,
    {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|body| body.error)
                .unwrap_or(body);
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let mut stream = response.bytes_stream();
        let mut reframer = LineReframer::new();
        let mut finished = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| ClientError::Stream(err.to_string()))?;
            for line in reframer.push(&chunk) {
                finished |= dispatch_line(&line, &mut on_frame).await;
            }
        }
        if let Some(line) = reframer.finish() {
            finished |= dispatch_line(&line, &mut on_frame).await;
        }

        if !finished {
            return Err(ClientError::Stream(
                "stream ended without a finish frame".to_string(),
            ));
        }

        Ok(())
    }
}

/// Returns true when the line was the finish frame.
async fn dispatch_line<F, Fut>(line: &[u8], on_frame: &mut F) -> bool
where
    F: FnMut(Frame) -> Fut,
    Fut: Future<Output = ()>,
{
    let line = String::from_utf8_lossy(line);
    match Frame::parse_line(&line) {
        Ok(Some(frame)) => {
            let finished = frame.is_finish();
            on_frame(frame).await;
            finished
        }
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(error = %err, line = %line.trim_end(), "skipping malformed frame");
            false
        }
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}
