use std::fmt::Write as _;
use std::future::Future;
use std::io;

use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::model::{ChatRequest, ChatResponse, Completion, CompletionRequest, RateLimit};
use crate::providers::http_errors::request_error;
use crate::signal::Shutdown;
use crate::spinner::Spinner;

const REMAINING_REQUESTS_HEADER: &str = "x-ratelimit-remaining-requests";
const REMAINING_TOKENS_HEADER: &str = "x-ratelimit-remaining-tokens";

/// One chat-completion exchange against the configured endpoint.
pub struct ChatCompletions<'a> {
    client: &'a Client,
    cfg: &'a Config,
    diagnostics: &'a Diagnostics,
    shutdown: &'a Shutdown,
    spinner: Spinner,
}

impl<'a> ChatCompletions<'a> {
    pub fn new(
        client: &'a Client,
        cfg: &'a Config,
        diagnostics: &'a Diagnostics,
        shutdown: &'a Shutdown,
    ) -> Self {
        Self {
            client,
            cfg,
            diagnostics,
            shutdown,
            spinner: Spinner::new(cfg.spinner_enabled),
        }
    }

    pub async fn complete(&self, api_key: &str, request: &CompletionRequest) -> Result<Completion> {
        let api_url = self.cfg.api_url.as_str();
        let body = ChatRequest::from(request);
        debug!(
            api_url = %api_url,
            model = %request.model,
            temperature = request.temperature,
            prompt_len = request.prompt.len(),
            "sending chat completion request"
        );

        let send = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send();

        let spinner = self
            .spinner
            .start(io::stderr(), self.shutdown.token().child_token());
        let outcome = self.or_shutdown(send).await;
        spinner.stop().await;

        let response = outcome?.map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %request.model,
                error = %err,
                "chat completion request failed"
            );
            request_error(err, api_url, self.cfg.request_timeout_secs)
        })?;

        let status = response.status();
        if !status.is_success() {
            let (head, body) = self.or_shutdown(read_raw(response)).await?;
            warn!(
                api_url = %api_url,
                model = %request.model,
                status = %status,
                response_body_len = body.len(),
                "chat completion returned non-success status"
            );
            self.diagnostics.emit_raw(&format!("{head}{body}"));
            return Err(Error::Protocol {
                status: status.as_u16(),
            });
        }

        let rate_limit = rate_limit_from(response.headers());
        if let Some(remaining) = &rate_limit.remaining_requests {
            self.diagnostics
                .emit(format!("remaining requests: {remaining}"));
        }
        if let Some(remaining) = &rate_limit.remaining_tokens {
            self.diagnostics.emit(format!("remaining tokens: {remaining}"));
        }

        let head = render_head(&response);
        let body = self.or_shutdown(response.text()).await?.map_err(|err| {
            Error::Transport(format!("error reading HTTP response body ({err})"))
        })?;

        let completion = ChatResponse::decode(&body)
            .and_then(|parsed| parsed.into_completion(rate_limit))
            .inspect_err(|err| {
                warn!(
                    model = %request.model,
                    error = %err,
                    response_body_len = body.len(),
                    "chat completion response has unexpected shape"
                );
                self.diagnostics.emit_raw(&format!("{head}{body}"));
            })?;

        self.diagnostics.emit(format!("model: {}", completion.model));
        self.diagnostics
            .emit(format!("total tokens used: {}", completion.total_tokens));
        debug!(
            model = %completion.model,
            total_tokens = completion.total_tokens,
            answer_len = completion.answer.len(),
            "received chat completion"
        );
        Ok(completion)
    }

    /// Polls `work` until it finishes or a termination signal arrives.
    async fn or_shutdown<F: Future>(&self, work: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(self.shutdown.interrupted()),
            output = work => Ok(output),
        }
    }
}

fn rate_limit_from(headers: &HeaderMap) -> RateLimit {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    RateLimit {
        remaining_requests: read(REMAINING_REQUESTS_HEADER),
        remaining_tokens: read(REMAINING_TOKENS_HEADER),
    }
}

/// Status line and headers in HTTP/1 text form, followed by the blank line.
fn render_head(response: &Response) -> String {
    let mut head = format!("{:?} {}\n", response.version(), response.status());
    for (name, value) in response.headers() {
        let _ = writeln!(
            head,
            "{}: {}",
            name,
            value.to_str().unwrap_or("<non-ascii header value>")
        );
    }
    head.push('\n');
    head
}

async fn read_raw(response: Response) -> (String, String) {
    let head = render_head(&response);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    (head, body)
}
