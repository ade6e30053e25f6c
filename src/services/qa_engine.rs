/// 问答引擎服务
///
/// 通过 Assistants 接口提问，轮询运行状态，并把最新回答转换为 `RawAnswer`
use async_openai::config::OpenAIConfig;
use async_openai::traits::RequestOptionsBuilder;
use async_openai::types::assistants::{
    CreateMessageRequestArgs, CreateThreadAndRunRequestArgs, CreateThreadRequestArgs,
    MessageContent, MessageContentTextAnnotations, MessageObject, MessageRole, RunObject,
    RunStatus,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::call_with_timeout;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{CitationMarker, RawAnswer};
use crate::utils::logging::truncate_text;

/// 问答引擎
#[async_trait]
pub trait QaEngine: Send + Sync {
    /// 对单个问题求解，返回未经整理的回答
    async fn answer(&self, question: &str) -> AppResult<RawAnswer>;
}

/// 运行状态归类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Completed,
    Terminal,
}

/// 排队、执行中、取消中都继续轮询；其余非完成状态都是终止失败
pub fn run_phase(status: &RunStatus) -> RunPhase {
    match status {
        RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => RunPhase::Pending,
        RunStatus::Completed => RunPhase::Completed,
        RunStatus::RequiresAction
        | RunStatus::Cancelled
        | RunStatus::Failed
        | RunStatus::Incomplete
        | RunStatus::Expired => RunPhase::Terminal,
    }
}

/// 状态的接口名称，用于日志和错误
pub fn status_label(status: &RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "queued",
        RunStatus::InProgress => "in_progress",
        RunStatus::RequiresAction => "requires_action",
        RunStatus::Cancelling => "cancelling",
        RunStatus::Cancelled => "cancelled",
        RunStatus::Failed => "failed",
        RunStatus::Completed => "completed",
        RunStatus::Incomplete => "incomplete",
        RunStatus::Expired => "expired",
    }
}

/// 终止失败的说明：优先取 `last_error`
fn failure_message(run: &RunObject) -> String {
    if let Some(error) = &run.last_error {
        return error.message.clone();
    }
    if let Some(details) = &run.incomplete_details {
        return format!("incomplete: {:?}", details.reason);
    }
    format!("run {}", status_label(&run.status))
}

/// 基于 Assistants 接口的问答引擎
pub struct AssistantEngine {
    client: Client<OpenAIConfig>,
    assistant_id: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
    request_timeout: Duration,
}

impl AssistantEngine {
    pub fn new(client: Client<OpenAIConfig>, config: &Config) -> Self {
        Self {
            client,
            assistant_id: config.assistant_id.clone(),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
            request_timeout: config.request_timeout(),
        }
    }

    async fn start_run(&self, question: &str) -> AppResult<RunObject> {
        let message = CreateMessageRequestArgs::default()
            .role(MessageRole::User)
            .content(question)
            .build()?;
        let request = CreateThreadAndRunRequestArgs::default()
            .assistant_id(self.assistant_id.as_str())
            .thread(
                CreateThreadRequestArgs::default()
                    .messages(vec![message])
                    .build()?,
            )
            .build()?;

        let threads = self.client.threads();
        call_with_timeout(self.request_timeout, threads.create_and_run(request)).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> AppResult<RunObject> {
        let threads = self.client.threads();
        let runs = threads.runs(thread_id);
        call_with_timeout(self.request_timeout, runs.retrieve(run_id)).await
    }

    /// 取线程中最新的一条消息
    async fn latest_message(&self, thread_id: &str) -> AppResult<Option<MessageObject>> {
        let threads = self.client.threads();
        let messages = threads
            .messages(thread_id)
            .query(&[("order", "desc"), ("limit", "1")])?;
        let list = call_with_timeout(self.request_timeout, messages.list()).await?;
        Ok(list.data.into_iter().next())
    }
}

#[async_trait]
impl QaEngine for AssistantEngine {
    async fn answer(&self, question: &str) -> AppResult<RawAnswer> {
        info!("🤖 提交问题到问答引擎: {}", truncate_text(question, 50));

        let mut run = self.start_run(question).await?;
        let thread_id = run.thread_id.clone();
        let mut attempts = 0u32;

        loop {
            match run_phase(&run.status) {
                RunPhase::Completed => break,
                RunPhase::Terminal => {
                    let message = failure_message(&run);
                    warn!("❌ 运行失败 ({}): {}", status_label(&run.status), message);
                    return Err(AppError::engine_failure(status_label(&run.status), message));
                }
                RunPhase::Pending => {
                    if attempts >= self.max_poll_attempts {
                        warn!("⏰ 轮询 {} 次后仍未完成: {}", attempts, run.id);
                        return Err(AppError::QueryTimeout { attempts });
                    }
                    attempts += 1;
                    tokio::time::sleep(self.poll_interval).await;
                    run = self.retrieve_run(&thread_id, &run.id).await?;
                    debug!(
                        "运行状态 [{}/{}]: {}",
                        attempts,
                        self.max_poll_attempts,
                        status_label(&run.status)
                    );
                }
            }
        }

        let raw = match self.latest_message(&thread_id).await? {
            Some(m) if m.role == MessageRole::Assistant => message_to_raw_answer(&m),
            _ => {
                warn!("⚠️ 线程中没有助手回答: {}", thread_id);
                RawAnswer::default()
            }
        };

        info!(
            "✓ 引擎回答完成，轮询 {} 次，引用标记 {} 个",
            attempts,
            raw.citation_markers.len()
        );
        Ok(raw)
    }
}

/// 把助手消息转换为原始回答
///
/// 多个文本段以空行连接；每个 `file_citation` 注释转换为一个引用标记，
/// 注释没有引文时取标记前的一句作为引文
pub fn message_to_raw_answer(message: &MessageObject) -> RawAnswer {
    let mut parts = Vec::new();
    let mut markers = Vec::new();

    for content in &message.content {
        let MessageContent::Text(text_object) = content else {
            continue;
        };
        let text = &text_object.text;

        let mut cursor = 0;
        for annotation in &text.annotations {
            let MessageContentTextAnnotations::FileCitation(citation) = annotation else {
                continue;
            };
            let marker_text = &citation.text;

            let position = text.value[cursor..]
                .find(marker_text.as_str())
                .map(|offset| cursor + offset);
            let quote = match &citation.file_citation.quote {
                Some(q) if !q.trim().is_empty() => q.trim().to_string(),
                _ => position
                    .map(|pos| preceding_sentence(&text.value[..pos]))
                    .unwrap_or_default(),
            };
            if let Some(pos) = position {
                cursor = pos + marker_text.len();
            }

            markers.push(CitationMarker::new(
                marker_text.clone(),
                citation.file_citation.file_id.clone(),
                quote,
            ));
        }

        parts.push(text.value.clone());
    }

    RawAnswer::new(parts.join("\n\n"), markers)
}

fn is_sentence_boundary(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '\n' | '.' | '!' | '?' | '】')
}

/// 取文本末尾的最后一句（不含句末标点）
pub fn preceding_sentence(before: &str) -> String {
    let body = before.trim_end_matches(|c: char| is_sentence_boundary(c) || c.is_whitespace());
    let start = body
        .char_indices()
        .rev()
        .find(|(_, c)| is_sentence_boundary(*c))
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    body[start..].trim().to_string()
}
