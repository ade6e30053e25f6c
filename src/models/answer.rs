use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 问答引擎返回的行内引用标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    /// 标记在原文中的字面文本，例如 `【4:0†source】`
    pub marker_text: String,
    pub document_id: String,
    pub quoted_snippet: String,
}

impl CitationMarker {
    pub fn new(
        marker_text: impl Into<String>,
        document_id: impl Into<String>,
        quoted_snippet: impl Into<String>,
    ) -> Self {
        Self {
            marker_text: marker_text.into(),
            document_id: document_id.into(),
            quoted_snippet: quoted_snippet.into(),
        }
    }
}

/// 问答引擎的原始回答，只被整理一次后丢弃
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAnswer {
    pub text: String,
    /// 按引擎输出顺序排列
    pub citation_markers: Vec<CitationMarker>,
}

impl RawAnswer {
    pub fn new(text: impl Into<String>, citation_markers: Vec<CitationMarker>) -> Self {
        Self {
            text: text.into(),
            citation_markers,
        }
    }
}

/// 整理后的引用来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// 从 1 开始，按文档首次出现的顺序编号
    pub ordinal: usize,
    pub document_id: String,
    pub display_name: String,
    pub quote: String,
}

/// 对外返回的回答，构造后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer_text: String,
    pub sources: Vec<Citation>,
    pub timestamp: DateTime<Utc>,
}

impl AnswerResult {
    pub fn new(question: impl Into<String>, answer_text: String, sources: Vec<Citation>) -> Self {
        Self {
            question: question.into(),
            answer_text,
            sources,
            timestamp: Utc::now(),
        }
    }
}
