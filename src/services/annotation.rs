/// 引用标注整理服务
///
/// 把问答引擎的原始回答（文本 + 行内引用标记）整理成
/// 格式化正文和按编号排序、去重后的来源列表
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{Citation, RawAnswer};
use crate::services::document_names::{fallback_name, strip_extension, DocumentNamer};
use crate::services::text_cleanup;
use crate::utils::logging::truncate_text;

/// 引擎没有返回任何正文时的固定回答
pub const NO_ANSWER_FALLBACK: &str =
    "抱歉，我在知識庫中找不到相關資訊來回答這個問題。請嘗試使用不同的關鍵詞或更具體的問題。";

/// 来源引文的最大字符数（含截断时的 `...`）
pub const QUOTE_MAX_CHARS: usize = 120;

/// 引用标注整理器
pub struct AnnotationProcessor {
    namer: Arc<dyn DocumentNamer>,
}

impl AnnotationProcessor {
    pub fn new(namer: Arc<dyn DocumentNamer>) -> Self {
        Self { namer }
    }

    /// 整理原始回答
    ///
    /// # 参数
    /// - `raw`: 引擎返回的原始回答
    ///
    /// # 返回
    /// 返回 (格式化正文, 按编号升序的来源列表)
    pub async fn normalize(&self, raw: RawAnswer) -> (String, Vec<Citation>) {
        if raw.text.trim().is_empty() {
            debug!("引擎未返回正文，使用固定回答");
            return (NO_ANSWER_FALLBACK.to_string(), Vec::new());
        }

        let mut sources: Vec<Citation> = Vec::new();
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let mut marked = String::with_capacity(raw.text.len() + raw.citation_markers.len() * 4);
        let mut cursor = 0;

        for marker in &raw.citation_markers {
            let ordinal = match ordinals.get(&marker.document_id).copied() {
                Some(ordinal) => {
                    // 首个标记没有引文时，用后续标记补上
                    let citation = &mut sources[ordinal - 1];
                    if citation.quote.is_empty() {
                        citation.quote = quote_of(&marker.quoted_snippet);
                    }
                    ordinal
                }
                None => {
                    let ordinal = sources.len() + 1;
                    let display_name = self.resolve_name(&marker.document_id).await;
                    ordinals.insert(marker.document_id.clone(), ordinal);
                    sources.push(Citation {
                        ordinal,
                        document_id: marker.document_id.clone(),
                        display_name,
                        quote: quote_of(&marker.quoted_snippet),
                    });
                    ordinal
                }
            };

            if marker.marker_text.is_empty() {
                continue;
            }
            match raw.text[cursor..].find(&marker.marker_text) {
                Some(offset) => {
                    let end = cursor + offset + marker.marker_text.len();
                    marked.push_str(&raw.text[cursor..end]);
                    marked.push_str(&format!("[{}]", ordinal));
                    cursor = end;
                }
                None => {
                    debug!("正文中未找到引用标记: {}", marker.marker_text);
                }
            }
        }
        marked.push_str(&raw.text[cursor..]);

        let text = text_cleanup::clean(&marked);
        if text.is_empty() {
            debug!("清理后正文为空，使用固定回答");
            return (NO_ANSWER_FALLBACK.to_string(), Vec::new());
        }

        sources.sort_by_key(|c| c.ordinal);
        (text, sources)
    }

    /// 解析显示名称，失败时使用占位名称，不中断整理
    async fn resolve_name(&self, document_id: &str) -> String {
        match self.namer.display_name(document_id).await {
            Ok(name) if !name.trim().is_empty() => strip_extension(name.trim()),
            Ok(_) => fallback_name(document_id),
            Err(e) => {
                warn!("⚠️ 文档名称解析失败 ({}): {}", document_id, e);
                fallback_name(document_id)
            }
        }
    }
}

fn quote_of(snippet: &str) -> String {
    let snippet = snippet.trim();
    if snippet.chars().count() <= QUOTE_MAX_CHARS {
        return snippet.to_string();
    }
    truncate_text(snippet, QUOTE_MAX_CHARS - 3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::models::CitationMarker;
    use async_trait::async_trait;

    /// 按固定表返回名称，不在表中的ID返回错误
    struct TableNamer(HashMap<&'static str, &'static str>);

    #[async_trait]
    impl DocumentNamer for TableNamer {
        async fn display_name(&self, document_id: &str) -> AppResult<String> {
            self.0
                .get(document_id)
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::Internal(format!("unknown {}", document_id)))
        }
    }

    fn processor() -> AnnotationProcessor {
        let names = HashMap::from([
            ("A", "系統神學.pdf"),
            ("B", "基督教要義.DOCX"),
            ("C", "教會歷史.md"),
            ("doc1", "Trinity.txt"),
        ]);
        AnnotationProcessor::new(Arc::new(TableNamer(names)))
    }

    #[tokio::test]
    async fn test_ordinals_follow_first_occurrence() {
        let raw = RawAnswer::new(
            "甲說【m1】，乙說【m2】，甲又說【m3】，丙說【m4】",
            vec![
                CitationMarker::new("【m1】", "A", "甲的話"),
                CitationMarker::new("【m2】", "B", "乙的話"),
                CitationMarker::new("【m3】", "A", "甲的另一句"),
                CitationMarker::new("【m4】", "C", "丙的話"),
            ],
        );

        let (text, sources) = processor().normalize(raw).await;

        // 标记本身被清理，只留下编号
        assert_eq!(text, "甲說[1]，乙說[2]，甲又說[1]，丙說[3]");
        let ids: Vec<_> = sources
            .iter()
            .map(|c| (c.ordinal, c.document_id.as_str()))
            .collect();
        assert_eq!(ids, vec![(1, "A"), (2, "B"), (3, "C")]);
        assert_eq!(sources[0].quote, "甲的話");
        assert_eq!(sources[0].display_name, "系統神學");
        assert_eq!(sources[1].display_name, "基督教要義");
    }

    #[tokio::test]
    async fn test_single_marker() {
        let raw = RawAnswer::new(
            "God is triune[marker:doc1]",
            vec![CitationMarker::new("[marker:doc1]", "doc1", "")],
        );

        let (text, sources) = processor().normalize(raw).await;

        assert!(text.ends_with("[1]"));
        assert_eq!(text, "God is triune[1]");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].ordinal, 1);
        assert_eq!(sources[0].document_id, "doc1");
        assert_eq!(sources[0].display_name, "Trinity");
    }

    #[tokio::test]
    async fn test_no_markers_only_cleans_text() {
        let raw = RawAnswer::new("  三位一體  是核心教義  ", vec![]);
        let (text, sources) = processor().normalize(raw).await;
        assert_eq!(text, "三位一體 是核心教義");
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_returns_fallback() {
        let raw = RawAnswer::new(
            "   ",
            vec![CitationMarker::new("【1†source】", "A", "")],
        );
        let (text, sources) = processor().normalize(raw).await;
        assert_eq!(text, NO_ANSWER_FALLBACK);
        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn test_naming_failure_uses_fallback_name() {
        let raw = RawAnswer::new(
            "聖靈論【4:0†source】",
            vec![CitationMarker::new("【4:0†source】", "file-xyz12345678", "")],
        );
        let (text, sources) = processor().normalize(raw).await;
        assert_eq!(text, "聖靈論[1]");
        assert_eq!(sources[0].display_name, "文件-xyz12345");
    }

    #[tokio::test]
    async fn test_quote_truncated_and_backfilled() {
        let long = "恩".repeat(150);
        let raw = RawAnswer::new(
            "甲【1†a】乙【2†b】丙【3†c】",
            vec![
                CitationMarker::new("【1†a】", "A", ""),
                CitationMarker::new("【2†b】", "A", "後補引文"),
                CitationMarker::new("【3†c】", "B", long.clone()),
            ],
        );
        let (text, sources) = processor().normalize(raw).await;

        assert_eq!(text, "甲[1]乙[1]丙[2]");
        assert_eq!(sources[0].quote, "後補引文");
        assert_eq!(sources[1].quote.chars().count(), QUOTE_MAX_CHARS);
        assert!(sources[1].quote.ends_with("..."));
    }

    #[test]
    fn test_quote_length_boundary() {
        let exact = "恩".repeat(QUOTE_MAX_CHARS);
        assert_eq!(quote_of(&exact), exact);

        let over = "恩".repeat(QUOTE_MAX_CHARS + 1);
        let quote = quote_of(&over);
        assert_eq!(quote.chars().count(), QUOTE_MAX_CHARS);
        assert!(quote.starts_with(&"恩".repeat(QUOTE_MAX_CHARS - 3)));
        assert!(quote.ends_with("..."));

        assert_eq!(quote_of("  短引文  "), "短引文");
    }

    #[tokio::test]
    async fn test_repeated_identical_markers_replaced_in_order() {
        let raw = RawAnswer::new(
            "甲【0†source】乙【0†source】",
            vec![
                CitationMarker::new("【0†source】", "A", ""),
                CitationMarker::new("【0†source】", "B", ""),
            ],
        );
        let (text, _) = processor().normalize(raw).await;
        assert_eq!(text, "甲[1]乙[2]");
    }
}
