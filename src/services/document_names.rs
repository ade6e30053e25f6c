/// 文档名称解析服务
///
/// 把引擎返回的文档ID转换成可读的显示名称
use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

use crate::clients::call_with_timeout;
use crate::error::AppResult;

/// 显示名称中去除的文件扩展名
const KNOWN_EXTENSIONS: &[&str] = &[
    ".pdf", ".docx", ".doc", ".txt", ".md", ".json", ".csv", ".tsv", ".epub", ".html",
];

/// 文档名称解析
#[async_trait]
pub trait DocumentNamer: Send + Sync {
    /// 返回文档的显示名称
    async fn display_name(&self, document_id: &str) -> AppResult<String>;
}

/// 去除已知扩展名（不区分大小写）
pub fn strip_extension(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    for ext in KNOWN_EXTENSIONS {
        if lower.ends_with(ext) && file_name.len() > ext.len() {
            return file_name[..file_name.len() - ext.len()].to_string();
        }
    }
    file_name.to_string()
}

/// 解析失败时使用的占位名称：`文件-` 加上ID前 8 个字符
pub fn fallback_name(document_id: &str) -> String {
    let short: String = document_id
        .strip_prefix("file-")
        .unwrap_or(document_id)
        .chars()
        .take(8)
        .collect();
    format!("文件-{}", short)
}

/// 基于 Files 接口的名称解析，结果按ID记忆
///
/// 返回原始文件名，扩展名由调用方去除
pub struct FileNamer {
    client: Client<OpenAIConfig>,
    request_timeout: Duration,
    names: DashMap<String, String>,
}

impl FileNamer {
    pub fn new(client: Client<OpenAIConfig>, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
            names: DashMap::new(),
        }
    }
}

#[async_trait]
impl DocumentNamer for FileNamer {
    async fn display_name(&self, document_id: &str) -> AppResult<String> {
        if let Some(name) = self.names.get(document_id) {
            return Ok(name.clone());
        }

        let files = self.client.files();
        let file = call_with_timeout(self.request_timeout, files.retrieve(document_id)).await?;
        let name = file.filename;
        debug!("文档名称解析: {} -> {}", document_id, name);
        self.names.insert(document_id.to_string(), name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_extension_case_insensitive() {
        assert_eq!(strip_extension("系統神學.pdf"), "系統神學");
        assert_eq!(strip_extension("Institutes.PDF"), "Institutes");
        assert_eq!(strip_extension("notes.docx"), "notes");
        assert_eq!(strip_extension("archive.zip"), "archive.zip");
        assert_eq!(strip_extension(".pdf"), ".pdf");
    }

    #[test]
    fn test_fallback_name() {
        assert_eq!(fallback_name("file-abcdefghijkl"), "文件-abcdefgh");
        assert_eq!(fallback_name("doc1"), "文件-doc1");
    }
}
