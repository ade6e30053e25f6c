//! 回答文本清理流水线
//!
//! 一组按顺序执行的纯文本变换，前一步的输出是后一步的输入。
//! 每一步都可以单独测试。

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

/// 单个清理步骤
pub type CleanupStep = fn(&str) -> String;

/// 清理流水线，顺序固定
pub const PIPELINE: &[(&str, CleanupStep)] = &[
    ("strip_bracket_artifacts", strip_bracket_artifacts),
    ("strip_dagger_artifacts", strip_dagger_artifacts),
    ("strip_comma_newline_noise", strip_comma_newline_noise),
    ("collapse_repeated_ordinals", collapse_repeated_ordinals),
    ("dedup_ordinal_runs", dedup_ordinal_runs),
    ("promote_list_markers", promote_list_markers),
    ("collapse_blank_lines", collapse_blank_lines),
    ("collapse_horizontal_whitespace", collapse_horizontal_whitespace),
    ("break_after_sentences", break_after_sentences),
    ("trim", trim),
];

/// 依次执行全部清理步骤
pub fn clean(text: &str) -> String {
    PIPELINE
        .iter()
        .fold(text.to_string(), |acc, (_, step)| step(&acc))
}

static BRACKET_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"【[^】]*】|\[[^\[\]\n]*[:：†][^\[\]\n]*\]").expect("静态正则")
});
static DAGGER_ARTIFACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"†[^†\n]*†|†[^\s\[\]。，！？,.]*").expect("静态正则"));
static COMMA_BEFORE_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，][ \t]*\n").expect("静态正则"));
static COMMA_AFTER_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*[,，][ \t]*").expect("静态正则"));
static ORDINAL_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\[\d+\]){2,}").expect("静态正则"));
static ORDINAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("静态正则"));
// 冒号前是数字时（`3：16`）不算列表起点
static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[。！？\n]|[^\d\n]：)[ \t]*(\d{1,2})[.、．][ \t]*([^\d\s])").expect("静态正则")
});
static LIST_ITEM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*\*\d{1,2}\.\*\* ").expect("静态正则"));
static INLINE_NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]+(\d{1,2})[.、．][ \t]*([^\d\s])").expect("静态正则")
});
static LATIN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[。！？\n])[ \t]*([A-Z])[.、．)）][ \t]*([^\s])").expect("静态正则")
});
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("静态正则"));
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}\u{3000}]+").expect("静态正则"));
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([。！？])[ \t]*([^\s。！？」』）)\]\[*,，、；;：:])").expect("静态正则")
});
// 句号前至少两个小写字母或数字，`St.`、`Dr.`、`e.g.` 不断开
static LATIN_SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-z\d)\]"'”’]{2,})([.!?])[ \t]+([A-Z])"#).expect("静态正则")
});

/// 删除引擎遗留的括号标注，如 `【4:0†source】`、`[marker:doc1]`。
/// 纯数字的 `[n]` 引用编号保留。
pub fn strip_bracket_artifacts(text: &str) -> String {
    BRACKET_ARTIFACT.replace_all(text, "").into_owned()
}

/// 删除 `†...†` 或 `†source` 形式的残留
pub fn strip_dagger_artifacts(text: &str) -> String {
    DAGGER_ARTIFACT.replace_all(text, "").into_owned()
}

/// 删除紧贴换行的逗号，以及首尾的逗号和空白
pub fn strip_comma_newline_noise(text: &str) -> String {
    let text = COMMA_BEFORE_NEWLINE.replace_all(text, "\n");
    let text = COMMA_AFTER_NEWLINE.replace_all(&text, "\n");
    text.trim_matches(|c: char| c == ',' || c == '，' || c.is_whitespace())
        .to_string()
}

/// `[n][n]` → `[n]`：合并相邻的重复编号
pub fn collapse_repeated_ordinals(text: &str) -> String {
    ORDINAL_RUN
        .replace_all(text, |caps: &Captures| {
            let mut ordinals = parse_ordinals(&caps[0]);
            ordinals.dedup();
            render_ordinals(&ordinals)
        })
        .into_owned()
}

/// `[1][2][1]` → `[1][2]`：同一组相邻编号内去重，保留首次出现顺序
pub fn dedup_ordinal_runs(text: &str) -> String {
    ORDINAL_RUN
        .replace_all(text, |caps: &Captures| {
            let mut seen = HashSet::new();
            let ordinals: Vec<&str> = parse_ordinals(&caps[0])
                .into_iter()
                .filter(|n| seen.insert(*n))
                .collect();
            render_ordinals(&ordinals)
        })
        .into_owned()
}

/// 把编号列表项（`1.`、`2、`）和句首的拉丁字母标题（`A.`）提到独立段落并加粗
///
/// 列表从句首或冒号后的编号开始；同一行里后续的 `2.`、`3.` 也各成一段
pub fn promote_list_markers(text: &str) -> String {
    let text = NUMBERED_ITEM.replace_all(text, "$1\n\n**$2.** $3");
    let text = promote_inline_items(&text);
    LATIN_HEADER
        .replace_all(&text, "$1\n\n**$2.** $3")
        .into_owned()
}

/// 只在已经是列表项的行内拆分后续编号，普通句子里的 `verse 5.` 不动
fn promote_inline_items(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if LIST_ITEM_LINE.is_match(line) {
                INLINE_NUMBERED_ITEM
                    .replace_all(line, "\n\n**$1.** $2")
                    .into_owned()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 三个及以上换行合并为两个
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n\n").into_owned()
}

/// 连续的水平空白合并为一个空格
pub fn collapse_horizontal_whitespace(text: &str) -> String {
    HORIZONTAL_SPACE.replace_all(text, " ").into_owned()
}

/// 句末标点后若不是换行、列表项或引用编号，则插入段落分隔
///
/// 英文句子在 `.!?` 加空白后接大写字母处断开
pub fn break_after_sentences(text: &str) -> String {
    let text = SENTENCE_END.replace_all(text, "$1\n\n$2");
    LATIN_SENTENCE_END
        .replace_all(&text, "$1$2\n\n$3")
        .into_owned()
}

pub fn trim(text: &str) -> String {
    text.trim().to_string()
}

fn parse_ordinals(run: &str) -> Vec<&str> {
    ORDINAL
        .captures_iter(run)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

fn render_ordinals(ordinals: &[&str]) -> String {
    ordinals.iter().map(|n| format!("[{}]", n)).collect()
}
