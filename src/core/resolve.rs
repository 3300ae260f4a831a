//! 函数结果截断
//!
//! 超过上限的结果按字符截断到上限并追加标记，同时生成一条说明文本交给后端。

pub const FUNCTION_RESULT_LIMIT: usize = 10_000;
pub const TRUNCATION_SUFFIX: &str = "\n... [result truncated]";

/// 超过 limit 个字符时返回截断后的文本（恰好 limit 个字符 + 标记）
pub fn truncate_result(text: &str, limit: usize) -> Option<String> {
    let (cut, _) = text.char_indices().nth(limit)?;
    let mut out = String::with_capacity(cut + TRUNCATION_SUFFIX.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_SUFFIX);
    Some(out)
}

pub fn truncation_note(tool: &str, original_chars: usize, limit: usize) -> String {
    format!(
        "Note: the result of {tool} was {original_chars} characters long and has been truncated to the first {limit} characters."
    )
}
