use std::io::{Read, Write};
use std::path::Path;

use indicatif::ProgressStyle;
use regex::Regex;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// 从标准输入读取一行，读到 EOF 时返回空字符串
pub fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let v = std::io::stdin()
        .bytes()
        .take_while(|c| c.as_ref().ok() != Some(&b'\n'))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(String::from_utf8(v)?.trim().to_owned())
}

/// 将逗号分隔的后缀列表转换为不区分大小写的正则
pub fn suffix_regex(suffix: &str) -> anyhow::Result<Regex> {
    let alternatives = suffix
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>();
    if alternatives.is_empty() {
        return Err(anyhow::anyhow!("后缀列表不能为空"));
    }
    Ok(Regex::new(&format!("(?i)^({})$", alternatives.join("|")))?)
}

pub fn has_suffix(path: &Path, re_suf: &Regex) -> bool {
    path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
}

/// 将路径转换为数据库中保存的绝对路径
pub fn normalize_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// 将多行文本压成一行，用于表格输出
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
