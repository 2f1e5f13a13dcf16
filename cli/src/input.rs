use anyhow::{bail, Context, Result};
use serde_json::Value;
use sqlxrecord::Record;
use std::fs;

/// 解析命令行传入的 JSON 对象，`@path` 表示从文件读取
pub fn parse_record(arg: &str) -> Result<Record> {
    let text = match arg.strip_prefix('@') {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path))?
        }
        None => arg.to_string(),
    };
    match serde_json::from_str::<Value>(&text).context("Invalid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Expected a JSON object, got {}", other),
    }
}

/// 关联键按 JSON 解析（`42`、`"alice"`），解析失败时当作普通字符串
pub fn parse_key(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}
