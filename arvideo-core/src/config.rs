//! 配置字符串分词
//!
//! 配置字符串形如 `-device=Dummy -width=640 -cachedir="/tmp/my cache" -camcalibbydevid`。
//! 空白 (空格/Tab) 分隔 token；取值可以用双引号包裹以容纳空格。
//! 所有解析都基于内部持有的副本，调用方传入的字符串永远不会被修改。

use std::str::FromStr;

use crate::error::{Result, VideoError};

/// 环境变量：未显式提供配置时使用的默认配置字符串
pub const CONFIG_ENV_VAR: &str = "ARVIDEO_VCONF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigToken {
    /// 原始文本 (含引号)
    pub raw: String,
    /// 去掉前导 '-' 的键名，例如 "width"
    pub key: String,
    /// 去掉引号后的取值；无 '=' 的 flag 为 None
    pub value: Option<String>,
    /// token 在源字符串中的字节区间
    pub start: usize,
    pub end: usize,
}

impl ConfigToken {
    /// 是否为 `-key...` 形式
    pub fn is_option(&self) -> bool {
        self.raw.starts_with('-')
    }

    /// 解析取值，失败时返回带键名的 InvalidConfig
    pub fn parse_value<T: FromStr>(&self) -> Result<T> {
        let value = self.value.as_deref().ok_or_else(|| {
            VideoError::InvalidConfig(format!("option '-{}=' requires a value", self.key))
        })?;
        value.parse::<T>().map_err(|_| {
            VideoError::InvalidConfig(format!(
                "option '-{}=' has invalid value '{}'",
                self.key, value
            ))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigTokens {
    source: String,
    tokens: Vec<ConfigToken>,
}

impl ConfigTokens {
    pub fn parse(config: &str) -> Self {
        let source = config.to_owned();
        let bytes = source.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;

        loop {
            // 1. 跳过空白
            while i < bytes.len() && is_blank(bytes[i]) {
                i += 1;
            }
            if i >= bytes.len() {
                break;
            }

            // 2. 读取一个 token，引号内的空白不作为分隔
            let start = i;
            let mut in_quotes = false;
            while i < bytes.len() && (in_quotes || !is_blank(bytes[i])) {
                if bytes[i] == b'"' {
                    in_quotes = !in_quotes;
                }
                i += 1;
            }
            let raw = &source[start..i];
            tokens.push(split_token(raw, start, i));
        }

        Self { source, tokens }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigToken> {
        self.tokens.iter()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 最后一次出现的同名选项 (后出现的覆盖先出现的)
    pub fn get(&self, key: &str) -> Option<&ConfigToken> {
        self.tokens.iter().rev().find(|t| t.key == key)
    }

    pub fn contains_flag(&self, key: &str) -> bool {
        self.tokens.iter().any(|t| t.key == key)
    }

    /// 返回指定 token 之后的子串 (去掉前导空白)
    pub fn remainder_after(&self, token: &ConfigToken) -> &str {
        self.source[token.end..].trim_start_matches([' ', '\t'])
    }

    /// 小写副本，用于大小写不敏感的后端
    pub fn lowercased(&self) -> ConfigTokens {
        ConfigTokens::parse(&self.source.to_lowercase())
    }
}

impl<'a> IntoIterator for &'a ConfigTokens {
    type Item = &'a ConfigToken;
    type IntoIter = std::slice::Iter<'a, ConfigToken>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n' || b == b'\r'
}

fn split_token(raw: &str, start: usize, end: usize) -> ConfigToken {
    let body = raw.strip_prefix('-').unwrap_or(raw);
    let (key, value) = match body.split_once('=') {
        Some((k, v)) => (k.to_owned(), Some(unquote(v).to_owned())),
        None => (body.to_owned(), None),
    };
    ConfigToken {
        raw: raw.to_owned(),
        key,
        value,
        start,
        end,
    }
}

fn unquote(v: &str) -> &str {
    let v = v.strip_prefix('"').unwrap_or(v);
    v.strip_suffix('"').unwrap_or(v)
}

/// 选择生效的配置字符串：显式参数 > 环境变量 > None (默认配置)
pub fn effective_config(config: Option<&str>) -> Option<String> {
    match config {
        Some(c) if !c.trim().is_empty() => {
            tracing::info!(target: "arvideo::config", "Using supplied video config \"{}\".", c);
            Some(c.to_owned())
        }
        _ => match std::env::var(CONFIG_ENV_VAR) {
            Ok(env) if !env.trim().is_empty() => {
                tracing::info!(target: "arvideo::config", "Using video config from environment \"{}\".", env);
                Some(env)
            }
            _ => {
                tracing::info!(target: "arvideo::config", "Using default video config.");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_blanks_and_keeps_offsets() {
        let t = ConfigTokens::parse("  -device=Dummy\t-width=640 -flag ");
        let keys: Vec<_> = t.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, ["device", "width", "flag"]);
        let width = t.get("width").unwrap();
        assert_eq!(width.value.as_deref(), Some("640"));
        assert_eq!(&t.source()[width.start..width.end], "-width=640");
        assert_eq!(t.get("flag").unwrap().value, None);
    }

    #[test]
    fn quoted_values_may_contain_spaces() {
        let t = ConfigTokens::parse(r#"-cachedir="/tmp/my cache" -x=1"#);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("cachedir").unwrap().value.as_deref(), Some("/tmp/my cache"));
    }

    #[test]
    fn remainder_follows_token() {
        let t = ConfigTokens::parse("-device=GStreamer   v4l2src ! videoconvert");
        let dev = t.iter().next().unwrap();
        assert_eq!(t.remainder_after(dev), "v4l2src ! videoconvert");
    }

    #[test]
    fn lowercasing_uses_a_private_copy() {
        let original = String::from("-Device=Android -FORMAT=NV21");
        let t = ConfigTokens::parse(&original);
        let lower = t.lowercased();
        assert_eq!(lower.get("format").unwrap().value.as_deref(), Some("nv21"));
        assert_eq!(original, "-Device=Android -FORMAT=NV21");
        assert_eq!(t.source(), "-Device=Android -FORMAT=NV21");
    }

    #[test]
    fn parse_value_reports_key() {
        let t = ConfigTokens::parse("-width=abc");
        let err = t.get("width").unwrap().parse_value::<u32>().unwrap_err();
        assert!(err.to_string().contains("-width="));
    }
}
