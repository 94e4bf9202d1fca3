use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use log::{debug, warn};
use std::fs;

use crate::exception::Exception;

/// 以点号路径访问的配置仓库，例如 `app.env` 或 `servers[0].port`。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    values: Value,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn as_key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

/// 解析 `a.b[0].c` 形式的路径。纯数字的片段同时可以作为数组下标。
fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = vec![];
    for part in path.split('.') {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            let key = &rest[..open];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            rest = &rest[open..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = match stripped.find(']') {
                    Some(close) => close,
                    None => break,
                };
                let inner = &stripped[..close];
                segments.push(match inner.parse::<usize>() {
                    Ok(index) => Segment::Index(index),
                    Err(_) => Segment::Key(inner.trim_matches(|c| c == '"' || c == '\'').to_string()),
                });
                rest = &stripped[close + 1..];
            }
            continue;
        }
        if rest.is_empty() {
            continue;
        }
        segments.push(match rest.parse::<usize>() {
            Ok(index) => Segment::Index(index),
            Err(_) => Segment::Key(rest.to_string()),
        });
    }
    segments
}

fn child<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (value, segment) {
        (Value::Object(map), segment) => map.get(&segment.as_key()),
        (Value::Array(list), Segment::Index(index)) => list.get(*index),
        _ => None,
    }
}

fn empty_container(next: &Segment) -> Value {
    match next {
        Segment::Index(_) => Value::Array(vec![]),
        Segment::Key(_) => Value::Object(Map::new()),
    }
}

/// 取出（必要时创建）`segment` 对应的子节点。
fn child_mut<'a>(value: &'a mut Value, segment: &Segment, next: Option<&Segment>) -> &'a mut Value {
    let fresh = || next.map(empty_container).unwrap_or(Value::Null);
    match (value, segment) {
        (Value::Array(list), Segment::Index(index)) => {
            if list.len() <= *index {
                list.resize(*index + 1, Value::Null);
            }
            let slot = &mut list[*index];
            if next.is_some() && !slot.is_object() && !slot.is_array() {
                *slot = fresh();
            }
            slot
        }
        (value, segment) => {
            if !value.is_object() {
                *value = Value::Object(Map::new());
            }
            let map = match value {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
            let slot = map.entry(segment.as_key()).or_insert_with(fresh);
            if next.is_some() && !slot.is_object() && !slot.is_array() {
                *slot = fresh();
            }
            slot
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            values: Value::Object(Map::new()),
        }
    }

    pub fn from_value(values: Value) -> Self {
        Self { values }
    }

    /// 从 TOML 文件读取配置。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let text = match fs::read_to_string(filename) {
            Ok(text) => text,
            Err(e) => {
                warn!("无法读取配置文件{}：{}", filename, e);
                return Err(Exception::new(format!("Unable to read config file {}", filename))
                    .with_code("E_CONFIG_READ")
                    .with_cause(e));
            }
        };
        let config = Self::from_toml_str(&text)?;
        debug!("配置文件{}已载入", filename);
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, Exception> {
        let values: Value = toml::from_str(text).map_err(|e| {
            Exception::new("Unable to parse TOML configuration")
                .with_code("E_CONFIG_PARSE")
                .with_cause(e)
        })?;
        Ok(Self { values })
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// 按路径读取配置值，路径不存在时返回 `None`。
    pub fn get(&self, path: &str) -> Option<&Value> {
        parse_path(path)
            .iter()
            .try_fold(&self.values, |value, segment| child(value, segment))
    }

    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    /// 读取并反序列化为指定类型。路径不存在时返回 `Ok(None)`。
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, Exception> {
        match self.get(path) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// 整个配置树
    pub fn all(&self) -> &Value {
        &self.values
    }

    /// 按路径写入配置值，自动创建中间节点；下一段是数组下标时创建数组。
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = parse_path(path);
        if segments.is_empty() {
            return;
        }
        let mut node = &mut self.values;
        for (index, segment) in segments.iter().enumerate() {
            let next = segments.get(index + 1);
            node = child_mut(node, segment, next);
        }
        *node = value;
    }

    /// 将 `section` 段反序列化为配置结构体，段不存在时按空表处理以套用默认值。
    pub fn settings<T: DeserializeOwned>(&self, section: &str) -> Result<T, Exception> {
        let value = self
            .get(section)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(serde_json::from_value(value)?)
    }
}

/// `server` 段的配置。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_threads: 0,
        }
    }
}

impl ServerSettings {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 配置为 0 时取 CPU 核数。
    pub fn worker_threads(&self) -> usize {
        match self.worker_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_set_and_get() {
        let mut config = Config::new();
        config.set("app.name", json!("bane"));

        assert!(config.has("app.name"));
        assert!(config.has("app"));
        assert_eq!(config.get("app.name"), Some(&json!("bane")));
        assert_eq!(config.all(), &json!({"app": {"name": "bane"}}));
    }

    #[test]
    fn test_get_missing() {
        let config = Config::new();

        assert!(!config.has("app.name"));
        assert_eq!(config.get("app.name"), None);
        assert_eq!(config.get_or("app.name", json!("default")), json!("default"));
    }

    #[test]
    fn test_set_overwrites_scalar_parent() {
        let mut config = Config::new();
        config.set("a", json!(1));
        config.set("a.b", json!(2));

        assert_eq!(config.all(), &json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_array_paths() {
        let mut config = Config::new();
        config.set("servers[1].port", json!(8080));

        assert_eq!(config.all(), &json!({"servers": [null, {"port": 8080}]}));
        assert_eq!(config.get("servers[1].port"), Some(&json!(8080)));
        assert_eq!(config.get("servers.1.port"), Some(&json!(8080)));
        assert!(!config.has("servers[0].port"));
    }

    #[test]
    fn test_get_as() {
        let mut config = Config::new();
        config.set("server.port", json!(8080));

        assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(8080));
        assert_eq!(config.get_as::<u16>("server.host").unwrap(), None);
        assert!(config.get_as::<u16>("server").is_err());
    }

    #[test]
    fn test_from_toml_str() {
        let config = Config::from_toml_str(
            r#"
            [app]
            env = "production"

            [server]
            host = "0.0.0.0"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.get("app.env"), Some(&json!("production")));
        let settings: ServerSettings = config.settings("server").unwrap();
        assert_eq!(settings.host(), "0.0.0.0");
        assert_eq!(settings.port(), 8080);
        assert!(settings.worker_threads() > 0);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("this is = = not toml").unwrap_err();
        assert_eq!(err.code(), "E_CONFIG_PARSE");
    }

    #[test]
    fn test_settings_defaults() {
        let config = Config::new();
        let settings: ServerSettings = config.settings("server").unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.host(), "localhost");
        assert_eq!(settings.port(), 3000);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[app]\nenv = \"testing\"").unwrap();

        let config = Config::from_toml(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.get("app.env"), Some(&json!("testing")));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_toml("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err.code(), "E_CONFIG_READ");
    }
}
