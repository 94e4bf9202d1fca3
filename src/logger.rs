//! # 应用日志模块
//!
//! 提供八个级别（emergency ... debug）的 `Logger` 接口以及 `{{token}}` 消息模板。
//! 框架内部诊断信息仍然直接使用 `log` 宏；`Logger` 面向应用代码与服务器的错误上报。
//!
//! 两个实现：
//! - `ConsoleLogger`：带时间戳与颜色，错误类级别写入标准错误流，其余写入标准输出；
//! - `LogFacade`：转发给 `log` 门面，由 log4rs 等后端决定输出位置。

use chrono::Local;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
    sync::Mutex,
};

use crate::exception::Exception;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"(?i)\{\{([a-z][a-z0-9]*)\}\}").unwrap();
}

/// 日志级别，按严重程度从高到低排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Emergency,
        LogLevel::Alert,
        LogLevel::Critical,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Notice,
        LogLevel::Info,
        LogLevel::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// 错误类级别写入错误流。
    pub fn is_error(&self) -> bool {
        *self <= LogLevel::Error
    }

    /// ANSI 颜色码
    fn color(&self) -> &'static str {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => "31",
            LogLevel::Warning | LogLevel::Notice => "33",
            LogLevel::Info => "34",
            LogLevel::Debug => "36",
        }
    }

    /// 对应的 `log` 门面级别
    pub fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                log::Level::Error
            }
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Notice | LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Exception;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        LogLevel::ALL
            .iter()
            .find(|level| level.as_str() == lower)
            .copied()
            .ok_or_else(|| Exception::new(format!("Unknown log level: {}", s)).with_code("E_LOG_LEVEL"))
    }
}

/// 判断模板变量是否视为"有值"：null、false、0 与空字符串保留占位符原样输出。
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 用 `context` 中的同名字段替换消息中的 `{{token}}`。
pub fn render(message: &str, context: &Value) -> String {
    PLACEHOLDER
        .replace_all(message, |caps: &Captures| {
            match context.get(&caps[1]).filter(|value| is_truthy(value)) {
                Some(Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// 应用日志接口。实现者只需提供 `log`。
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, context: &Value);

    fn emergency(&self, message: &str, context: &Value) {
        self.log(LogLevel::Emergency, message, context)
    }

    fn alert(&self, message: &str, context: &Value) {
        self.log(LogLevel::Alert, message, context)
    }

    fn critical(&self, message: &str, context: &Value) {
        self.log(LogLevel::Critical, message, context)
    }

    fn error(&self, message: &str, context: &Value) {
        self.log(LogLevel::Error, message, context)
    }

    fn warning(&self, message: &str, context: &Value) {
        self.log(LogLevel::Warning, message, context)
    }

    fn notice(&self, message: &str, context: &Value) {
        self.log(LogLevel::Notice, message, context)
    }

    fn info(&self, message: &str, context: &Value) {
        self.log(LogLevel::Info, message, context)
    }

    fn debug(&self, message: &str, context: &Value) {
        self.log(LogLevel::Debug, message, context)
    }
}

type Sink = Mutex<Box<dyn Write + Send>>;

/// 控制台日志，格式为 `HH:MM:SS.mmm [level] message`，每条后空一行。
pub struct ConsoleLogger {
    out: Sink,
    err: Sink,
    colored: bool,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    /// 写入标准输出 / 标准错误流，启用颜色。
    pub fn new() -> Self {
        Self {
            out: Mutex::new(Box::new(io::stdout())),
            err: Mutex::new(Box::new(io::stderr())),
            colored: true,
        }
    }

    /// 写入自定义的输出流，不带颜色。
    pub fn with_writers(out: impl Write + Send + 'static, err: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            err: Mutex::new(Box::new(err)),
            colored: false,
        }
    }

    pub fn colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colored {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        let time = Local::now().format("%H:%M:%S%.3f").to_string();
        let line = format!(
            "{} {} {}\n\n",
            self.paint(&time, "33"),
            self.paint(&format!("[{}]", level), level.color()),
            render(message, context)
        );
        let sink = if level.is_error() { &self.err } else { &self.out };
        let mut writer = match sink.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 日志写入失败不应影响请求处理
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

/// 转发到 `log` 门面的实现，目标（target）为 `bane`。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        log::log!(target: "bane", level.to_log_level(), "[{}] {}", level, render(message, context));
    }
}
