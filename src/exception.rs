// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 框架内所有组件共用的错误类型。
//!
//! ## 设计意图
//! - **单一类型**：容器、路由、请求解析等模块都返回 `Exception`，通过 `kind` 区分来源，
//!   不存在继承链。
//! - **HTTP 语义**：每个异常都携带 `status`，服务器据此设置响应状态码。
//! - **可序列化**：`Serialize` 只输出 `name`、`message`、`code`、`status`、`data` 五个字段，
//!   调用栈与原始错误不会泄露到 JSON 中。

use serde_derive::Serialize;
use serde_json::{Map, Value};

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    error::Error,
    fmt,
    sync::Arc,
};

/// 异常的来源分类，决定 `name` 与默认的错误码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// 通用异常
    Exception,
    /// 依赖注入容器在构建实例时失败
    Container,
    /// 容器中不存在请求的条目
    ContainerNotFound,
    /// 路由器内部错误（例如非法的路由模式）
    Router,
    /// 没有任何路由能够匹配当前请求
    RouterNotFound,
}

impl ExceptionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::Container => "ContainerException",
            ExceptionKind::ContainerNotFound => "NotFoundException",
            ExceptionKind::Router => "RouterException",
            ExceptionKind::RouterNotFound => "NotFoundException",
        }
    }
}

/// 框架统一的异常类型。
#[derive(Debug, Clone, Serialize)]
pub struct Exception {
    #[serde(skip)]
    kind: ExceptionKind,
    name: &'static str,
    message: String,
    code: String,
    status: u16,
    data: Value,
    #[serde(skip)]
    cause: Option<Arc<dyn Error + Send + Sync>>,
    #[serde(skip)]
    backtrace: Option<String>,
}

const DEFAULT_MESSAGE: &str = "Internal error";
const DEFAULT_CODE: &str = "E_INTERNAL_ERROR";
const DEFAULT_STATUS: u16 = 500;

impl Exception {
    /// 使用默认错误码 `E_INTERNAL_ERROR` 与状态码 500 构造异常。
    ///
    /// 空消息会被替换为 `Internal error`。
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ExceptionKind::Exception, message.into(), DEFAULT_MESSAGE, DEFAULT_CODE, DEFAULT_STATUS)
    }

    /// 容器异常，默认消息 `Unexpected container exception`。
    pub fn container(message: impl Into<String>) -> Self {
        Self::with_kind(
            ExceptionKind::Container,
            message.into(),
            "Unexpected container exception",
            "E_CONTAINER_EXCEPTION",
            DEFAULT_STATUS,
        )
    }

    /// 容器中找不到条目。
    pub fn container_not_found() -> Self {
        Self::with_kind(
            ExceptionKind::ContainerNotFound,
            "No entry was found in the container".to_string(),
            "",
            "E_CONTAINER_NO_ENTRY",
            DEFAULT_STATUS,
        )
    }

    /// 路由异常，默认消息 `Unexpected router exception`。
    pub fn router(message: impl Into<String>) -> Self {
        Self::with_kind(
            ExceptionKind::Router,
            message.into(),
            "Unexpected router exception",
            "E_ROUTER_EXCEPTION",
            DEFAULT_STATUS,
        )
    }

    /// 没有路由匹配当前请求，对应 `404 Not Found`。
    pub fn router_not_found() -> Self {
        Self::with_kind(
            ExceptionKind::RouterNotFound,
            "No entry was found in the router".to_string(),
            "",
            "E_ROUTER_NOT_FOUND",
            404,
        )
    }

    fn with_kind(kind: ExceptionKind, message: String, fallback: &str, code: &str, status: u16) -> Self {
        let message = if message.is_empty() {
            fallback.to_string()
        } else {
            message
        };
        let backtrace = Backtrace::capture();
        let backtrace = match backtrace.status() {
            BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        Self {
            kind,
            name: kind.name(),
            message,
            code: code.to_string(),
            status,
            data: Value::Object(Map::new()),
            cause: None,
            backtrace,
        }
    }

    /// 将任意错误规整为 `Exception`。
    ///
    /// 已经是 `Exception` 的错误原样返回（克隆），其他错误仅保留消息，
    /// 使用默认的错误码与状态码，原始错误作为 `source()` 保存。
    pub fn normalize(error: &(dyn Error + 'static)) -> Self {
        match error.downcast_ref::<Exception>() {
            Some(exception) => exception.clone(),
            None => Self::new(error.to_string()),
        }
    }

    /// 包装一个外部错误，保留其为 `source()`。
    pub fn from_error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::new(error.to_string()).with_cause(error)
    }
}

// --- Builder 风格的修改器 ---

impl Exception {
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.cause = Some(Arc::from(cause.into()));
        self
    }
}

// --- Getter 访问器实现 ---

impl Exception {
    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// 任一来源的 `NotFoundException`。
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ExceptionKind::ContainerNotFound | ExceptionKind::RouterNotFound
        )
    }

    /// `ContainerException` 及其子类 `NotFoundException`。
    pub fn is_container_error(&self) -> bool {
        matches!(
            self.kind,
            ExceptionKind::Container | ExceptionKind::ContainerNotFound
        )
    }

    /// `RouterException` 及其子类 `NotFoundException`。
    pub fn is_router_error(&self) -> bool {
        matches!(
            self.kind,
            ExceptionKind::Router | ExceptionKind::RouterNotFound
        )
    }

    /// 生成调用栈文本：首行 `Name: message`，随后是错误链，
    /// 若运行时开启了 `RUST_BACKTRACE` 则附带回溯信息。
    pub fn stack(&self) -> String {
        let mut stack = format!("{}: {}", self.name, self.message);
        let mut source = self.source();
        while let Some(cause) = source {
            stack.push_str(&format!("\n    caused by: {}", cause));
            source = cause.source();
        }
        if let Some(backtrace) = &self.backtrace {
            stack.push('\n');
            stack.push_str(backtrace);
        }
        stack
    }

    /// 序列化为 JSON 对象。
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for Exception {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

impl From<std::io::Error> for Exception {
    fn from(error: std::io::Error) -> Self {
        Exception::from_error(error)
    }
}

impl From<serde_json::Error> for Exception {
    fn from(error: serde_json::Error) -> Self {
        Exception::from_error(error)
    }
}

impl From<toml::de::Error> for Exception {
    fn from(error: toml::de::Error) -> Self {
        Exception::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let exception = Exception::new("");
        assert_eq!(exception.name(), "Exception");
        assert_eq!(exception.message(), "Internal error");
        assert_eq!(exception.code(), "E_INTERNAL_ERROR");
        assert_eq!(exception.status(), 500);
        assert_eq!(exception.data(), &json!({}));
    }

    #[test]
    fn test_custom_fields() {
        let exception = Exception::new("Boom")
            .with_code("E_BOOM")
            .with_status(418)
            .with_data(json!({"field": "value"}));
        assert_eq!(exception.message(), "Boom");
        assert_eq!(exception.code(), "E_BOOM");
        assert_eq!(exception.status(), 418);
        assert_eq!(exception.data()["field"], "value");
        assert_eq!(exception.to_string(), "Boom");
    }

    #[test]
    fn test_to_json() {
        let exception = Exception::new("Boom").with_data(json!({"a": 1}));
        assert_eq!(
            exception.to_json(),
            json!({
                "name": "Exception",
                "message": "Boom",
                "code": "E_INTERNAL_ERROR",
                "status": 500,
                "data": {"a": 1}
            })
        );
    }

    #[test]
    fn test_container_exceptions() {
        let exception = Exception::container("");
        assert_eq!(exception.name(), "ContainerException");
        assert_eq!(exception.message(), "Unexpected container exception");
        assert_eq!(exception.code(), "E_CONTAINER_EXCEPTION");
        assert_eq!(exception.status(), 500);
        assert!(exception.is_container_error());
        assert!(!exception.is_not_found());

        let not_found = Exception::container_not_found();
        assert_eq!(not_found.name(), "NotFoundException");
        assert_eq!(not_found.message(), "No entry was found in the container");
        assert_eq!(not_found.code(), "E_CONTAINER_NO_ENTRY");
        assert_eq!(not_found.status(), 500);
        assert!(not_found.is_container_error());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_router_error());
    }

    #[test]
    fn test_router_exceptions() {
        let exception = Exception::router("bad pattern");
        assert_eq!(exception.name(), "RouterException");
        assert_eq!(exception.code(), "E_ROUTER_EXCEPTION");
        assert_eq!(exception.status(), 500);

        let not_found = Exception::router_not_found();
        assert_eq!(not_found.name(), "NotFoundException");
        assert_eq!(not_found.message(), "No entry was found in the router");
        assert_eq!(not_found.code(), "E_ROUTER_NOT_FOUND");
        assert_eq!(not_found.status(), 404);
        assert!(not_found.is_router_error());
        assert_eq!(not_found.kind(), ExceptionKind::RouterNotFound);
    }

    #[test]
    fn test_normalize_keeps_exception() {
        let exception = Exception::router_not_found();
        let normalized = Exception::normalize(&exception);
        assert_eq!(normalized.status(), 404);
        assert_eq!(normalized.code(), "E_ROUTER_NOT_FOUND");
    }

    #[test]
    fn test_normalize_wraps_plain_error() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let normalized = Exception::normalize(&error);
        assert_eq!(normalized.name(), "Exception");
        assert_eq!(normalized.message(), "disk on fire");
        assert_eq!(normalized.code(), "E_INTERNAL_ERROR");
        assert_eq!(normalized.status(), 500);
    }

    #[test]
    fn test_stack_includes_cause_chain() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "root cause");
        let exception = Exception::container("failed to build").with_cause(cause);
        let stack = exception.stack();
        assert!(stack.starts_with("ContainerException: failed to build"));
        assert!(stack.contains("caused by: root cause"));
        assert!(exception.source().is_some());
    }
}
