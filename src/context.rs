use bytes::Bytes;
use serde_json::{Map, Value};

use std::sync::Arc;

use crate::{param::HttpRequestMethod, request::Request, router::Params};

/// 响应体
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Bytes(Bytes),
}

impl Body {
    /// 是否尚未设置响应体。空字符串与空字节串视为已设置。
    pub fn is_unset(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// 根据内容推断 Content-Type。以 `<` 开头的文本按 HTML 处理。
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Body::Empty => None,
            Body::Text(text) if text.starts_with('<') => Some("text/html;charset=utf-8"),
            Body::Text(_) => Some("text/plain;charset=utf-8"),
            Body::Json(_) => Some("application/json;charset=utf-8"),
            Body::Bytes(_) => Some("application/octet-stream"),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Text(text) => Bytes::from(text.clone()),
            Body::Json(value) => Bytes::from(value.to_string()),
            Body::Bytes(bytes) => bytes.clone(),
        }
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

/// 单个请求的上下文，在中间件链中按值传递。
///
/// 状态码初始为 404；设置响应体时若尚未显式设置状态码，
/// 则自动变为 200（`Body::Empty` 为 204）。
#[derive(Debug, Clone)]
pub struct Context {
    id: u128,
    request: Arc<Request>,
    params: Params,
    state: Map<String, Value>,
    status: u16,
    explicit_status: bool,
    body: Body,
    headers: Vec<(String, String)>,
}

impl Context {
    pub fn new(id: u128, request: Request) -> Self {
        Self {
            id,
            request: Arc::new(request),
            params: Params::default(),
            state: Map::new(),
            status: 404,
            explicit_status: false,
            body: Body::Empty,
            headers: vec![],
        }
    }

    /// 连接编号，用于日志中的 `[ID{}]` 标记
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.request.method()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// 路由参数的便捷读取
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// 中间件之间共享数据的地方
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
        self.explicit_status = true;
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
        if !self.explicit_status {
            self.status = if self.body.is_unset() { 204 } else { 200 };
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 设置响应头，同名（大小写不敏感）的旧值会被替换。
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> Context {
        Context::new(1, Request::new(HttpRequestMethod::Get, "/user/john?tab=1"))
    }

    #[test]
    fn test_initial_state() {
        let ctx = context();
        assert_eq!(ctx.status(), 404);
        assert_eq!(ctx.body(), &Body::Empty);
        assert_eq!(ctx.path(), "/user/john");
        assert_eq!(ctx.method(), HttpRequestMethod::Get);
        assert!(ctx.params().is_empty());
    }

    #[test]
    fn test_set_body_implies_status() {
        let mut ctx = context();
        ctx.set_body("hello");
        assert_eq!(ctx.status(), 200);

        let mut ctx = context();
        ctx.set_body(());
        assert_eq!(ctx.status(), 204);
    }

    #[test]
    fn test_empty_string_body_is_ok() {
        let mut ctx = context();
        ctx.set_body("");
        assert_eq!(ctx.status(), 200);
        assert!(!ctx.body().is_unset());

        let mut ctx = context();
        ctx.set_body(Vec::<u8>::new());
        assert_eq!(ctx.status(), 200);
    }

    #[test]
    fn test_explicit_status_is_kept() {
        let mut ctx = context();
        ctx.set_status(201);
        ctx.set_body(json!({"created": true}));
        assert_eq!(ctx.status(), 201);
        assert_eq!(ctx.body().content_type(), Some("application/json;charset=utf-8"));
    }

    #[test]
    fn test_body_content_types() {
        assert_eq!(Body::from("<p>hi</p>").content_type(), Some("text/html;charset=utf-8"));
        assert_eq!(Body::from("hi").content_type(), Some("text/plain;charset=utf-8"));
        assert_eq!(Body::from(vec![1u8, 2]).content_type(), Some("application/octet-stream"));
        assert_eq!(Body::Empty.content_type(), None);
        assert_eq!(Body::from(json!([1])).to_bytes(), Bytes::from("[1]"));
    }

    #[test]
    fn test_headers_replace_case_insensitively() {
        let mut ctx = context();
        ctx.set_header("X-Trace", "a");
        ctx.set_header("x-trace", "b");
        assert_eq!(ctx.headers().len(), 1);
        assert_eq!(ctx.header("X-TRACE"), Some("b"));
    }
}
