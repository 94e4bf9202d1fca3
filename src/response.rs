// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! 将中间件链处理后的 `Context` 转换为 HTTP/1.1 响应报文。
//! 每个连接只处理一个请求，响应总是携带 `Connection: close`。

use bytes::Bytes;
use chrono::prelude::*;
use log::warn;

use crate::{context::Context, param::*, util::HtmlBuilder};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    server_name: String,
    headers: Vec<(String, String)>,
    content: Option<Bytes>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            server_name: SERVER_NAME.to_string(),
            headers: vec![],
            content: None,
        }
    }

    /// 根据上下文生成响应。
    ///
    /// 响应体为空且状态码表示错误（或 404）时，以原因短语作为纯文本响应体。
    /// `head_only` 为真时只保留 `Content-Length`，不发送响应体。
    pub fn from_context(ctx: &Context, head_only: bool) -> Self {
        let mut response = Self::new();
        response.set_code(ctx.status());
        response.headers = ctx
            .headers()
            .iter()
            .filter(|(name, _)| !is_managed_header(name))
            .cloned()
            .collect();

        let body = ctx.body();
        let (content, content_type) = if !body.is_unset() {
            let content_type = ctx
                .header("content-type")
                .map(str::to_string)
                .or_else(|| body.content_type().map(str::to_string));
            (body.to_bytes(), content_type)
        } else if ctx.status() >= 400 {
            (
                Bytes::from(response.information.clone()),
                Some("text/plain;charset=utf-8".to_string()),
            )
        } else {
            (Bytes::new(), None)
        };

        // 204 与 304 不允许携带响应体
        if matches!(ctx.status(), 204 | 304) {
            return response;
        }

        response.content_length = content.len() as u64;
        response.content_type = content_type;
        if !head_only && !content.is_empty() {
            response.content = Some(content);
        }
        response
    }

    /// 传输层错误（无法解析的报文等）对应的 HTML 状态页。
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let mut response = Self::new();
        let content = HtmlBuilder::from_status_code(code, note).build();
        let bytes = Bytes::from(content);
        response.content_length = bytes.len() as u64;
        response.content = Some(bytes);
        response.content_type = Some("text/html;charset=utf-8".to_string());
        response.set_code(code);
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match reason_phrase(code) {
            Some(information) => information.to_string(),
            None => {
                warn!("未登记的状态码：{}", code);
                "Unknown Status".to_string()
            }
        };
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let version = self.version.to_string();
        let status_code = self.status_code.to_string();
        let content_length = self.content_length.to_string();
        let date = format_date(&self.date);

        let extra_headers: String = self
            .headers
            .iter()
            .map(|(name, value)| [name.as_str(), ": ", value.as_str(), CRLF].concat())
            .collect();

        let header = [
            version.as_str(),
            " ",
            status_code.as_str(),
            " ",
            &self.information,
            CRLF,
            match &self.content_type {
                Some(t) => ["Content-Type: ", t, CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            "Content-Length: ",
            content_length.as_str(),
            CRLF,
            "Date: ",
            date.as_str(),
            CRLF,
            "Server: ",
            &self.server_name,
            CRLF,
            extra_headers.as_str(),
            "Connection: close",
            CRLF,
            CRLF,
        ]
        .concat();
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => &c[..],
                None => b"",
            },
        ]
        .concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 这些头部由响应本身生成，中间件设置的同名头部会被忽略
fn is_managed_header(name: &str) -> bool {
    ["content-type", "content-length", "date", "server", "connection"]
        .iter()
        .any(|managed| name.eq_ignore_ascii_case(managed))
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use serde_json::json;

    fn context(method: HttpRequestMethod) -> Context {
        Context::new(1, Request::new(method, "/"))
    }

    fn text(response: &Response) -> String {
        String::from_utf8_lossy(&response.as_bytes()).to_string()
    }

    #[test]
    fn test_format_date() {
        let date = Utc::now();
        let formatted = format_date(&date);

        assert!(formatted.contains("+0000") || formatted.contains("GMT"));
    }

    #[test]
    fn test_response_new() {
        let response = Response::new();

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.information(), "OK");
        assert_eq!(response.content_length(), 0);
    }

    #[test]
    fn test_response_as_bytes_basic() {
        let response_str = text(&Response::new());

        assert!(response_str.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response_str.contains("Content-Length: 0"));
        assert!(response_str.contains("Server: bane"));
        assert!(response_str.contains("Connection: close"));
        assert!(response_str.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_from_context_text_body() {
        let mut ctx = context(HttpRequestMethod::Get);
        ctx.set_body("Hello");
        ctx.set_header("X-Powered-By", "bane");

        let response = Response::from_context(&ctx, false);
        let response_str = text(&response);

        assert_eq!(response.status_code(), 200);
        assert!(response_str.contains("Content-Type: text/plain;charset=utf-8"));
        assert!(response_str.contains("Content-Length: 5"));
        assert!(response_str.contains("X-Powered-By: bane\r\n"));
        assert!(response_str.ends_with("Hello"));
    }

    #[test]
    fn test_from_context_json_body() {
        let mut ctx = context(HttpRequestMethod::Get);
        ctx.set_body(json!({"ok": true}));

        let response = Response::from_context(&ctx, false);

        assert_eq!(response.content_type(), Some("application/json;charset=utf-8"));
        assert_eq!(response.content(), Some(&Bytes::from(r#"{"ok":true}"#)));
    }

    #[test]
    fn test_from_context_not_found_uses_reason_phrase() {
        let ctx = context(HttpRequestMethod::Get);
        let response = Response::from_context(&ctx, false);

        assert_eq!(response.status_code(), 404);
        assert_eq!(response.content(), Some(&Bytes::from("Not Found")));
        assert_eq!(response.content_type(), Some("text/plain;charset=utf-8"));
    }

    #[test]
    fn test_from_context_head_only() {
        let mut ctx = context(HttpRequestMethod::Head);
        ctx.set_body("Hello, world!");

        let response = Response::from_context(&ctx, true);

        assert_eq!(response.content_length(), 13);
        assert!(response.content().is_none());
        assert!(text(&response).ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_from_context_empty_string_body() {
        let mut ctx = context(HttpRequestMethod::Get);
        ctx.set_body("");

        let response = Response::from_context(&ctx, false);

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_length(), 0);
        assert_eq!(response.content_type(), Some("text/plain;charset=utf-8"));
        assert!(response.content().is_none());
    }

    #[test]
    fn test_from_context_no_content() {
        let mut ctx = context(HttpRequestMethod::Delete);
        ctx.set_body(());

        let response = Response::from_context(&ctx, false);

        assert_eq!(response.status_code(), 204);
        assert_eq!(response.content_length(), 0);
        assert!(response.content_type().is_none());
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let mut ctx = context(HttpRequestMethod::Get);
        ctx.set_body("a,b");
        ctx.set_header("Content-Type", "text/csv");

        let response = Response::from_context(&ctx, false);

        assert_eq!(response.content_type(), Some("text/csv"));
        assert_eq!(text(&response).matches("Content-Type").count(), 1);
    }

    #[test]
    fn test_status_page() {
        let response = Response::from_status_code(400, None);

        assert_eq!(response.status_code(), 400);
        assert_eq!(response.information(), "Bad Request");
        assert!(text(&response).contains("<h1>400</h1>"));
    }

    #[test]
    fn test_unknown_status_code() {
        let mut response = Response::new();
        response.set_code(599);

        assert_eq!(response.status_code(), 599);
        assert_eq!(response.information(), "Unknown Status");
    }
}
