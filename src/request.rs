// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（Request-Line）的解析（方法、目标、版本）。
//! 2. 头部字段（Headers）的提取，字段名统一转为小写。
//! 3. 按 `Content-Length` 截取请求体。

use bytes::Bytes;
use log::error;

use crate::{
    exception::Exception,
    param::*,
    util::{find_header_end, split_target},
};

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求目标（包含查询字符串）
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 头部字段，字段名为小写，保持报文中的顺序
    headers: Vec<(String, String)>,
    /// 请求体
    body: Bytes,
}

impl Request {
    /// 直接构造请求，主要用于进程内分发与测试。
    pub fn new(method: HttpRequestMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: HttpVersion::V1_1,
            headers: vec![],
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：头部必须是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、目标和协议版本。
    /// 3. 迭代解析头部字段。
    /// 4. 根据 `Content-Length` 截取请求体。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据。
    /// * `id` - 连接 ID，用于在多线程环境下追踪日志。
    ///
    /// # 错误处理
    /// 报文不符合规范时返回 400，不支持的方法返回 501，不支持的版本返回 505。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, rest) = match find_header_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + 4..]),
            None => (buffer, &buffer[buffer.len()..]),
        };

        // 1. 将头部转换为字符串，失败则判定为非法的 HTTP 请求
        let head = match std::str::from_utf8(head) {
            Ok(string) => string,
            Err(e) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::new("Request bytes can't be parsed in UTF-8")
                    .with_code("E_REQUEST_NOT_UTF8")
                    .with_status(400)
                    .with_cause(e));
            }
        };

        let mut lines = head.split(CRLF);

        // 2. 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let request_line = lines.next().unwrap_or_default();
        let parts: Vec<&str> = request_line.split(' ').collect();

        if parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::new(format!("Malformed request line: {}", request_line))
                .with_code("E_MALFORMED_REQUEST")
                .with_status(400));
        }

        let method: HttpRequestMethod = match parts[0].parse() {
            Ok(method) => method,
            Err(e) => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(e);
            }
        };

        let version_str = parts[parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::new(format!("Unsupported HTTP version: {}", version_str))
                    .with_code("E_UNSUPPORTED_VERSION")
                    .with_status(505));
            }
        };

        // 路径中可能包含空格，虽然不规范但通过 join 尝试恢复
        let target = parts[1..parts.len() - 1].join(" ");

        // 3. 迭代各行解析 Headers
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
            .collect();

        // 4. 请求体最多截取 Content-Length 个字节
        let length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let body = Bytes::copy_from_slice(&rest[..length.min(rest.len())]);

        Ok(Self {
            method,
            target,
            version,
            headers,
            body,
        })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取完整的请求目标（含查询参数）
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        split_target(&self.target).0
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 按名称查找头部字段（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}
