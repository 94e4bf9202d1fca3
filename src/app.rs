// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 中间件 HTTP 运行时
//!
//! `App` 保存应用级中间件链，负责：
//! - 基于 Tokio 的监听循环，每个连接在独立任务中处理；
//! - 读取并解析请求报文，无法解析时直接返回 400/501/505 状态页；
//! - 以新的 `Context`（状态码 404、空响应体）执行中间件链；
//! - 中间件链抛出的错误由默认兜底处理：状态码取自规整后的错误，响应体为原因短语。

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    sync::oneshot,
    task::JoinHandle,
};

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::{
    context::Context,
    exception::Exception,
    middleware::{passthrough, Middleware, Next},
    param::{reason_phrase, HttpRequestMethod, MAX_REQUEST_BYTES},
    request::Request,
    response::Response,
    util::{content_length, find_header_end},
};

type Chain = Arc<[Arc<dyn Middleware>]>;

#[derive(Default)]
pub struct App {
    middlewares: Vec<Arc<dyn Middleware>>,
    /// 连接编号计数器，单调递增
    counter: Arc<AtomicU64>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在链条末尾追加一个中间件
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    fn chain(&self) -> Chain {
        self.middlewares.clone().into()
    }

    /// 在进程内处理一个请求，不经过网络。
    pub async fn respond(&self, request: Request) -> Response {
        let id = next_id(&self.counter);
        dispatch(self.chain(), request, id).await
    }

    /// 绑定地址并在后台任务中开始接受连接。
    pub async fn listen<A: ToSocketAddrs>(self, addr: A) -> Result<Listening, Exception> {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定地址，错误：{}", e);
                return Err(Exception::from_error(e).with_code("E_LISTEN"));
            }
        };
        let local_addr = listener.local_addr()?;
        info!("服务端将在{}上监听Socket连接", local_addr);

        let (shutdown, signal) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, self.chain(), self.counter.clone(), signal));

        Ok(Listening {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// 正在运行的监听器句柄
pub struct Listening {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Listening {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止接受新连接。已经在处理中的连接不受影响。
    pub async fn close(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!("监听任务异常退出：{}", e);
        }
    }

    /// 等待监听循环结束
    pub async fn wait(self) {
        let Listening { shutdown, task, .. } = self;
        if let Err(e) = task.await {
            error!("监听任务异常退出：{}", e);
        }
        drop(shutdown);
    }
}

fn next_id(counter: &AtomicU64) -> u128 {
    counter.fetch_add(1, Ordering::Relaxed) as u128
}

async fn accept_loop(
    listener: TcpListener,
    chain: Chain,
    counter: Arc<AtomicU64>,
    mut signal: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut signal => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => {
                let (mut stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("接受连接时遇到错误：{}", e);
                        continue;
                    }
                };
                let id = next_id(&counter);
                debug!("[ID{}]TCP连接已建立：{}", id, addr);

                let chain = Arc::clone(&chain);
                tokio::spawn(async move {
                    handle_connection(&mut stream, id, chain).await;
                });
            }
        }
    }
}

/// 负责单个 TCP 连接：读取请求、执行中间件链、写回响应后关闭。
async fn handle_connection(stream: &mut TcpStream, id: u128, chain: Chain) {
    let buffer = match read_request(stream, id).await {
        Ok(buffer) if buffer.is_empty() => return, // 客户端主动关闭连接
        Ok(buffer) => buffer,
        Err(e) if e.status() == 413 => {
            warn!("[ID{}]请求报文过大，返回413", id);
            write_response(stream, id, &Response::from_status_code(413, None)).await;
            return;
        }
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };

    let start_time = Instant::now();

    let response = match Request::try_from(&buffer, id) {
        Ok(request) => {
            debug!("[ID{}]成功解析HTTP请求", id);
            let summary = format!(
                "{}, {}, {}",
                request.version(),
                request.target(),
                request.method()
            );
            let user_agent = request.user_agent().to_string();
            let response = dispatch(chain, request, id).await;
            info!(
                "[ID{}] {}, {}, {}, {}, ",
                id,
                summary,
                response.status_code(),
                response.information(),
                user_agent,
            );
            response
        }
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败：{}，返回{}", id, e, e.status());
            Response::from_status_code(e.status(), None)
        }
    };

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    write_response(stream, id, &response).await;
}

/// 读取到头部结束并收齐 `Content-Length` 个字节为止。返回空缓冲区表示对端已关闭。
async fn read_request(stream: &mut TcpStream, id: u128) -> Result<Vec<u8>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    // 头部结束后报文应有的总长度
    let mut expected: Option<usize> = None;

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        // 只扫描新读入的部分，向前多留 3 字节以覆盖跨块的 `\r\n\r\n`
        let scan_from = buffer.len().saturating_sub(3);
        buffer.extend_from_slice(&chunk[..n]);

        if expected.is_none() {
            if let Some(offset) = find_header_end(&buffer[scan_from..]) {
                let end = scan_from + offset;
                let total = (end + 4).checked_add(content_length(&buffer[..end]));
                match total {
                    Some(total) if total <= MAX_REQUEST_BYTES => expected = Some(total),
                    _ => {
                        warn!("[ID{}]Content-Length超出上限", id);
                        return Err(too_large());
                    }
                }
            }
        }
        match expected {
            Some(total) if buffer.len() >= total => break,
            _ => {}
        }
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(too_large());
        }
    }

    debug!("[ID{}]HTTP请求接收完毕，共{}字节", id, buffer.len());
    Ok(buffer)
}

fn too_large() -> Exception {
    Exception::new("Request entity too large")
        .with_code("E_REQUEST_TOO_LARGE")
        .with_status(413)
}

async fn write_response(stream: &mut TcpStream, id: u128, response: &Response) {
    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送全量响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}

/// 以新的上下文执行中间件链并生成响应。
async fn dispatch(chain: Chain, request: Request, id: u128) -> Response {
    let head_only = request.method() == HttpRequestMethod::Head;
    let ctx = Context::new(id, request);
    let fallback = ctx.clone();

    let ctx = match Next::new(chain, passthrough()).run(ctx).await {
        Ok(ctx) => ctx,
        Err(e) => {
            let exception = Exception::normalize(&e);
            error!("[ID{}]未处理的异常：{}", id, exception.stack());
            let mut ctx = fallback;
            ctx.set_status(exception.status());
            ctx.set_body(reason_phrase(exception.status()).unwrap_or("Unknown Status"));
            ctx
        }
    };

    Response::from_context(&ctx, head_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Body;
    use bytes::Bytes;

    fn get(path: &str) -> Request {
        Request::new(HttpRequestMethod::Get, path)
    }

    #[tokio::test]
    async fn test_empty_app_responds_not_found() {
        let app = App::new();
        let response = app.respond(get("/")).await;

        assert_eq!(response.status_code(), 404);
        assert_eq!(response.content(), Some(&Bytes::from("Not Found")));
    }

    #[tokio::test]
    async fn test_middleware_sets_body() {
        let mut app = App::new();
        app.use_middleware(|mut ctx: Context, _next: Next| async move {
            ctx.set_body("<h1>hi</h1>");
            Ok::<_, Exception>(ctx)
        });

        let response = app.respond(get("/")).await;

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_type(), Some("text/html;charset=utf-8"));
    }

    #[tokio::test]
    async fn test_escaped_error_uses_fallback() {
        let mut app = App::new();
        app.use_middleware(|_ctx: Context, _next: Next| async move {
            Err::<Context, _>(Exception::new("boom").with_status(503))
        });

        let response = app.respond(get("/")).await;

        assert_eq!(response.status_code(), 503);
        assert_eq!(response.content(), Some(&Bytes::from("Service Unavailable")));
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let mut app = App::new();
        app.use_middleware(|mut ctx: Context, next: Next| async move {
            ctx.set_body(Body::from("Hello, world!"));
            next.run(ctx).await
        });

        let response = app.respond(Request::new(HttpRequestMethod::Head, "/")).await;

        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_length(), 13);
        assert!(response.content().is_none());
    }

    #[tokio::test]
    async fn test_listen_and_close() {
        let mut app = App::new();
        app.use_middleware(|mut ctx: Context, _next: Next| async move {
            ctx.set_body("pong");
            Ok::<_, Exception>(ctx)
        });

        let listening = app.listen("127.0.0.1:0").await.unwrap();
        let addr = listening.local_addr();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("pong"));

        listening.close().await;
    }

    #[tokio::test]
    async fn test_malformed_request_gets_status_page() {
        let listening = App::new().listen("127.0.0.1:0").await.unwrap();

        let mut stream = TcpStream::connect(listening.local_addr()).await.unwrap();
        stream.write_all(b"BREW /pot HTTP/1.1\r\n\r\n").await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
        assert!(text.contains("<h1>501</h1>"));

        listening.close().await;
    }

    #[tokio::test]
    async fn test_oversized_content_length_is_rejected() {
        let listening = App::new().listen("127.0.0.1:0").await.unwrap();

        let mut stream = TcpStream::connect(listening.local_addr()).await.unwrap();
        stream
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nhi")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.starts_with("HTTP/1.1 413 "));

        listening.close().await;
    }

    #[tokio::test]
    async fn test_header_terminator_split_across_reads() {
        let mut app = App::new();
        app.use_middleware(|mut ctx: Context, _next: Next| async move {
            let body = String::from_utf8_lossy(ctx.request().body()).to_string();
            ctx.set_body(body);
            Ok::<_, Exception>(ctx)
        });
        let listening = app.listen("127.0.0.1:0").await.unwrap();

        let mut stream = TcpStream::connect(listening.local_addr()).await.unwrap();
        stream
            .write_all(b"POST /echo HTTP/1.1\r\nContent-Length: 4\r\n\r")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stream.write_all(b"\nping").await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let text = String::from_utf8_lossy(&raw);

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("ping"));

        listening.close().await;
    }
}
