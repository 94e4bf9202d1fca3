//! # 路由模块
//!
//! 路由按注册顺序保存，解析时线性扫描，第一个路径与方法都匹配的路由胜出，
//! 不做任何"更具体优先"的排序。

pub mod pattern;
pub mod route;

pub use pattern::{Modifier, Token, TokenName};
pub use route::{Params, Route};

use log::debug;

use std::sync::Arc;

use crate::{exception::Exception, middleware::Handler, param::HttpRequestMethod};

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有已注册的路由，按注册顺序排列
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// 底层注册方法：编译模式并保存路由，返回路由以便继续配置。
    pub fn route<H: Handler>(
        &mut self,
        pattern: &str,
        methods: &[HttpRequestMethod],
        handler: H,
    ) -> Result<&mut Route, Exception> {
        let route = Route::new(pattern, methods, Arc::new(handler))?;
        debug!("注册路由{} {:?}", pattern, methods);
        self.routes.push(route);
        let index = self.routes.len() - 1;
        Ok(&mut self.routes[index])
    }

    /// GET 路由同时响应 HEAD 请求
    pub fn get<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(
            pattern,
            &[HttpRequestMethod::Get, HttpRequestMethod::Head],
            handler,
        )
    }

    pub fn post<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &[HttpRequestMethod::Post], handler)
    }

    pub fn put<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &[HttpRequestMethod::Put], handler)
    }

    pub fn patch<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &[HttpRequestMethod::Patch], handler)
    }

    pub fn delete<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &[HttpRequestMethod::Delete], handler)
    }

    pub fn options<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &[HttpRequestMethod::Options], handler)
    }

    /// 为显式给出的一组方法注册路由
    pub fn match_methods<H: Handler>(
        &mut self,
        pattern: &str,
        methods: &[HttpRequestMethod],
        handler: H,
    ) -> Result<&mut Route, Exception> {
        self.route(pattern, methods, handler)
    }

    pub fn any<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<&mut Route, Exception> {
        self.route(pattern, &HttpRequestMethod::ALL, handler)
    }

    /// 查找第一个路径与方法都匹配的路由。
    pub fn resolve(&self, path: &str, method: HttpRequestMethod) -> Result<&Route, Exception> {
        self.routes
            .iter()
            .find(|route| route.is_match(path) && route.accepts(method))
            .ok_or_else(|| {
                Exception::router_not_found()
                    .with_data(serde_json::json!({"path": path, "method": method.as_str()}))
            })
    }
}
