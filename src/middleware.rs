//! # 中间件
//!
//! 洋葱模型：每个中间件拿到上下文和 `Next`，调用 `next.run(ctx)` 进入内层，
//! 返回后可以继续修改上下文；不调用则短路后续的中间件与处理函数。
//! `Next` 按值传递且不可克隆，一个中间件至多进入内层一次。

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    context::{Body, Context},
    exception::Exception,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 链条最内层：接收上下文，产出最终的上下文。
pub type Endpoint =
    Arc<dyn Fn(Context) -> BoxFuture<'static, Result<Context, Exception>> + Send + Sync>;

/// 路由处理函数，返回值成为响应体。
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Body, Exception>>;
}

impl<F, Fut, B> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, Exception>> + Send + 'static,
    B: Into<Body> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Body, Exception>> {
        let future = (self)(ctx);
        Box::pin(async move { future.await.map(Into::into) })
    }
}

pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<Context, Exception>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Context, Exception>> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<Context, Exception>> {
        Box::pin((self)(ctx, next))
    }
}

/// 指向链条中下一个中间件的游标。
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: Endpoint,
}

impl Next {
    pub fn new(chain: Arc<[Arc<dyn Middleware>]>, endpoint: Endpoint) -> Self {
        Self {
            chain,
            index: 0,
            endpoint,
        }
    }

    /// 执行剩余的链条
    pub fn run(self, ctx: Context) -> BoxFuture<'static, Result<Context, Exception>> {
        let current = self.chain.get(self.index).cloned();
        match current {
            Some(middleware) => {
                let next = Next {
                    index: self.index + 1,
                    ..self
                };
                middleware.handle(ctx, next)
            }
            None => (self.endpoint)(ctx),
        }
    }
}

/// 原样返回上下文的最内层
pub fn passthrough() -> Endpoint {
    Arc::new(|ctx: Context| -> BoxFuture<'static, Result<Context, Exception>> {
        Box::pin(async move { Ok(ctx) })
    })
}

/// 调用处理函数并把返回值写入响应体的最内层
pub fn handler_endpoint(handler: Arc<dyn Handler>) -> Endpoint {
    Arc::new(
        move |mut ctx: Context| -> BoxFuture<'static, Result<Context, Exception>> {
            let handler = handler.clone();
            Box::pin(async move {
                let body = handler.call(ctx.clone()).await?;
                ctx.set_body(body);
                Ok(ctx)
            })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{param::HttpRequestMethod, request::Request};
    use serde_json::Value;

    fn context() -> Context {
        Context::new(1, Request::new(HttpRequestMethod::Get, "/"))
    }

    fn trace(ctx: &mut Context, step: &str) {
        let entry = ctx
            .state_mut()
            .entry("trace")
            .or_insert_with(|| Value::Array(vec![]));
        if let Value::Array(list) = entry {
            list.push(Value::from(step));
        }
    }

    fn tracer(name: &'static str) -> Arc<dyn Middleware> {
        Arc::new(move |mut ctx: Context, next: Next| async move {
            trace(&mut ctx, &format!("{} in", name));
            let mut ctx = next.run(ctx).await?;
            trace(&mut ctx, &format!("{} out", name));
            Ok::<_, Exception>(ctx)
        })
    }

    #[tokio::test]
    async fn test_onion_order() {
        let chain: Arc<[Arc<dyn Middleware>]> = vec![tracer("a"), tracer("b")].into();
        let endpoint = handler_endpoint(Arc::new(|_ctx: Context| async move {
            Ok::<_, Exception>("done")
        }));

        let ctx = Next::new(chain, endpoint).run(context()).await.unwrap();

        assert_eq!(
            ctx.state()["trace"],
            serde_json::json!(["a in", "b in", "b out", "a out"])
        );
        assert_eq!(ctx.body(), &Body::from("done"));
        assert_eq!(ctx.status(), 200);
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let stop: Arc<dyn Middleware> = Arc::new(|mut ctx: Context, _next: Next| async move {
            ctx.set_status(401);
            Ok::<_, Exception>(ctx)
        });
        let chain: Arc<[Arc<dyn Middleware>]> = vec![stop, tracer("never")].into();

        let ctx = Next::new(chain, passthrough()).run(context()).await.unwrap();

        assert_eq!(ctx.status(), 401);
        assert!(ctx.state().get("trace").is_none());
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let endpoint = handler_endpoint(Arc::new(|_ctx: Context| async move {
            Err::<String, _>(Exception::new("Sample Error"))
        }));
        let chain: Arc<[Arc<dyn Middleware>]> = vec![tracer("a")].into();

        let err = Next::new(chain, endpoint).run(context()).await.unwrap_err();

        assert_eq!(err.message(), "Sample Error");
    }

    #[tokio::test]
    async fn test_empty_chain_runs_endpoint() {
        let chain: Arc<[Arc<dyn Middleware>]> = Vec::new().into();
        let ctx = Next::new(chain, passthrough()).run(context()).await.unwrap();
        assert_eq!(ctx.status(), 404);
    }
}
