//! # 服务器
//!
//! 在 `App` 之上接入路由：应用级中间件先执行，最后由兜底的分发中间件
//! 解析路由、执行路由中间件与处理函数，并把错误转换为响应状态码。

use serde_json::{json, Value};

use std::sync::Arc;

use crate::{
    app::{App, Listening},
    context::Context,
    env::Env,
    exception::Exception,
    logger::Logger,
    middleware::{BoxFuture, Middleware, Next},
    router::Router,
    util::escape_html,
};

pub struct Server {
    env: Env,
    logger: Arc<dyn Logger>,
    router: Arc<Router>,
    app: App,
}

impl Server {
    pub fn new(env: Env, logger: Arc<dyn Logger>, router: Router) -> Self {
        Self {
            env,
            logger,
            router: Arc::new(router),
            app: App::new(),
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.app
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// 注册应用级中间件，在路由分发之前按注册顺序执行。
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.app.use_middleware(middleware);
        self
    }

    pub fn middlewares<I>(&mut self, middlewares: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        for middleware in middlewares {
            self.app.use_shared(middleware);
        }
        self
    }

    /// 安装分发中间件，返回可直接处理请求的 `App`。
    pub fn into_app(self) -> App {
        let Server {
            env,
            logger,
            router,
            mut app,
        } = self;
        app.use_middleware(Dispatch {
            env,
            logger,
            router,
        });
        app
    }

    pub async fn listen(self, host: &str, port: u16) -> Result<Listening, Exception> {
        self.logger.debug("Waiting for server start...", &Value::Null);
        let logger = Arc::clone(&self.logger);

        let listening = self.into_app().listen((host, port)).await?;

        logger.debug(
            "Serving app on http://{{host}}:{{port}}/",
            &json!({"host": host, "port": listening.local_addr().port()}),
        );
        Ok(listening)
    }
}

/// 链条末端的路由分发
struct Dispatch {
    env: Env,
    logger: Arc<dyn Logger>,
    router: Arc<Router>,
}

impl Middleware for Dispatch {
    fn handle(&self, mut ctx: Context, _next: Next) -> BoxFuture<'static, Result<Context, Exception>> {
        let env = self.env.clone();
        let logger = Arc::clone(&self.logger);
        let router = Arc::clone(&self.router);

        Box::pin(async move {
            let result = match router.resolve(ctx.path(), ctx.method()) {
                Ok(route) => {
                    let params = route.params(ctx.path());
                    ctx.set_params(params);
                    route.dispatch(ctx).await
                }
                Err(e) => Err((ctx, e)),
            };

            match result {
                Ok(ctx) => Ok(ctx),
                Err((mut ctx, error)) => {
                    let exception = Exception::normalize(&error);
                    ctx.set_status(exception.status());
                    if env.is_development() {
                        ctx.set_body(escape_html(&exception.stack()));
                    }
                    logger.error(&exception.stack(), &exception.to_json());
                    Ok(ctx)
                }
            }
        })
    }
}
