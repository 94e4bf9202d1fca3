// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # bane 示例服务
//!
//! 启动流程：
//! 1. 读取 `config/app.toml`，初始化 log4rs；
//! 2. 按配置构建 Tokio 多线程运行时；
//! 3. 在容器中注册配置、环境、日志与路由，由 `Application` 完成装配；
//! 4. 启动服务器，收到 Ctrl-C 后停止监听。

use bane::{
    Application, Config, Container, Context, Env, Exception, LogFacade, Logger, Next, Router,
    Server, ServerSettings,
};
use log::{error, info};
use serde_json::json;
use tokio::runtime::Builder;

use std::{process, sync::Arc, time::Instant};

const CONFIG_FILE: &str = "config/app.toml";
const LOG_CONFIG_FILE: &str = "config/log4rs.yaml";

fn main() {
    // 1. 日志系统初始化失败时退回标准错误输出，不影响启动
    if let Err(e) = log4rs::init_file(LOG_CONFIG_FILE, Default::default()) {
        eprintln!("无法载入日志配置{}：{}", LOG_CONFIG_FILE, e);
    }

    let config = match Config::from_toml(CONFIG_FILE) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e.stack());
            Config::new()
        }
    };
    info!("配置文件已载入");

    let settings: ServerSettings = match config.settings("server") {
        Ok(settings) => settings,
        Err(e) => {
            error!("server 配置段无效：{}", e.stack());
            process::exit(1);
        }
    };

    // 2. 根据配置分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(settings.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建Tokio运行时：{}", e);
            process::exit(1);
        }
    };

    let application = Application::new(bootstrap(config));

    if let Err(e) = runtime.block_on(application.handle(|container| serve(container, settings))) {
        error!("{}", e.stack());
        process::exit(1);
    }
}

/// 在容器中注册服务
fn bootstrap(config: Config) -> Container {
    let container = Container::new();

    container.singleton("env", |c: &Container| {
        let config = c.get::<Config>("config")?;
        Ok(Env::from_config(&config))
    });
    container.constant("config", config);
    container.singleton("logger", |_: &Container| {
        Ok(Arc::new(LogFacade) as Arc<dyn Logger>)
    });
    container.alias("logger", "log");

    container
}

fn routes() -> Result<Router, Exception> {
    let mut router = Router::new();

    router
        .get("/", |_ctx: Context| async move { Ok::<_, Exception>("Hello, world!") })?
        .named("home");

    router
        .get("/user/:name?", |ctx: Context| async move {
            let name = ctx.param("name").unwrap_or("guest").to_string();
            Ok::<_, Exception>(json!({ "name": name }))
        })?
        .named("user.show");

    router
        .any("/health", |_ctx: Context| async move {
            Ok::<_, Exception>(json!({ "status": "ok" }))
        })?
        .named("health");

    Ok(router)
}

fn serve(
    container: &Container,
    settings: ServerSettings,
) -> impl std::future::Future<Output = Result<(), Exception>> {
    let services = (|| {
        let env = container.get::<Env>("env")?;
        let logger = container.get::<Arc<dyn Logger>>("log")?;
        Ok::<_, Exception>((env, logger))
    })();

    async move {
        let (env, logger) = services?;
        info!("运行环境：{}", env.environment());

        let mut server = Server::new((*env).clone(), Arc::clone(&*logger), routes()?);
        server.middleware(|ctx: Context, next: Next| async move {
            let start_time = Instant::now();
            let mut ctx = next.run(ctx).await?;
            ctx.set_header(
                "X-Response-Time",
                format!("{}ms", start_time.elapsed().as_millis()),
            );
            Ok::<_, Exception>(ctx)
        });

        let listening = server.listen(settings.host(), settings.port()).await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听停机信号：{}", e);
        }
        info!("收到停机信号，正在关闭服务器...");
        listening.close().await;
        Ok::<(), Exception>(())
    }
}
