use serde_json::{Map, Value};

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    context::Context,
    exception::Exception,
    middleware::{handler_endpoint, BoxFuture, Endpoint, Handler, Middleware, Next},
    param::HttpRequestMethod,
};

use super::pattern::{compile, CompiledPattern, Token};

/// 路由参数，按参数在模式中出现的顺序保存。
///
/// 可选参数未匹配时键仍然存在，值为 `None`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// 键是否存在（值可能为 `None`）
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| key == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    /// 缺失的值序列化为 `null`
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(key, value)| (key.to_string(), value.map_or(Value::Null, Value::from)))
            .collect();
        Value::Object(map)
    }
}

/// 一条已注册的路由。
pub struct Route {
    name: String,
    pattern: String,
    compiled: CompiledPattern,
    methods: Vec<HttpRequestMethod>,
    handler: Arc<dyn Handler>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("regex", &self.compiled.regex().as_str())
            .field("methods", &self.methods)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Route {
    pub fn new(
        pattern: &str,
        methods: &[HttpRequestMethod],
        handler: Arc<dyn Handler>,
    ) -> Result<Self, Exception> {
        Ok(Self {
            name: pattern.to_string(),
            pattern: pattern.to_string(),
            compiled: compile(pattern)?,
            methods: methods.to_vec(),
            handler,
            middlewares: vec![],
        })
    }

    /// 路由名，默认为模式本身
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// 编译后的正则表达式源码
    pub fn regex_source(&self) -> &str {
        self.compiled.regex().as_str()
    }

    pub fn tokens(&self) -> &[Token] {
        self.compiled.tokens()
    }

    pub fn methods(&self) -> &[HttpRequestMethod] {
        &self.methods
    }

    pub fn accepts(&self, method: HttpRequestMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.compiled.is_match(path)
    }

    /// 追加一个路由中间件，在处理函数之前按注册顺序执行。
    pub fn middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn middlewares<I>(&mut self, middlewares: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares.extend(middlewares);
        self
    }

    pub fn middleware_list(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        self.handler.clone()
    }

    /// 按位置把捕获组与参数对应起来。路径不匹配时返回空表。
    pub fn params(&self, path: &str) -> Params {
        let mut params = Params::new();
        if let Some(captures) = self.compiled.regex().captures(path) {
            for (index, token) in self.tokens().iter().enumerate() {
                let value = captures.get(index + 1).map(|m| m.as_str().to_string());
                params.insert(token.name.to_string(), value);
            }
        }
        params
    }

    /// 先执行路由中间件，最后调用处理函数。
    /// 依次执行路由中间件与处理函数。
    ///
    /// 失败时连同错误一起交回最后一次到达处理函数前后的上下文，
    /// 因此中间件在出错前写入的头部与状态得以保留；处理函数未被调用时交回传入的上下文。
    pub async fn dispatch(&self, ctx: Context) -> Result<Context, (Context, Exception)> {
        let reached: Arc<Mutex<Option<Context>>> = Arc::new(Mutex::new(None));
        let endpoint = recording(handler_endpoint(self.handler.clone()), Arc::clone(&reached));
        let chain: Arc<[Arc<dyn Middleware>]> = self.middlewares.clone().into();
        let fallback = ctx.clone();

        match Next::new(chain, endpoint).run(ctx).await {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                let last = match reached.lock() {
                    Ok(mut slot) => slot.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                Err((last.unwrap_or(fallback), e))
            }
        }
    }
}

/// 在处理函数执行前后记录上下文
fn recording(endpoint: Endpoint, slot: Arc<Mutex<Option<Context>>>) -> Endpoint {
    fn store(slot: &Mutex<Option<Context>>, ctx: &Context) {
        match slot.lock() {
            Ok(mut guard) => *guard = Some(ctx.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(ctx.clone()),
        }
    }

    Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<Context, Exception>> {
        let endpoint = Arc::clone(&endpoint);
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            store(&slot, &ctx);
            let ctx = endpoint(ctx).await?;
            store(&slot, &ctx);
            Ok(ctx)
        })
    })
}
