//! # 依赖注入容器
//!
//! 以字符串 id 为键登记创建方式（binding），按需构建实例：
//! - `bind` / `factory`：每次 `get` 都重新调用创建函数；
//! - `singleton`：第一次构建后缓存实例，之后总是返回同一个 `Arc`；
//! - `constant`：直接保存值，从不调用；
//! - `alias`：别名在每次查找前被解析为真实 id（只解析一层）。
//!
//! 创建函数以容器自身作为唯一参数，因此可以在构建时拉取其他依赖。

use log::{debug, warn};

use std::{
    any::Any,
    collections::HashMap,
    error::Error,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::exception::Exception;

/// 容器中保存的实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 创建函数可以返回的错误
pub type BoxError = Box<dyn Error + Send + Sync>;

type BuildFn = Arc<dyn Fn(&Container) -> Result<Instance, BoxError> + Send + Sync>;

/// 创建方式
#[derive(Clone)]
pub enum Creator {
    /// 常量，原样返回
    Value(Instance),
    /// 构建函数，返回实例
    Builder(BuildFn),
    /// 构建函数，返回一个工厂（函数或闭包）
    FactoryBuilder(BuildFn),
}

#[derive(Clone)]
struct Binding {
    creator: Creator,
    shared: bool,
}

#[derive(Default)]
pub struct Container {
    bindings: RwLock<HashMap<String, Binding>>,
    instances: RwLock<HashMap<String, Instance>>,
    aliases: RwLock<HashMap<String, String>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("容器读锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("容器写锁被污染，恢复并继续");
            poisoned.into_inner()
        }
    }
}

fn erase<T, F>(creator: F) -> BuildFn
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        creator(container).map(|value| Arc::new(value) as Instance)
    })
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    fn base_bind(&self, id: String, creator: Creator, shared: bool) {
        debug!("容器登记条目：{}（shared={}）", id, shared);
        write(&self.bindings).insert(id, Binding { creator, shared });
    }

    /// 登记普通绑定，每次解析都重新构建。
    pub fn bind<T, F>(&self, id: impl Into<String>, creator: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.base_bind(id.into(), Creator::Builder(erase(creator)), false);
    }

    /// 登记单例，首次解析后缓存。
    pub fn singleton<T, F>(&self, id: impl Into<String>, creator: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.base_bind(id.into(), Creator::Builder(erase(creator)), true);
    }

    /// 登记工厂：`creator` 返回的值本身是一个可调用的工厂。
    pub fn factory<T, F>(&self, id: impl Into<String>, creator: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.base_bind(id.into(), Creator::FactoryBuilder(erase(creator)), false);
    }

    /// 登记常量
    pub fn constant<T>(&self, id: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.base_bind(id.into(), Creator::Value(Arc::new(value)), false);
    }

    /// 登记别名：之后通过 `alias` 的查找都会被重定向到 `id`。
    pub fn alias(&self, id: impl Into<String>, alias: impl Into<String>) {
        write(&self.aliases).insert(alias.into(), id.into());
    }

    fn resolve_alias(&self, id: &str) -> String {
        match read(&self.aliases).get(id) {
            Some(target) => target.clone(),
            None => id.to_string(),
        }
    }

    pub fn has(&self, id: &str) -> bool {
        let id = self.resolve_alias(id);
        read(&self.bindings).contains_key(&id) || read(&self.instances).contains_key(&id)
    }

    fn build(&self, id: &str, creator: &Creator) -> Result<Instance, Exception> {
        let build = match creator {
            Creator::Value(value) => return Ok(Arc::clone(value)),
            Creator::Builder(build) | Creator::FactoryBuilder(build) => build,
        };
        // 构建期间不持有任何锁，创建函数可以递归调用 `get`
        build(self).map_err(|e| {
            warn!("容器构建条目{}失败：{}", id, e);
            Exception::container(e.to_string()).with_cause(e)
        })
    }

    /// 解析条目，返回类型擦除后的实例。
    pub fn get_any(&self, id: &str) -> Result<Instance, Exception> {
        let id = self.resolve_alias(id);

        if let Some(instance) = read(&self.instances).get(&id) {
            return Ok(Arc::clone(instance));
        }

        let binding = match read(&self.bindings).get(&id) {
            Some(binding) => binding.clone(),
            None => return Err(Exception::container_not_found().with_data(serde_json::json!({ "id": id }))),
        };

        let instance = self.build(&id, &binding.creator)?;

        if binding.shared {
            // 并发首次解析时只保留最先写入的实例
            let mut instances = write(&self.instances);
            let cached = instances.entry(id).or_insert(instance);
            return Ok(Arc::clone(cached));
        }

        Ok(instance)
    }

    /// 解析条目并向下转型为 `T`。
    pub fn get<T>(&self, id: &str) -> Result<Arc<T>, Exception>
    where
        T: Send + Sync + 'static,
    {
        self.get_any(id)?.downcast::<T>().map_err(|_| {
            Exception::container(format!(
                "Entry \"{}\" is not of type {}",
                id,
                std::any::type_name::<T>()
            ))
        })
    }
}
