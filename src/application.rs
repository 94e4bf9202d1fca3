use crate::container::Container;

/// 持有容器的应用对象，启动代码通过 `handle` 取出服务完成装配。
#[derive(Default)]
pub struct Application {
    container: Container,
}

impl Application {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// 以容器为参数调用回调，返回回调的结果。
    pub fn handle<F, R>(&self, callback: F) -> R
    where
        F: FnOnce(&Container) -> R,
    {
        callback(&self.container)
    }
}
