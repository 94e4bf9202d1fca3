use serde_derive::{Deserialize, Serialize};

use crate::config::Config;

/// 运行环境。由启动代码显式注入，不读取进程环境变量。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Env {
    environment: String,
}

pub const DEVELOPMENT: &str = "development";
pub const TESTING: &str = "testing";
pub const PRODUCTION: &str = "production";

impl Default for Env {
    fn default() -> Self {
        Self::new(DEVELOPMENT)
    }
}

impl Env {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// 读取配置中的 `app.env`，缺失时为 `development`。
    pub fn from_config(config: &Config) -> Self {
        match config.get("app.env").and_then(|value| value.as_str()) {
            Some(environment) => Self::new(environment),
            None => Self::default(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_development(&self) -> bool {
        self.environment == DEVELOPMENT
    }

    pub fn is_testing(&self) -> bool {
        self.environment == TESTING
    }

    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }
}
