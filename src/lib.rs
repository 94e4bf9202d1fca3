pub mod app;
pub mod application;
pub mod config;
pub mod container;
pub mod context;
pub mod env;
pub mod exception;
pub mod logger;
pub mod middleware;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod util;

pub use app::{App, Listening};
pub use application::Application;
pub use config::{Config, ServerSettings};
pub use container::Container;
pub use context::{Body, Context};
pub use env::Env;
pub use exception::{Exception, ExceptionKind};
pub use logger::{ConsoleLogger, LogFacade, LogLevel, Logger};
pub use middleware::{BoxFuture, Handler, Middleware, Next};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use router::{Params, Route, Router};
pub use server::Server;
pub use util::HtmlBuilder;
