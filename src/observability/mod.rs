//! 可观测性：tracing 订阅器（EnvFilter + fmt）
//!
//! 默认 info，RUST_LOG 可覆盖；日志写 stderr，stdout 留给控制台回复。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
