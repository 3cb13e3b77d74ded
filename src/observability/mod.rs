//! 可观测性：tracing 订阅器初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志默认 info，可通过 RUST_LOG 覆盖；输出到 stderr，stdout 留给命令结果
pub fn init() {
    init_with_default("info");
}

/// 指定 RUST_LOG 未设置时的默认过滤指令（如 `debug`）
pub fn init_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
