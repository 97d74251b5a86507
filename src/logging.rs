use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

/// 日志文件名前缀（按天滚动）
const LOG_FILE_PREFIX: &str = "bsc-trading-server.log";

/// 初始化日志系统
///
/// stdout 被 MCP stdio 传输占用，控制台日志一律写到 stderr：
/// - 人类可读格式或 JSON 格式
/// - 配置了目录时额外写一份按天滚动的 JSON 文件
///
/// 返回的 guard 必须在进程退出前保持存活，否则缓冲中的文件日志会丢失。
pub fn init_logging(
    log_level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level = parse_log_level(log_level);

    // RUST_LOG 优先
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{}", level)))?;

    let (file_writer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_ansi(false)
            .with_writer(writer)
    });

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    tracing::info!(
        log_level = %log_level,
        json_format = %json_format,
        log_dir = ?log_dir,
        "日志系统初始化完成"
    );

    Ok(guard)
}

/// 解析日志级别字符串
fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "⚠️  无效的日志级别 '{}', 使用默认值 'info'",
                level_str
            );
            Level::INFO
        }
    }
}
