use crate::r#const::shutdown_timeout;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

// PortRelay - TCP/UDP 端口转发服务
#[derive(Parser, Debug, Clone)]
#[command(
    name = "portrelayd",
    author,
    version,
    about = "A TCP/UDP port relay daemon whose mapping rules are added, removed and queried at runtime \nthrough an authenticated HTTP control API.\n\n\
             Key Features:\n\
             - Dynamic Mappings: Listen address to forward address rules for tcp, udp or both, applied without restart.\n\
             - Immediate Effect: A successful add means the port is listening; a successful delete means it no longer accepts.\n\
             - Graceful Draining: In-flight connections survive rule removal for a configurable grace period.\n\
             - UDP Sessions: Per-client sessions with idle timeout, bounded queues and a per-listener session cap.\n\
             - Optional Persistence: Non-temporary rules are written to a state file and restored on start.\n\
             - Observability: Prometheus metrics and structured logs for every listener and flow."
)]
pub struct Args {
    // 配置文件路径
    #[clap(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        help = "Path to the configuration file"
    )]
    pub config: PathBuf,

    // 是否开启调试模式
    #[clap(
        short,
        long,
        action = ArgAction::SetTrue,
        help = "Enable debug mode"
    )]
    pub debug: bool,

    // 是否仅测试配置文件
    #[clap(
        short = 't',
        long = "test",
        action = ArgAction::SetTrue,
        help = "Test configuration file for validity and exit"
    )]
    pub test_config: bool,

    // 优雅关闭超时时间（秒）
    #[clap(
        long = "shutdown-timeout",
        value_name = "SECONDS",
        default_value_t = shutdown_timeout::DEFAULT,
        help = "Maximum time in seconds to wait for complete shutdown"
    )]
    pub shutdown_timeout: u64,

    // API 授权码，覆盖配置文件
    #[clap(
        long = "code",
        value_name = "SECRET",
        help = "Auth code required in the Authorization header of API requests (overrides admin.auth_code)"
    )]
    pub auth_code: Option<String>,

    // 管理服务端口，覆盖配置文件
    #[clap(
        short = 'p',
        long = "port",
        value_name = "PORT",
        help = "Port of the admin API service (overrides admin.port)"
    )]
    pub port: Option<u16>,
}

impl Args {
    // 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    // 验证参数
    pub fn validation(&self) -> Result<(), String> {
        // 验证关闭超时时间
        if self.shutdown_timeout < shutdown_timeout::MIN
            || self.shutdown_timeout > shutdown_timeout::MAX
        {
            return Err(format!(
                "Shutdown timeout must be between {} and {} seconds",
                shutdown_timeout::MIN,
                shutdown_timeout::MAX
            ));
        }

        if self.port == Some(0) {
            return Err("Admin port must be between 1 and 65535".to_string());
        }

        Ok(())
    }
}
