use mimalloc::MiMalloc;
use portrelay::{
    admin::AdminServer,
    args::Args,
    config::Config,
    control::ControlPlane,
    error::AppError,
    listener::{ListenerManager, SocketListenerFactory},
    persist::{self, MappingFile, MappingPersister},
    registry::MappingRegistry,
    r#const::shutdown_timeout,
    relay::RelaySettings,
};
use std::{process, sync::Arc, time::Duration};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, Toplevel};
use tracing::{error, info, warn};

// 使用 mimalloc 分配器提高内存效率
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging(args: &Args) {
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_line_number(false);

    // 如果启用调试模式，输出调试信息，否则只输出 info 及以上级别
    if args.debug {
        builder.with_max_level(tracing::Level::DEBUG)
    } else {
        builder.with_max_level(tracing::Level::INFO)
    }
    .init();
}

// 命令行参数覆盖配置文件
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(code) = &args.auth_code {
        config.admin.auth_code = code.clone();
    }
    if let Some(port) = args.port {
        config.admin.port = port;
    }
}

// 程序入口
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 初始化日志
    init_logging(&args);

    // 验证参数
    if let Err(e) = args.validation() {
        error!("Invalid command line arguments: {}", e);
        process::exit(1);
    }

    info!("Starting PortRelay - TCP/UDP Port Relay Service");

    // 加载配置
    let mut config = match Config::from_file_or_default(&args.config) {
        Ok(config) => {
            info!("Successfully loaded configuration: {:?}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration file: {}", e);
            process::exit(1);
        }
    };
    apply_overrides(&mut config, &args);

    if let Err(e) = config.check_auth_code() {
        error!("{}", e);
        process::exit(1);
    }

    // 如果是测试模式，成功验证配置后退出
    if args.test_config {
        info!("Configuration file validated successfully");
        return Ok(());
    }

    // 创建应用组件
    let shutdown_budget = Duration::from_secs(args.shutdown_timeout);
    let components = match create_components(args.debug, &config, shutdown_budget) {
        Ok(components) => components,
        Err(e) => {
            error!("Failed to create application components: {}", e);
            process::exit(1);
        }
    };

    // 创建优雅关闭顶层管理器
    let toplevel = Toplevel::new(|s| async move {
        // 监听器管理器
        let manager = components.listener_manager;
        s.start(SubsystemBuilder::new("listener_manager", move |s| async move {
            manager.run(s).await
        }));

        // 映射持久化
        if let Some(persister) = components.persister {
            s.start(SubsystemBuilder::new("mapping_persister", move |s| async move {
                persister.run(s).await
            }));
        }

        // 管理服务
        let admin_server = components.admin_server;
        s.start(SubsystemBuilder::new("admin_server", move |s| async move {
            admin_server.run(s).await
        }));
    });

    // 等待关闭
    info!("All services started, waiting for requests...");
    match toplevel
        .catch_signals()
        .handle_shutdown_requests(shutdown_budget)
        .await
    {
        Ok(_) => {
            info!("Application gracefully shutdown");
            Ok(())
        }
        Err(e) => {
            error!("Application shutdown error: {}", e);
            process::exit(1);
        }
    }
}

// 应用组件
struct AppComponents {
    // 管理服务
    admin_server: AdminServer,
    // 监听器管理器
    listener_manager: ListenerManager,
    // 映射持久化（可选）
    persister: Option<MappingPersister>,
}

// 创建应用组件
fn create_components(
    debug: bool,
    config: &Config,
    shutdown_budget: Duration,
) -> Result<AppComponents, AppError> {
    let registry = Arc::new(MappingRegistry::new());

    // 配置文件中的初始规则
    persist::restore(&registry, &config.mappings, "configuration file");

    // 状态文件中的规则，与配置文件重复时以状态文件为准
    let persister = match &config.state_file {
        Some(path) => {
            let file = MappingFile::load(path)?;
            persist::restore(&registry, &file.mappings, &format!("state file {:?}", path));
            Some(MappingPersister::new(registry.clone(), path.clone()))
        }
        None => None,
    };

    // 监听器管理器
    let factory = Arc::new(SocketListenerFactory::new(RelaySettings::from(&config.relay)));
    let grace_period = Duration::from_secs(config.relay.grace_period);
    // 退出时的排空必须在关闭超时内完成
    let shutdown_grace =
        shutdown_budget.saturating_sub(Duration::from_secs(shutdown_timeout::RESERVED));
    if grace_period > shutdown_grace {
        warn!(
            "Grace period {:?} exceeds the shutdown budget, draining for at most {:?} on exit",
            grace_period, shutdown_grace
        );
    }
    let listener_manager = ListenerManager::new(registry.clone(), factory, grace_period)
        .with_shutdown_grace(shutdown_grace);

    // 控制面
    let control = Arc::new(ControlPlane::new(
        registry,
        listener_manager.reports(),
        Duration::from_secs(config.relay.reconcile_wait),
    ));

    // 管理服务
    let admin_addr = config.admin_addr()?;
    let admin_server = AdminServer::new(
        debug,
        admin_addr,
        control,
        config.admin.auth_code.clone(),
        Duration::from_secs(config.admin.timeout),
    );
    info!("Admin server initialized successfully: {:?}", admin_addr);

    Ok(AppComponents {
        admin_server,
        listener_manager,
        persister,
    })
}
