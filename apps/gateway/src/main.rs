//! 网关进程装配：配置加载、存储接线、启动同步、双协议接入器、
//! 管理面 HTTP 与优雅停机。

mod handlers;
mod middleware;
mod routes;
mod sync;
mod utils;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tgw_config::AppConfig;
use tgw_forward::{Forwarder, WebhookForwarder};
use tgw_protocol::{Codec, Gt06Codec, TeltonikaCodec};
use tgw_session::{PortServer, SessionDeps, SessionOptions, SessionRegistry};
use tgw_storage::{
    connect_pool, AllowListStore, CommandQueue, DurableCommandQueue, PgDeviceDirectory,
    PgStatusStore, RedisAllowListStore, RedisStatusStore, StatusStore,
};
use tgw_telemetry::init_tracing;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info};

/// 管理面共享状态。
#[derive(Clone)]
pub struct AppState {
    pub secret_key: String,
    pub commands: Arc<dyn CommandQueue>,
    pub registry: SessionRegistry,
    pub started_at: Instant,
    pub environment: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_level);
    info!(
        target: "tgw",
        environment = config.environment.as_str(),
        gt06_port = config.gt06_port,
        teltonika_port = config.teltonika_port,
        api_port = config.api_port,
        "gateway starting"
    );

    // 存储接线：SQL 连接池 + Redis 热路径存储
    let pool = connect_pool(&config.database_url, config.db_pool_size).await?;
    let redis_url = config.redis_url();
    let allow_list: Arc<RedisAllowListStore> = Arc::new(RedisAllowListStore::connect(
        &redis_url,
        config.auth_fallback_lenient,
    )?);
    let status_cache: Arc<RedisStatusStore> = Arc::new(RedisStatusStore::connect(&redis_url)?);
    let commands: Arc<DurableCommandQueue> =
        Arc::new(DurableCommandQueue::connect(pool.clone(), &redis_url)?);
    let forwarder = Arc::new(WebhookForwarder::new(
        &config.data_forward_url,
        &config.secret_key,
        Duration::from_secs(5),
    )?);

    // 启动同步先行：许可名单 / 命令队列 / 状态刷写；失败即退出
    let sync_deps = sync::SyncDeps {
        directory: PgDeviceDirectory::new(pool.clone()),
        status_sql: PgStatusStore::new(pool.clone()),
        allow_list: allow_list.clone() as Arc<dyn AllowListStore>,
        status_cache: status_cache.clone() as Arc<dyn StatusStore>,
        queue: commands.clone(),
    };
    sync::run_once(&sync_deps).await?;

    let registry = SessionRegistry::new();
    let options = SessionOptions {
        socket_timeout: config.socket_timeout,
        max_connections_per_port: config.max_connections_per_port,
        keepalive_interval: config.keep_alive_timeout,
        shutdown_grace: config.connect_timeout,
    };
    let shutdown_grace = options.shutdown_grace;
    let deps = Arc::new(SessionDeps {
        allow_list: allow_list as Arc<dyn AllowListStore>,
        status: status_cache as Arc<dyn StatusStore>,
        commands: commands.clone() as Arc<dyn CommandQueue>,
        forwarder: forwarder as Arc<dyn Forwarder>,
        registry: registry.clone(),
        options,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 每协议端口一个接入器
    let mut acceptors: JoinSet<Result<(), tgw_session::SessionError>> = JoinSet::new();
    {
        let server = PortServer::new(
            Codec::Gt06(Gt06Codec {
                checksum_fallback: config.gt06_checksum_fallback,
            }),
            config.gt06_port,
            deps.clone(),
        );
        let shutdown = shutdown_rx.clone();
        acceptors.spawn(async move { server.run(shutdown).await });
    }
    {
        let server = PortServer::new(
            Codec::Teltonika(TeltonikaCodec {
                strict_crc: config.teltonika_strict_crc,
            }),
            config.teltonika_port,
            deps.clone(),
        );
        let shutdown = shutdown_rx.clone();
        acceptors.spawn(async move { server.run(shutdown).await });
    }

    // 后台同步循环（实例内单飞）
    let sync_handle = tokio::spawn(sync::run_loop(
        sync_deps,
        config.sync_interval,
        shutdown_rx.clone(),
    ));

    // 管理面 HTTP
    let state = AppState {
        secret_key: config.secret_key.clone(),
        commands: commands as Arc<dyn CommandQueue>,
        registry,
        started_at: Instant::now(),
        environment: config.environment.as_str().to_string(),
    };
    let app = routes::create_api_router()
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_context));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port)).await?;
    info!(target: "tgw", port = config.api_port, "admin api listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target: "tgw", "shutdown signal received");
        }
        finished = acceptors.join_next() => {
            if let Some(finished) = finished {
                finished??;
            }
            error!(target: "tgw", "acceptor exited unexpectedly");
            return Err("acceptor exited unexpectedly".into());
        }
    }

    // 优雅停机：停止 accept，给在途连接固定宽限
    let _ = shutdown_tx.send(true);
    let drained = timeout(shutdown_grace + Duration::from_secs(1), async {
        while acceptors.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        error!(target: "tgw", "acceptors did not stop within grace, aborting");
        acceptors.abort_all();
    }
    sync_handle.abort();
    info!(target: "tgw", "gateway stopped");
    Ok(())
}
