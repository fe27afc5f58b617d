use spillway::config;
use spillway::err::{self, FatalErr};
use spillway::request::{Handler, Query, UserData};
use spillway::response::redis::Manager;
use spillway::response::stream::{Sse, Ws};

use std::fs;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio_stream::wrappers::UnixListenerStream;
use warp::Filter;

#[tokio::main]
async fn main() -> Result<(), FatalErr> {
    config::merge_dotenv()?;
    let log_level = std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&log_level)
        .init();

    let (postgres_cfg, redis_cfg, cfg) = config::from_env(std::env::vars().collect())?;
    let require_auth = cfg.require_auth();

    let request = Handler::new(&postgres_cfg, require_auth)?;
    let pool = request.pg_pool();

    let (manager, feed) = Manager::connect(&redis_cfg).await?;
    let manager = manager.into_arc();
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = Manager::run(manager, feed).await {
                err::die_with_msg(format!("Lost connection to Redis: {}", e));
            }
        });
    }

    let sse_interval = Duration::from_secs(*cfg.sse_interval);
    let ws_interval = Duration::from_secs(*cfg.ws_interval);

    let sse_routes = {
        let (manager, pool) = (manager.clone(), pool.clone());
        request.sse_subscription().and_then(move |subscription| {
            Sse::send_events(manager.clone(), pool.clone(), sse_interval, subscription)
        })
    };

    let ws_routes = request
        .ws_handshake()
        .and(warp::ws())
        .map(move |(user, query): (UserData, Option<Query>), ws: warp::ws::Ws| {
            let (manager, pool) = (manager.clone(), pool.clone());
            ws.on_upgrade(move |socket| {
                Ws::new(manager, pool, ws_interval, require_auth, user).send_to(socket, query)
            })
        });

    let health = request.health().map(|| "OK");

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(cfg.cors.allowed_methods.clone())
        .allow_headers(cfg.cors.allowed_headers.clone());

    let routes = health
        .or(sse_routes)
        .or(ws_routes)
        .recover(Handler::recover)
        .with(cors);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => log::info!("SIGTERM received; draining connections"),
            _ = sigint.recv() => log::info!("SIGINT received; draining connections"),
        }
    };

    let server = warp::serve(routes);
    match &*cfg.unix_socket {
        Some(socket_path) => {
            log::info!("Streaming server listening on {}", socket_path);
            // a stale socket file from a previous run refuses the bind
            let _ = fs::remove_file(socket_path);
            let listener = UnixListener::bind(socket_path)?;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o666))?;
            server
                .serve_incoming_with_graceful_shutdown(UnixListenerStream::new(listener), shutdown)
                .await;
        }
        None => {
            let addr = SocketAddr::new(*cfg.address, *cfg.port);
            log::info!("Streaming server listening on {}", addr);
            let (_, serving) = server.bind_with_graceful_shutdown(addr, shutdown);
            serving.await;
        }
    }
    Ok(())
}
