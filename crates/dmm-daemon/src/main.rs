//! DMM daemon: indexes a Markdown memory root and serves budget-bounded Memory Packs
//! over HTTP (§4.N).
//!
//! Singleton per memory root, detected via PID file + liveness probe. On startup it
//! runs an opportunistic incremental reindex, starts the filesystem watcher, and
//! precomputes the baseline pack before accepting requests.

mod handlers;
mod pidfile;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dmm_core::config::Config;
use dmm_core::storage::Storage;
use dmm_core::watcher::{ChangeKind, MemoryWatcher};

#[cfg(feature = "embeddings")]
use dmm_core::EmbeddingService;

use state::AppState;

struct Args {
    memory_root: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut memory_root = None;
    let mut host = None;
    let mut port = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("dmm-daemon {}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Dynamic Markdown Memory daemon.");
                println!();
                println!("USAGE:");
                println!("    dmm-daemon [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --data-dir <PATH>       Memory root (default: current directory)");
                println!("    --host <HOST>           Bind host (default: from daemon.config.json, else 127.0.0.1)");
                println!("    --port <PORT>           Bind port (default: from daemon.config.json, else 7437)");
                println!();
                println!("ENVIRONMENT:");
                println!("    RUST_LOG                Log level filter (e.g., debug, info, warn, error)");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("dmm-daemon {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--data-dir" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    eprintln!("error: --data-dir requires a path argument");
                    std::process::exit(1);
                };
                memory_root = Some(PathBuf::from(path));
            }
            "--host" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("error: --host requires a value");
                    std::process::exit(1);
                };
                host = Some(value.clone());
            }
            "--port" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("error: --port requires a value");
                    std::process::exit(1);
                };
                port = Some(value.parse().unwrap_or_else(|_| {
                    eprintln!("error: --port must be a number");
                    std::process::exit(1);
                }));
            }
            arg => {
                eprintln!("error: unknown argument '{arg}'");
                eprintln!("Try 'dmm-daemon --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { memory_root, host, port }
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    let memory_root = args.memory_root.unwrap_or_else(|| std::env::current_dir().expect("current directory must be resolvable"));
    std::fs::create_dir_all(&memory_root).expect("memory root must be creatable");
    let memory_root = memory_root.canonicalize().unwrap_or(memory_root);

    let mut config = Config::load_or_default(&memory_root).unwrap_or_else(|e| {
        eprintln!("error: failed to load config: {e}");
        std::process::exit(1);
    });
    if let Some(host) = args.host {
        config.daemon.host = host;
    }
    if let Some(port) = args.port {
        config.daemon.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.daemon.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!(version = %dmm_core::VERSION, root = %memory_root.display(), "dmm-daemon starting");

    if let Some(existing) = pidfile::read(&memory_root) {
        if pidfile::process_alive(existing.pid) && pidfile::probe_reachable(&existing.host, existing.port).await {
            info!(pid = existing.pid, host = %existing.host, port = existing.port, "daemon already running for this memory root, reusing");
            return;
        }
        warn!(pid = existing.pid, "stale PID file found, cleaning up before starting");
        pidfile::remove(&memory_root);
    }

    let db_path = config.storage.db_path(&memory_root);
    let storage = match Storage::new(Some(db_path)) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to initialize storage");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "embeddings")]
    let embedder = {
        let service = EmbeddingService::new();
        if let Err(e) = service.init() {
            warn!(error = %e, "embedding model failed to initialize; query and review semantics will degrade");
        }
        service
    };

    #[cfg(feature = "embeddings")]
    let state = AppState::new(memory_root.clone(), config.clone(), storage, embedder);
    #[cfg(not(feature = "embeddings"))]
    let state = AppState::new(memory_root.clone(), config.clone(), storage);

    // Opportunistic incremental reindex: only files whose file_hash has drifted get
    // re-embedded (§4.N "run an opportunistic incremental reindex").
    match state.indexer().reindex_all() {
        Ok(result) => {
            info!(indexed = result.indexed, errors = result.errors.len(), duration_ms = result.duration_ms, "startup reindex complete");
            state.mark_reindexed(chrono::Utc::now());
        }
        Err(e) => warn!(error = %e, "startup reindex failed"),
    }

    if let Err(e) = state.baseline().get_baseline_pack() {
        warn!(error = %e, "failed to precompute baseline pack");
    }

    let watcher_root = memory_root.clone();
    let debounce = Duration::from_millis(config.indexer.debounce_ms);
    match MemoryWatcher::start(watcher_root, debounce) {
        Ok((watcher, mut events)) => {
            state.watcher_active.store(true, Ordering::Relaxed);
            let watch_state = state.clone();
            tokio::spawn(async move {
                let _watcher = watcher;
                while let Some(event) = events.recv().await {
                    let relative = event.path.strip_prefix(&watch_state.root).unwrap_or(&event.path).to_string_lossy().replace('\\', "/");
                    match event.kind {
                        ChangeKind::Created | ChangeKind::Modified => {
                            if let Err(e) = watch_state.indexer().index_file(&event.path) {
                                warn!(error = %e, path = %relative, "watcher-triggered index failed");
                            } else {
                                let _ = watch_state.baseline().invalidate_cache();
                            }
                        }
                        ChangeKind::Deleted => {
                            if let Err(e) = watch_state.indexer().delete_file(&relative) {
                                warn!(error = %e, path = %relative, "watcher-triggered delete failed");
                            } else {
                                let _ = watch_state.baseline().invalidate_cache();
                            }
                        }
                    }
                }
            });
        }
        Err(e) => warn!(error = %e, "filesystem watcher failed to start; changes require manual /reindex"),
    }

    if let Err(e) = pidfile::write(&memory_root, &config.daemon.host, config.daemon.port) {
        warn!(error = %e, "failed to write PID file");
    }

    let app = routes::build_router(state);
    let addr = format!("{}:{}", config.daemon.host, config.daemon.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %addr, "failed to bind");
            pidfile::remove(&memory_root);
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "dmm-daemon listening");
    let shutdown_timeout = config.daemon.graceful_shutdown_timeout();
    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = tokio::time::timeout(shutdown_timeout + Duration::from_secs(3600), serve).await {
        error!(error = ?e, "server task timed out during shutdown");
    }

    info!("dmm-daemon shutting down");
    pidfile::remove(&memory_root);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("failed to listen for SIGTERM").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
