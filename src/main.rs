use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::http::Method;
use clap::Parser;
use hilite::applier::{Highlighter, Page};
use hilite::config::{Cli, Command, Config, default_config_dir, default_config_path};
use hilite::db::Database;
use hilite::handler::{AppState, router};
use hilite::message::{Dispatcher, Request, Response};
use hilite::model::PageUrl;
use hilite::panel;
use hilite::store::HighlightStore;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // With --config the database lives next to the config file, otherwise
    // both go under ~/.hilite/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = Config::new(&config_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::open(&cfg.app, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    if let Err(e) = run(args.command, cfg, db).await {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        std::process::exit(1);
    }
}

async fn run(command: Command, cfg: Config, db: Arc<Database>) -> Result<()> {
    match command {
        Command::Serve => serve(cfg, db).await,
        Command::Capture {
            url,
            file,
            text,
            occurrence,
            out,
        } => {
            let mut page = load_page(&url, &file, &cfg)?;
            let response = Dispatcher::new(db.as_ref())
                .dispatch(&mut page, Request::Capture { text, occurrence })
                .await;
            report(&response)?;
            db.sync().await?;
            write_page(&page, out.as_deref())
        }
        Command::Open { url, file, out } => {
            let mut page = load_page(&url, &file, &cfg)?;
            let response = Dispatcher::new(db.as_ref())
                .dispatch(&mut page, Request::Restore)
                .await;
            report(&response)?;
            write_page(&page, out.as_deref())
        }
        Command::Select { url, id, file, out } => {
            let mut page = load_page(&url, &file, &cfg)?;
            let outcome = Highlighter::new(db.as_ref()).select(&mut page, &id).await?;
            tracing::info!(url = %page.url(), id = %id, outcome = ?outcome, "selected highlight");
            db.sync().await?;
            write_page(&page, out.as_deref())
        }
        Command::Clear { url, file, out } => match file {
            Some(file) => {
                let mut page = load_page(&url, &file, &cfg)?;
                let response = Dispatcher::new(db.as_ref())
                    .dispatch(&mut page, Request::ClearActive)
                    .await;
                report(&response)?;
                db.sync().await?;
                write_page(&page, out.as_deref())
            }
            None => {
                let url = PageUrl::parse(&url)?;
                if !db.set_active(&url, None).await? {
                    tracing::info!(url = %url, "no stored page to clear");
                }
                db.sync().await
            }
        },
        Command::List { url, query } => {
            let url = PageUrl::parse(&url)?;
            let record = db.get(&url).await?;
            let view = panel::page_list(&url, record.as_ref(), query.as_deref().unwrap_or_default());
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Dashboard { query } => {
            let pages = db.get_all().await?;
            let view = panel::dashboard(&pages, query.as_deref().unwrap_or_default(), None);
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Delete { url, id } => {
            let url = PageUrl::parse(&url)?;
            let highlighter = Highlighter::new(db.as_ref());
            match id {
                Some(id) => {
                    highlighter.delete_highlight(&url, &id, None).await?;
                }
                None => highlighter.delete_page(&url).await?,
            }
            db.sync().await
        }
    }
}

async fn serve(cfg: Config, db: Arc<Database>) -> Result<()> {
    tracing::info!("hilite.svc starting");

    let address = format!("127.0.0.1:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel::<()>(1);

    if db.is_synced() {
        let sync_db = db.clone();
        let sync_token = cancellation_token.clone();
        let sync_done = shutdown_complete_tx.clone();
        let every = std::time::Duration::from_secs(cfg.app.sync_interval_seconds.max(1));
        tokio::spawn(async move {
            let _sync_done = sync_done;
            let mut interval = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = sync_db.sync().await {
                            tracing::warn!("failed to sync replica: {}", e);
                        }
                    }
                    _ = sync_token.cancelled() => {
                        tracing::info!("replica sync task shutting down");
                        break;
                    }
                }
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = router(AppState {
        db,
        color: cfg.marker.color.clone(),
    })
    .layer(cors);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("hilite.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("server stopped")?;
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
            cancellation_token.cancel();
        }
    }

    drop(shutdown_complete_tx);
    shutdown_complete_rx.recv().await;
    tracing::info!("hilite.svc going off, graceful shutdown complete");
    Ok(())
}

fn load_page(url: &str, file: &Path, cfg: &Config) -> Result<Page> {
    let url = PageUrl::parse(url)?;
    let html = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    Ok(Page::parse(url, &html).with_color(cfg.marker.color.as_str()))
}

fn write_page(page: &Page, out: Option<&Path>) -> Result<()> {
    let html = page.to_html();
    match out {
        Some(path) => std::fs::write(path, html).with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{html}"),
    }
    Ok(())
}

fn report(response: &Response) -> Result<()> {
    match response {
        Response::Success { message, .. } => {
            tracing::info!(response = %serde_json::to_string(response)?, "{}", message);
            Ok(())
        }
        Response::Error { kind, message } => bail!("{kind}: {message}"),
    }
}
