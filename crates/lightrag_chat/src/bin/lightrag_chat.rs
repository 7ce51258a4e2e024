//! lightrag-chat: command-line chat client for a LightRAG backend.
//! Reads config, authenticates, sends one question (argument or first stdin
//! line) and prints the streamed answer to stdout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use lightrag_chat::config::{self, Config, CONFIG_PATH_ENV};
use lightrag_chat::{
    describe_login_error, AuthStore, ChatSession, ChatStore, QueryClient, Resolver, ServerInfo,
    StaticContext,
};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Page location assumed when neither `--page-url` nor `page.url` is set.
const DEFAULT_PAGE_URL: &str = "http://localhost/";

#[derive(Debug, Parser)]
#[command(name = "lightrag-chat", version, about = "Ask a LightRAG backend and stream the answer")]
struct Args {
    /// Config file (default: $LIGHTRAG_CHAT_CONFIG or ~/.lightrag-chat/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Location the client is viewed from; drives endpoint resolution.
    #[arg(long)]
    page_url: Option<String>,

    /// Backend base URL override.
    #[arg(long)]
    backend_url: Option<String>,

    /// Bearer token; skips login.
    #[arg(long)]
    token: Option<String>,

    /// The question. Read from stdin when omitted.
    question: Option<String>,
}

fn load_config(args: &Args) -> Result<Config, String> {
    // 1. --config <path>, 2. LIGHTRAG_CHAT_CONFIG; both must exist.
    let explicit = args
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let cfg = match explicit {
        Some(path) => config::load(&path)
            .map_err(|e| format!("failed to load config from {}: {}", path.display(), e))?,
        // 3. Default path, optional.
        None => match config::default_config_path() {
            Some(path) => config::load_or_default(&path)
                .map_err(|e| format!("failed to load config from {}: {}", path.display(), e))?,
            None => Config::default(),
        },
    };
    let mut cfg = cfg.with_env_overrides();
    if let Some(url) = &args.backend_url {
        cfg.backend.base_url = Some(url.clone());
    }
    Ok(cfg)
}

fn read_question(args: &Args) -> Result<String, String> {
    if let Some(q) = &args.question {
        return Ok(q.trim().to_string());
    }
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("failed to read question from stdin: {}", e))?;
    Ok(line.trim().to_string())
}

async fn authenticate(client: &QueryClient, args: &Args, cfg: &Config) -> Result<(), String> {
    let auth = client.auth();
    if let Some(token) = args.token.as_ref().or(cfg.auth.token.as_ref()) {
        auth.login(token.clone(), false, ServerInfo::default());
        return Ok(());
    }
    if let (Some(user), Some(pass)) = (&cfg.auth.username, &cfg.auth.password) {
        let resp = client
            .login(user, pass)
            .await
            .map_err(|e| describe_login_error(&e))?;
        auth.login(resp.access_token.clone(), false, ServerInfo::from(&resp));
        return Ok(());
    }
    let status = client.auth_status().await;
    if let (false, Some(token)) = (status.auth_configured, &status.access_token) {
        auth.login(token.clone(), true, ServerInfo::from(&status));
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let cfg = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let question = read_question(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });
    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    let page_url = args
        .page_url
        .clone()
        .or_else(|| cfg.page.url.clone())
        .unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
    let resolver = Resolver::from_config(&cfg, Arc::new(StaticContext::from_href(&page_url)));
    let client = QueryClient::from_config(&cfg, resolver, AuthStore::new());
    let session = ChatSession::new(client, ChatStore::new());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        if let Err(e) = authenticate(session.client(), &args, &cfg).await {
            eprintln!("Error: login failed: {}", e);
            process::exit(1);
        }

        // Stdout failing (closed pipe) cancels the query; no further writes.
        let (broken_tx, mut broken_rx) = oneshot::channel::<io::Error>();
        let mut broken_tx = Some(broken_tx);
        let send = session.send_with(&question, move |delta| {
            if broken_tx.is_none() {
                return;
            }
            let mut out = io::stdout().lock();
            if let Err(e) = out.write_all(delta.as_bytes()).and_then(|()| out.flush()) {
                if let Some(tx) = broken_tx.take() {
                    let _ = tx.send(e);
                }
            }
        });

        let result = tokio::select! {
            result = send => result.map_err(|e| e.to_string()),
            Ok(e) = &mut broken_rx => Err(format!("failed to write answer: {}", e)),
        };
        let result = result.and_then(|_| {
            writeln!(io::stdout()).map_err(|e| format!("failed to write answer: {}", e))
        });

        if let Err(e) = result {
            eprintln!();
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    });
}
