use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "console-cli", about = "Knowledge console document API CLI")]
struct Cli {
    #[arg(long, env = "CONSOLE_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[arg(long, env = "CONSOLE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Subcommand, Debug)]
enum Command {
    Ping,
    /// Ask a question against the document corpus.
    Ask {
        question: String,
        #[arg(long)]
        collection_id: Option<Uuid>,
        #[arg(long)]
        document_id: Option<Uuid>,
    },
    /// Ranked passage search.
    Query {
        query: String,
        #[arg(long)]
        collection_id: Option<Uuid>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List curated question/answer pairs.
    Qa {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        document_id: Option<Uuid>,
        #[arg(long)]
        collection_id: Option<Uuid>,
    },
    Markdown(MarkdownCommand),
    Documents(DocumentsCommand),
}

#[derive(Args, Debug)]
struct MarkdownCommand {
    #[command(subcommand)]
    command: MarkdownSubcommand,
}

#[derive(Subcommand, Debug)]
enum MarkdownSubcommand {
    List,
    Read {
        document_id: Uuid,
        /// Print the raw markdown instead of the JSON envelope.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
}

#[derive(Args, Debug)]
struct DocumentsCommand {
    #[command(subcommand)]
    command: DocumentsSubcommand,
}

#[derive(Subcommand, Debug)]
enum DocumentsSubcommand {
    List {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        collection_id: Option<Uuid>,
        #[arg(long, help = "processing, ready or failed")]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;
    let ctx = CliContext { base_url: cli.base_url, client };

    match cli.command {
        Command::Ping => run_ping(&ctx).await,
        Command::Ask { question, collection_id, document_id } => {
            let mut body = Map::new();
            body.insert("question".to_owned(), Value::String(question));
            insert_id(&mut body, "collection_id", collection_id);
            insert_id(&mut body, "document_id", document_id);
            let json = api_request(&ctx, reqwest::Method::POST, "/api/documents/ask", Some(Value::Object(body))).await?;
            print_json(&json)
        }
        Command::Query { query, collection_id, limit } => {
            let mut body = Map::new();
            body.insert("query".to_owned(), Value::String(query));
            insert_id(&mut body, "collection_id", collection_id);
            if let Some(limit) = limit {
                body.insert("limit".to_owned(), Value::from(limit));
            }
            let json =
                api_request(&ctx, reqwest::Method::POST, "/api/documents/query", Some(Value::Object(body))).await?;
            print_json(&json)
        }
        Command::Qa { q, document_id, collection_id } => {
            let mut params = Vec::new();
            push_param(&mut params, "q", q);
            push_param(&mut params, "document_id", document_id.map(|id| id.to_string()));
            push_param(&mut params, "collection_id", collection_id.map(|id| id.to_string()));
            let json = api_get(&ctx, "/api/documents/qa", &params).await?;
            print_json(&json)
        }
        Command::Markdown(markdown) => run_markdown(&ctx, markdown).await,
        Command::Documents(documents) => run_documents(&ctx, documents).await,
    }
}

async fn run_ping(cli: &CliContext) -> Result<(), CliError> {
    let url = format!("{}/healthz", cli.base_url.trim_end_matches('/'));
    let response = cli.client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: "health check failed".to_owned() });
    }
    println!("ok");
    Ok(())
}

async fn run_markdown(cli: &CliContext, markdown: MarkdownCommand) -> Result<(), CliError> {
    match markdown.command {
        MarkdownSubcommand::List => {
            let json = api_request(cli, reqwest::Method::GET, "/api/documents/markdown", None).await?;
            print_json(&json)
        }
        MarkdownSubcommand::Read { document_id, raw } => {
            let path = format!("/api/documents/markdown/{document_id}");
            let json = api_request(cli, reqwest::Method::GET, &path, None).await?;
            match json.get("content").and_then(Value::as_str) {
                Some(content) if raw => {
                    println!("{content}");
                    Ok(())
                }
                _ => print_json(&json),
            }
        }
    }
}

async fn run_documents(cli: &CliContext, documents: DocumentsCommand) -> Result<(), CliError> {
    match documents.command {
        DocumentsSubcommand::List { q, collection_id, status } => {
            let mut params = Vec::new();
            push_param(&mut params, "q", q);
            push_param(&mut params, "collection_id", collection_id.map(|id| id.to_string()));
            push_param(&mut params, "status", status);
            let json = api_get(cli, "/api/documents", &params).await?;
            print_json(&json)
        }
    }
}

fn insert_id(body: &mut Map<String, Value>, key: &str, id: Option<Uuid>) {
    if let Some(id) = id {
        body.insert(key.to_owned(), Value::String(id.to_string()));
    }
}

fn push_param(params: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        params.push((key, value));
    }
}

async fn api_get(cli: &CliContext, path: &str, params: &[(&'static str, String)]) -> Result<Value, CliError> {
    let url = format!("{}{}", cli.base_url.trim_end_matches('/'), path);
    let response = cli.client.get(&url).query(params).send().await?;
    decode(response).await
}

async fn api_request(
    cli: &CliContext,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value, CliError> {
    let url = format!("{}{}", cli.base_url.trim_end_matches('/'), path);

    let request = cli.client.request(method, &url);
    let request = if let Some(json) = body { request.json(&json) } else { request };

    let response = request.send().await?;
    decode(response).await
}

async fn decode(response: reqwest::Response) -> Result<Value, CliError> {
    let status = response.status();
    let value = response
        .json::<Value>()
        .await
        .unwrap_or_else(|_| Value::Null);

    if !status.is_success() {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| value.to_string(), str::to_owned);
        return Err(CliError::ServerError { status: status.as_u16(), message });
    }

    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
