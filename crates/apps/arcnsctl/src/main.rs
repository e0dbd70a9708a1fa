use anyhow::{anyhow, bail, Context, Result};
use arcns_net::{
    ApiResult, ClientConfig, CredentialStore, FileCredentialStore, HttpRequest, HttpTransport,
    PageLoader, Paginator, RequestExecutor,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;

const BASE_URL_ENV: &str = "ARCNS_BASE_URL";

#[derive(Parser, Debug)]
#[command(name = "arcnsctl", about = "Signed request client for arcns services", version)]
struct Cli {
    /// Client configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Session file holding the token, clock offset and saved login.
    #[arg(long, default_value = "arcns-session.toml")]
    session: PathBuf,

    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or edit the stored session token.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Inspect or edit the saved login.
    LoginInfo {
        #[command(subcommand)]
        action: LoginInfoAction,
    },
    /// Issue one signed GET and print its data.
    Get {
        path: String,
        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "query", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
    /// Post credentials and store the returned session token.
    Login {
        path: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Load consecutive pages of a list endpoint and print the merged list.
    Pages(PagesArgs),
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    Show,
    Set {
        #[arg(long)]
        token: String,
        /// Server clock minus local clock, in seconds.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
    },
    Clear,
}

#[derive(Subcommand, Debug)]
enum LoginInfoAction {
    Show,
    Set {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Clear,
}

#[derive(Args, Debug)]
struct PagesArgs {
    path: String,
    #[arg(long, default_value_t = 1)]
    pages: u32,
    #[arg(long, default_value = "page")]
    page_param: String,
    #[arg(long, default_value = "size")]
    size_param: String,
    #[arg(long)]
    page_size: Option<usize>,
    #[arg(long, default_value_t = arcns_net::pagination::DEFAULT_INITIAL_PAGE)]
    initial_page: u32,
}

type Executor = RequestExecutor<HttpTransport, FileCredentialStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let store = FileCredentialStore::open(&cli.session)
        .with_context(|| format!("failed to open session {}", cli.session.display()))?;

    match cli.command {
        Command::Session { action } => session(&store, action),
        Command::LoginInfo { action } => login_info(&store, action),
        Command::Get { path, query } => {
            let executor = executor(cli.config.as_ref(), store)?;
            let request =
                query.into_iter().fold(HttpRequest::get(path), |request, (key, value)| {
                    request.with_query(key, value)
                });
            let data = executor.execute::<JsonValue>(request).await.into_result()?;
            print_json(&data)
        }
        Command::Login { path, username, password } => {
            let executor = executor(cli.config.as_ref(), store)?;
            let body = json!({ "username": &username, "password": &password });
            let request = HttpRequest::post_json(path, &body).context("failed to encode login")?;
            executor.execute_login(request).await.into_result()?;
            executor
                .store()
                .save_login_info(&username, &password)
                .context("failed to save login info")?;
            log::info!("logged in as {username}");
            Ok(())
        }
        Command::Pages(args) => {
            let executor = executor(cli.config.as_ref(), store)?;
            let items = pages(&executor, &args).await?;
            print_json(&JsonValue::Array(items))
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    Ok(match std::env::var(BASE_URL_ENV) {
        Ok(base_url) if !base_url.trim().is_empty() => {
            log::debug!("base url overridden by {BASE_URL_ENV}");
            config.with_base_url(base_url)
        }
        _ => config,
    })
}

fn executor(config: Option<&PathBuf>, store: FileCredentialStore) -> Result<Executor> {
    let config = load_config(config)?;
    config.validate().context("invalid client config")?;
    let base_url = config.base_url.clone();
    RequestExecutor::from_config(config, store)
        .with_context(|| format!("unusable base url {base_url}"))
}

fn session(store: &FileCredentialStore, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Show => {
            let credentials = store.credentials();
            print_json(&json!({
                "token": credentials.signing_token(),
                "clock_offset_secs": credentials.clock_offset_secs,
            }))
        }
        SessionAction::Set { token, offset } => {
            store.set_token(&token, offset).context("failed to store token")
        }
        SessionAction::Clear => store.clear_token().context("failed to clear token"),
    }
}

fn login_info(store: &FileCredentialStore, action: LoginInfoAction) -> Result<()> {
    match action {
        LoginInfoAction::Show => match store.login_info() {
            Some(info) => print_json(&json!({ "username": info.username })),
            None => bail!("no login info saved in {}", store.path().display()),
        },
        LoginInfoAction::Set { username, password } => store
            .save_login_info(&username, &password)
            .context("failed to save login info"),
        LoginInfoAction::Clear => store.clear_login_info().context("failed to clear login info"),
    }
}

async fn pages(executor: &Executor, args: &PagesArgs) -> Result<Vec<JsonValue>> {
    let mut paginator = Paginator::new(args.initial_page);
    if let Some(page_size) = args.page_size {
        paginator = paginator.with_page_size(page_size);
    }
    let loader = PageLoader::new(paginator);

    for index in 0..args.pages {
        let result = loader
            .load(index == 0, |page| {
                let mut request =
                    HttpRequest::get(args.path.as_str()).with_query(&args.page_param, page);
                if let Some(page_size) = args.page_size {
                    request = request.with_query(&args.size_param, page_size);
                }
                executor.execute::<Vec<JsonValue>>(request)
            })
            .await?;
        match result {
            ApiResult::Success { data, .. } => {
                log::debug!("page {} returned {data} items", loader.current_page());
            }
            other => {
                let message = other.error_message();
                return Err(anyhow!("page {} failed: {message}", loader.current_page() + 1));
            }
        }
        if loader.no_more_data() {
            break;
        }
    }
    Ok(loader.into_items().unwrap_or_default())
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn print_json(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("failed to render output")?);
    Ok(())
}
