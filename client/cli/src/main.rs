use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lightbox::api::ApiClient;
use lightbox::auth::{CredentialProvider, StaticToken, StoredToken};
use lightbox::config::{resolve_base_url, Config, BASE_URL_ENV};
use lightbox::events::RefreshHub;
use lightbox::gallery::{render_lines, GalleryView};
use lightbox::tui;
use lightbox::upload::{UploadCandidate, UploadWidget, UPLOADING_MESSAGE};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lightbox")]
#[command(about = "Upload images and browse your gallery", long_about = None)]
struct Cli {
    /// Backend URL (overrides LIGHTBOX_API_BASE_URL and the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token to use instead of the stored one
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive upload and gallery screen
    Gallery,
    /// Upload one image
    Upload {
        /// JPG, PNG or GIF, at most 5MB
        path: PathBuf,
    },
    /// List uploaded images
    Ls,
    /// Store a bearer token issued by the identity provider
    Login,
    /// Forget the stored token
    Logout,
    /// Show server and login status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = Config::load()?;

    let base_url = match &cli.server {
        Some(server) => resolve_base_url(Some(server.clone()), None),
        None => config.base_url(),
    };
    let credentials: Arc<dyn CredentialProvider> = match &cli.token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(StoredToken::new()),
    };

    let command = cli.command.unwrap_or(Commands::Gallery);

    // The interactive screen owns the terminal; no stdout logging there.
    if !matches!(command, Commands::Gallery) {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "lightbox=info".into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let api = Arc::new(ApiClient::new(&base_url)?);

    match command {
        Commands::Gallery => {
            if cli.token.is_none() && !config.is_logged_in() {
                println!("not logged in. run: lightbox login");
                return Ok(());
            }
            tui::run_gallery(api, credentials).await?
        }
        Commands::Upload { path } => upload(api, credentials, &path).await?,
        Commands::Ls => list(api, credentials).await?,
        Commands::Login => login(&api, config).await?,
        Commands::Logout => logout()?,
        Commands::Status => status(&api, &config).await,
    }

    Ok(())
}

async fn upload(
    api: Arc<ApiClient>,
    credentials: Arc<dyn CredentialProvider>,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    let candidate = UploadCandidate::from_path(path)
        .await
        .map_err(|e| anyhow::anyhow!("could not read {}: {}", path.display(), e))?;

    let mut widget = UploadWidget::new(api, credentials, RefreshHub::default());
    widget.set_picker(path.to_string_lossy());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message(UPLOADING_MESSAGE);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let state = widget.select(candidate).await;
    spinner.finish_and_clear();

    let message = state.message().unwrap_or_default();
    if state.is_error() {
        anyhow::bail!("{}", message);
    }
    println!("{}", message);
    Ok(())
}

async fn list(api: Arc<ApiClient>, credentials: Arc<dyn CredentialProvider>) -> anyhow::Result<()> {
    let view = GalleryView::new(api, credentials);
    view.reload().await;

    let state = view.state();
    for line in render_lines(&state) {
        println!("{}", line);
    }
    if matches!(state, lightbox::GalleryState::LoadError(_)) {
        anyhow::bail!("could not list files");
    }
    Ok(())
}

async fn login(api: &ApiClient, mut config: Config) -> anyhow::Result<()> {
    println!("server: {}", api.base_url());
    let token = rpassword::prompt_password("paste the access token from your identity provider: ")?;
    let token = token.trim().to_string();
    if token.is_empty() {
        anyhow::bail!("token required");
    }

    let files = api
        .list_files(&token)
        .await
        .map_err(|e| anyhow::anyhow!("token rejected: {}", e))?;

    config.server_url = Some(api.base_url().to_string());
    config.token = Some(token);
    config.save()?;
    println!("logged in ({} images)", files.len());
    Ok(())
}

fn logout() -> anyhow::Result<()> {
    let mut config = Config::load()?;
    config.token = None;
    config.save()?;
    println!("logged out");
    Ok(())
}

async fn status(api: &ApiClient, config: &Config) {
    println!("server: {}", api.base_url());
    if std::env::var(BASE_URL_ENV).is_ok() {
        println!("  (from {})", BASE_URL_ENV);
    }
    match api.health().await {
        Ok(health) => println!("backend: {}", health),
        Err(e) => println!("backend: unreachable ({})", e),
    }
    if config.is_logged_in() {
        println!("login: token stored");
    } else {
        println!("login: not logged in");
        println!("run: lightbox login");
    }
}
