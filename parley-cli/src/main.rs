// Parley command line interface
// Upload candidate documents, run an avatar interview, render single clips

mod console;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use parley_avatar::client::{AvatarServiceClient, HttpAvatarClient};
use parley_avatar::{
    ClipBackend, HeadlessTransportFactory, InterviewSession, ScriptedInterviewer, SessionEngine,
    StatusPoller,
};
use parley_core::identity::{IdentityProvider, MemoryIdentityProvider};
use parley_core::logging::init_tracing;
use parley_core::storage::{JOB_DESCRIPTION_CATEGORY, RESUME_CATEGORY};
use parley_core::{
    AuthSession, CandidateProfile, ConfigManager, JsonFileStore, LocalStore, ParleyConfig, Route,
    UploadedFile,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley - simulated AI video interviews", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<String>,

    /// Mediator base URL, overrides the configuration
    #[arg(long, global = true)]
    provider_url: Option<String>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and upload a resume and job description
    Upload {
        #[arg(long)]
        email: String,

        /// Password; without one a sign-in link is issued instead
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        name: String,

        #[arg(long)]
        contact: String,

        #[arg(long)]
        job_role: String,

        /// Resume document (.pdf, .doc or .docx)
        #[arg(long)]
        resume: PathBuf,

        /// Job description document (.pdf, .doc or .docx)
        #[arg(long)]
        job_description: PathBuf,
    },

    /// Run an interactive interview with the avatar
    Interview {
        /// Render each reply as a video clip instead of streaming
        #[arg(long)]
        clip: bool,
    },

    /// Render a single clip and print its URL
    Render {
        text: String,

        /// Poll until the job finishes, however long it takes
        #[arg(long)]
        unbounded: bool,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the effective configuration
    Check,

    /// Switch between the light and dark theme
    ToggleTheme,
}

fn load_config(cli: &Cli) -> Result<ConfigManager> {
    let mut config = match &cli.config {
        Some(path) => ParleyConfig::from_file(path)?,
        None => ParleyConfig::default(),
    };
    config.apply_env();
    if let Some(url) = &cli.provider_url {
        config.provider.base_url = url.clone();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(ConfigManager::new(config))
}

/// Validate the configuration and start logging before any network work
fn prepare(manager: &ConfigManager) -> Result<ParleyConfig> {
    let config = manager.get();
    config.validate()?;
    init_tracing(&config.logging)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let manager = load_config(&cli)?;

    match cli.command {
        Commands::Upload {
            email,
            password,
            name,
            contact,
            job_role,
            resume,
            job_description,
        } => {
            let config = prepare(&manager)?;
            let profile = CandidateProfile {
                name,
                email,
                contact,
                job_role,
                resume_path: resume.display().to_string(),
                job_description_path: job_description.display().to_string(),
            };
            upload(&config, password.as_deref(), profile, resume, job_description).await
        }
        Commands::Interview { clip } => interview(&prepare(&manager)?, clip).await,
        Commands::Render { text, unbounded } => render(prepare(&manager)?, &text, unbounded).await,
        Commands::Config(cmd) => handle_config_command(&manager, cmd, cli.config.as_deref()),
    }
}

fn handle_config_command(
    manager: &ConfigManager,
    cmd: ConfigCommands,
    path: Option<&str>,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&manager.get())?);
        }
        ConfigCommands::Check => {
            manager.get().validate()?;
            println!("Configuration OK");
        }
        ConfigCommands::ToggleTheme => {
            let theme = manager.toggle_theme()?;
            match path {
                Some(path) => {
                    std::fs::write(path, serde_json::to_string_pretty(&manager.get())?)
                        .with_context(|| format!("failed to write {}", path))?;
                    println!("Theme set to {:?} in {}", theme, path);
                }
                None => println!("Theme is now {:?} (pass --config to persist it)", theme),
            }
        }
    }
    Ok(())
}

async fn upload(
    config: &ParleyConfig,
    password: Option<&str>,
    profile: CandidateProfile,
    resume: PathBuf,
    job_description: PathBuf,
) -> Result<()> {
    // the terminal client has no hosted identity service
    let identity = Arc::new(MemoryIdentityProvider::accepting_any());
    let auth = AuthSession::follow(identity.clone());
    sign_in(&identity, &profile.email, password).await?;
    if auth.resolve(Route::Upload) != Route::Upload {
        return Err(anyhow!("not signed in"));
    }

    profile.validate()?;

    let store = JsonFileStore::open(&config.storage.data_dir).await?;
    let resume = UploadedFile::from_path(&resume).await?;
    let job_description = UploadedFile::from_path(&job_description).await?;

    let resume_path = store.save_file(&resume, RESUME_CATEGORY).await?;
    let job_description_path = store
        .save_file(&job_description, JOB_DESCRIPTION_CATEGORY)
        .await?;

    let record = store
        .save_record(CandidateProfile {
            resume_path,
            job_description_path,
            ..profile
        })
        .await?;

    info!(record_id = %record.id, data_dir = %config.storage.data_dir, "candidate saved");
    println!("Saved candidate {} ({})", record.profile.name, record.id);
    println!("Next: parley interview");
    Ok(())
}

async fn sign_in(
    identity: &MemoryIdentityProvider,
    email: &str,
    password: Option<&str>,
) -> Result<()> {
    let user = match password {
        Some(password) => identity.sign_in(email, password).await?,
        None => {
            identity.send_passwordless_link(email).await?;
            let link = identity
                .sent_links(email)
                .pop()
                .ok_or_else(|| anyhow!("no sign-in link issued for {}", email))?;
            identity.complete_passwordless_sign_in(&link).await?
        }
    };
    info!(uid = %user.uid, method = ?user.method, "signed in");
    Ok(())
}

fn avatar_client(config: &ParleyConfig) -> Result<Arc<dyn AvatarServiceClient>> {
    Ok(Arc::new(HttpAvatarClient::new(&config.provider, &config.clip)?))
}

async fn interview(config: &ParleyConfig, clip: bool) -> Result<()> {
    let client = avatar_client(config)?;
    let interviewer = Box::new(ScriptedInterviewer);
    let greeting = config.interview.greeting.clone();
    let limit = config.interview.time_limit();
    let banner = config.interview.summary();

    if clip {
        let poller = StatusPoller::from_config(client.clone(), &config.poll);
        let session = InterviewSession::new(ClipBackend::new(client, poller), interviewer, greeting)
            .with_time_limit(limit);
        console::InterviewConsole::new(session, banner).run().await
    } else {
        let engine = SessionEngine::new(client, Arc::new(HeadlessTransportFactory), &config.provider);
        tokio::spawn(console::report_snapshots(engine.subscribe()));
        let session = InterviewSession::new(engine, interviewer, greeting).with_time_limit(limit);
        console::InterviewConsole::new(session, banner).run().await
    }
}

async fn render(config: ParleyConfig, text: &str, unbounded: bool) -> Result<()> {
    let client = avatar_client(&config)?;
    let mut poll = config.poll;
    poll.unbounded |= unbounded;
    let poller = StatusPoller::from_config(client.clone(), &poll);

    let job_id = client.submit_render_job(text).await?;
    println!("Submitted render job {}", job_id);

    let cancel = CancellationToken::new();
    let handle = poller.spawn(job_id, cancel.clone());
    let url = tokio::select! {
        result = handle.join() => result?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Err(anyhow!("render cancelled"));
        }
    };

    println!("{}", url);
    Ok(())
}
