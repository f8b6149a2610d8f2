//! Briefly CLI - a command-line client for the Briefly summarization service.
//!
//! Thin driver over the library core: it wires the credential store, API
//! client, session manager, polling views, and mutation gateway together and
//! exposes one subcommand per operation.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use briefly_client::api::ApiClient;
use briefly_client::auth::{CredentialStore, SessionManager, SessionPhase};
use briefly_client::config::{
    Config, IDENTITY_REFRESH_INTERVAL_SECS, JOBS_POLL_INTERVAL_SECS,
    NOTIFICATIONS_POLL_INTERVAL_SECS,
};
use briefly_client::models::{Job, Notification};
use briefly_client::sync::{MutationGateway, PollingView};

/// Capacity for transport-to-session auth signals; one pending signal is
/// enough since they all collapse to the same transition.
const AUTH_EVENT_CAPACITY: usize = 4;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Set up logging with environment-based filter
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("Usage: briefly <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  signup                 Create an account");
    eprintln!("  login [username]       Authenticate and store the session");
    eprintln!("  logout                 Discard the stored session");
    eprintln!("  me                     Show the authenticated identity");
    eprintln!("  submit <text>          Submit text for summarization");
    eprintln!("  jobs                   List your summarization jobs");
    eprintln!("  notifications          List notifications");
    eprintln!("  read <id>              Mark a notification as read");
    eprintln!("  credits <amount>       Purchase credits");
    eprintln!("  watch                  Poll jobs and notifications live");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_usage();
        bail!("missing command");
    };

    let mut config = Config::load().context("failed to load configuration")?;
    let storage_dir = config.storage_dir()?;
    let credentials = Arc::new(CredentialStore::new(storage_dir));
    let (event_tx, event_rx) = mpsc::channel(AUTH_EVENT_CAPACITY);
    let api = ApiClient::new(config.api_url(), Arc::clone(&credentials), event_tx)
        .context("failed to build API client")?;
    let mut session = SessionManager::new(api.clone(), Arc::clone(&credentials), event_rx);

    match command {
        "signup" => cmd_signup(&api).await,
        "login" => cmd_login(&mut session, &mut config, args.get(2).cloned()).await,
        "logout" => {
            session.resolve().await;
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        "me" => {
            require_session(&mut session).await?;
            print_identity(&session);
            Ok(())
        }
        "submit" => {
            let text = args.get(2..).filter(|rest| !rest.is_empty()).map(|rest| rest.join(" "));
            let Some(text) = text else {
                bail!("usage: briefly submit <text>");
            };
            require_session(&mut session).await?;
            cmd_submit(&api, &session, &text).await
        }
        "jobs" => {
            require_session(&mut session).await?;
            let jobs = api.fetch_jobs().await?;
            print_jobs(&jobs);
            Ok(())
        }
        "notifications" => {
            require_session(&mut session).await?;
            let notifications = api.fetch_notifications().await?;
            print_notifications(&notifications);
            Ok(())
        }
        "read" => {
            let id: i64 = args
                .get(2)
                .context("usage: briefly read <id>")?
                .parse()
                .context("notification id must be a number")?;
            require_session(&mut session).await?;
            api.mark_notification_read(id).await?;
            println!("Notification {} marked as read.", id);
            Ok(())
        }
        "credits" => {
            let amount: i64 = args
                .get(2)
                .context("usage: briefly credits <amount>")?
                .parse()
                .context("credit amount must be a number")?;
            require_session(&mut session).await?;
            let balance = api.add_credits(amount).await?;
            session.apply_credits(balance);
            println!("New balance: {} credits", balance);
            Ok(())
        }
        "watch" => {
            require_session(&mut session).await?;
            cmd_watch(api, session).await
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown command: {}", other);
        }
    }
}

/// Resolve the stored session and fail with a friendly message when it does
/// not land on an authenticated identity.
async fn require_session(session: &mut SessionManager) -> Result<()> {
    session.resolve().await;
    if session.phase() != SessionPhase::Authenticated {
        bail!("not logged in - run `briefly login` first");
    }
    Ok(())
}

async fn cmd_signup(api: &ApiClient) -> Result<()> {
    let username = prompt("Username: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;

    api.signup(&username, &email, &password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("Account created. Run `briefly login` to sign in.");
    Ok(())
}

async fn cmd_login(
    session: &mut SessionManager,
    config: &mut Config,
    username_arg: Option<String>,
) -> Result<()> {
    let username = match username_arg
        .or_else(|| std::env::var("BRIEFLY_USERNAME").ok())
    {
        Some(u) => u,
        None => {
            let hint = config.last_username.clone();
            let entered = match &hint {
                Some(last) => prompt(&format!("Username [{}]: ", last))?,
                None => prompt("Username: ")?,
            };
            if entered.is_empty() {
                hint.context("username is required")?
            } else {
                entered
            }
        }
    };
    let password = match std::env::var("BRIEFLY_PASSWORD") {
        Ok(p) => p,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    session
        .authenticate(&username, &password)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        info!(error = %e, "Failed to save configuration");
    }

    print_identity(session);
    Ok(())
}

async fn cmd_submit(api: &ApiClient, session: &SessionManager, text: &str) -> Result<()> {
    let jobs = PollingView::jobs(api.clone());
    let notifications = PollingView::notifications(api.clone());
    let gateway = MutationGateway::new(api.clone(), session.subscribe(), jobs, notifications);

    let job = gateway
        .submit_job(text)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("Submitted job {} ({})", job.id, job.status);
    Ok(())
}

/// Live view: polls jobs and notifications on their own cadences, refreshes
/// the identity every minute, and exits on Ctrl+C.
async fn cmd_watch(api: ApiClient, mut session: SessionManager) -> Result<()> {
    let jobs = PollingView::jobs(api.clone());
    let notifications = PollingView::notifications(api);

    jobs.start(Duration::from_secs(JOBS_POLL_INTERVAL_SECS));
    notifications.start(Duration::from_secs(NOTIFICATIONS_POLL_INTERVAL_SECS));

    let mut identity_refresh =
        tokio::time::interval(Duration::from_secs(IDENTITY_REFRESH_INTERVAL_SECS));
    identity_refresh.tick().await; // first tick fires immediately
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    println!("Watching (Ctrl+C to stop)...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = identity_refresh.tick() => {
                let _ = session.refresh_identity().await;
            }
            _ = redraw.tick() => {
                session.process_auth_events();
                if session.phase() == SessionPhase::Anonymous {
                    eprintln!("Session expired, please log in again.");
                    break;
                }
                render_watch(&session, &jobs.snapshot().data, &notifications.snapshot().data);
            }
        }
    }

    jobs.stop();
    notifications.stop();
    println!();
    Ok(())
}

fn render_watch(session: &SessionManager, jobs: &[Job], notifications: &[Notification]) {
    let credits = session
        .identity()
        .map(|i| i.credits.to_string())
        .unwrap_or_else(|| "?".to_string());
    let pending = jobs.iter().filter(|j| !j.status.is_terminal()).count();
    let unread = notifications.iter().filter(|n| !n.is_read).count();
    print!(
        "\rcredits: {} | jobs: {} ({} running) | notifications: {} ({} unread)   ",
        credits,
        jobs.len(),
        pending,
        notifications.len(),
        unread
    );
    let _ = io::stdout().flush();
}

fn print_identity(session: &SessionManager) {
    if let Some(identity) = session.identity() {
        println!(
            "{} <{}> - {} credits",
            identity.username, identity.email, identity.credits
        );
    }
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs yet.");
        return;
    }
    for job in jobs {
        println!("[{}] {} ({})", job.id, job.status, job.created_at);
        let preview: String = job.input_text.chars().take(60).collect();
        println!("  input:  {}", preview);
        if let Some(output) = &job.output_text {
            println!("  output: {}", output);
        }
    }
}

fn print_notifications(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("No notifications.");
        return;
    }
    for n in notifications {
        let marker = if n.is_read { " " } else { "*" };
        println!("{}[{}] {}", marker, n.id, n.message);
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
