use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use dbcv::AppState;
use dbcv::api::ResourceKind;
use dbcv::config::Config;
use dbcv::events::NoticeKind;
use dbcv::generation::GenerationStatus;
use dbcv::prefs::recent::RecentKind;
use dbcv::prefs::sorting::{SortOption, sort_items};
use dbcv::store::bots::BotsStore;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "dbcv", about = "Command-line client for the DBCV bot builder")]
enum Cli {
    /// Sign in and store the access token
    Login {
        username: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored token and cached user
    Logout,
    /// List a resource collection
    List {
        /// Resource name, e.g. bots, channels, template_group
        resource: String,
        /// Case-insensitive name filter
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "recently_updated")]
        sort: SortOption,
        /// List the credentials of this bot instead
        #[arg(long)]
        bot: Option<String>,
    },
    /// Stream a bot's execution logs until Ctrl-C
    Logs {
        bot_id: String,
        /// Only print logs for this step
        #[arg(long)]
        step: Option<String>,
    },
    /// Ask the AI builder to generate or modify a bot
    Generate {
        bot_id: String,
        prompt: String,
        /// `build` for a new bot, anything else modifies the existing one
        #[arg(long, default_value = "build")]
        mode: String,
    },
    /// Plan or build a bot with the autonomous assistant
    Assist {
        prompt: String,
        /// Attach the build to this bot
        #[arg(long)]
        bot: Option<String>,
        /// Only ask for a plan, do not build
        #[arg(long)]
        plan: bool,
    },
    /// Print the state of a generation-tracking session
    Track {
        session_id: String,
        #[arg(long)]
        events: bool,
    },
    /// Download a bot as JSON
    Export {
        bot_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload an exported bot, optionally replacing an existing one
    Import {
        file: PathBuf,
        #[arg(long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbcv=info,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(false),
        )
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    let state = AppState::new(config);
    spawn_notice_printer(&state);

    match cli {
        Cli::Login { username, password } => login(&state, &username, password).await,
        Cli::Logout => {
            state.auth.logout();
            println!("Signed out");
            Ok(())
        }
        Cli::List {
            resource,
            search,
            sort,
            bot,
        } => list(&state, &resource, &search, sort, bot.as_deref()).await,
        Cli::Logs { bot_id, step } => logs(&state, &bot_id, step.as_deref()).await,
        Cli::Generate {
            bot_id,
            prompt,
            mode,
        } => generate(&state, &bot_id, &prompt, &mode).await,
        Cli::Assist { prompt, bot, plan } => assist(&state, &prompt, bot.as_deref(), plan).await,
        Cli::Track { session_id, events } => track(&state, &session_id, events).await,
        Cli::Export { bot_id, out } => export(&state, &bot_id, out).await,
        Cli::Import { file, target } => import(&state, &file, target.as_deref()).await,
    }
}

fn spawn_notice_printer(state: &AppState) {
    let mut notices = state.api.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.kind {
                NoticeKind::LoginRequired => eprintln!("Session expired, run `dbcv login`"),
                NoticeKind::Error => eprintln!("{}", notice.message),
            }
        }
    });
}

fn require_login(state: &AppState) -> Result<String> {
    state
        .credentials
        .token()
        .context("not signed in, run `dbcv login` first")
}

async fn login(state: &AppState, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Password: ");
            std::io::stdout().flush().context("failed to flush stdout")?;
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("failed to read password")?;
            line.trim_end().to_string()
        }
    };

    if state.auth.login(username, &password).await.is_none() {
        bail!("login failed");
    }
    match state.users.read_current_user().await {
        Some(user) => println!(
            "Signed in as {}",
            user.email.as_deref().unwrap_or(user.id.as_str())
        ),
        None => println!("Signed in"),
    }
    Ok(())
}

fn recent_kind(kind: &ResourceKind) -> Option<RecentKind> {
    match kind {
        ResourceKind::Bots => Some(RecentKind::Bot),
        ResourceKind::Channels => Some(RecentKind::Channel),
        ResourceKind::Requests => Some(RecentKind::Request),
        ResourceKind::Widgets => Some(RecentKind::Widget),
        _ => None,
    }
}

async fn list(
    state: &AppState,
    resource: &str,
    search: &str,
    sort: SortOption,
    bot: Option<&str>,
) -> Result<()> {
    require_login(state)?;

    if let Some(bot_id) = bot {
        let creds = state.bot_credentials(bot_id);
        let items = creds.list(&[]).await.context("failed to list credentials")?;
        for c in items {
            let marker = if c.is_default { "*" } else { " " };
            println!("{marker} {}\t{}/{}", c.id, c.provider, c.strategy);
        }
        return Ok(());
    }

    let Some(kind) = ResourceKind::from_name(resource) else {
        let known: Vec<&str> = ResourceKind::NAMED.iter().map(|k| k.name()).collect();
        bail!("unknown resource {resource:?}; expected one of {}", known.join(", "));
    };

    let recent = recent_kind(&kind).map(|k| state.recent(k));
    let recent_ids = recent.as_ref().map(|r| r.ids()).unwrap_or_default();

    let store = state.resource_store(kind);
    let items = store
        .list(&[])
        .await
        .with_context(|| format!("failed to list {resource}"))?;

    for item in sort_items(&items, search, sort, &recent_ids) {
        println!(
            "{}\t{}\t{}",
            item.id,
            item.name.as_deref().unwrap_or("-"),
            item.updated_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn logs(state: &AppState, bot_id: &str, step: Option<&str>) -> Result<()> {
    let token = require_login(state)?;

    if let Some(bot) = state.bots.read(bot_id).await {
        state
            .recent(RecentKind::Bot)
            .add(bot_id, bot.name.as_deref().unwrap_or(bot_id));
    }

    if !state.execution.connect(bot_id, &token, Map::new()).await {
        bail!("could not open the execution socket for bot {bot_id}");
    }

    let mut printed = 0usize;
    let mut was_connected = false;
    let mut last_vars = Value::Null;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let Some(session) = state.execution.get_bot(bot_id).await else {
            break;
        };

        match step {
            Some(step_id) => {
                let entries = state.execution.get_step_logs(bot_id, step_id).await;
                for entry in entries.iter().skip(printed) {
                    println!(
                        "{} [{}] {}",
                        entry.timestamp.format("%H:%M:%S"),
                        entry.level,
                        entry.message
                    );
                }
                printed = entries.len();
            }
            None => {
                for line in session.logs.iter().skip(printed) {
                    println!("{line}");
                }
                printed = session.logs.len();
            }
        }

        let vars = Value::Object(session.variables.clone());
        if vars != last_vars {
            println!("variables: {vars}");
            last_vars = vars;
        }

        if session.connected {
            was_connected = true;
        } else if was_connected {
            tracing::info!(bot_id, "execution socket closed");
            break;
        }
    }

    state.execution.disconnect(bot_id).await;
    Ok(())
}

async fn generate(state: &AppState, bot_id: &str, prompt: &str, mode: &str) -> Result<()> {
    require_login(state)?;
    let session_id = format!("cli-{}", uuid::Uuid::new_v4());
    let generation = &state.generation;

    if !generation.connect(&session_id, bot_id).await {
        let error = generation
            .get_session(&session_id)
            .await
            .and_then(|s| s.error)
            .unwrap_or(Value::Null);
        bail!("could not start generation: {error}");
    }

    let context = json!({ "bot_id": bot_id });
    generation
        .send_prompt(&session_id, prompt, &context, mode)
        .await
        .context("failed to send prompt")?;

    let mut seen: HashSet<String> = HashSet::new();
    let outcome = loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let Some(session) = generation.get_session(&session_id).await else {
            bail!("generation session disappeared");
        };

        for step in &session.steps {
            let key = format!("{}:{:?}", step.id, step.status);
            if seen.insert(key) {
                println!(
                    "[{:>3}%] {} {:?}: {}",
                    step.progress, step.name, step.status, step.description
                );
            }
        }

        if session.status.is_finished() {
            break session;
        }
        if !session.connected && session.status != GenerationStatus::Connecting {
            break session;
        }
    };

    generation.disconnect(&session_id).await;

    match outcome.status {
        GenerationStatus::Completed => {
            let result = outcome.result.unwrap_or(Value::Null);
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to render result")?
            );
            Ok(())
        }
        GenerationStatus::Error => bail!(
            "generation failed: {}",
            outcome.error.unwrap_or(Value::Null)
        ),
        other => bail!("generation ended while {other:?}"),
    }
}

async fn assist(
    state: &AppState,
    prompt: &str,
    bot_id: Option<&str>,
    plan_only: bool,
) -> Result<()> {
    require_login(state)?;
    let assistant = &state.assistant;

    if plan_only {
        let plan = assistant
            .generate_plan(prompt, Map::new())
            .await
            .context("failed to plan")?;
        for (n, step) in plan.steps.iter().enumerate() {
            println!("{:>2}. {} ({})", n + 1, step.name, step.action);
            if !step.required_data.is_empty() {
                println!("    needs: {}", step.required_data.join(", "));
            }
        }
        if !plan.missing_data.is_empty() {
            println!("missing: {}", plan.missing_data.join(", "));
        }
        if let Some(suggestion) = plan.prompt_suggestion {
            println!("try: {suggestion}");
        }
        return Ok(());
    }

    let session_id = assistant.create_session(prompt, bot_id, Map::new()).await;
    let response = assistant
        .generate_bot(&session_id)
        .await
        .context("assistant build failed")?;
    for call in assistant.tool_history(&session_id).await {
        let mark = if call.success { "ok" } else { "failed" };
        println!("  {} [{mark}]", call.tool);
    }
    println!("{}", response.output_text);
    Ok(())
}

async fn track(state: &AppState, session_id: &str, show_events: bool) -> Result<()> {
    require_login(state)?;
    let tracking = &state.tracking;

    tracking
        .load_session_summary(session_id)
        .await
        .with_context(|| format!("failed to load tracking session {session_id}"))?;
    if show_events {
        tracking.load_session_events(session_id).await;
    }

    let snapshot = tracking.snapshot().await;
    println!(
        "status: {:?}  progress: {}/{} ({:.1}%)",
        snapshot.session_status(),
        snapshot.progress.completed_steps,
        snapshot.progress.total_steps,
        snapshot.progress.percentage
    );
    for step in &snapshot.steps {
        println!("  {:?}\t{}\t{}", step.status, step.name, step.description);
    }
    if show_events {
        for event in &snapshot.events {
            println!("  event {} {}", event.kind, Value::Object(event.data.clone()));
        }
    }
    Ok(())
}

async fn export(state: &AppState, bot_id: &str, out: Option<PathBuf>) -> Result<()> {
    require_login(state)?;
    let bytes = state
        .bots
        .export_bot(bot_id)
        .await
        .with_context(|| format!("failed to export bot {bot_id}"))?;
    let path = out.unwrap_or_else(|| PathBuf::from(BotsStore::export_file_name(bot_id)));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Exported {bot_id} to {}", path.display());
    Ok(())
}

async fn import(state: &AppState, file: &PathBuf, target: Option<&str>) -> Result<()> {
    require_login(state)?;
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("bot.json");
    let bot = state
        .bots
        .import_bot(file_name, content, target)
        .await
        .context("import failed")?;
    println!("Imported bot {}", bot.id);
    Ok(())
}
