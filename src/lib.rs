pub mod api;
pub mod cli;
pub mod cloudinary;
pub mod config;
pub mod debounce;
pub mod discovery;
pub mod display;
pub mod follow;
pub mod models;
pub mod session;
pub mod utils;
pub mod validation;

use std::path::Path;

use anyhow::{bail, Context};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use api::{events::Membership, ApiClient, ApiError, Listing};
use cli::{
    AdminCommand, Cli, Command, ConfigCommand, EventsCommand, ListArgs, SignupArgs, SkillsCommand,
};
use cloudinary::Uploader;
use config::{AppConfig, ConfigStore};
use debounce::Debouncer;
use discovery::{Discovery, BUCKET_KEYS};
use follow::{FollowError, FollowOutcome, FollowState, FollowTarget};
use models::{Event, MailRequest, NewEvent, NewUser, Skill, UserProfile, UserRole};
use session::{Session, SessionError};
use validation::ValidationError;

struct Ctx {
    store: ConfigStore,
    config: AppConfig,
    json: bool,
}

impl Ctx {
    fn client(&self) -> anyhow::Result<ApiClient> {
        ApiClient::from_config(&self.config, self.config.session.as_ref())
            .context("invalid api base url")
    }

    fn session(&self) -> anyhow::Result<&Session> {
        Ok(self.config.session.as_ref().ok_or(SessionError::SignedOut)?)
    }

    fn tz(&self) -> Tz {
        self.config.tz()
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

/// `--json` result for commands that only acknowledge an action.
#[derive(Debug, Serialize)]
struct Ack {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Ack {
    fn new(action: &'static str) -> Self {
        Self {
            action,
            id: None,
            role: None,
            message: None,
        }
    }

    fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Logs the full failure and keeps only the user-facing message.
fn toast(err: ApiError) -> anyhow::Error {
    error!(kind = ?err.kind(), error = %err, "request failed");
    anyhow::Error::msg(err.user_message())
}

fn session_err(err: SessionError) -> anyhow::Error {
    match err {
        SessionError::Api(err) => toast(err),
        other => other.into(),
    }
}

fn follow_err(err: FollowError) -> anyhow::Error {
    match err {
        FollowError::Api(err) => toast(err),
        other => other.into(),
    }
}

fn reject_invalid(issues: &[ValidationError]) -> anyhow::Result<()> {
    if issues.is_empty() {
        return Ok(());
    }
    let lines = issues
        .iter()
        .map(|issue| format!("  - {issue}"))
        .collect::<Vec<_>>()
        .join("\n");
    bail!("please fix the following:\n{lines}")
}

fn render_users(users: &[&UserProfile]) -> String {
    if users.is_empty() {
        return "Nobody found.".to_string();
    }
    users
        .iter()
        .map(|user| display::render_user_line(user))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_skills(skills: &[Skill]) -> String {
    if skills.is_empty() {
        return "No skills found.".to_string();
    }
    skills
        .iter()
        .map(display::render_skill_line)
        .collect::<Vec<_>>()
        .join("\n")
}

async fn list_events(ctx: &Ctx, client: &ApiClient, args: ListArgs) -> anyhow::Result<()> {
    let events = client.fetch_all_events().await.map_err(toast)?;
    let mut discovery = Discovery::new(events);
    let state = &mut discovery.state;
    state.set_search_type(args.search_type);
    state.set_term(args.search);
    for skill in &args.skills {
        state.toggle_skill(skill);
    }
    for org in &args.orgs {
        state.toggle_host(org);
    }
    state.set_sort(args.sort);
    for _ in 1..args.page.max(1) {
        state.load_more();
    }

    let view = discovery.view();
    ctx.emit(&view, || display::render_view(&view, ctx.tz()))
}

/// Fetches the event and checks the viewer may manage it.
async fn managed_event(ctx: &Ctx, client: &ApiClient, id: &str) -> anyhow::Result<Event> {
    let session = ctx.session()?;
    let event = client.get_event(id).await.map_err(toast)?;
    session.ensure_can_manage(&event)?;
    Ok(event)
}

async fn create_event(ctx: &Ctx, client: &ApiClient, file: &Path) -> anyhow::Result<()> {
    let session = ctx.session()?;
    session.require_host()?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let mut draft: NewEvent = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid event draft", file.display()))?;
    if draft.owner_id.is_none() {
        draft.owner_id = Some(session.user_id().to_string());
    }
    reject_invalid(&validation::validate_event(&draft))?;

    let event = client.create_event(&draft).await.map_err(toast)?;
    info!(id = %event.id, title = %event.display_title(), "event created");
    ctx.emit(&event, || {
        format!("Created {}", display::render_event_line(&event, ctx.tz()))
    })
}

async fn change_membership(
    ctx: &Ctx,
    client: &ApiClient,
    id: &str,
    membership: Membership,
    join: bool,
) -> anyhow::Result<()> {
    let session = ctx.session()?;
    let event = client
        .set_membership(id, membership, session.user_id(), join)
        .await
        .map_err(toast)?;
    let verb = match (membership, join) {
        (Membership::Registered, true) => "Registered for",
        (Membership::Registered, false) => "Unregistered from",
        (Membership::Bookmarked, true) => "Bookmarked",
        (Membership::Bookmarked, false) => "Removed bookmark for",
    };
    ctx.emit(&event, || {
        format!(
            "{verb} {} (going {}, saved {}).",
            event.display_title(),
            event.going_count(),
            event.bookmark_count()
        )
    })
}

async fn events_command(ctx: &Ctx, command: EventsCommand) -> anyhow::Result<()> {
    let client = ctx.client()?;
    match command {
        EventsCommand::List(args) => list_events(ctx, &client, args).await,
        EventsCommand::Show { id } => {
            let event = client.get_event(&id).await.map_err(toast)?;
            ctx.emit(&event, || display::render_event_detail(&event, ctx.tz()))
        }
        EventsCommand::Create { file } => create_event(ctx, &client, &file).await,
        EventsCommand::Delete { id } => {
            let event = managed_event(ctx, &client, &id).await?;
            client.delete_event(&event.id).await.map_err(toast)?;
            ctx.emit(&Ack::new("deleted").id(&event.id), || {
                format!("Deleted {}.", event.display_title())
            })
        }
        EventsCommand::Toggle { id } => {
            let event = managed_event(ctx, &client, &id).await?;
            let updated = client
                .set_event_active(&event.id, !event.is_active)
                .await
                .map_err(toast)?;
            ctx.emit(&updated, || {
                let state = if updated.is_active { "active" } else { "inactive" };
                format!("{} is now {state}.", updated.display_title())
            })
        }
        EventsCommand::Register { id } => {
            change_membership(ctx, &client, &id, Membership::Registered, true).await
        }
        EventsCommand::Unregister { id } => {
            change_membership(ctx, &client, &id, Membership::Registered, false).await
        }
        EventsCommand::Bookmark { id, remove } => {
            change_membership(ctx, &client, &id, Membership::Bookmarked, !remove).await
        }
        EventsCommand::Registrants { id, page, size } => {
            let event = managed_event(ctx, &client, &id).await?;
            let users = match page {
                Some(page) => client
                    .registered_participants(&event.id, page, size)
                    .await
                    .map(Listing::into_items),
                None => client.all_registered_participants(&event.id).await,
            }
            .map_err(toast)?;
            ctx.emit(&users, || render_users(&users.iter().collect::<Vec<_>>()))
        }
        EventsCommand::Mail { id, subject, body } => {
            let mail = MailRequest { subject, body };
            reject_invalid(&validation::validate_mail(&mail))?;
            let event = managed_event(ctx, &client, &id).await?;
            client.send_event_mail(&event.id, &mail).await.map_err(toast)?;
            ctx.emit(&Ack::new("mailed").id(&event.id), || {
                format!("Mail sent to everyone registered for {}.", event.display_title())
            })
        }
    }
}

#[derive(Serialize)]
struct HomeFeed<'a> {
    trending: Vec<&'a Event>,
    latest: Vec<&'a Event>,
}

async fn home(ctx: &Ctx, limit: usize) -> anyhow::Result<()> {
    let events = ctx.client()?.fetch_all_events().await.map_err(toast)?;
    let feed = HomeFeed {
        trending: discovery::top_trending(&events, limit),
        latest: discovery::latest(&events, limit),
    };
    let tz = ctx.tz();
    ctx.emit(&feed, || {
        let mut lines = vec!["Trending".to_string()];
        lines.extend(feed.trending.iter().map(|e| display::render_event_line(e, tz)));
        lines.push(String::new());
        lines.push("Latest".to_string());
        lines.extend(feed.latest.iter().map(|e| display::render_event_line(e, tz)));
        lines.join("\n")
    })
}

async fn upcoming(ctx: &Ctx) -> anyhow::Result<()> {
    let events = ctx.client()?.fetch_all_events().await.map_err(toast)?;
    let buckets = discovery::upcoming_buckets(&events, Utc::now());
    let tz = ctx.tz();
    ctx.emit(&buckets, || {
        BUCKET_KEYS
            .iter()
            .filter_map(|key| buckets.get(key).map(|items| display::render_bucket(key, items, tz)))
            .collect::<Vec<_>>()
            .join("\n\n")
    })
}

async fn dashboard(ctx: &Ctx) -> anyhow::Result<()> {
    let session = ctx.session()?;
    session.require_host()?;
    let events = ctx.client()?.fetch_all_events().await.map_err(toast)?;
    let stats = discovery::dashboard_stats(&events, session.user_id());
    ctx.emit(&stats, || display::render_stats(&stats))
}

async fn people(ctx: &Ctx, query: &str) -> anyhow::Result<()> {
    let directory = ctx.client()?.fetch_directory().await.map_err(toast)?;
    let viewer = ctx.config.session.as_ref();
    let matches = directory.search(query, viewer.map(|s| s.firebase_uid.as_str()));
    let following = viewer.map(|s| FollowState::from_profile(&s.user));

    ctx.emit(&matches, || {
        if matches.is_empty() {
            return "Nobody matches.".to_string();
        }
        matches
            .iter()
            .map(|user| {
                let mark = match &following {
                    Some(state) if state.is_following(&user.firebase_uid) => " [following]",
                    _ => "",
                };
                format!("{}{mark}", display::render_user_line(user))
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn change_follow(ctx: &Ctx, firebase_uid: &str, follow: bool) -> anyhow::Result<()> {
    let session = ctx.session()?;
    let client = ctx.client()?;

    // The stored profile may be stale; start from the backend's view.
    let viewer = client
        .fetch_profile(&session.firebase_uid)
        .await
        .map_err(toast)?;
    let target_profile = client
        .fetch_profile(firebase_uid.trim())
        .await
        .map_err(toast)?;
    let target = FollowTarget::from(&target_profile);
    let name = target_profile.display_name();

    let state = FollowState::from_profile(&viewer);
    let outcome = if follow {
        state.follow(&client, &target).await
    } else {
        state.unfollow(&client, &target).await
    }
    .map_err(follow_err)?;

    let (action, message) = match outcome {
        FollowOutcome::Followed => ("followed", format!("Now following {name}.")),
        FollowOutcome::Unfollowed => ("unfollowed", format!("Unfollowed {name}.")),
        FollowOutcome::Unchanged if follow => ("unchanged", format!("Already following {name}.")),
        FollowOutcome::Unchanged => ("unchanged", format!("You were not following {name}.")),
    };
    let ack = Ack::new(action).id(&target.firebase_uid).message(&message);
    ctx.emit(&ack, || {
        format!("{message} You follow {} accounts.", state.following_count())
    })
}

/// Reads queries from stdin and prints debounced skill suggestions.
async fn autocomplete(ctx: &Ctx, client: ApiClient) -> anyhow::Result<()> {
    let debouncer: Debouncer<Result<Vec<Skill>, String>> =
        Debouncer::from_millis(ctx.config.debounce_ms);
    let mut updates = debouncer.subscribe();

    let (tx, mut lines) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    eprintln!("Type part of a skill name and press enter. An empty line quits.");
    loop {
        tokio::select! {
            line = lines.recv() => {
                let query = line.map(|l| l.trim().to_string()).unwrap_or_default();
                if query.is_empty() {
                    break;
                }
                let client = client.clone();
                let seq = debouncer.schedule(query, move |query| async move {
                    client
                        .search_skills(&query, 0, 10)
                        .await
                        .map(Listing::into_items)
                        .map_err(|err| err.user_message())
                });
                debug!(seq, "skill lookup scheduled");
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let settled = updates.borrow_and_update().clone();
                let Some(settled) = settled else { continue };
                match settled.value {
                    Ok(skills) if skills.is_empty() => println!("{}: no matches", settled.input),
                    Ok(skills) => {
                        let names = skills.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
                        println!("{}: {}", settled.input, names.join(", "));
                    }
                    Err(message) => eprintln!("{}: {message}", settled.input),
                }
            }
        }
    }

    debouncer.cancel();
    Ok(())
}

async fn skills_command(ctx: &Ctx, command: SkillsCommand) -> anyhow::Result<()> {
    let client = ctx.client()?;
    match command {
        SkillsCommand::List => {
            let skills = client.list_skills().await.map_err(toast)?;
            ctx.emit(&skills, || render_skills(&skills))
        }
        SkillsCommand::Search { name, page, size } => {
            let skills = client
                .search_skills(&name, page, size)
                .await
                .map_err(toast)?
                .into_items();
            ctx.emit(&skills, || render_skills(&skills))
        }
        SkillsCommand::Create { name, description } => {
            ctx.session()?.require_role(&[UserRole::Admin])?;
            if name.trim().is_empty() {
                bail!("skill name is required");
            }
            let skill = client
                .create_skill(name.trim(), description.as_deref())
                .await
                .map_err(toast)?;
            ctx.emit(&skill, || format!("Created {}", display::render_skill_line(&skill)))
        }
        SkillsCommand::Delete { id } => {
            ctx.session()?.require_role(&[UserRole::Admin])?;
            client.delete_skill(&id).await.map_err(toast)?;
            ctx.emit(&Ack::new("deleted").id(&id), || format!("Deleted skill {id}."))
        }
        SkillsCommand::Autocomplete => autocomplete(ctx, client).await,
    }
}

async fn admin_command(ctx: &Ctx, command: AdminCommand) -> anyhow::Result<()> {
    ctx.session()?.require_role(&[UserRole::Admin])?;
    let client = ctx.client()?;
    match command {
        AdminCommand::Pending { role } => {
            let users = client.pending_verifications(role).await.map_err(toast)?;
            ctx.emit(&users, || render_users(&users.iter().collect::<Vec<_>>()))
        }
        AdminCommand::Approve { role, id } => {
            client.approve_user(role, &id).await.map_err(toast)?;
            ctx.emit(&Ack::new("approved").id(&id).role(role), || {
                format!("Approved {role} {id}.")
            })
        }
        AdminCommand::Reject { role, id } => {
            client.reject_user(role, &id).await.map_err(toast)?;
            ctx.emit(&Ack::new("rejected").id(&id).role(role), || {
                format!("Rejected {role} {id}.")
            })
        }
        AdminCommand::ToggleVerification { role, id } => {
            client.toggle_verification(role, &id).await.map_err(toast)?;
            ctx.emit(&Ack::new("verification-toggled").id(&id).role(role), || {
                format!("Toggled verification for {role} {id}.")
            })
        }
        AdminCommand::DeactivateExpired => {
            let message = client.deactivate_expired_events().await.map_err(toast)?;
            let text = if message.is_empty() {
                "Expired events deactivated.".to_string()
            } else {
                message
            };
            ctx.emit(&Ack::new("deactivated-expired").message(&text), || text.clone())
        }
    }
}

async fn login(
    ctx: &Ctx,
    firebase_uid: &str,
    token: Option<String>,
    role: UserRole,
) -> anyhow::Result<()> {
    let client = ApiClient::new(&ctx.config.api_base_url).context("invalid api base url")?;
    let session = session::login(&ctx.store, &client, firebase_uid, token, role)
        .await
        .map_err(session_err)?;
    let ack = Ack::new("signed-in")
        .id(&session.firebase_uid)
        .role(session.role);
    ctx.emit(&ack, || {
        format!(
            "Signed in as {} ({}).",
            session.user.display_name(),
            session.role
        )
    })
}

async fn signup(ctx: &Ctx, args: SignupArgs) -> anyhow::Result<()> {
    if args.role == UserRole::Admin {
        bail!("admin accounts cannot be created from here");
    }
    let issues: Vec<ValidationError> = [
        validation::validate_username(&args.username),
        validation::validate_email(&args.email),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();
    reject_invalid(&issues)?;

    let client = ctx.client()?;
    if !client.check_username(&args.username).await.map_err(toast)? {
        bail!("username {} is already taken", args.username);
    }
    let user = NewUser {
        firebase_uid: args.firebase_uid.trim().to_string(),
        username: args.username,
        email: args.email.trim().to_string(),
        name: args.name,
        role: args.role,
    };
    let profile = client.register_user(&user).await.map_err(toast)?;
    ctx.emit(&profile, || {
        format!("Created {}", display::render_user_line(&profile))
    })
}

#[derive(Serialize)]
struct UsernameCheck<'a> {
    username: &'a str,
    available: bool,
}

async fn check_username(ctx: &Ctx, username: &str) -> anyhow::Result<()> {
    validation::validate_username(username)?;
    let available = ctx
        .client()?
        .check_username(username)
        .await
        .map_err(toast)?;
    let check = UsernameCheck {
        username,
        available,
    };
    ctx.emit(&check, || {
        if available {
            format!("{username} is available.")
        } else {
            format!("{username} is taken.")
        }
    })
}

async fn upload(ctx: &Ctx, path: &Path, folder: Option<&str>) -> anyhow::Result<()> {
    let uploader = Uploader::from_config(&ctx.config)?;
    let asset = uploader.upload_file(path, folder).await?;
    ctx.emit(&asset, || asset.secure_url.clone())
}

fn config_command(ctx: &Ctx, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut shown = ctx.config.clone();
            if let Some(session) = shown.session.as_mut() {
                if session.id_token.is_some() {
                    session.id_token = Some("<redacted>".to_string());
                }
            }
            if !ctx.json {
                println!("# {}", ctx.store.path().display());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            Ok(())
        }
        ConfigCommand::Set {
            api_url,
            cloud_name,
            upload_preset,
            timezone,
            debounce_ms,
            log_level,
        } => {
            if let Some(url) = &api_url {
                ApiClient::new(url).with_context(|| format!("{url} is not a usable base url"))?;
            }
            if let Some(tz) = &timezone {
                if tz.parse::<Tz>().is_err() {
                    bail!("unknown timezone {tz}");
                }
            }
            ctx.store.update(|config| {
                if let Some(url) = api_url {
                    config.api_base_url = url;
                }
                if let Some(cloud) = cloud_name {
                    config.cloudinary_cloud_name = Some(cloud);
                }
                if let Some(preset) = upload_preset {
                    config.cloudinary_upload_preset = Some(preset);
                }
                if let Some(tz) = timezone {
                    config.timezone = tz;
                }
                if let Some(ms) = debounce_ms {
                    config.debounce_ms = ms;
                }
                if let Some(level) = log_level {
                    config.log_level = level;
                }
            })?;
            let path = ctx.store.path().display().to_string();
            ctx.emit(&Ack::new("saved").message(&path), || format!("Saved {path}."))
        }
    }
}

async fn dispatch(ctx: &Ctx, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Events(command) => events_command(ctx, command).await,
        Command::Home { limit } => home(ctx, limit).await,
        Command::Upcoming => upcoming(ctx).await,
        Command::Dashboard => dashboard(ctx).await,
        Command::People { query } => people(ctx, &query).await,
        Command::Follow { firebase_uid } => change_follow(ctx, &firebase_uid, true).await,
        Command::Unfollow { firebase_uid } => change_follow(ctx, &firebase_uid, false).await,
        Command::Skills(command) => skills_command(ctx, command).await,
        Command::Admin(command) => admin_command(ctx, command).await,
        Command::Login {
            firebase_uid,
            token,
            role,
        } => login(ctx, &firebase_uid, token, role).await,
        Command::Logout => {
            session::logout(&ctx.store).map_err(session_err)?;
            ctx.emit(&Ack::new("signed-out"), || "Signed out.".to_string())
        }
        Command::Whoami => {
            let session = ctx.session()?;
            ctx.emit(session, || {
                format!(
                    "{}\nrole: {}",
                    display::render_user_line(&session.user),
                    session.role
                )
            })
        }
        Command::Signup(args) => signup(ctx, args).await,
        Command::CheckUsername { username } => check_username(ctx, &username).await,
        Command::Upload { path, folder } => upload(ctx, &path, folder.as_deref()).await,
        Command::Config(command) => config_command(ctx, command),
    }
}

/// `RUST_LOG` wins; otherwise the configured level applies. Logs go to stderr.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_LEVEL));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let store = ConfigStore::load();
    let mut config = store.read();
    init_tracing(&config.log_level);
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }

    let ctx = Ctx {
        store,
        config,
        json: cli.json,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(dispatch(&ctx, cli.command))
}
