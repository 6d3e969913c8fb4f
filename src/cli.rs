use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::discovery::{SearchType, SortMode};
use crate::models::UserRole;

#[derive(Parser, Debug)]
#[command(name = "event-lagbe")]
#[command(version, about = "Browse, host and join Event Lagbe events")]
pub struct Cli {
    /// Backend base url for this run only
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Browse and manage events
    #[command(subcommand)]
    Events(EventsCommand),
    /// Trending and latest events
    Home {
        #[arg(long, default_value_t = 6)]
        limit: usize,
    },
    /// Active events grouped by how soon they start
    Upcoming,
    /// Totals for the events you host
    Dashboard,
    /// Search participants, organizers and organizations
    People {
        #[arg(default_value = "")]
        query: String,
    },
    /// Follow someone by firebase uid
    Follow {
        firebase_uid: String,
    },
    /// Unfollow someone by firebase uid
    Unfollow {
        firebase_uid: String,
    },
    /// Skill taxonomy
    #[command(subcommand)]
    Skills(SkillsCommand),
    /// Verification and moderation
    #[command(subcommand)]
    Admin(AdminCommand),
    /// Sign in with an identity-provider uid and token
    Login {
        firebase_uid: String,
        #[arg(long)]
        token: Option<String>,
        /// Role to assume when the profile does not carry one
        #[arg(long, default_value = "participant")]
        role: UserRole,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Create an account for an identity-provider uid
    Signup(SignupArgs),
    /// Check whether a username is free
    CheckUsername {
        username: String,
    },
    /// Upload a picture or document to Cloudinary
    Upload {
        path: PathBuf,
        #[arg(long)]
        folder: Option<String>,
    },
    /// Show or change stored settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Title substring (used when --search-type is name)
    #[arg(long, default_value = "")]
    pub search: String,
    /// name, skill or orgs
    #[arg(long, default_value = "name")]
    pub search_type: SearchType,
    /// Skill name to filter by; repeatable
    #[arg(long = "skill")]
    pub skills: Vec<String>,
    /// Organizer/organization id to filter by; repeatable
    #[arg(long = "org")]
    pub orgs: Vec<String>,
    /// latest or trending
    #[arg(long, default_value = "latest")]
    pub sort: SortMode,
    /// How many pages of six to show
    #[arg(long, default_value_t = 1)]
    pub page: usize,
}

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    List(ListArgs),
    Show {
        id: String,
    },
    /// Create an event from a JSON draft file
    Create {
        file: PathBuf,
    },
    Delete {
        id: String,
    },
    /// Flip an event between active and inactive
    Toggle {
        id: String,
    },
    Register {
        id: String,
    },
    Unregister {
        id: String,
    },
    Bookmark {
        id: String,
        #[arg(long)]
        remove: bool,
    },
    /// List registered participants (all pages unless --page is given)
    Registrants {
        id: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Email everyone registered for the event
    Mail {
        id: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SkillsCommand {
    List,
    Search {
        name: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
    /// Interactive debounced search, one query per line
    Autocomplete,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Accounts waiting for verification
    Pending { role: UserRole },
    Approve { role: UserRole, id: String },
    Reject { role: UserRole, id: String },
    ToggleVerification { role: UserRole, id: String },
    /// Run the expired-event deactivation job now
    DeactivateExpired,
}

#[derive(Args, Debug)]
pub struct SignupArgs {
    pub firebase_uid: String,
    pub username: String,
    pub email: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, default_value = "participant")]
    pub role: UserRole,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Set {
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        cloud_name: Option<String>,
        #[arg(long)]
        upload_preset: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        debounce_ms: Option<u64>,
        #[arg(long)]
        log_level: Option<String>,
    },
}
