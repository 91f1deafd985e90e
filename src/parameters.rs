use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Args, Error, Subcommand};
use url::Url;

use crate::session::Registration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default API root of a local Agri-Trek backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/";
/// Environment variable overriding the API root.
pub const BASE_URL_ENV_NAME: &str = "AGRITREK_API_URL";

const SESSION_DIR: &str = ".agritrek";
const SESSION_FILE: &str = "session.json";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with email and password, persisting the session locally.
    Login {
        /// Account email address
        #[arg(long, short, required = true)]
        email: String,

        /// Account password
        #[arg(long, short, required = true)]
        password: String,
    },
    /// Register a new account. Does not log in.
    Register(RegisterArgs),
    /// Print the identity behind the current session.
    Whoami {
        /// Resolve the identity against the server instead of the local copy
        #[arg(long)]
        remote: bool,
    },
    /// Drop the persisted session.
    Logout,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Email address for the new account
    #[arg(long, required = true)]
    pub email: String,

    /// Unique username
    #[arg(long, required = true)]
    pub username: String,

    /// Password (entered twice server-side via password2)
    #[arg(long, required = true)]
    pub password: String,

    /// Optional phone number
    #[arg(long)]
    pub phone_number: Option<String>,

    /// Optional postal address
    #[arg(long)]
    pub address: Option<String>,

    /// Register the account as a farmer
    #[arg(long, default_value_t = false)]
    pub is_farmer: bool,
}

impl From<RegisterArgs> for Registration {
    fn from(args: RegisterArgs) -> Self {
        Registration {
            email: args.email,
            username: args.username,
            password2: args.password.clone(),
            password: args.password,
            phone_number: args.phone_number,
            address: args.address,
            is_farmer: args.is_farmer,
        }
    }
}

/// Resolves the API root: CLI flag, then the environment, then the local
/// default. A missing trailing slash is added so relative joins behave.
pub fn resolve_base_url(cli_value: Option<String>) -> Result<Url, Error> {
    let raw = cli_value
        .or_else(|| env::var(BASE_URL_ENV_NAME).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let raw = if raw.ends_with('/') {
        raw
    } else {
        format!("{raw}/")
    };

    Url::parse(&raw).map_err(|e| Error::raw(ErrorKind::Format, format!("invalid API URL: {e}")))
}

/// Resolves the session file path: CLI flag, then `~/.agritrek/session.json`,
/// falling back to the working directory when no home is known.
pub fn resolve_session_path(cli_value: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }
    match env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(SESSION_DIR).join(SESSION_FILE),
        _ => PathBuf::from(SESSION_FILE),
    }
}
