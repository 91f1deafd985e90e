use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agritrek_auth::commands::login::LoginCommand;
use agritrek_auth::commands::logout::LogoutCommand;
use agritrek_auth::commands::register::RegisterCommand;
use agritrek_auth::commands::whoami::WhoamiCommand;
use agritrek_auth::http::client::HttpClient;
use agritrek_auth::parameters::{Commands, resolve_base_url, resolve_session_path};
use agritrek_auth::session::SessionManager;
use agritrek_auth::store::FileCredentialStore;

#[derive(Parser, Debug)]
#[command(name = "agritrek-auth-cli")]
struct Cli {
    /// API root, e.g. https://agritrek.example.com/api
    /// (overrides AGRITREK_API_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Path of the persisted session file
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let base_url = resolve_base_url(cli.base_url)?;
    let store = Arc::new(FileCredentialStore::new(resolve_session_path(
        cli.session_file,
    )));
    let http_client =
        Arc::new(HttpClient::new().map_err(|e| format!("error creating http client: {e}"))?);
    let session = SessionManager::new(http_client, base_url, store)?;

    match cli.command {
        Commands::Login { email, password } => {
            let user = LoginCommand::new(session).run(&email, &password)?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Commands::Register(args) => {
            let user = RegisterCommand::new(session).run(args.into())?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Commands::Whoami { remote } => {
            let user = WhoamiCommand::new(session).run(remote)?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Commands::Logout => {
            LogoutCommand::new(session).run();
            Ok(())
        }
    }
}
