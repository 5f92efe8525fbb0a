//! `rental` - command-line client for the rental API
//!
//! The login session is kept in the file token store, so `rental login`
//! followed by `rental get /bookings/customer` in a later process reuses the
//! same credentials and renews them when the server reports them expired.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use rental_auth_core::{
    AdminRegistrationRequest, Admission, ApiRequest, AuthConfig, FileTokenStore, HttpAuthApi,
    LoginRequest, RegistrationRequest, RequestAuthorizer, Role, RouteGuard, RouteTable,
    SessionManager,
};
use rental_infra_common::{log_welcome, parse_log_level, setup_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "rental", author, version, about = "Rental API client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file; RENTAL_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON, overriding `logging_json`
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "RENTAL_PASSWORD", hide_env_values = true)]
        password: String,

        /// CUSTOMER or ADMIN
        #[arg(short, long, default_value = "CUSTOMER")]
        role: Role,

        /// Required by the server for admin logins
        #[arg(long)]
        employee_id: Option<String>,
    },

    /// Drop the session and its stored credentials
    Logout,

    /// Show the current session
    Whoami,

    /// Register a customer account
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "RENTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register another admin (requires an admin session)
    RegisterAdmin {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "RENTAL_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        employee_id: String,
    },

    /// Change the password of the signed-in user
    ChangePassword {
        #[arg(long)]
        old: String,

        #[arg(long)]
        new: String,
    },

    /// Authorized GET against the API, printing the response body
    Get {
        /// API path, e.g. /bookings/customer
        path: String,

        /// Query parameters as key=value
        #[arg(short, long = "query")]
        query: Vec<String>,
    },

    /// Check whether the session may open a client route
    Open {
        /// Route, e.g. /admin-dashboard
        route: String,
    },

    /// Renew the session credentials now
    Renew,
}

impl Commands {
    /// Whether the stored session must be restored first. Logout and
    /// customer registration skip it, so an expired stored token is not
    /// renewed right before being cleared or ignored.
    fn needs_session(&self) -> bool {
        !matches!(self, Commands::Logout | Commands::Register { .. })
    }
}

struct Client {
    sessions: SessionManager,
    authorizer: RequestAuthorizer,
    guard: RouteGuard,
}

impl Client {
    async fn connect(config: &AuthConfig, restore: bool) -> anyhow::Result<Self> {
        let base_url = config.base_url()?;
        let api = HttpAuthApi::new(base_url.clone(), config.request_timeout())?;
        let store = FileTokenStore::new(&config.token_store_path);
        debug!("Token store at {}", store.path().display());

        let sessions = SessionManager::new(Arc::new(store), Arc::new(api));
        if restore {
            sessions.initialize().await?;
        }

        let authorizer =
            RequestAuthorizer::new(sessions.clone(), base_url, config.request_timeout())?;
        let guard = RouteGuard::new(config.login_route.clone()).with_routes(RouteTable::standard());

        Ok(Self {
            sessions,
            authorizer,
            guard,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AuthConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let level = if cli.verbose {
        parse_log_level("debug")?
    } else {
        parse_log_level(&config.logging_level)?
    };
    setup_logging(
        LoggingConfig::new(level, "rental")
            .with_json(cli.log_json || config.logging_json)
            .with_file_info(config.logging_file_info),
    )?;
    log_welcome("rental", env!("CARGO_PKG_VERSION"));

    let client = Client::connect(&config, cli.command.needs_session()).await?;
    run(cli.command, &client).await
}

async fn run(command: Commands, client: &Client) -> anyhow::Result<()> {
    match command {
        Commands::Login {
            email,
            password,
            role,
            employee_id,
        } => {
            if role == Role::Admin && employee_id.is_none() {
                bail!("--employee-id is required for admin logins");
            }
            let session = client
                .sessions
                .login_with_password(&LoginRequest {
                    email,
                    password,
                    role,
                    employee_id,
                })
                .await?;
            match session.user {
                Some(user) => println!(
                    "Signed in as {} ({}); home: {}",
                    user.email,
                    user.role,
                    user.role.home_route()
                ),
                None => bail!("login did not produce a session"),
            }
        }

        Commands::Logout => {
            client.sessions.logout().await?;
            println!("Signed out");
        }

        Commands::Whoami => {
            let session = client.sessions.session();
            println!("{}", serde_json::to_string_pretty(&session)?);
        }

        Commands::Register {
            username,
            email,
            password,
        } => {
            let message = client
                .sessions
                .register(&RegistrationRequest::customer(username, email, password))
                .await?;
            println!("{}", message);
        }

        Commands::RegisterAdmin {
            email,
            password,
            employee_id,
        } => {
            let message = client
                .authorizer
                .register_admin(&AdminRegistrationRequest::new(email, password, employee_id))
                .await?;
            println!("{}", message);
        }

        Commands::ChangePassword { old, new } => {
            let message = client.authorizer.change_credential_secret(&old, &new).await?;
            println!("{}", message);
            if let Some(role) = client.sessions.session().role() {
                println!("home: {}", role.home_route());
            }
        }

        Commands::Get { path, query } => {
            let mut request = ApiRequest::get(path);
            for pair in query {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("query parameter '{}' is not key=value", pair);
                };
                request = request.query(key, value);
            }

            let response = client.authorizer.send(&request).await?;
            match response.json::<serde_json::Value>() {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(_) => println!("{}", response.text()),
            }
        }

        Commands::Open { route } => match client.guard.check_path(&route, &client.sessions.session()) {
            Admission::Admit => println!("admit {}", route),
            Admission::RedirectTo(target) => println!("redirect {} -> {}", route, target),
            Admission::Pending => println!("pending"),
        },

        Commands::Renew => {
            client.authorizer.renew().await?;
            let session = client.sessions.session();
            match session.role() {
                Some(role) => println!("Credentials renewed ({})", role),
                None => println!("Credentials renewed"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rental").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_session_free_commands_skip_restore() {
        assert!(!parse(&["logout"]).command.needs_session());
        assert!(!parse(&["register", "-u", "n", "-e", "n@rental.test", "-p", "pw"])
            .command
            .needs_session());

        assert!(parse(&["whoami"]).command.needs_session());
        assert!(parse(&["open", "/admin-dashboard"]).command.needs_session());
        assert!(parse(&["get", "/variants", "-q", "page=2"]).command.needs_session());
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&["whoami", "--log-json", "-v"]);
        assert!(cli.log_json);
        assert!(cli.verbose);

        let cli = parse(&[
            "login", "-e", "a@rental.test", "-p", "pw", "-r", "admin", "--employee-id", "E1",
        ]);
        assert!(matches!(cli.command, Commands::Login { role: Role::Admin, .. }));
    }
}
