use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "attendance")]
#[command(about = "Attendance app access gate", long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Print the identity provider's sign-in URL
    LoginUrl,

    /// Finish sign-in with the code from the callback URL
    Callback {
        /// Authorization code (the `code` query parameter)
        #[arg(long)]
        code: String,
    },

    /// Show the signed-in subject
    Whoami,

    /// Refresh the access and identity tokens
    Refresh,

    /// Sign out and print the provider logout URL
    Logout,

    /// Register this device's biometric credential
    Enroll {
        /// Display name shown by the authenticator
        #[arg(long, default_value = "Admin User")]
        label: String,
    },

    /// Remove this device's biometric credential
    Unenroll,

    /// Show session, enrollment and protected-area state
    Status,

    /// Run the route guard for a path, stepping up if needed
    Open {
        /// App path, e.g. /dashboard
        path: String,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// Directory holding the persistent store and authenticator key
    #[arg(long, env = "ATTENDANCE_STATE_DIR", default_value = ".attendance")]
    pub state_dir: PathBuf,

    /// Identity provider hosted domain (e.g. https://auth.example.com)
    #[arg(long, env = "COGNITO_DOMAIN")]
    pub idp_domain: Option<String>,

    /// OAuth client id registered with the identity provider
    #[arg(long, env = "COGNITO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Redirect URI registered for the authorization-code callback
    #[arg(
        long,
        env = "REDIRECT_SIGNIN",
        default_value = "http://localhost:3000/callback"
    )]
    pub redirect_uri: String,

    /// Where the provider sends the browser after logout
    #[arg(
        long,
        env = "REDIRECT_SIGNOUT",
        default_value = "http://localhost:3000/login"
    )]
    pub logout_uri: String,

    /// OAuth scopes (space-separated)
    #[arg(long, env = "OAUTH_SCOPES", default_value = "email openid profile")]
    pub scopes: String,

    /// WebAuthn relying party id
    #[arg(long, env = "RP_ID", default_value = "localhost")]
    pub rp_id: String,

    /// WebAuthn relying party display name
    #[arg(long, env = "RP_NAME", default_value = "Attendance App")]
    pub rp_name: String,

    /// Approve authenticator prompts without asking (non-interactive use)
    #[arg(long, env = "ATTENDANCE_ASSUME_PRESENT", default_value_t = false)]
    pub assume_present: bool,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Settings {
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .split(|c: char| c == ' ' || c == ',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("local_storage.json")
    }

    pub fn authenticator_path(&self) -> PathBuf {
        self.state_dir.join("authenticator.json")
    }
}
