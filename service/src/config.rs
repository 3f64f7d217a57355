use clap::builder::TypedValueParser as _;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

/// Directory under the user's config dir holding the credentials file.
const APP_DIR: &str = "sso-login";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Log in to a service through its single sign-on provider and store the token.
    Login {
        /// Hostname or URL of the service, e.g. app.example.io
        service: String,
    },
    /// Remove the stored token for a service.
    Logout {
        /// Hostname or URL of the service, e.g. app.example.io
        service: String,
    },
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        global = true,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Seconds to wait for the browser to complete the login before giving up
    #[arg(long, env, global = true, default_value_t = 300)]
    pub login_timeout_secs: u64,

    /// First loopback port tried for the OAuth callback listener
    #[arg(long, env, global = true, default_value_t = 21000)]
    pub callback_port_min: u16,

    /// Last loopback port tried for the OAuth callback listener
    #[arg(long, env, global = true, default_value_t = 21199)]
    pub callback_port_max: u16,

    /// Timeout in seconds for each discovery and token request
    #[arg(long, env, global = true, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Print the login URL without trying to open a web browser
    #[arg(long, env, global = true)]
    pub no_browser: bool,

    /// Path of the JSON file tokens are stored in.
    /// Defaults to `sso-login/credentials.json` under the user's config directory.
    #[arg(long, env, global = true)]
    credentials_file: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn set_credentials_file(mut self, path: PathBuf) -> Self {
        self.credentials_file = Some(path);
        self
    }

    /// Returns the credentials file path, falling back to the per-user default.
    pub fn credentials_file(&self) -> PathBuf {
        self.credentials_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .or_else(dirs::home_dir)
                .map(|dir| dir.join(APP_DIR).join(CREDENTIALS_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(CREDENTIALS_FILE_NAME))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_command_with_defaults() {
        let config = Config::try_parse_from(["sso-login", "login", "app.example.io"]).unwrap();

        assert_eq!(
            config.command,
            Command::Login {
                service: "app.example.io".to_string()
            }
        );
        assert_eq!(config.login_timeout(), Duration::from_secs(300));
        assert_eq!(config.callback_port_min, 21000);
        assert_eq!(config.callback_port_max, 21199);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(!config.no_browser);
    }

    #[test]
    fn test_flags_after_subcommand() {
        let config = Config::try_parse_from([
            "sso-login",
            "logout",
            "app.example.io",
            "--log-level-filter",
            "DEBUG",
            "--no-browser",
            "--credentials-file",
            "/tmp/creds.json",
        ])
        .unwrap();

        assert_eq!(
            config.command,
            Command::Logout {
                service: "app.example.io".to_string()
            }
        );
        assert_eq!(config.log_level_filter, LevelFilter::Debug);
        assert!(config.no_browser);
        assert_eq!(config.credentials_file(), PathBuf::from("/tmp/creds.json"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let result = Config::try_parse_from([
            "sso-login",
            "login",
            "app.example.io",
            "--log-level-filter",
            "LOUD",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_requires_a_command() {
        assert!(Config::try_parse_from(["sso-login"]).is_err());
    }

    #[test]
    fn test_default_credentials_file_name() {
        let config = Config::try_parse_from(["sso-login", "login", "app.example.io"]).unwrap();
        assert!(config.credentials_file().ends_with(CREDENTIALS_FILE_NAME));

        let config = config.set_credentials_file(PathBuf::from("elsewhere.json"));
        assert_eq!(config.credentials_file(), PathBuf::from("elsewhere.json"));
    }
}
