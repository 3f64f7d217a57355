use log::*;
use service::{
    config::{Command, Config},
    logging::Logger,
};
use sso_auth::credentials::{credential_key, FileStorage, Storage};
use sso_auth::http::HttpClientConfig;
use sso_auth::oauth::{normalize_service_url, Login, LoginConfig, NoBrowser, PortRange};
use sso_auth::ui::Ui;
use sso_auth::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prints login prompts to stdout.
struct TerminalUi;

impl Ui for TerminalUi {
    fn output(&self, message: &str) {
        println!("{message}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::new();
    Logger::init_logger(&config);

    let storage = FileStorage::new(config.credentials_file());
    debug!("Using credentials file {}", storage.path().display());

    let result = match &config.command {
        Command::Login { service } => login(&config, &storage, service).await,
        Command::Logout { service } => logout(&storage, service).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn login(config: &Config, storage: &FileStorage, service: &str) -> Result<(), Error> {
    let service_url = normalize_service_url(service)?;
    let key = credential_key(&service_url);

    let login_config = LoginConfig {
        timeout: config.login_timeout(),
        ports: PortRange::new(config.callback_port_min, config.callback_port_max),
        http: HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: format!("sso-login/{}", env!("CARGO_PKG_VERSION")),
        },
    };

    let mut login = Login::new(login_config)?.with_ui(Arc::new(TerminalUi));
    if config.no_browser {
        login = login.with_browser(Arc::new(NoBrowser));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling login");
            on_interrupt.cancel();
        }
    });

    let token = login
        .run_until_cancelled(service_url.as_str(), cancel)
        .await?;
    storage.store(&key, &token).await?;

    println!(
        "Success! Logged in to {key}. The token is stored in {}.",
        storage.path().display()
    );
    Ok(())
}

async fn logout(storage: &FileStorage, service: &str) -> Result<(), Error> {
    let key = credential_key(&normalize_service_url(service)?);

    if storage.delete(&key).await? {
        println!("Removed the stored token for {key}.");
    } else {
        println!("No token is stored for {key}.");
    }
    Ok(())
}
