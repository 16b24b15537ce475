//! Persisted client-side state: session token and theme.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tether_core::config::TetherConfig;
use tether_gateway::auth::{CredentialStore, JsonFileStore, Theme};
use tracing::info;

/// Arguments for the login command
#[derive(Parser)]
pub struct LoginArgs {
    /// Session token issued by the backend
    #[arg(long, env = "TETHER_TOKEN")]
    pub token: String,
}

/// Arguments for the theme command
#[derive(Parser)]
pub struct ThemeArgs {
    /// New theme (dark, light); prints the current one when omitted
    pub theme: Option<String>,
}

/// Opens the credential store configured in `backend.credentials_path`.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read.
pub fn open_credentials(config: &TetherConfig) -> Result<CredentialStore> {
    let path = &config.backend.credentials_path;
    let store = JsonFileStore::open(path.as_str())
        .with_context(|| format!("Failed to open credential store {path}"))?;
    Ok(CredentialStore::new(store))
}

/// Stores the session token.
///
/// # Errors
///
/// Returns error if the token is empty or cannot be written.
pub fn login(config: &TetherConfig, args: &LoginArgs) -> Result<()> {
    let token = args.token.trim();
    if token.is_empty() {
        return Err(anyhow!("Token must not be empty"));
    }
    open_credentials(config)?
        .set_token(token)
        .context("Failed to store session token")?;
    info!(path = %config.backend.credentials_path, "Session token stored");
    println!("Logged in");
    Ok(())
}

/// Removes the session token.
///
/// # Errors
///
/// Returns error if the store cannot be written.
pub fn logout(config: &TetherConfig) -> Result<()> {
    open_credentials(config)?
        .clear_token()
        .context("Failed to remove session token")?;
    println!("Logged out");
    Ok(())
}

/// Prints or sets the theme preference.
///
/// # Errors
///
/// Returns error if the theme is unknown or cannot be written.
pub fn theme(config: &TetherConfig, args: &ThemeArgs) -> Result<()> {
    let credentials = open_credentials(config)?;
    match &args.theme {
        Some(value) => {
            let theme: Theme = value.parse().map_err(|e: String| anyhow!(e))?;
            credentials
                .set_theme(theme)
                .context("Failed to store theme")?;
            println!("Theme set to {}", theme.as_str());
        }
        None => println!("{}", credentials.theme().as_str()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> TetherConfig {
        let mut config = TetherConfig::default();
        config.backend.credentials_path = dir
            .path()
            .join("credentials.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    #[test]
    fn test_login_then_logout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        login(
            &config,
            &LoginArgs {
                token: " abc123 ".to_string(),
            },
        )
        .unwrap();
        assert_eq!(
            open_credentials(&config).unwrap().token().as_deref(),
            Some("abc123")
        );

        logout(&config).unwrap();
        assert!(open_credentials(&config).unwrap().token().is_none());
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let args = LoginArgs {
            token: "  ".to_string(),
        };
        assert!(login(&config, &args).is_err());
    }

    #[test]
    fn test_theme_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        theme(
            &config,
            &ThemeArgs {
                theme: Some("light".to_string()),
            },
        )
        .unwrap();
        assert_eq!(open_credentials(&config).unwrap().theme(), Theme::Light);

        let unknown = ThemeArgs {
            theme: Some("sepia".to_string()),
        };
        assert!(theme(&config, &unknown).is_err());
    }
}
