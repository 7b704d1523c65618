use async_trait::async_trait;
use inquire::{Password, Text};
use jex_store::ExchangeError;
use jex_store::registry::{CredentialProvider, Credentials};
use url::Url;

/// Asks for exchange credentials on the terminal
pub struct InquireCredentials;

#[async_trait]
impl CredentialProvider for InquireCredentials {
    async fn credentials(&self, exchange_url: &Url) -> jex_store::Result<Credentials> {
        let url = exchange_url.to_string();
        tokio::task::spawn_blocking(move || prompt(&url))
            .await
            .map_err(|e| ExchangeError::Prompt(e.to_string()))?
    }
}

fn prompt(exchange_url: &str) -> jex_store::Result<Credentials> {
    println!("🔐 {} requires you to log in", exchange_url);

    let username = Text::new("Username:")
        .prompt()
        .map_err(|e| ExchangeError::Prompt(e.to_string()))?;
    let password = Password::new("Password:")
        .without_confirmation()
        .prompt()
        .map_err(|e| ExchangeError::Prompt(e.to_string()))?;

    Ok(Credentials::new(username.trim(), password))
}
