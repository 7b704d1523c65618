use eyre::Result;
use jex_store::ComponentManager;

pub async fn handle_login_command(manager: &ComponentManager) -> Result<()> {
    let token = manager.login().await?;
    println!(
        "✅ Logged in to {} (token valid until {})",
        manager.client().base_url(),
        token.expires_at.format("%Y-%m-%d %H:%M UTC")
    );
    Ok(())
}

pub async fn handle_logout_command(manager: &ComponentManager) -> Result<()> {
    if manager.logout().await? {
        println!("✅ Logged out of {}", manager.client().base_url());
    } else {
        println!("💡 No stored token for {}", manager.client().base_url());
    }
    Ok(())
}
