use keybridge_core::registry::HostProvider;

use super::App;

pub(crate) async fn run(app: &App) -> eyre::Result<()> {
    let ctx = app.read_request()?;
    let registry = app.registry_for(&ctx.settings)?;

    let provider = registry.resolve(&ctx)?;
    provider
        .erase_credential(&ctx, app.credential_store())
        .await?;
    Ok(())
}
