use keybridge_core::input::write_pairs;
use keybridge_core::registry::HostProvider;

use super::App;

pub(crate) async fn run(app: &App) -> eyre::Result<()> {
    let ctx = app.read_request()?;
    let registry = app.registry_for(&ctx.settings)?;

    let provider = registry.resolve(&ctx)?;
    tracing::debug!(provider = provider.id(), "resolved host provider");

    let credential = provider
        .get_credential(&ctx, app.credential_store())
        .await?;

    write_pairs(
        std::io::stdout().lock(),
        &[
            ("username", credential.username.as_str()),
            ("password", credential.password.as_str()),
        ],
    )?;
    Ok(())
}
