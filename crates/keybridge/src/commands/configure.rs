use keybridge_core::registry::HostProvider;

use super::App;

/// Run every provider's configure (or unconfigure) hook. No request block
/// is read: configuration is not scoped to a single remote.
pub(crate) async fn run(app: &App, install: bool) -> eyre::Result<()> {
    let registry = app.registry_for(&app.base_settings())?;

    for provider in registry.providers() {
        if install {
            tracing::debug!(provider = provider.id(), "running configure hook");
            provider.configure(app.git()).await?;
        } else {
            tracing::debug!(provider = provider.id(), "running unconfigure hook");
            provider.unconfigure(app.git()).await?;
        }
    }
    Ok(())
}
