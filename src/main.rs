use std::sync::Arc;
use uplink::{Config, HttpTransport, ImageSlot, ImageSource, SlotConfig, SlotEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uplink=info".into()),
        )
        .init();

    let config = Config::load("config.toml")?;
    let transport = Arc::new(HttpTransport::new(&config.client)?);

    let slot = ImageSlot::new(
        SlotConfig {
            image_type: config.image_type.clone(),
            target_user_id: config.target_user_id.clone(),
            ..SlotConfig::default()
        },
        transport,
    );

    let mut events = slot.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SlotEvent::Progress { percent, .. } => tracing::info!("uploading: {percent}%"),
                SlotEvent::StateChanged { old, new, .. } => {
                    tracing::info!("state: {old:?} -> {new:?}")
                }
                SlotEvent::Completed { url, .. } => tracing::info!("stored at {url}"),
                SlotEvent::Failed { reason, .. } => tracing::error!("failed: {reason}"),
                _ => {}
            }
        }
    });

    let source = ImageSource::from_path(&config.file_path).await?;
    slot.select(source).await;
    slot.wait().await;
    printer.abort();

    match slot.error() {
        Some(reason) => anyhow::bail!(reason),
        None => Ok(()),
    }
}
