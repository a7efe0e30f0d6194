use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod storage;
mod ui;

use crate::audio::player::{ConnectPolicy, PlaybackQueue};
use crate::audio::voice::SongbirdBackend;
use crate::bot::{SoundHub, SoundHubBot};
use crate::config::Config;
use crate::storage::CatalogStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("soundhub=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🔊 Iniciando SoundHub v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Catálogo de audios
    let catalog = Arc::new(CatalogStore::new(config.catalog_file.clone()));
    catalog.init().await?;
    info!("📚 Catálogo cargado: {} audios", catalog.get_all().await.len());

    // Voz y cola de reproducción
    let songbird = Songbird::serenity();
    let voice = Arc::new(SongbirdBackend::new(songbird.clone(), config.default_volume));
    let (queue, completions) = PlaybackQueue::new(catalog.clone(), voice, ConnectPolicy::from_config(&config));

    let hub = Arc::new(SoundHub::new(config.clone(), catalog, Arc::new(queue)));
    let handler = SoundHubBot::new(hub, completions);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("No se pudo escuchar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg no disponible en {}", config.ffmpeg_path);
    }
}
