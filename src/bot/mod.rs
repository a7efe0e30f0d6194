//! # Bot Module
//!
//! Discord surface of SoundHub.
//!
//! This module contains:
//! - [`SoundHub`]: the shared services (catalog, playback queue, editor)
//! - [`SoundHubBot`]: Serenity's [`EventHandler`] that routes messages,
//!   button clicks and reactions into [`handlers`]
//! - The completion task that advances the queues and announces what plays
//!
//! ## Flow
//!
//! Every entry point builds a [`trigger::Trigger`] and a
//! [`commands::Command`], then calls [`handlers::dispatch`]. Handlers never
//! talk to Serenity directly, so they can be exercised with a mocked trigger.

use dashmap::DashMap;
use serenity::{
    all::{ComponentInteraction, Context, EventHandler, Interaction, Message, Reaction, Ready, VoiceState},
    async_trait,
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod trigger;

use crate::{
    audio::{
        editor::AudioEditor,
        player::{Advance, PlaybackQueue},
        voice::CompletionEvent,
    },
    config::Config,
    storage::CatalogStore,
    ui::{buttons, embeds},
};
use trigger::{ComponentTrigger, MessageTrigger, ReactionTrigger, Trigger};

/// Servicios compartidos por todos los handlers
pub struct SoundHub {
    pub config: Arc<Config>,
    pub catalog: Arc<CatalogStore>,
    pub queue: Arc<PlaybackQueue>,
    pub editor: AudioEditor,
    /// Canal de texto donde anunciar lo que empieza a sonar en cada guild
    announce_channels: DashMap<GuildId, ChannelId>,
}

impl SoundHub {
    pub fn new(config: Arc<Config>, catalog: Arc<CatalogStore>, queue: Arc<PlaybackQueue>) -> Self {
        let editor = AudioEditor::new(config.ffmpeg_path.clone());
        Self {
            config,
            catalog,
            queue,
            editor,
            announce_channels: DashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.config.command_prefix
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.config.originals_dir()
    }

    pub fn edited_dir(&self) -> PathBuf {
        self.config.edited_dir()
    }

    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }

    pub fn forget_channel(&self, guild_id: GuildId) {
        self.announce_channels.remove(&guild_id);
    }

    /// Aplica una finalización y devuelve el anuncio a enviar, si corresponde
    pub async fn handle_completion(&self, event: CompletionEvent) -> Option<(ChannelId, CreateEmbed)> {
        let guild_id = event.guild_id;
        match self.queue.on_playback_complete(event).await {
            Advance::Started(entry) => {
                let channel_id = *self.announce_channels.get(&guild_id)?;
                Some((channel_id, embeds::create_audio_embed(&entry, true)))
            }
            Advance::Failed(e) => {
                warn!("La cola de guild {} se detuvo: {}", guild_id, e);
                None
            }
            Advance::Stale | Advance::Idle => None,
        }
    }
}

/// Recibe las finalizaciones de todos los guilds y avanza sus colas.
///
/// Cada evento corre en su propia tarea: un guild bloqueado (por ejemplo
/// reconectando) no retrasa a los demás. El orden dentro de un guild lo dan su
/// mutex y los tickets.
async fn run_completion_loop<F, Fut>(hub: Arc<SoundHub>, completions: flume::Receiver<CompletionEvent>, announce: F)
where
    F: Fn(ChannelId, CreateEmbed) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    info!("🔄 Tarea de finalizaciones iniciada");

    while let Ok(event) = completions.recv_async().await {
        let hub = hub.clone();
        let announce = announce.clone();
        tokio::spawn(async move {
            if let Some((channel_id, embed)) = hub.handle_completion(event).await {
                announce(channel_id, embed).await;
            }
        });
    }

    info!("Tarea de finalizaciones terminada");
}

async fn announce_in_channel(http: Arc<Http>, channel_id: ChannelId, embed: CreateEmbed) {
    let message = CreateMessage::new()
        .embed(embed)
        .components(buttons::create_player_controls());
    if let Err(e) = channel_id.send_message(&http, message).await {
        warn!("No se pudo anunciar en {}: {:?}", channel_id, e);
    }
}

/// Main Discord event handler.
///
/// The completion receiver is taken by the first `ready` event; later
/// reconnections find it empty and do not spawn a second task.
pub struct SoundHubBot {
    hub: Arc<SoundHub>,
    completions: Mutex<Option<flume::Receiver<CompletionEvent>>>,
}

impl SoundHubBot {
    pub fn new(hub: Arc<SoundHub>, completions: flume::Receiver<CompletionEvent>) -> Self {
        Self {
            hub,
            completions: Mutex::new(Some(completions)),
        }
    }

    async fn handle_component(&self, ctx: Context, component: ComponentInteraction) -> anyhow::Result<()> {
        let Some(action) = buttons::ButtonAction::parse(&component.data.custom_id) else {
            debug!("Botón desconocido: {}", component.data.custom_id);
            return Ok(());
        };

        info!(
            "🔘 Botón {} presionado por {} en guild {:?}",
            component.data.custom_id, component.user.name, component.guild_id
        );

        let trigger = ComponentTrigger::new(ctx, component).await?;
        handlers::dispatch(&self.hub, &trigger, action.into_command()).await
    }
}

#[async_trait]
impl EventHandler for SoundHubBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Some(completions) = self.completions.lock().await.take() {
            let hub = self.hub.clone();
            let http = ctx.http.clone();
            let announce = move |channel_id: ChannelId, embed: CreateEmbed| announce_in_channel(http.clone(), channel_id, embed);
            tokio::spawn(run_completion_loop(hub, completions, announce));
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let command = match commands::parse(self.hub.prefix(), &msg.content) {
            None => return,
            Some(Ok(command)) => command,
            Some(Err(usage)) => {
                if let Err(e) = msg.channel_id.say(&ctx.http, format!("❌ {}", usage)).await {
                    error!("Error enviando uso: {:?}", e);
                }
                return;
            }
        };

        info!("📝 Comando {:?} de {} en guild {:?}", command, msg.author.name, msg.guild_id);
        let trigger = MessageTrigger::new(ctx, msg);
        if let Err(e) = handlers::dispatch(&self.hub, &trigger, command).await {
            error!("Error manejando comando: {:?}", e);
            let _ = trigger.send(trigger::Reply::Text(format!("❌ Error inesperado: {}", e))).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Component(component) = interaction {
            if let Err(e) = self.handle_component(ctx, component).await {
                error!("Error manejando componente: {:?}", e);
            }
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if reaction.user_id == Some(ctx.cache.current_user().id) {
            return;
        }
        if reaction.member.as_ref().is_some_and(|m| m.user.bot) {
            return;
        }

        let emoji = reaction.emoji.to_string();
        let Some(trigger) = ReactionTrigger::new(ctx, reaction) else {
            return;
        };
        if let Err(e) = handlers::handle_reaction(&self.hub, &trigger, &emoji).await {
            error!("Error manejando reacción {}: {:?}", emoji, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.hub.queue.on_disconnected(guild_id).await;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::player::{
        tests::{catalog_with, hold_guild, FakeVoice},
        ConnectPolicy,
    };
    use std::time::Duration;
    use tempfile::TempDir;

    pub(crate) struct TestHub {
        pub hub: SoundHub,
        pub voice: Arc<FakeVoice>,
        pub completions: flume::Receiver<CompletionEvent>,
        pub dir: TempDir,
    }

    /// Hub con catálogo temporal, backend de voz falso y sin conexión
    pub(crate) async fn test_hub(names: &[&str]) -> TestHub {
        let (dir, catalog) = catalog_with(names).await;
        let config = Config {
            audio_dir: dir.path().join("audios"),
            catalog_file: catalog.path().to_path_buf(),
            ffmpeg_path: "/ruta/inexistente/ffmpeg".to_string(),
            ..Config::default()
        };
        std::fs::create_dir_all(config.originals_dir()).unwrap();
        std::fs::create_dir_all(config.edited_dir()).unwrap();

        let voice = Arc::new(FakeVoice::default());
        let policy = ConnectPolicy {
            attempts: 1,
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        };
        let (queue, completions) = PlaybackQueue::new(catalog.clone(), voice.clone(), policy);
        let hub = SoundHub::new(Arc::new(config), catalog, Arc::new(queue));

        TestHub {
            hub,
            voice,
            completions,
            dir,
        }
    }

    #[tokio::test]
    async fn test_completion_announces_next_entry_in_remembered_channel() {
        let t = test_hub(&["a", "b"]).await;
        let guild = GuildId::new(3);

        t.hub.queue.join(guild, ChannelId::new(10)).await.unwrap();
        t.hub.queue.enqueue(guild, "a").await.unwrap();
        t.hub.queue.enqueue(guild, "b").await.unwrap();
        t.hub.remember_channel(guild, ChannelId::new(77));

        t.voice.finish_current();
        let event = t.completions.try_recv().unwrap();
        let (channel, embed) = t.hub.handle_completion(event).await.unwrap();

        assert_eq!(channel, ChannelId::new(77));
        assert_eq!(serde_json::to_value(&embed).unwrap()["title"], "▶️ Reproduciendo: b");
    }

    #[tokio::test]
    async fn test_completion_without_channel_or_next_is_silent() {
        let t = test_hub(&["a"]).await;
        let guild = GuildId::new(3);

        t.hub.queue.join(guild, ChannelId::new(10)).await.unwrap();
        t.hub.queue.enqueue(guild, "a").await.unwrap();

        t.voice.finish_current();
        let event = t.completions.try_recv().unwrap();
        assert!(t.hub.handle_completion(event).await.is_none());
    }

    #[tokio::test]
    async fn test_blocked_guild_does_not_delay_other_guilds() {
        let TestHub {
            hub,
            voice,
            completions,
            dir: _dir,
        } = test_hub(&["a", "b"]).await;
        let hub = Arc::new(hub);
        let busy = GuildId::new(1);
        let other = GuildId::new(2);

        hub.queue.join(other, ChannelId::new(10)).await.unwrap();
        hub.queue.enqueue(other, "a").await.unwrap();
        hub.queue.enqueue(other, "b").await.unwrap();
        hub.remember_channel(other, ChannelId::new(77));
        voice.finish_current();
        let finished = completions.try_recv().unwrap();

        // El guild ocupado tiene un evento pendiente delante del otro
        let _held = hold_guild(&hub.queue, busy).await;
        let (tx, rx) = flume::unbounded();
        tx.send(CompletionEvent {
            guild_id: busy,
            ticket: 999,
            track: "x".to_string(),
            error: None,
        })
        .unwrap();
        tx.send(finished).unwrap();

        let (announced_tx, announced_rx) = flume::unbounded();
        let announce = move |channel_id: ChannelId, embed: CreateEmbed| {
            let announced_tx = announced_tx.clone();
            async move {
                let _ = announced_tx.send((channel_id, embed));
            }
        };
        tokio::spawn(run_completion_loop(hub.clone(), rx, announce));

        let (channel, embed) = tokio::time::timeout(Duration::from_secs(2), announced_rx.recv_async())
            .await
            .expect("el otro guild quedó esperando al ocupado")
            .unwrap();
        assert_eq!(channel, ChannelId::new(77));
        assert_eq!(serde_json::to_value(&embed).unwrap()["title"], "▶️ Reproduciendo: b");
        assert_eq!(voice.plays(), vec!["a", "b"]);
    }
}
