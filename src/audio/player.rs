use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{GuildPlaybackState, QueueSnapshot},
        voice::{CompletionEvent, CompletionNotifier, VoiceBackend, VoiceError},
    },
    config::Config,
    storage::{AudioEntry, CatalogStore},
};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Audio '{0}' no encontrado")]
    NotFound(String),
    #[error("El archivo del audio '{0}' no existe")]
    MissingFile(String),
    #[error("Posición {position} inválida. La cola tiene {len} elementos")]
    OutOfRange { position: usize, len: usize },
    #[error("No hay nada reproduciéndose")]
    NothingPlaying,
    #[error("No se pudo conectar al canal de voz tras {attempts} intentos: {reason}")]
    Connection { attempts: u32, reason: String },
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// Resultado de pedir la reproducción de un audio
#[derive(Debug, Clone)]
pub enum Enqueued {
    Started(AudioEntry),
    Queued { entry: AudioEntry, position: usize },
}

/// Qué pasó al procesar una finalización
#[derive(Debug)]
pub enum Advance {
    /// El evento pertenecía a una reproducción ya reemplazada
    Stale,
    Started(AudioEntry),
    Idle,
    Failed(QueueError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub was_playing: bool,
    pub cleared: usize,
    pub was_connected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AddManyReport {
    pub added: Vec<String>,
    pub missing: Vec<String>,
    pub started: Option<AudioEntry>,
}

/// Reintentos de conexión de voz
#[derive(Debug, Clone, Copy)]
pub struct ConnectPolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
}

impl ConnectPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.voice_connect_attempts.max(1),
            retry_delay: config.voice_retry_delay(),
            settle_delay: config.voice_settle_delay(),
        }
    }
}

/// Colas de reproducción de todos los guilds.
///
/// Cada guild tiene su estado detrás de un mutex asíncrono que se mantiene
/// durante toda la operación, incluidas las esperas al catálogo y al backend
/// de voz. Las finalizaciones llegan por el canal devuelto en
/// [`PlaybackQueue::new`] y se aplican con [`PlaybackQueue::on_playback_complete`].
pub struct PlaybackQueue {
    guilds: DashMap<GuildId, Arc<Mutex<GuildPlaybackState>>>,
    catalog: Arc<CatalogStore>,
    voice: Arc<dyn VoiceBackend>,
    completions: flume::Sender<CompletionEvent>,
    next_ticket: AtomicU64,
    policy: ConnectPolicy,
}

impl PlaybackQueue {
    pub fn new(
        catalog: Arc<CatalogStore>,
        voice: Arc<dyn VoiceBackend>,
        policy: ConnectPolicy,
    ) -> (Self, flume::Receiver<CompletionEvent>) {
        let (tx, rx) = flume::unbounded();
        let queue = Self {
            guilds: DashMap::new(),
            catalog,
            voice,
            completions: tx,
            next_ticket: AtomicU64::new(1),
            policy,
        };
        (queue, rx)
    }

    /// Conecta (o mueve) el bot al canal de voz indicado
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), QueueError> {
        let state = self.state(guild_id);
        let mut state = state.lock().await;

        match self.voice.current_channel(guild_id).await {
            Some(current) if current == channel_id => return Ok(()),
            Some(current) => {
                info!("🔀 Moviendo el bot de {} a {} en guild {}", current, channel_id, guild_id);
                if let Err(e) = self.voice.stop(guild_id).await {
                    warn!("No se pudo detener la reproducción antes de moverse: {}", e);
                }
                state.clear_current();
                if let Err(e) = self.voice.disconnect(guild_id).await {
                    warn!("Error al desconectar antes de moverse: {}", e);
                }
                tokio::time::sleep(self.policy.settle_delay).await;
            }
            None => {}
        }

        self.connect_with_retries(guild_id, channel_id).await?;

        if state.current().is_none() && !state.is_empty() {
            match self.advance_locked(&mut state, guild_id).await {
                Ok(Some(entry)) => info!("▶️ Reanudando la cola con {}", entry.name),
                Ok(None) => {}
                Err(e) => error!("Error reanudando la cola: {}", e),
            }
        }

        Ok(())
    }

    /// Reproduce ahora si el guild está libre; si no, agrega a la cola
    pub async fn enqueue(&self, guild_id: GuildId, name: &str) -> Result<Enqueued, QueueError> {
        let state = self.state(guild_id);
        let mut state = state.lock().await;

        let entry = self.resolve(name).await?;

        if state.current().is_none() && !self.voice.is_playing(guild_id).await {
            self.start_locked(&mut state, guild_id, &entry).await?;
            return Ok(Enqueued::Started(entry));
        }

        let position = state.push(entry.name.clone());
        info!("➕ {} en la posición {} (guild {})", entry.name, position, guild_id);
        Ok(Enqueued::Queued { entry, position })
    }

    /// Agrega varios audios en orden; los que no se resuelven se informan
    pub async fn add_many(&self, guild_id: GuildId, names: &[String]) -> Result<AddManyReport, QueueError> {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        let mut report = AddManyReport::default();

        for name in names {
            match self.resolve(name).await {
                Ok(entry) => {
                    state.push(entry.name.clone());
                    report.added.push(entry.name);
                }
                Err(e) => {
                    debug!("No se agrega {}: {}", name, e);
                    report.missing.push(name.clone());
                }
            }
        }

        if !report.added.is_empty() && state.current().is_none() && !self.voice.is_playing(guild_id).await {
            report.started = self.advance_locked(&mut state, guild_id).await?;
        }

        Ok(report)
    }

    /// Aplica una finalización recibida del backend de voz
    pub async fn on_playback_complete(&self, event: CompletionEvent) -> Advance {
        let state = self.state(event.guild_id);
        let mut state = state.lock().await;

        if state.ticket() != Some(event.ticket) {
            debug!("Finalización obsoleta de {} (ticket {})", event.track, event.ticket);
            return Advance::Stale;
        }

        state.clear_current();
        match &event.error {
            Some(e) => error!("❌ Error reproduciendo {}: {}", event.track, e),
            None => debug!("⏹️ Terminó {}", event.track),
        }

        match self.advance_locked(&mut state, event.guild_id).await {
            Ok(Some(entry)) => Advance::Started(entry),
            Ok(None) => {
                info!("📭 Cola vacía en guild {}", event.guild_id);
                Advance::Idle
            }
            Err(e) => {
                error!("Error al avanzar la cola: {}", e);
                Advance::Failed(e)
            }
        }
    }

    /// Corta el audio actual; la finalización se encarga de avanzar.
    /// Devuelve si hay algo más en la cola.
    pub async fn skip(&self, guild_id: GuildId) -> Result<bool, QueueError> {
        let state = self.state(guild_id);
        let state = state.lock().await;

        if !self.voice.is_playing(guild_id).await && !self.voice.is_paused(guild_id).await {
            return Err(QueueError::NothingPlaying);
        }

        self.voice.stop(guild_id).await?;
        info!("⏭️ Audio saltado en guild {}", guild_id);
        Ok(!state.is_empty())
    }

    /// Detiene todo, vacía la cola y sale del canal de voz
    pub async fn stop(&self, guild_id: GuildId) -> StopReport {
        let state = self.state(guild_id);
        let mut state = state.lock().await;

        let was_playing = state.current().is_some()
            || self.voice.is_playing(guild_id).await
            || self.voice.is_paused(guild_id).await;
        let cleared = state.clear();
        state.clear_current();

        if let Err(e) = self.voice.stop(guild_id).await {
            warn!("Error al detener la reproducción: {}", e);
        }

        let was_connected = self.voice.current_channel(guild_id).await.is_some();
        if was_connected {
            if let Err(e) = self.voice.disconnect(guild_id).await {
                warn!("Error al desconectar: {}", e);
            }
        }

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        StopReport {
            was_playing,
            cleared,
            was_connected,
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), QueueError> {
        let state = self.state(guild_id);
        let _state = state.lock().await;

        if !self.voice.is_playing(guild_id).await {
            return Err(QueueError::NothingPlaying);
        }
        self.voice.pause(guild_id).await?;
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), QueueError> {
        let state = self.state(guild_id);
        let _state = state.lock().await;

        if !self.voice.is_paused(guild_id).await {
            return Err(QueueError::NothingPlaying);
        }
        self.voice.resume(guild_id).await?;
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    pub async fn clear(&self, guild_id: GuildId) -> usize {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        state.clear()
    }

    pub async fn toggle_loop(&self, guild_id: GuildId) -> bool {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        state.toggle_loop()
    }

    /// Mezcla la cola y devuelve cuántas entradas tiene
    pub async fn shuffle(&self, guild_id: GuildId) -> usize {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        if !state.is_empty() {
            state.shuffle();
        }
        state.len()
    }

    pub async fn remove_at(&self, guild_id: GuildId, position: usize) -> Result<String, QueueError> {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        let len = state.len();
        state
            .remove_at(position)
            .ok_or(QueueError::OutOfRange { position, len })
    }

    pub async fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        let state = self.state(guild_id);
        let state = state.lock().await;
        state.current().map(str::to_string)
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let state = self.state(guild_id);
        let state = state.lock().await;
        state.snapshot()
    }

    /// El bot fue sacado del canal de voz desde fuera
    pub async fn on_disconnected(&self, guild_id: GuildId) {
        let state = self.state(guild_id);
        let mut state = state.lock().await;
        if let Some(name) = state.clear_current() {
            info!("🔌 Desconectado mientras sonaba {} en guild {}", name, guild_id);
        }
    }

    fn state(&self, guild_id: GuildId) -> Arc<Mutex<GuildPlaybackState>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildPlaybackState::new())))
            .clone()
    }

    async fn resolve(&self, name: &str) -> Result<AudioEntry, QueueError> {
        let entry = self
            .catalog
            .get_by_name(name)
            .await
            .ok_or_else(|| QueueError::NotFound(name.to_string()))?;

        if !tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            return Err(QueueError::MissingFile(entry.name));
        }
        Ok(entry)
    }

    async fn start_locked(
        &self,
        state: &mut GuildPlaybackState,
        guild_id: GuildId,
        entry: &AudioEntry,
    ) -> Result<(), QueueError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let notifier = CompletionNotifier::new(self.completions.clone(), guild_id, ticket, entry.name.clone());

        if let Err(e) = self.voice.play(guild_id, &entry.path, notifier).await {
            state.clear_current();
            return Err(e.into());
        }

        state.set_current(entry.name.clone(), ticket);
        info!("🎵 Reproduciendo {} en guild {}", entry.name, guild_id);
        Ok(())
    }

    /// Saca la siguiente entrada válida y la inicia
    async fn advance_locked(
        &self,
        state: &mut GuildPlaybackState,
        guild_id: GuildId,
    ) -> Result<Option<AudioEntry>, QueueError> {
        while let Some(name) = state.pop_next() {
            match self.resolve(&name).await {
                Ok(entry) => {
                    state.requeue_if_looping(&name);
                    self.start_locked(state, guild_id, &entry).await?;
                    return Ok(Some(entry));
                }
                Err(e) => warn!("⏭️ Saltando {}: {}", name, e),
            }
        }
        Ok(None)
    }

    async fn connect_with_retries(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), QueueError> {
        let attempts = self.policy.attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            match self.voice.connect(guild_id, channel_id).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("⚠️ Intento {}/{} de conexión fallido: {}", attempt, attempts, e);
                    reason = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        Err(QueueError::Connection { attempts, reason })
    }
}
