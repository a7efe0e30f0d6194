use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File as FileInput,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("El bot no está conectado a un canal de voz")]
    NotConnected,
    #[error("No se pudo conectar al canal de voz: {0}")]
    Join(String),
    #[error("Error controlando la reproducción: {0}")]
    Control(String),
}

/// Aviso de que terminó (o falló) la reproducción iniciada con `ticket`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub guild_id: GuildId,
    pub ticket: u64,
    pub track: String,
    pub error: Option<String>,
}

/// Emisor de un único [`CompletionEvent`] por petición de reproducción.
///
/// Las copias comparten la bandera, así que el backend puede registrar el
/// mismo notificador en el evento de fin y en el de error.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: flume::Sender<CompletionEvent>,
    guild_id: GuildId,
    ticket: u64,
    track: String,
    fired: Arc<AtomicBool>,
}

impl CompletionNotifier {
    pub fn new(tx: flume::Sender<CompletionEvent>, guild_id: GuildId, ticket: u64, track: String) -> Self {
        Self {
            tx,
            guild_id,
            ticket,
            track,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Envía el evento si nadie lo envió antes; devuelve si este llamado lo hizo
    pub fn notify(&self, error: Option<String>) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }

        let event = CompletionEvent {
            guild_id: self.guild_id,
            ticket: self.ticket,
            track: self.track.clone(),
            error,
        };
        if self.tx.send(event).is_err() {
            warn!("Canal de finalización cerrado, evento de {} descartado", self.track);
        }
        true
    }
}

/// Subsistema de voz que reproduce archivos en un guild
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Reemplaza lo que suene por `path`; `notifier` se dispara al terminar
    async fn play(&self, guild_id: GuildId, path: &Path, notifier: CompletionNotifier) -> Result<(), VoiceError>;

    async fn pause(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), VoiceError>;

    async fn is_playing(&self, guild_id: GuildId) -> bool;

    async fn is_paused(&self, guild_id: GuildId) -> bool;
}

/// Implementación sobre songbird
pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    current_tracks: DashMap<GuildId, TrackHandle>,
    volume: f32,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self {
            manager,
            current_tracks: DashMap::new(),
            volume: volume.clamp(0.0, 2.0),
        }
    }

    async fn play_mode(&self, guild_id: GuildId) -> Option<PlayMode> {
        let track = self.current_tracks.get(&guild_id)?.clone();
        track.get_info().await.ok().map(|info| info.playing)
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Join(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        self.current_tracks.remove(&guild_id);

        if self.manager.get(guild_id).is_none() {
            return Err(VoiceError::NotConnected);
        }
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| VoiceError::Control(e.to_string()))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let call = call.lock().await;
        call.current_channel().map(|id| ChannelId::new(id.0.get()))
    }

    async fn play(&self, guild_id: GuildId, path: &Path, notifier: CompletionNotifier) -> Result<(), VoiceError> {
        let call = self.manager.get(guild_id).ok_or(VoiceError::NotConnected)?;

        let track = {
            let mut call = call.lock().await;
            call.play_only_input(FileInput::new(path.to_path_buf()).into())
        };

        if let Err(e) = track.set_volume(self.volume) {
            warn!("No se pudo ajustar el volumen: {:?}", e);
        }

        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(Event::Track(event), TrackCompletionHandler { notifier: notifier.clone() })
                .map_err(|e| VoiceError::Control(e.to_string()))?;
        }

        debug!("▶️ Pista {} iniciada (ticket {})", path.display(), notifier.ticket());
        self.current_tracks.insert(guild_id, track);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        let track = self.current_tracks.get(&guild_id).ok_or(VoiceError::NotConnected)?;
        track.pause().map_err(|e| VoiceError::Control(e.to_string()))
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        let track = self.current_tracks.get(&guild_id).ok_or(VoiceError::NotConnected)?;
        track.play().map_err(|e| VoiceError::Control(e.to_string()))
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), VoiceError> {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            // La pista puede haber terminado ya; eso no es un error
            let _ = track.stop();
        }
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Play))
    }

    async fn is_paused(&self, guild_id: GuildId) -> bool {
        matches!(self.play_mode(guild_id).await, Some(PlayMode::Pause))
    }
}

/// Handler de songbird para el fin o el error de una pista
struct TrackCompletionHandler {
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackCompletionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        if let Some(ref e) = error {
            error!("Error reproduciendo pista: {}", e);
        }
        self.notifier.notify(error);

        Some(Event::Cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_notifier_fires_once_across_clones() {
        let (tx, rx) = flume::unbounded();
        let notifier = CompletionNotifier::new(tx, GuildId::new(1), 9, "grito".to_string());
        let on_error = notifier.clone();

        assert!(on_error.notify(Some("falló".to_string())));
        assert!(!notifier.notify(None));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![CompletionEvent {
                guild_id: GuildId::new(1),
                ticket: 9,
                track: "grito".to_string(),
                error: Some("falló".to_string()),
            }]
        );
    }

    #[test]
    fn test_notifier_with_closed_channel_does_not_panic() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let notifier = CompletionNotifier::new(tx, GuildId::new(2), 1, "x".to_string());
        assert!(notifier.notify(None));
    }
}
