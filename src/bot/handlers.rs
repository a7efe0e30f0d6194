use anyhow::Result;
use serenity::model::id::GuildId;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{
    commands::{self, Command},
    trigger::{is_confirmation_emoji, Confirmation, Reply, Trigger},
    SoundHub,
};
use crate::{
    audio::{
        player::{Enqueued, QueueError},
        probe::probe_duration_ms_async,
    },
    storage::{sanitize_name, AudioEntry, AudioKind, CatalogError, EntryUpdate},
    ui::{buttons, embeds},
};

const UPLOAD_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "m4a"];

/// Ejecuta un comando ya parseado, venga de texto, botón o reacción
pub async fn dispatch(hub: &SoundHub, trigger: &dyn Trigger, command: Command) -> Result<()> {
    match command {
        // Reproducción
        Command::Play(name) => play(hub, trigger, &name).await,
        Command::Pause => pause(hub, trigger).await,
        Command::Resume => resume(hub, trigger).await,
        Command::Stop => stop(hub, trigger).await,
        Command::Skip => skip(hub, trigger).await,
        Command::NowPlaying => now_playing(hub, trigger).await,

        // Cola
        Command::Queue => show_queue(hub, trigger).await,
        Command::Clear => clear(hub, trigger).await,
        Command::Loop => toggle_loop(hub, trigger).await,
        Command::Shuffle => shuffle(hub, trigger).await,
        Command::Add(names) => add(hub, trigger, &names).await,
        Command::Remove(position) => remove(hub, trigger, position).await,

        // Biblioteca
        Command::Upload => upload(hub, trigger).await,
        Command::Rename { old, new } => rename(hub, trigger, &old, &new).await,
        Command::Emoji { name, emoji } => set_emoji(hub, trigger, &name, &emoji).await,
        Command::Delete(name) => delete(hub, trigger, &name).await,
        Command::List => list(hub, trigger).await,
        Command::Menu => menu(hub, trigger).await,

        // Edición
        Command::Cut { name, start, end } => cut(hub, trigger, &name, &start, &end).await,
        Command::Reverse(name) => reverse(hub, trigger, &name).await,
        Command::Speed { name, factor } => speed(hub, trigger, &name, factor).await,

        Command::Help(topic) => help(hub, trigger, topic.as_deref()).await,
    }
}

/// Reproduce el audio asociado a un emoji si el usuario está en un canal de voz
pub async fn handle_reaction(hub: &SoundHub, trigger: &dyn Trigger, emoji: &str) -> Result<()> {
    if trigger.guild_id().is_none() || is_confirmation_emoji(emoji) {
        return Ok(());
    }
    let Some(entry) = hub.catalog.get_by_emoji(emoji).await else {
        return Ok(());
    };
    if trigger.author_voice_channel().is_none() {
        debug!("Reacción {} ignorada: {} no está en un canal de voz", emoji, trigger.author_id());
        return Ok(());
    }

    info!("😀 Reacción {} reproduce {}", emoji, entry.name);
    play(hub, trigger, &entry.name).await
}

fn error_reply(message: impl Display) -> Reply {
    Reply::Embed(embeds::create_error_embed(&message.to_string()))
}

/// Guild del trigger; en mensajes directos avisa y devuelve `None`
async fn require_guild(trigger: &dyn Trigger) -> Result<Option<GuildId>> {
    if let Some(guild_id) = trigger.guild_id() {
        return Ok(Some(guild_id));
    }
    trigger
        .send(error_reply("Este comando sólo funciona dentro de un servidor"))
        .await?;
    Ok(None)
}

/// Conecta el bot al canal de voz del autor y recuerda dónde anunciar
async fn join_author(hub: &SoundHub, trigger: &dyn Trigger, guild_id: GuildId) -> Result<bool> {
    let Some(channel_id) = trigger.author_voice_channel() else {
        trigger
            .send(error_reply("Tienes que estar en un canal de voz para usar este comando"))
            .await?;
        return Ok(false);
    };

    if let Err(e) = hub.queue.join(guild_id, channel_id).await {
        warn!("No se pudo entrar al canal de voz {}: {}", channel_id, e);
        trigger.send(error_reply(e)).await?;
        return Ok(false);
    }

    hub.remember_channel(guild_id, trigger.channel_id());
    Ok(true)
}

fn now_playing_panel(entry: &AudioEntry) -> Reply {
    Reply::Panel {
        embed: embeds::create_audio_embed(entry, true),
        components: buttons::create_player_controls(),
    }
}

async fn play(hub: &SoundHub, trigger: &dyn Trigger, name: &str) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    if hub.catalog.get_by_name(name).await.is_none() {
        return trigger
            .send(error_reply(format!(
                "Audio '{}' no encontrado. Usa `{}list` para ver los audios disponibles",
                name,
                hub.prefix()
            )))
            .await;
    }

    if !join_author(hub, trigger, guild_id).await? {
        return Ok(());
    }

    let reply = match hub.queue.enqueue(guild_id, name).await {
        Ok(Enqueued::Started(entry)) => now_playing_panel(&entry),
        Ok(Enqueued::Queued { entry, position }) => Reply::Embed(embeds::create_queued_embed(&entry, position)),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

async fn pause(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.pause(guild_id).await {
        Ok(()) => Reply::Text("⏸️ Audio pausado".to_string()),
        Err(QueueError::NothingPlaying) => error_reply("No hay ningún audio reproduciéndose"),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

async fn resume(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.resume(guild_id).await {
        Ok(()) => Reply::Text("▶️ Audio reanudado".to_string()),
        Err(QueueError::NothingPlaying) => error_reply("No hay ningún audio pausado para reanudar"),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

async fn stop(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let report = hub.queue.stop(guild_id).await;
    hub.forget_channel(guild_id);

    if !report.was_connected && !report.was_playing && report.cleared == 0 {
        return trigger
            .send(error_reply("El bot no está conectado a un canal de voz"))
            .await;
    }

    let mut lines = Vec::new();
    if report.was_playing {
        lines.push("⏹️ Reproducción detenida".to_string());
    }
    if report.cleared > 0 {
        lines.push(format!("🗑️ Cola limpiada ({} audios)", report.cleared));
    }
    if report.was_connected {
        lines.push("👋 Desconectado del canal de voz".to_string());
    }
    trigger.send(Reply::Text(lines.join("\n"))).await
}

async fn skip(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.skip(guild_id).await {
        Ok(true) => Reply::Text("⏭️ Saltando al siguiente audio...".to_string()),
        Ok(false) => Reply::Text("⏭️ Audio saltado, no quedan más audios en la cola".to_string()),
        Err(QueueError::NothingPlaying) => error_reply("No hay ningún audio reproduciéndose"),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

async fn now_playing(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.now_playing(guild_id).await {
        None => error_reply("No hay nada sonando ahora mismo"),
        Some(name) => match hub.catalog.get_by_name(&name).await {
            Some(entry) => now_playing_panel(&entry),
            // El registro pudo borrarse mientras sonaba
            None => Reply::Text(format!("🎵 Sonando: {}", name)),
        },
    };
    trigger.send(reply).await
}

async fn show_queue(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let snapshot = hub.queue.snapshot(guild_id).await;
    trigger
        .send(Reply::Embed(embeds::create_queue_embed(&snapshot, hub.prefix())))
        .await
}

async fn clear(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.clear(guild_id).await {
        0 => error_reply("La cola ya está vacía"),
        removed => Reply::Text(format!("🗑️ ¡Cola limpiada! Se quitaron {} audios", removed)),
    };
    trigger.send(reply).await
}

async fn toggle_loop(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let text = if hub.queue.toggle_loop(guild_id).await {
        "🔁 Modo repetición **activado**. La cola se repetirá continuamente"
    } else {
        "➡️ Modo repetición **desactivado**. La cola se reproducirá una sola vez"
    };
    trigger.send(Reply::Text(text.to_string())).await
}

async fn shuffle(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.shuffle(guild_id).await {
        0 => error_reply("La cola está vacía, no hay nada que mezclar"),
        len => Reply::Text(format!("🔀 Cola mezclada ({} audios)", len)),
    };
    trigger.send(reply).await
}

async fn add(hub: &SoundHub, trigger: &dyn Trigger, names: &[String]) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };
    if !join_author(hub, trigger, guild_id).await? {
        return Ok(());
    }

    let report = match hub.queue.add_many(guild_id, names).await {
        Ok(report) => report,
        Err(e) => return trigger.send(error_reply(e)).await,
    };

    if report.added.is_empty() {
        return trigger
            .send(error_reply(format!(
                "Ningún audio válido. No encontrados: {}",
                report.missing.join(", ")
            )))
            .await;
    }

    let mut text = format!("➕ Agregados a la cola: {}", report.added.join(", "));
    if !report.missing.is_empty() {
        text.push_str(&format!("\n❓ No encontrados: {}", report.missing.join(", ")));
    }
    trigger.send(Reply::Text(text)).await?;

    if let Some(entry) = report.started {
        trigger.send(now_playing_panel(&entry)).await?;
    }
    Ok(())
}

async fn remove(hub: &SoundHub, trigger: &dyn Trigger, position: usize) -> Result<()> {
    let Some(guild_id) = require_guild(trigger).await? else {
        return Ok(());
    };

    let reply = match hub.queue.remove_at(guild_id, position).await {
        Ok(name) => Reply::Text(format!("🗑️ **{}** quitado de la cola", name)),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

fn upload_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename).extension()?.to_str()?.to_lowercase();
    UPLOAD_EXTENSIONS.contains(&extension.as_str()).then_some(extension)
}

async fn upload(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let Some(file) = trigger.attachment().await? else {
        return trigger
            .send(error_reply(format!(
                "No hay ningún archivo adjunto. Usa `{}upload` y adjunta un archivo de audio",
                hub.prefix()
            )))
            .await;
    };

    let Some(extension) = upload_extension(&file.filename) else {
        return trigger
            .send(error_reply("Formato no soportado. Formatos aceptados: .mp3, .wav, .ogg, .m4a"))
            .await;
    };

    let name = sanitize_name(&file.filename);
    if name.is_empty() {
        return trigger.send(error_reply("El nombre del archivo no es válido")).await;
    }

    let path = hub.originals_dir().join(format!("{}.{}", name, extension));
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return trigger
            .send(error_reply(format!(
                "Ya existe un archivo llamado '{}'. Renómbralo antes de subirlo",
                name
            )))
            .await;
    }

    tokio::fs::create_dir_all(hub.originals_dir()).await?;
    tokio::fs::write(&path, &file.data).await?;
    info!("💾 Archivo guardado en {}", path.display());

    let duration_ms = probe_duration_ms_async(&path).await;
    let entry = AudioEntry::new(name, path.clone(), AudioKind::Original).with_duration(duration_ms);

    match hub.catalog.add(entry).await {
        Ok(entry) => {
            let embed = embeds::create_success_embed(
                "Audio agregado",
                &format!(
                    "**Nombre:** {}\n**Duración:** {}\n\nUsa `{}play {}` para reproducirlo",
                    entry.name,
                    embeds::format_duration(entry.duration_ms.unwrap_or(0)),
                    hub.prefix(),
                    entry.name
                ),
            );
            trigger.send(Reply::Embed(embed)).await
        }
        Err(e) => {
            remove_file_quietly(&path).await;
            trigger
                .send(error_reply(format!("Error al registrar el audio: {}", e)))
                .await
        }
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("No se pudo borrar {}: {}", path.display(), e);
    }
}

async fn rename(hub: &SoundHub, trigger: &dyn Trigger, old: &str, new: &str) -> Result<()> {
    let new_name = sanitize_name(new);
    if new_name.is_empty() {
        return trigger.send(error_reply("El nuevo nombre no es válido")).await;
    }

    let reply = match hub.catalog.update(old, EntryUpdate::rename(&new_name)).await {
        Ok(entry) => Reply::Text(format!("✅ Audio renombrado de '{}' a '{}'", old, entry.name)),
        Err(CatalogError::DuplicateName(name)) => {
            error_reply(format!("Ya existe un audio llamado '{}'. Elige otro nombre", name))
        }
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

/// Emoji estándar (hasta dos caracteres) o personalizado de Discord
fn is_valid_emoji(emoji: &str) -> bool {
    let custom = emoji.starts_with('<') && emoji.ends_with('>');
    !emoji.is_empty() && (custom || emoji.chars().count() <= 2)
}

async fn set_emoji(hub: &SoundHub, trigger: &dyn Trigger, name: &str, emoji: &str) -> Result<()> {
    if is_confirmation_emoji(emoji) {
        return trigger
            .send(error_reply(format!("El emoji {} está reservado para las confirmaciones", emoji)))
            .await;
    }
    if !is_valid_emoji(emoji) {
        return trigger
            .send(error_reply("Emoji inválido. Usa un emoji estándar o uno personalizado del servidor"))
            .await;
    }

    let reply = match hub.catalog.update(name, EntryUpdate::emoji(emoji)).await {
        Ok(entry) => Reply::Text(format!("✅ Emoji {} asociado al audio '{}'", emoji, entry.name)),
        Err(e) => error_reply(e),
    };
    trigger.send(reply).await
}

async fn delete(hub: &SoundHub, trigger: &dyn Trigger, name: &str) -> Result<()> {
    let Some(entry) = hub.catalog.get_by_name(name).await else {
        return trigger.send(error_reply(CatalogError::NotFound(name.to_string()))).await;
    };

    let prompt = format!(
        "¿Seguro que quieres eliminar el audio '{}'? Reacciona con ✅ para confirmar o ❌ para cancelar",
        entry.name
    );
    match trigger.confirm(prompt, hub.config.confirm_timeout()).await? {
        Confirmation::Cancelled => return trigger.send(Reply::Text("❌ Eliminación cancelada".to_string())).await,
        Confirmation::TimedOut => {
            return trigger
                .send(Reply::Text("⏱️ Tiempo agotado. Eliminación cancelada".to_string()))
                .await
        }
        Confirmation::Confirmed => {}
    }

    let removed = match hub.catalog.remove(&entry.name).await {
        Ok(removed) => removed,
        Err(e) => return trigger.send(error_reply(format!("Error al eliminar el audio: {}", e))).await,
    };
    info!("🗑️ Audio {} eliminado del catálogo", removed.name);

    let text = match tokio::fs::remove_file(&removed.path).await {
        Ok(()) => format!("✅ Audio '{}' eliminado", removed.name),
        Err(e) => {
            warn!("No se pudo borrar el archivo {}: {}", removed.path.display(), e);
            format!(
                "⚠️ Audio '{}' eliminado del catálogo, pero no se pudo borrar el archivo: {}",
                removed.name, e
            )
        }
    };
    trigger.send(Reply::Text(text)).await
}

async fn list(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let entries = hub.catalog.get_all().await;
    trigger
        .send(Reply::Embed(embeds::create_list_embed(&entries, hub.prefix())))
        .await
}

async fn menu(hub: &SoundHub, trigger: &dyn Trigger) -> Result<()> {
    let entries = hub.catalog.get_all().await;
    if entries.is_empty() {
        return trigger
            .send(error_reply(format!(
                "No hay audios todavía. Usa `{}upload` para agregar uno",
                hub.prefix()
            )))
            .await;
    }

    let (components, shown) = buttons::create_menu_rows(&entries);
    trigger
        .send(Reply::Panel {
            embed: embeds::create_menu_embed(shown, entries.len()),
            components,
        })
        .await
}

async fn help(hub: &SoundHub, trigger: &dyn Trigger, topic: Option<&str>) -> Result<()> {
    let embed = match topic {
        None => embeds::create_help_embed(hub.prefix()),
        Some(word) => match commands::lookup(word) {
            Some(info) => embeds::create_command_help_embed(hub.prefix(), info),
            None => embeds::create_error_embed(&format!(
                "Comando '{}' desconocido. Usa `{}help` para ver la lista",
                word,
                hub.prefix()
            )),
        },
    };
    trigger.send(Reply::Embed(embed)).await
}

/// Registro de origen para una edición, con su archivo verificado
async fn edit_source(hub: &SoundHub, trigger: &dyn Trigger, name: &str) -> Result<Option<AudioEntry>> {
    let Some(entry) = hub.catalog.get_by_name(name).await else {
        trigger
            .send(error_reply(format!(
                "Audio '{}' no encontrado. Usa `{}list` para ver los audios disponibles",
                name,
                hub.prefix()
            )))
            .await?;
        return Ok(None);
    };

    if !tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
        trigger
            .send(error_reply(format!(
                "No se encontró el archivo de audio en '{}'",
                entry.path.display()
            )))
            .await?;
        return Ok(None);
    }
    Ok(Some(entry))
}

fn edited_path(hub: &SoundHub, name: &str) -> PathBuf {
    hub.edited_dir().join(format!("{}.mp3", name))
}

/// Registra en el catálogo el archivo producido por una edición.
/// Si el registro falla, el archivo se borra.
async fn register_edit(
    hub: &SoundHub,
    trigger: &dyn Trigger,
    name: String,
    path: PathBuf,
    title: &str,
    detail: String,
) -> Result<()> {
    let duration_ms = probe_duration_ms_async(&path).await;
    let entry = AudioEntry::new(name, path.clone(), AudioKind::Edited).with_duration(duration_ms);

    match hub.catalog.add(entry).await {
        Ok(entry) => {
            info!("✅ Edición registrada: {}", entry.name);
            trigger
                .send(Reply::Embed(embeds::create_edit_embed(title, &entry, &detail, hub.prefix())))
                .await
        }
        Err(e) => {
            remove_file_quietly(&path).await;
            trigger
                .send(error_reply(format!("Error al registrar el audio: {}", e)))
                .await
        }
    }
}

async fn cut(hub: &SoundHub, trigger: &dyn Trigger, name: &str, start: &str, end: &str) -> Result<()> {
    let Some(source) = edit_source(hub, trigger, name).await? else {
        return Ok(());
    };

    let new_name = format!("{}_cortado_{}_{}", source.name, start.replace(':', ""), end.replace(':', ""));
    let output = edited_path(hub, &new_name);

    trigger
        .send(Reply::Text(format!("✂️ Cortando '{}' de {} a {}...", source.name, start, end)))
        .await?;

    match hub.editor.cut(&source.path, start, end, &output).await {
        Ok(path) => {
            register_edit(hub, trigger, new_name, path, "Audio cortado", format!("De {} a {}", start, end)).await
        }
        Err(e) => trigger.send(error_reply(format!("Error al cortar el audio: {}", e))).await,
    }
}

async fn reverse(hub: &SoundHub, trigger: &dyn Trigger, name: &str) -> Result<()> {
    let Some(source) = edit_source(hub, trigger, name).await? else {
        return Ok(());
    };

    let new_name = format!("{}_invertido", source.name);
    let output = edited_path(hub, &new_name);

    trigger
        .send(Reply::Text(format!("🔄 Invirtiendo '{}'...", source.name)))
        .await?;

    match hub.editor.reverse(&source.path, &output).await {
        Ok(path) => {
            register_edit(hub, trigger, new_name, path, "Audio invertido", "Reproducción al revés".to_string()).await
        }
        Err(e) => trigger.send(error_reply(format!("Error al invertir el audio: {}", e))).await,
    }
}

/// Sufijo del nombre editado: `rapido_1_5`, `lento_0_75`
fn speed_suffix(factor: f64) -> String {
    let label = if factor > 1.0 { "rapido" } else { "lento" };
    format!("{}_{}", label, format!("{:?}", factor).replace('.', "_"))
}

async fn speed(hub: &SoundHub, trigger: &dyn Trigger, name: &str, factor: f64) -> Result<()> {
    let Some(source) = edit_source(hub, trigger, name).await? else {
        return Ok(());
    };

    let new_name = format!("{}_{}", source.name, speed_suffix(factor));
    let output = edited_path(hub, &new_name);

    trigger
        .send(Reply::Text(format!(
            "⏩ Cambiando la velocidad de '{}' (factor {})...",
            source.name, factor
        )))
        .await?;

    match hub.editor.change_speed(&source.path, factor, &output).await {
        Ok(path) => {
            register_edit(hub, trigger, new_name, path, "Velocidad cambiada", format!("Factor {}", factor)).await
        }
        Err(e) => {
            trigger
                .send(error_reply(format!("Error al cambiar la velocidad: {}", e)))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::probe::tests::write_silent_wav,
        bot::{
            tests::{test_hub, TestHub},
            trigger::{MockTrigger, UploadedFile},
        },
        ui::embeds::tests::embed_json,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, UserId};
    use std::sync::Arc;

    const GUILD: GuildId = GuildId::new(42);
    const TEXT_CHANNEL: ChannelId = ChannelId::new(500);

    type Sent = Arc<Mutex<Vec<Reply>>>;

    /// Trigger de un usuario en el guild de prueba que guarda lo enviado
    fn trigger_in(voice: Option<u64>) -> (MockTrigger, Sent) {
        let sent: Sent = Arc::default();
        let mut trigger = MockTrigger::new();
        trigger.expect_guild_id().return_const(Some(GUILD));
        trigger.expect_author_id().return_const(UserId::new(7));
        trigger.expect_channel_id().return_const(TEXT_CHANNEL);
        trigger
            .expect_author_voice_channel()
            .return_const(voice.map(ChannelId::new));
        let log = sent.clone();
        trigger.expect_send().returning(move |reply| {
            log.lock().push(reply);
            Ok(())
        });
        (trigger, sent)
    }

    fn attach(trigger: &mut MockTrigger, filename: &str, data: Vec<u8>) {
        let file = UploadedFile {
            filename: filename.to_string(),
            data,
        };
        trigger.expect_attachment().returning(move || Ok(Some(file.clone())));
    }

    /// Texto visible de una respuesta: el contenido o el JSON del embed
    fn rendered(reply: &Reply) -> String {
        match reply {
            Reply::Text(text) => text.clone(),
            Reply::Embed(embed) | Reply::Panel { embed, .. } => embed_json(embed).to_string(),
        }
    }

    fn last(sent: &Sent) -> String {
        sent.lock().last().map(rendered).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_play_joins_author_channel_and_shows_controls() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["bocina"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Play("bocina".to_string())).await.unwrap();

        assert_eq!(voice.channel(), Some(ChannelId::new(9)));
        assert_eq!(voice.plays(), vec!["bocina"]);
        let replies = sent.lock();
        assert_eq!(replies.len(), 1);
        assert!(matches!(&replies[0], Reply::Panel { components, .. } if components.len() == 2));
        assert!(rendered(&replies[0]).contains("Reproduciendo: bocina"));
    }

    #[tokio::test]
    async fn test_play_second_audio_is_queued() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a", "b"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Play("a".to_string())).await.unwrap();
        dispatch(&hub, &trigger, Command::Play("b".to_string())).await.unwrap();

        assert_eq!(voice.plays(), vec!["a"]);
        assert!(last(&sent).contains("posición **1**"));
    }

    #[tokio::test]
    async fn test_play_requires_voice_channel_and_known_audio() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a"]).await;
        let (trigger, sent) = trigger_in(None);

        dispatch(&hub, &trigger, Command::Play("a".to_string())).await.unwrap();
        assert!(last(&sent).contains("canal de voz"));

        dispatch(&hub, &trigger, Command::Play("nada".to_string())).await.unwrap();
        assert!(last(&sent).contains("'nada' no encontrado"));

        assert!(voice.plays().is_empty());
        assert_eq!(voice.channel(), None);
    }

    #[tokio::test]
    async fn test_commands_in_direct_messages_are_refused() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a"]).await;
        let sent: Sent = Arc::default();
        let mut trigger = MockTrigger::new();
        trigger.expect_guild_id().return_const(None::<GuildId>);
        let log = sent.clone();
        trigger.expect_send().returning(move |reply| {
            log.lock().push(reply);
            Ok(())
        });

        dispatch(&hub, &trigger, Command::Skip).await.unwrap();
        assert!(last(&sent).contains("dentro de un servidor"));
    }

    #[tokio::test]
    async fn test_stop_reports_and_forgets_announce_channel() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a", "b"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Add(vec!["a".into(), "b".into()])).await.unwrap();
        dispatch(&hub, &trigger, Command::Stop).await.unwrap();

        let text = last(&sent);
        assert!(text.contains("Reproducción detenida"));
        assert!(text.contains("Cola limpiada (1 audios)"));
        assert!(text.contains("Desconectado"));
        assert_eq!(voice.channel(), None);

        dispatch(&hub, &trigger, Command::Stop).await.unwrap();
        assert!(last(&sent).contains("no está conectado"));
    }

    #[tokio::test]
    async fn test_add_reports_missing_names_and_starts_playback() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a", "b"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Add(vec!["a".into(), "x".into(), "b".into()]))
            .await
            .unwrap();

        let replies: Vec<String> = sent.lock().iter().map(rendered).collect();
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("Agregados a la cola: a, b"));
        assert!(replies[0].contains("No encontrados: x"));
        assert!(replies[1].contains("Reproduciendo: a"));
        assert_eq!(voice.plays(), vec!["a"]);
        assert_eq!(hub.queue.snapshot(GUILD).await.upcoming, vec!["b"]);
    }

    #[tokio::test]
    async fn test_remove_out_of_range_shows_queue_length() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Remove(3)).await.unwrap();
        assert!(last(&sent).contains("La cola tiene 0 elementos"));
    }

    #[tokio::test]
    async fn test_pause_without_playback_is_an_error() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&[]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Pause).await.unwrap();
        assert!(last(&sent).contains("No hay ningún audio reproduciéndose"));
    }

    #[tokio::test]
    async fn test_upload_registers_sanitized_name_with_duration() {
        let TestHub { hub, dir, .. } = test_hub(&[]).await;
        let wav = dir.path().join("fuente.wav");
        write_silent_wav(&wav, 8000, 16000);
        let data = std::fs::read(&wav).unwrap();

        let (mut trigger, sent) = trigger_in(None);
        attach(&mut trigger, "Mi Audio?.WAV", data);

        dispatch(&hub, &trigger, Command::Upload).await.unwrap();

        let entry = hub.catalog.get_by_name("Mi_Audio_").await.unwrap();
        assert_eq!(entry.kind, AudioKind::Original);
        assert_eq!(entry.duration_ms, Some(2000));
        assert_eq!(entry.path, hub.originals_dir().join("Mi_Audio_.wav"));
        assert!(entry.path.exists());
        assert!(last(&sent).contains("Audio agregado"));

        // El mismo archivo otra vez no sobrescribe
        dispatch(&hub, &trigger, Command::Upload).await.unwrap();
        assert!(last(&sent).contains("Ya existe un archivo"));
        assert_eq!(hub.catalog.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_rejects_unsupported_format() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&[]).await;
        let (mut trigger, sent) = trigger_in(None);
        attach(&mut trigger, "notas.txt", b"hola".to_vec());

        dispatch(&hub, &trigger, Command::Upload).await.unwrap();

        assert!(last(&sent).contains("Formato no soportado"));
        assert!(hub.catalog.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_emoji_update_catalog() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a", "b"]).await;
        let (trigger, sent) = trigger_in(None);

        dispatch(&hub, &trigger, Command::Rename { old: "a".into(), new: "b".into() })
            .await
            .unwrap();
        assert!(last(&sent).contains("Ya existe un audio llamado 'b'"));

        dispatch(&hub, &trigger, Command::Rename { old: "a".into(), new: "nuevo nombre".into() })
            .await
            .unwrap();
        assert!(hub.catalog.get_by_name("nuevo_nombre").await.is_some());

        dispatch(&hub, &trigger, Command::Emoji { name: "b".into(), emoji: "🎺".into() })
            .await
            .unwrap();
        assert_eq!(hub.catalog.get_by_emoji("🎺").await.unwrap().name, "b");

        dispatch(&hub, &trigger, Command::Emoji { name: "b".into(), emoji: "trompeta".into() })
            .await
            .unwrap();
        assert!(last(&sent).contains("Emoji inválido"));
    }

    #[test]
    fn test_emoji_validation() {
        assert!(is_valid_emoji("🎺"));
        assert!(is_valid_emoji("👍🏽"));
        assert!(is_valid_emoji("<:bocina:123456>"));
        assert!(!is_valid_emoji(""));
        assert!(!is_valid_emoji("abc"));
    }

    #[tokio::test]
    async fn test_confirmation_emojis_never_play_audio() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a"]).await;
        let (trigger, sent) = trigger_in(Some(9));

        dispatch(&hub, &trigger, Command::Emoji { name: "a".into(), emoji: "✅".into() })
            .await
            .unwrap();
        assert!(last(&sent).contains("reservado para las confirmaciones"));
        assert!(hub.catalog.get_by_emoji("✅").await.is_none());

        // Un catálogo antiguo puede tenerlo asociado igualmente
        let mut entry = hub.catalog.remove("a").await.unwrap();
        entry.emoji = Some("❌".to_string());
        hub.catalog.add(entry).await.unwrap();

        handle_reaction(&hub, &trigger, "❌").await.unwrap();
        assert!(voice.plays().is_empty());
    }

    async fn delete_with(answer: Confirmation) -> (TestHub, Sent) {
        let t = test_hub(&["a"]).await;
        let (mut trigger, sent) = trigger_in(None);
        trigger.expect_confirm().returning(move |_, _| Ok(answer));
        dispatch(&t.hub, &trigger, Command::Delete("A".to_string())).await.unwrap();
        (t, sent)
    }

    #[tokio::test]
    async fn test_delete_confirmed_removes_entry_and_file() {
        let (t, sent) = delete_with(Confirmation::Confirmed).await;

        assert!(t.hub.catalog.get_by_name("a").await.is_none());
        assert!(!t.dir.path().join("a.mp3").exists());
        assert!(last(&sent).contains("Audio 'a' eliminado"));
    }

    #[tokio::test]
    async fn test_delete_cancelled_or_timed_out_keeps_entry() {
        let (t, sent) = delete_with(Confirmation::Cancelled).await;
        assert!(t.hub.catalog.get_by_name("a").await.is_some());
        assert!(last(&sent).contains("cancelada"));

        let (t, sent) = delete_with(Confirmation::TimedOut).await;
        assert!(t.hub.catalog.get_by_name("a").await.is_some());
        assert!(t.dir.path().join("a.mp3").exists());
        assert!(last(&sent).contains("Tiempo agotado"));
    }

    #[tokio::test]
    async fn test_cut_with_inverted_range_registers_nothing() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a"]).await;
        let (trigger, sent) = trigger_in(None);

        dispatch(
            &hub,
            &trigger,
            Command::Cut {
                name: "a".into(),
                start: "00:00:05".into(),
                end: "00:00:02".into(),
            },
        )
        .await
        .unwrap();

        assert!(last(&sent).contains("Error al cortar el audio"));
        assert_eq!(hub.catalog.get_all().await.len(), 1);
        assert_eq!(std::fs::read_dir(hub.edited_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_edit_leaves_no_output() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a"]).await;
        let (trigger, sent) = trigger_in(None);

        // ffmpeg apunta a una ruta inexistente
        dispatch(&hub, &trigger, Command::Reverse("a".into())).await.unwrap();

        assert!(last(&sent).contains("Error al invertir el audio"));
        assert!(hub.catalog.get_by_name("a_invertido").await.is_none());
        assert_eq!(std::fs::read_dir(hub.edited_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_edit_of_unknown_audio_is_reported() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&[]).await;
        let (trigger, sent) = trigger_in(None);

        dispatch(&hub, &trigger, Command::Speed { name: "x".into(), factor: 1.5 })
            .await
            .unwrap();
        assert!(last(&sent).contains("'x' no encontrado"));
    }

    #[test]
    fn test_speed_suffix_names() {
        assert_eq!(speed_suffix(1.5), "rapido_1_5");
        assert_eq!(speed_suffix(2.0), "rapido_2_0");
        assert_eq!(speed_suffix(0.75), "lento_0_75");
    }

    #[tokio::test]
    async fn test_reaction_plays_only_when_author_is_in_voice() {
        let TestHub { hub, voice, dir: _dir, .. } = test_hub(&["a"]).await;
        hub.catalog.update("a", EntryUpdate::emoji("🎺")).await.unwrap();

        let (outside, sent) = trigger_in(None);
        handle_reaction(&hub, &outside, "🎺").await.unwrap();
        assert!(sent.lock().is_empty());
        assert!(voice.plays().is_empty());

        let (inside, _) = trigger_in(Some(9));
        handle_reaction(&hub, &inside, "🥁").await.unwrap();
        handle_reaction(&hub, &inside, "🎺").await.unwrap();
        assert_eq!(voice.plays(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_menu_and_help_replies() {
        let TestHub { hub, dir: _dir, .. } = test_hub(&["a", "b"]).await;
        let (trigger, sent) = trigger_in(None);

        dispatch(&hub, &trigger, Command::Menu).await.unwrap();
        assert!(matches!(sent.lock().last(), Some(Reply::Panel { components, .. }) if components.len() == 1));

        dispatch(&hub, &trigger, Command::Help(Some("np".into()))).await.unwrap();
        assert!(last(&sent).contains("nowplaying"));

        dispatch(&hub, &trigger, Command::Help(Some("volumen".into()))).await.unwrap();
        assert!(last(&sent).contains("desconocido"));
    }
}
