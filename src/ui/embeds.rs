use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::queue::QueueSnapshot,
    bot::commands::{CommandGroup, CommandInfo, COMMANDS},
    storage::{AudioEntry, AudioKind},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🔊 SoundHub";

/// Límite de Discord para el valor de un campo
const FIELD_LIMIT: usize = 1024;

/// Formatea milisegundos como `MM:SS`
pub fn format_duration(duration_ms: u64) -> String {
    let total_seconds = duration_ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn duration_text(entry: &AudioEntry) -> String {
    entry
        .duration_ms
        .map(format_duration)
        .unwrap_or_else(|| "Desconocida".to_string())
}

/// Embed de un audio; con `playing` se muestra como "reproduciendo ahora"
pub fn create_audio_embed(entry: &AudioEntry, playing: bool) -> CreateEmbed {
    let (title, color) = if playing {
        (format!("▶️ Reproduciendo: {}", entry.name), colors::SUCCESS_GREEN)
    } else {
        (format!("🎵 {}", entry.name), colors::MUSIC_PURPLE)
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .color(color)
        .field("📁 Tipo", entry.kind.label(), true)
        .field("⏱️ Duración", duration_text(entry), true);

    if let Some(emoji) = &entry.emoji {
        embed = embed.field("😀 Emoji", emoji, true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Embed para un audio agregado a la cola
pub fn create_queued_embed(entry: &AudioEntry, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Agregado a la cola")
        .description(format!("**{}** está en la posición **{}**", entry.name, position))
        .color(colors::INFO_BLUE)
        .field("⏱️ Duración", duration_text(entry), true)
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente al terminar el actual"))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description(format!("😴 **La cola está vacía**\n\n💡 Usa `{prefix}play <nombre>` para agregar audios"))
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.current {
        embed = embed.field("▶️ Reproduciendo", format!("**{}**", current), false);
    }

    let (page, hidden) = snapshot.first_page();
    if !page.is_empty() {
        let mut description: String = page
            .iter()
            .enumerate()
            .map(|(i, name)| format!("**{}**. {}\n", i + 1, name))
            .collect();
        if hidden > 0 {
            description.push_str(&format!("... y {} más", hidden));
        }
        embed = embed.field("Próximos", description, false);
    }

    let loop_status = if snapshot.loop_enabled { "🔁 Activada" } else { "➡️ Desactivada" };
    embed
        .field("Repetición", loop_status, true)
        .field("Total en cola", snapshot.upcoming.len().to_string(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Lista los audios separados en originales y editados
pub fn create_list_embed(entries: &[AudioEntry], prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Biblioteca de Audios")
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(format!("Usa {prefix}play <nombre> para reproducir")))
        .timestamp(Timestamp::now());

    if entries.is_empty() {
        return embed
            .description(format!("No hay audios todavía. Usa `{prefix}upload` con un archivo adjunto."))
            .color(colors::NEUTRAL_GRAY);
    }

    for (kind, title) in [(AudioKind::Original, "📁 Originales"), (AudioKind::Edited, "✂️ Editados")] {
        let lines: Vec<String> = entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| match &e.emoji {
                Some(emoji) => format!("{} `{}` ({})", emoji, e.name, duration_text(e)),
                None => format!("`{}` ({})", e.name, duration_text(e)),
            })
            .collect();

        if !lines.is_empty() {
            embed = embed.field(format!("{} ({})", title, lines.len()), join_within_limit(&lines), false);
        }
    }

    embed.description(format!("**{}** audios disponibles", entries.len()))
}

/// Une líneas sin pasar del límite de un campo
fn join_within_limit(lines: &[String]) -> String {
    let mut text = String::new();
    for (i, line) in lines.iter().enumerate() {
        let suffix = format!("\n... y {} más", lines.len() - i);
        if text.len() + line.len() + 1 + suffix.len() > FIELD_LIMIT {
            text.push_str(suffix.trim_start());
            return text;
        }
        text.push_str(line);
        text.push('\n');
    }
    text
}

/// Crea un embed de ayuda general
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🔊 SoundHub - Comandos")
        .description("Soundboard con cola por servidor y edición de audios")
        .color(colors::INFO_BLUE);

    for group in CommandGroup::ALL {
        let lines: Vec<String> = COMMANDS
            .iter()
            .filter(|info| info.group == group)
            .map(|info| format!("• `{}{}` - {}", prefix, info.usage, info.description))
            .collect();
        embed = embed.field(group.title(), lines.join("\n"), false);
    }

    embed
        .footer(CreateEmbedFooter::new(format!("Usa {prefix}help <comando> para ayuda específica")))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda para un comando específico
pub fn create_command_help_embed(prefix: &str, info: &CommandInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("Comando {}{}", prefix, info.name))
        .description(info.description)
        .color(colors::INFO_BLUE)
        .field("Uso", format!("`{}{}`", prefix, info.usage), false);

    if !info.aliases.is_empty() {
        let aliases: Vec<String> = info.aliases.iter().map(|a| format!("`{prefix}{a}`")).collect();
        embed = embed.field("Alias", aliases.join(", "), false);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Resultado de una edición ya registrada en el catálogo
pub fn create_edit_embed(title: &str, entry: &AudioEntry, detail: &str, prefix: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(format!("**Nombre:** {}\n**Duración:** {}", entry.name, duration_text(entry)))
        .field("Edición", detail, false)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(format!("Usa {prefix}play {} para reproducir este audio", entry.name)))
        .timestamp(Timestamp::now())
}

/// Encabezado del menú de botones
pub fn create_menu_embed(shown: usize, total: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎛️ Menú de Audios")
        .description("Pulsa un botón para reproducir el audio en tu canal de voz")
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if total > shown {
        embed = embed.field("Mostrando", format!("{} de {} audios", shown, total), false);
    }
    embed
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso previo a una operación que requiere confirmación
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    pub(crate) fn embed_json(embed: &CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    fn entry(name: &str, kind: AudioKind, duration_ms: Option<u64>) -> AudioEntry {
        AudioEntry::new(name, format!("{name}.mp3"), kind).with_duration(duration_ms)
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(65_400), "01:05");
        assert_eq!(format_duration(3_600_000), "60:00");
    }

    #[test]
    fn test_queue_embed_shows_ten_and_remainder() {
        let snapshot = QueueSnapshot {
            current: Some("actual".to_string()),
            upcoming: (1..=12).map(|i| format!("a{i}")).collect(),
            loop_enabled: true,
        };

        let json = embed_json(&create_queue_embed(&snapshot, "!"));
        let fields = json["fields"].as_array().unwrap();
        let upcoming = fields.iter().find(|f| f["name"] == "Próximos").unwrap();
        let text = upcoming["value"].as_str().unwrap();

        assert!(text.contains("**10**. a10"));
        assert!(!text.contains("a11\n"));
        assert!(text.ends_with("... y 2 más"));
        assert_eq!(fields[0]["value"], "**actual**");
    }

    #[test]
    fn test_empty_queue_embed() {
        let json = embed_json(&create_queue_embed(
            &QueueSnapshot {
                current: None,
                upcoming: vec![],
                loop_enabled: false,
            },
            "$",
        ));
        assert!(json["description"].as_str().unwrap().contains("$play"));
    }

    #[test]
    fn test_list_embed_groups_by_kind() {
        let entries = vec![
            entry("uno", AudioKind::Original, Some(1_000)),
            entry("uno_invertido", AudioKind::Edited, None),
            entry("dos", AudioKind::Original, None),
        ];

        let json = embed_json(&create_list_embed(&entries, "!"));
        let names: Vec<&str> = json["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();

        assert_eq!(names, vec!["📁 Originales (2)", "✂️ Editados (1)"]);
    }

    #[test]
    fn test_long_lists_stay_within_field_limit() {
        let lines: Vec<String> = (0..200).map(|i| format!("`audio_numero_{i}` (00:01)")).collect();
        let text = join_within_limit(&lines);
        assert!(text.len() <= FIELD_LIMIT);
        assert!(text.contains("más"));
    }

    #[test]
    fn test_help_embed_has_every_group() {
        let json = embed_json(&create_help_embed("!"));
        assert_eq!(json["fields"].as_array().unwrap().len(), CommandGroup::ALL.len());
        assert!(json["fields"][3]["value"].as_str().unwrap().contains("`!cut <nombre> <inicio> <fin>`"));
    }

    #[test]
    fn test_audio_embed_title() {
        let audio = entry("bocina", AudioKind::Original, Some(2_000));
        assert_eq!(embed_json(&create_audio_embed(&audio, true))["title"], "▶️ Reproduciendo: bocina");
        assert_eq!(embed_json(&create_audio_embed(&audio, false))["title"], "🎵 bocina");
    }
}
