use serenity::{
    all::{ButtonStyle, ReactionType},
    builder::{CreateActionRow, CreateButton},
};

use crate::{bot::commands::Command, storage::AudioEntry};

/// Discord admite 5 filas de 5 botones por mensaje
pub const MAX_MENU_BUTTONS: usize = 25;
const BUTTONS_PER_ROW: usize = 5;

const CUSTOM_ID_LIMIT: usize = 100;
const LABEL_LIMIT: usize = 80;

/// Prefijos de `custom_id`
pub mod button_ids {
    pub const PLAY_PREFIX: &str = "play:";
    pub const PLAYER_PREFIX: &str = "player:";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Pause,
    Resume,
    Skip,
    Stop,
    Loop,
    Shuffle,
}

impl PlayerAction {
    const ALL: [PlayerAction; 6] = [
        PlayerAction::Pause,
        PlayerAction::Resume,
        PlayerAction::Skip,
        PlayerAction::Stop,
        PlayerAction::Loop,
        PlayerAction::Shuffle,
    ];

    fn id(&self) -> &'static str {
        match self {
            PlayerAction::Pause => "pause",
            PlayerAction::Resume => "resume",
            PlayerAction::Skip => "skip",
            PlayerAction::Stop => "stop",
            PlayerAction::Loop => "loop",
            PlayerAction::Shuffle => "shuffle",
        }
    }

    fn emoji(&self) -> char {
        match self {
            PlayerAction::Pause => '⏸',
            PlayerAction::Resume => '▶',
            PlayerAction::Skip => '⏭',
            PlayerAction::Stop => '⏹',
            PlayerAction::Loop => '🔁',
            PlayerAction::Shuffle => '🔀',
        }
    }

    fn style(&self) -> ButtonStyle {
        match self {
            PlayerAction::Stop => ButtonStyle::Danger,
            PlayerAction::Resume => ButtonStyle::Success,
            _ => ButtonStyle::Secondary,
        }
    }
}

/// Acción asociada a un botón pulsado
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Play(String),
    Player(PlayerAction),
}

impl ButtonAction {
    pub fn parse(custom_id: &str) -> Option<Self> {
        if let Some(name) = custom_id.strip_prefix(button_ids::PLAY_PREFIX) {
            return (!name.is_empty()).then(|| ButtonAction::Play(name.to_string()));
        }

        let id = custom_id.strip_prefix(button_ids::PLAYER_PREFIX)?;
        PlayerAction::ALL
            .into_iter()
            .find(|action| action.id() == id)
            .map(ButtonAction::Player)
    }

    pub fn custom_id(&self) -> String {
        match self {
            ButtonAction::Play(name) => format!("{}{}", button_ids::PLAY_PREFIX, name),
            ButtonAction::Player(action) => format!("{}{}", button_ids::PLAYER_PREFIX, action.id()),
        }
    }

    /// Los botones ejecutan los mismos comandos que el texto
    pub fn into_command(self) -> Command {
        match self {
            ButtonAction::Play(name) => Command::Play(name),
            ButtonAction::Player(PlayerAction::Pause) => Command::Pause,
            ButtonAction::Player(PlayerAction::Resume) => Command::Resume,
            ButtonAction::Player(PlayerAction::Skip) => Command::Skip,
            ButtonAction::Player(PlayerAction::Stop) => Command::Stop,
            ButtonAction::Player(PlayerAction::Loop) => Command::Loop,
            ButtonAction::Player(PlayerAction::Shuffle) => Command::Shuffle,
        }
    }
}

/// Botones de reproducción para los primeros audios del catálogo.
/// Devuelve las filas y cuántos audios quedaron con botón.
pub fn create_menu_rows(entries: &[AudioEntry]) -> (Vec<CreateActionRow>, usize) {
    let buttons: Vec<CreateButton> = entries
        .iter()
        .filter_map(audio_button)
        .take(MAX_MENU_BUTTONS)
        .collect();
    let shown = buttons.len();

    let mut rows = Vec::new();
    let mut buttons = buttons.into_iter().peekable();
    while buttons.peek().is_some() {
        rows.push(CreateActionRow::Buttons(buttons.by_ref().take(BUTTONS_PER_ROW).collect()));
    }

    (rows, shown)
}

fn audio_button(entry: &AudioEntry) -> Option<CreateButton> {
    let custom_id = ButtonAction::Play(entry.name.clone()).custom_id();
    if custom_id.len() > CUSTOM_ID_LIMIT {
        return None;
    }

    let label: String = entry.name.chars().take(LABEL_LIMIT).collect();
    let mut button = CreateButton::new(custom_id)
        .label(label)
        .style(ButtonStyle::Primary);

    if let Some(emoji) = entry.emoji.as_ref().and_then(|e| ReactionType::try_from(e.as_str()).ok()) {
        button = button.emoji(emoji);
    }
    Some(button)
}

/// Controles del reproductor para los mensajes de "reproduciendo"
pub fn create_player_controls() -> Vec<CreateActionRow> {
    let buttons = PlayerAction::ALL
        .iter()
        .map(|action| {
            CreateButton::new(ButtonAction::Player(*action).custom_id())
                .emoji(action.emoji())
                .style(action.style())
        })
        .collect::<Vec<_>>();

    let (first, second) = buttons.split_at(4);
    vec![
        CreateActionRow::Buttons(first.to_vec()),
        CreateActionRow::Buttons(second.to_vec()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AudioKind;
    use pretty_assertions::assert_eq;

    fn components(row: &CreateActionRow) -> Vec<serde_json::Value> {
        serde_json::to_value(row).unwrap()["components"]
            .as_array()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_parse_custom_ids() {
        assert_eq!(
            ButtonAction::parse("play:bocina"),
            Some(ButtonAction::Play("bocina".to_string()))
        );
        assert_eq!(
            ButtonAction::parse("player:shuffle"),
            Some(ButtonAction::Player(PlayerAction::Shuffle))
        );
        assert_eq!(ButtonAction::parse("play:"), None);
        assert_eq!(ButtonAction::parse("player:volume"), None);
        assert_eq!(ButtonAction::parse("music_skip"), None);
    }

    #[test]
    fn test_player_buttons_map_to_commands() {
        assert_eq!(ButtonAction::Player(PlayerAction::Skip).into_command(), Command::Skip);
        assert_eq!(
            ButtonAction::parse("play:risa").unwrap().into_command(),
            Command::Play("risa".to_string())
        );
    }

    #[test]
    fn test_menu_caps_at_twenty_five_buttons() {
        let entries: Vec<AudioEntry> = (0..27)
            .map(|i| AudioEntry::new(format!("audio{i}"), "x.mp3", AudioKind::Original))
            .collect();

        let (rows, shown) = create_menu_rows(&entries);

        assert_eq!(shown, MAX_MENU_BUTTONS);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|row| components(row).len() == BUTTONS_PER_ROW));
        assert_eq!(components(&rows[0])[0]["custom_id"], "play:audio0");
    }

    #[test]
    fn test_menu_skips_names_too_long_for_custom_id() {
        let entries = vec![
            AudioEntry::new("x".repeat(120), "x.mp3", AudioKind::Original),
            AudioEntry::new("corto", "c.mp3", AudioKind::Edited),
        ];

        let (rows, shown) = create_menu_rows(&entries);
        assert_eq!(shown, 1);
        assert_eq!(components(&rows[0])[0]["label"], "corto");
    }

    #[test]
    fn test_player_controls_cover_every_action() {
        let ids: Vec<String> = create_player_controls()
            .iter()
            .flat_map(components)
            .map(|c| c["custom_id"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(ids.len(), 6);
        for id in ids {
            assert!(matches!(ButtonAction::parse(&id), Some(ButtonAction::Player(_))));
        }
    }
}
