use thiserror::Error;

/// Comandos de texto reconocidos por el bot
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Reproducción
    Play(String),
    Pause,
    Resume,
    Stop,
    Skip,
    NowPlaying,

    // Cola
    Queue,
    Clear,
    Loop,
    Shuffle,
    Add(Vec<String>),
    Remove(usize),

    // Biblioteca
    Upload,
    Rename { old: String, new: String },
    Emoji { name: String, emoji: String },
    Delete(String),
    List,
    Menu,

    // Edición
    Cut { name: String, start: String, end: String },
    Reverse(String),
    Speed { name: String, factor: f64 },

    Help(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandGroup {
    Playback,
    Queue,
    Library,
    Editing,
    Other,
}

impl CommandGroup {
    pub const ALL: [CommandGroup; 5] = [
        CommandGroup::Playback,
        CommandGroup::Queue,
        CommandGroup::Library,
        CommandGroup::Editing,
        CommandGroup::Other,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            CommandGroup::Playback => "🎵 Reproducción",
            CommandGroup::Queue => "📋 Cola",
            CommandGroup::Library => "📁 Biblioteca",
            CommandGroup::Editing => "✂️ Edición",
            CommandGroup::Other => "ℹ️ Otros",
        }
    }
}

/// Metadatos de un comando, usados por el parser y por la ayuda
#[derive(Debug)]
pub struct CommandInfo {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub description: &'static str,
    pub group: CommandGroup,
}

impl CommandInfo {
    pub fn matches(&self, word: &str) -> bool {
        self.name == word || self.aliases.contains(&word)
    }
}

pub static COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "play",
        aliases: &["p"],
        usage: "play <nombre>",
        description: "Reproduce un audio o lo agrega a la cola si ya hay algo sonando",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "pause",
        aliases: &[],
        usage: "pause",
        description: "Pausa la reproducción",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "resume",
        aliases: &[],
        usage: "resume",
        description: "Reanuda la reproducción pausada",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "stop",
        aliases: &[],
        usage: "stop",
        description: "Detiene todo, limpia la cola y sale del canal de voz",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "skip",
        aliases: &[],
        usage: "skip",
        description: "Salta al siguiente audio de la cola",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "nowplaying",
        aliases: &["np", "now-playing"],
        usage: "nowplaying",
        description: "Muestra el audio que está sonando",
        group: CommandGroup::Playback,
    },
    CommandInfo {
        name: "queue",
        aliases: &[],
        usage: "queue",
        description: "Muestra la cola de reproducción",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "clear",
        aliases: &[],
        usage: "clear",
        description: "Vacía la cola sin detener el audio actual",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "loop",
        aliases: &[],
        usage: "loop",
        description: "Activa o desactiva la repetición de la cola",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "shuffle",
        aliases: &[],
        usage: "shuffle",
        description: "Mezcla la cola",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "add",
        aliases: &[],
        usage: "add <nombre1>, <nombre2>, ...",
        description: "Agrega varios audios a la cola",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "remove",
        aliases: &[],
        usage: "remove <posición>",
        description: "Quita de la cola el audio en esa posición",
        group: CommandGroup::Queue,
    },
    CommandInfo {
        name: "upload",
        aliases: &[],
        usage: "upload (con un archivo adjunto)",
        description: "Sube un audio .mp3, .wav, .ogg o .m4a",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "rename",
        aliases: &[],
        usage: "rename <nombre_actual> <nombre_nuevo>",
        description: "Renombra un audio",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "emoji",
        aliases: &["set-emoji"],
        usage: "emoji <nombre> <emoji>",
        description: "Asocia un emoji a un audio para reproducirlo con reacciones",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "delete",
        aliases: &[],
        usage: "delete <nombre>",
        description: "Elimina un audio (pide confirmación)",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "list",
        aliases: &[],
        usage: "list",
        description: "Lista los audios disponibles",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "menu",
        aliases: &[],
        usage: "menu",
        description: "Muestra botones para reproducir audios",
        group: CommandGroup::Library,
    },
    CommandInfo {
        name: "cut",
        aliases: &[],
        usage: "cut <nombre> <inicio> <fin>",
        description: "Recorta un audio (tiempos en HH:MM:SS, MM:SS o SS)",
        group: CommandGroup::Editing,
    },
    CommandInfo {
        name: "reverse",
        aliases: &[],
        usage: "reverse <nombre>",
        description: "Crea una versión invertida del audio",
        group: CommandGroup::Editing,
    },
    CommandInfo {
        name: "speed",
        aliases: &["set-speed"],
        usage: "speed <nombre> <factor>",
        description: "Cambia la velocidad (0.5 = mitad, 2.0 = doble)",
        group: CommandGroup::Editing,
    },
    CommandInfo {
        name: "help",
        aliases: &[],
        usage: "help [comando]",
        description: "Muestra esta ayuda",
        group: CommandGroup::Other,
    },
];

/// Busca un comando por nombre o alias
pub fn lookup(word: &str) -> Option<&'static CommandInfo> {
    let word = word.to_lowercase();
    COMMANDS.iter().find(|info| info.matches(&word))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Uso: `{prefix}{usage}`")]
pub struct ParseError {
    pub prefix: String,
    pub usage: &'static str,
}

/// Interpreta un mensaje.
///
/// `None` si el mensaje no es un comando conocido; `Some(Err)` si lo es pero
/// sus argumentos no son válidos.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, ParseError>> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body, ""),
    };
    let info = lookup(word)?;

    let usage = || ParseError {
        prefix: prefix.to_string(),
        usage: info.usage,
    };
    let args = tokenize(rest);

    let command = match info.name {
        "play" => {
            let name = unquote(rest);
            if name.is_empty() {
                return Some(Err(usage()));
            }
            Command::Play(name.to_string())
        }
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "skip" => Command::Skip,
        "nowplaying" => Command::NowPlaying,
        "queue" => Command::Queue,
        "clear" => Command::Clear,
        "loop" => Command::Loop,
        "shuffle" => Command::Shuffle,
        "add" => {
            let names: Vec<String> = rest
                .split(',')
                .map(|n| unquote(n).to_string())
                .filter(|n| !n.is_empty())
                .collect();
            if names.is_empty() {
                return Some(Err(usage()));
            }
            Command::Add(names)
        }
        "remove" => match args.as_slice() {
            [position] => match position.parse() {
                Ok(position) => Command::Remove(position),
                Err(_) => return Some(Err(usage())),
            },
            _ => return Some(Err(usage())),
        },
        "upload" => Command::Upload,
        "rename" => match args.as_slice() {
            [old, new] => Command::Rename {
                old: old.clone(),
                new: new.clone(),
            },
            _ => return Some(Err(usage())),
        },
        "emoji" => match args.as_slice() {
            [name, emoji] => Command::Emoji {
                name: name.clone(),
                emoji: emoji.clone(),
            },
            _ => return Some(Err(usage())),
        },
        "delete" => match args.as_slice() {
            [name] => Command::Delete(name.clone()),
            _ => return Some(Err(usage())),
        },
        "list" => Command::List,
        "menu" => Command::Menu,
        "cut" => match args.as_slice() {
            [name, start, end] => Command::Cut {
                name: name.clone(),
                start: start.clone(),
                end: end.clone(),
            },
            _ => return Some(Err(usage())),
        },
        "reverse" => match args.as_slice() {
            [name] => Command::Reverse(name.clone()),
            _ => return Some(Err(usage())),
        },
        "speed" => match args.as_slice() {
            [name, factor] => match factor.replace(',', ".").parse() {
                Ok(factor) => Command::Speed {
                    name: name.clone(),
                    factor,
                },
                Err(_) => return Some(Err(usage())),
            },
            _ => return Some(Err(usage())),
        },
        "help" => Command::Help(args.first().cloned()),
        _ => return None,
    };

    Some(Ok(command))
}

/// Divide por espacios respetando comillas dobles
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }

    tokens
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim()
}
