use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::{fs, sync::Mutex};
use tracing::{error, info};

/// Origen de un clip del catálogo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioKind {
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "editado")]
    Edited,
}

impl AudioKind {
    pub fn label(&self) -> &'static str {
        match self {
            AudioKind::Original => "Original",
            AudioKind::Edited => "Editado",
        }
    }
}

/// Registro de un clip de audio.
///
/// Los nombres de campo serializados son los del archivo `audios_db.json`
/// existente, para que el catálogo siga siendo compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEntry {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "caminho")]
    pub path: PathBuf,
    #[serde(rename = "tipo")]
    pub kind: AudioKind,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(rename = "duracao", default)]
    pub duration_ms: Option<u64>,
}

impl AudioEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: AudioKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            emoji: None,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Cambios aplicables a un registro existente
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub name: Option<String>,
    /// `Some(None)` elimina la asociación de emoji
    pub emoji: Option<Option<String>>,
}

impl EntryUpdate {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn emoji(emoji: impl Into<String>) -> Self {
        Self {
            emoji: Some(Some(emoji.into())),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Audio '{0}' no encontrado")]
    NotFound(String),
    #[error("Ya existe un audio con el nombre '{0}'")]
    DuplicateName(String),
    #[error("El emoji {emoji} ya está asociado al audio '{owner}'")]
    EmojiInUse { emoji: String, owner: String },
    #[error("Error de E/S en el catálogo: {0}")]
    Io(#[from] std::io::Error),
    #[error("Catálogo corrupto: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    audios: Vec<AudioEntry>,
}

/// Catálogo de clips persistido en un único archivo JSON.
///
/// Cada operación relee el archivo completo y lo reescribe entero. Las
/// escrituras de este proceso se serializan con `write_lock`.
pub struct CatalogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Crea el archivo del catálogo si no existe
    pub async fn init(&self) -> Result<(), CatalogError> {
        if fs::try_exists(&self.path).await? {
            info!("📁 Catálogo encontrado en {}", self.path.display());
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.save(&CatalogFile::default()).await?;

        info!("📝 Catálogo inicializado en {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Todos los clips; un catálogo ilegible se trata como vacío
    pub async fn get_all(&self) -> Vec<AudioEntry> {
        match self.load().await {
            Ok(file) => file.audios,
            Err(e) => {
                error!("Error al leer el catálogo {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Búsqueda exacta sin distinguir mayúsculas
    pub async fn get_by_name(&self, name: &str) -> Option<AudioEntry> {
        self.get_all()
            .await
            .into_iter()
            .find(|entry| entry.matches_name(name))
    }

    pub async fn get_by_emoji(&self, emoji: &str) -> Option<AudioEntry> {
        self.get_all()
            .await
            .into_iter()
            .find(|entry| entry.emoji.as_deref() == Some(emoji))
    }

    pub async fn add(&self, entry: AudioEntry) -> Result<AudioEntry, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load_for_write().await?;

        if file.audios.iter().any(|existing| existing.matches_name(&entry.name)) {
            return Err(CatalogError::DuplicateName(entry.name));
        }

        file.audios.push(entry.clone());
        self.save(&file).await?;

        info!("➕ Audio registrado: {}", entry.name);
        Ok(entry)
    }

    pub async fn update(&self, name: &str, changes: EntryUpdate) -> Result<AudioEntry, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load_for_write().await?;

        let index = file
            .audios
            .iter()
            .position(|entry| entry.matches_name(name))
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;

        if let Some(new_name) = &changes.name {
            let taken = file
                .audios
                .iter()
                .enumerate()
                .any(|(i, entry)| i != index && entry.matches_name(new_name));
            if taken {
                return Err(CatalogError::DuplicateName(new_name.clone()));
            }
        }

        if let Some(Some(emoji)) = &changes.emoji {
            let owner = file
                .audios
                .iter()
                .enumerate()
                .find(|(i, entry)| *i != index && entry.emoji.as_deref() == Some(emoji.as_str()));
            if let Some((_, owner)) = owner {
                return Err(CatalogError::EmojiInUse {
                    emoji: emoji.clone(),
                    owner: owner.name.clone(),
                });
            }
        }

        let entry = &mut file.audios[index];
        if let Some(new_name) = changes.name {
            entry.name = new_name;
        }
        if let Some(emoji) = changes.emoji {
            entry.emoji = emoji;
        }
        let updated = entry.clone();

        self.save(&file).await?;

        info!("💾 Audio actualizado: {}", updated.name);
        Ok(updated)
    }

    /// Elimina el registro y lo devuelve para que el llamador borre el archivo
    pub async fn remove(&self, name: &str) -> Result<AudioEntry, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load_for_write().await?;

        let index = file
            .audios
            .iter()
            .position(|entry| entry.matches_name(name))
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;

        let removed = file.audios.remove(index);
        self.save(&file).await?;

        info!("🗑️ Audio eliminado del catálogo: {}", removed.name);
        Ok(removed)
    }

    // Métodos privados

    async fn load(&self) -> Result<CatalogFile, CatalogError> {
        let content = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Un archivo inexistente es un catálogo vacío; uno corrupto es un error
    async fn load_for_write(&self) -> Result<CatalogFile, CatalogError> {
        match self.load().await {
            Err(CatalogError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(CatalogFile::default())
            }
            other => other,
        }
    }

    async fn save(&self, file: &CatalogFile) -> Result<(), CatalogError> {
        let content = serde_json::to_string_pretty(file)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

fn invalid_filename_chars() -> &'static Regex {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    INVALID.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("static regex"))
}

/// Convierte un nombre de archivo en un nombre de catálogo seguro.
///
/// Quita la extensión, reemplaza los caracteres inválidos por `_`, recorta
/// espacios, cambia los espacios internos por `_` y limita a 50 caracteres.
pub fn sanitize_name(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    invalid_filename_chars()
        .replace_all(stem, "_")
        .trim()
        .replace(' ', "_")
        .chars()
        .take(50)
        .collect()
}
