use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info};

use crate::audio::probe::probe_duration_ms;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Formato de tiempo inválido '{0}'. Usa HH:MM:SS, MM:SS o SS")]
    InvalidTime(String),
    #[error("El tiempo inicial ({start_ms}ms) debe ser menor que el final ({end_ms}ms)")]
    InvalidRange { start_ms: u64, end_ms: u64 },
    #[error("El factor de velocidad debe ser mayor que cero, recibido: {0}")]
    InvalidFactor(f64),
    #[error("Ya existe un archivo en {0}")]
    OutputExists(PathBuf),
    #[error("Error al procesar audio: {0}")]
    Processing(String),
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

/// Convierte `HH:MM:SS`, `MM:SS` o `SS` a milisegundos
pub fn parse_time(text: &str) -> Result<u64, EditError> {
    let invalid = || EditError::InvalidTime(text.to_string());

    let parts = text
        .trim()
        .split(':')
        .map(|part| part.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        [s] => (0, 0, *s),
        _ => return Err(invalid()),
    };

    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .and_then(|total| total.checked_mul(1000))
        .ok_or_else(invalid)
}

/// Ajusta el rango a la duración del clip; falla si queda vacío
pub fn clamp_range(start_ms: u64, end_ms: u64, duration_ms: u64) -> Result<(u64, u64), EditError> {
    let end_ms = end_ms.min(duration_ms);
    if start_ms >= end_ms {
        return Err(EditError::InvalidRange { start_ms, end_ms });
    }
    Ok((start_ms, end_ms))
}

/// Cadena de filtros `atempo` cuyo producto es `factor`.
///
/// Cada instancia de `atempo` sólo acepta valores entre 0.5 y 2.0.
pub fn atempo_chain(factor: f64) -> String {
    let mut stages = Vec::new();
    let mut remaining = factor;

    while remaining > 2.0 {
        stages.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={}", trim_float(remaining)));

    stages.join(",")
}

fn trim_float(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0');
    text.strip_suffix('.').map(|t| format!("{t}.0")).unwrap_or_else(|| text.to_string())
}

fn seconds_arg(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

fn validate_factor(factor: f64) -> Result<(), EditError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(EditError::InvalidFactor(factor));
    }
    Ok(())
}

/// Ediciones de archivo a archivo delegadas a `ffmpeg`.
///
/// La salida se escribe primero en un temporal junto al destino y sólo se
/// mueve al destino final si el proceso termina bien.
#[derive(Debug, Clone)]
pub struct AudioEditor {
    ffmpeg: String,
}

impl AudioEditor {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }

    /// Recorta `input` entre `start` y `end`
    pub async fn cut(&self, input: &Path, start: &str, end: &str, output: &Path) -> Result<PathBuf, EditError> {
        let start_ms = parse_time(start)?;
        let end_ms = parse_time(end)?;
        if start_ms >= end_ms {
            return Err(EditError::InvalidRange { start_ms, end_ms });
        }

        let source = input.to_path_buf();
        let duration_ms = tokio::task::spawn_blocking(move || probe_duration_ms(&source))
            .await
            .map_err(|e| EditError::Processing(e.to_string()))?
            .map_err(|e| EditError::Processing(e.to_string()))?;

        let (start_ms, end_ms) = clamp_range(start_ms, end_ms, duration_ms)?;
        info!("✂️ Cortando {} de {}ms a {}ms", input.display(), start_ms, end_ms);

        self.run(
            input,
            vec!["-ss".into(), seconds_arg(start_ms), "-to".into(), seconds_arg(end_ms)],
            output,
        )
        .await
    }

    /// Invierte el orden de las muestras
    pub async fn reverse(&self, input: &Path, output: &Path) -> Result<PathBuf, EditError> {
        info!("🔄 Invirtiendo {}", input.display());
        self.run(input, vec!["-af".into(), "areverse".into()], output).await
    }

    /// Cambia la velocidad sin bloquear el runtime
    pub async fn change_speed(&self, input: &Path, factor: f64, output: &Path) -> Result<PathBuf, EditError> {
        validate_factor(factor)?;
        info!("⏩ Cambiando velocidad de {} (factor {})", input.display(), factor);
        self.run(input, vec!["-filter:a".into(), atempo_chain(factor)], output).await
    }

    /// Igual que [`AudioEditor::change_speed`] pero esperando al proceso en
    /// el hilo actual
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn change_speed_blocking(&self, input: &Path, factor: f64, output: &Path) -> Result<PathBuf, EditError> {
        validate_factor(factor)?;
        let temp = temp_output(output)?;
        let args = self.arguments(input, vec!["-filter:a".into(), atempo_chain(factor)], temp.path());

        let result = std::process::Command::new(&self.ffmpeg).args(&args).output();
        finish(&self.ffmpeg, result, temp, output)
    }

    async fn run(&self, input: &Path, filters: Vec<String>, output: &Path) -> Result<PathBuf, EditError> {
        let temp = temp_output(output)?;
        let args = self.arguments(input, filters, temp.path());

        let result = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await;
        finish(&self.ffmpeg, result, temp, output)
    }

    fn arguments(&self, input: &Path, filters: Vec<String>, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nostdin", "-y", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());
        args.extend(filters.into_iter().map(OsString::from));
        args.push("-vn".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

/// Temporal en el directorio del destino y con su misma extensión, para que
/// ffmpeg elija el formato correcto y el `persist` sea un simple rename
fn temp_output(output: &Path) -> Result<NamedTempFile, EditError> {
    if output.exists() {
        return Err(EditError::OutputExists(output.to_path_buf()));
    }

    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let suffix = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    Ok(tempfile::Builder::new()
        .prefix(".soundhub-")
        .suffix(&suffix)
        .tempfile_in(dir)?)
}

fn finish(
    ffmpeg: &str,
    result: std::io::Result<Output>,
    temp: NamedTempFile,
    output: &Path,
) -> Result<PathBuf, EditError> {
    let out = result.map_err(|e| EditError::Processing(format!("no se pudo ejecutar {ffmpeg}: {e}")))?;

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        error!("Error FFmpeg ({}): {}", out.status, stderr);
        return Err(EditError::Processing(stderr));
    }

    temp.persist_noclobber(output).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            EditError::OutputExists(output.to_path_buf())
        } else {
            EditError::Io(e.error)
        }
    })?;

    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_parse_time_formats() {
        assert_eq!(parse_time("00:00:05").unwrap(), 5_000);
        assert_eq!(parse_time("1:02:03").unwrap(), 3_723_000);
        assert_eq!(parse_time("02:30").unwrap(), 150_000);
        assert_eq!(parse_time("42").unwrap(), 42_000);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        for bad in ["", "a:b", "1:2:3:4", "-5", "1.5"] {
            assert!(matches!(parse_time(bad), Err(EditError::InvalidTime(_))), "{bad}");
        }
    }

    #[test]
    fn test_parse_time_rejects_overflowing_offsets() {
        for huge in ["18446744073709551615", "5124095576030432:0:0", "0:307445734561825861:0"] {
            assert!(matches!(parse_time(huge), Err(EditError::InvalidTime(_))), "{huge}");
        }
        assert_eq!(parse_time("18446744073709551").unwrap(), 18_446_744_073_709_551_000);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(1_000, 60_000, 10_000).unwrap(), (1_000, 10_000));
        assert!(matches!(
            clamp_range(12_000, 20_000, 10_000),
            Err(EditError::InvalidRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_cut_with_end_before_start_fails() {
        let editor = AudioEditor::new("ffmpeg");
        let err = editor
            .cut(Path::new("no-importa.mp3"), "00:00:05", "00:00:02", Path::new("salida.mp3"))
            .await
            .unwrap_err();

        assert!(matches!(err, EditError::InvalidRange { start_ms: 5_000, end_ms: 2_000 }));
    }

    #[tokio::test]
    async fn test_speed_rejects_non_positive_factor() {
        let editor = AudioEditor::new("ffmpeg");
        for factor in [0.0, -1.5, f64::NAN] {
            let err = editor
                .change_speed(Path::new("in.mp3"), factor, Path::new("out.mp3"))
                .await
                .unwrap_err();
            assert!(matches!(err, EditError::InvalidFactor(_)));
        }
        assert!(matches!(
            editor.change_speed_blocking(Path::new("in.mp3"), 0.0, Path::new("out.mp3")),
            Err(EditError::InvalidFactor(_))
        ));
    }

    #[test]
    fn test_atempo_chain_stays_in_filter_range() {
        assert_eq!(atempo_chain(1.5), "atempo=1.5");
        assert_eq!(atempo_chain(2.0), "atempo=2.0");
        assert_eq!(atempo_chain(5.0), "atempo=2.0,atempo=2.0,atempo=1.25");
        assert_eq!(atempo_chain(0.25), "atempo=0.5,atempo=0.5");
    }

    #[test]
    fn test_blocking_failure_leaves_no_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("rapido.mp3");
        let editor = AudioEditor::new("/ruta/inexistente/ffmpeg");

        let err = editor
            .change_speed_blocking(&dir.path().join("in.mp3"), 1.5, &output)
            .unwrap_err();

        assert!(matches!(err, EditError::Processing(_)));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_async_failure_leaves_no_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("invertido.mp3");
        let editor = AudioEditor::new("/ruta/inexistente/ffmpeg");

        let err = editor.reverse(&dir.path().join("in.mp3"), &output).await.unwrap_err();

        assert!(matches!(err, EditError::Processing(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_refuses_existing_output() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("ya.mp3");
        std::fs::write(&output, b"x").unwrap();
        let editor = AudioEditor::new("ffmpeg");

        let err = editor.reverse(&dir.path().join("in.mp3"), &output).await.unwrap_err();
        assert!(matches!(err, EditError::OutputExists(_)));
    }
}
