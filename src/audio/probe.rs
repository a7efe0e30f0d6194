use std::path::Path;
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("No se pudo abrir {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("Formato no reconocido: {0}")]
    Format(#[from] symphonia::core::errors::Error),
    #[error("El archivo no declara su duración")]
    UnknownDuration,
}

/// Calcula la duración de un clip en milisegundos a partir de los metadatos
/// del contenedor, sin decodificar las muestras.
pub fn probe_duration_ms(path: &Path) -> Result<u64, ProbeError> {
    let file = std::fs::File::open(path).map_err(|source| ProbeError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let track = probed
        .format
        .default_track()
        .ok_or(ProbeError::UnknownDuration)?;
    let params = &track.codec_params;
    let frames = params.n_frames.ok_or(ProbeError::UnknownDuration)?;

    let duration_ms = if let Some(time_base) = params.time_base {
        let time = time_base.calc_time(frames);
        time.seconds * 1000 + (time.frac * 1000.0).round() as u64
    } else if let Some(rate) = params.sample_rate.filter(|r| *r > 0) {
        frames * 1000 / u64::from(rate)
    } else {
        return Err(ProbeError::UnknownDuration);
    };

    debug!("⏱️ Duración de {}: {}ms", path.display(), duration_ms);
    Ok(duration_ms)
}

/// Variante asíncrona: el sondeo es bloqueante y corre en el pool de bloqueo.
/// Los fallos se registran y se devuelven como `None`.
pub async fn probe_duration_ms_async(path: &Path) -> Option<u64> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || probe_duration_ms(&owned)).await {
        Ok(Ok(ms)) => Some(ms),
        Ok(Err(e)) => {
            warn!("No se pudo obtener la duración de {}: {}", path.display(), e);
            None
        }
        Err(e) => {
            warn!("Tarea de sondeo abortada para {}: {}", path.display(), e);
            None
        }
    }
}
