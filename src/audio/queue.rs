use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Cantidad de entradas mostradas en la vista de la cola
pub const QUEUE_PAGE_SIZE: usize = 10;

/// Estado de reproducción de un guild.
///
/// Guarda sólo nombres de entradas del catálogo; la resolución a archivo se
/// hace al momento de reproducir para que renombres y borrados se respeten.
#[derive(Debug, Default)]
pub struct GuildPlaybackState {
    queue: VecDeque<String>,
    current: Option<String>,
    loop_enabled: bool,
    ticket: Option<u64>,
}

impl GuildPlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega al final y devuelve la posición (desde 1)
    pub fn push(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        debug!("➕ Agregado a la cola: {}", name);
        self.queue.push_back(name);
        self.queue.len()
    }

    /// Saca la cabeza de la cola (FIFO)
    pub fn pop_next(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    /// Con repetición activa, la entrada iniciada vuelve al final
    pub fn requeue_if_looping(&mut self, name: &str) {
        if self.loop_enabled {
            self.queue.push_back(name.to_string());
            debug!("🔁 {} vuelve al final por repetición", name);
        }
    }

    /// Elimina la entrada en `position` (desde 1)
    pub fn remove_at(&mut self, position: usize) -> Option<String> {
        if position == 0 {
            return None;
        }
        let removed = self.queue.remove(position - 1);
        if let Some(ref name) = removed {
            debug!("❌ {} eliminado de la posición {}", name, position);
        }
        removed
    }

    /// Vacía la cola sin tocar lo que suena; devuelve cuántas se quitaron
    pub fn clear(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        info!("🗑️ Cola limpiada ({} entradas)", count);
        count
    }

    /// Mezcla la cola en su lugar
    pub fn shuffle(&mut self) {
        self.queue.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.loop_enabled = !self.loop_enabled;
        if self.loop_enabled {
            info!("🔁 Repetir cola activado");
        } else {
            info!("➡️ Repetición desactivada");
        }
        self.loop_enabled
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn ticket(&self) -> Option<u64> {
        self.ticket
    }

    /// Marca `name` como la entrada en curso bajo el ticket dado
    pub fn set_current(&mut self, name: String, ticket: u64) {
        self.current = Some(name);
        self.ticket = Some(ticket);
    }

    /// Olvida la entrada en curso; las finalizaciones pendientes quedan obsoletas
    pub fn clear_current(&mut self) -> Option<String> {
        self.ticket = None;
        self.current.take()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            upcoming: self.queue.iter().cloned().collect(),
            loop_enabled: self.loop_enabled,
        }
    }
}

/// Vista inmutable de la cola para mostrar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current: Option<String>,
    pub upcoming: Vec<String>,
    pub loop_enabled: bool,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.upcoming.is_empty()
    }

    /// Primeras entradas y cuántas quedan fuera de la vista
    pub fn first_page(&self) -> (&[String], usize) {
        let shown = self.upcoming.len().min(QUEUE_PAGE_SIZE);
        (&self.upcoming[..shown], self.upcoming.len() - shown)
    }
}
