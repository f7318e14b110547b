//! In-memory [PanelWriter] for tests

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;

use super::{PanelWriter, TransportError};
use crate::{color::Rgb8, PanelId};

/// Records every submitted write, in order
#[derive(Debug, Default)]
pub struct RecordingWriter {
    writes: Mutex<Vec<(PanelId, Rgb8)>>,
    closed: AtomicBool,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(PanelId, Rgb8)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_for(&self, panel: PanelId) -> Vec<Rgb8> {
        self.writes()
            .into_iter()
            .filter(|(p, _)| *p == panel)
            .map(|(_, color)| color)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanelWriter for RecordingWriter {
    fn submit(&self, panel: PanelId, color: Rgb8) {
        if !self.is_closed() {
            self.writes.lock().unwrap().push((panel, color));
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
