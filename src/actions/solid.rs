use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use super::ActionError;
use crate::{color::Color, transport::PanelWriter, PanelId};

/// Fill a set of panels with one color
///
/// Renders once when started; there is nothing to cancel on stop.
pub struct SolidFill {
    writer: Arc<dyn PanelWriter>,
    panels: Vec<PanelId>,
    color: Color,
    started: AtomicBool,
}

impl SolidFill {
    /// Create a new solid fill
    ///
    /// # Parameters
    ///
    /// * `writer`: destination of the panel writes
    /// * `panels`: panels to fill
    /// * `color`: fill color, which must be displayable
    pub fn new(
        writer: Arc<dyn PanelWriter>,
        panels: Vec<PanelId>,
        color: Color,
    ) -> Result<Self, ActionError> {
        Ok(Self {
            writer,
            panels,
            color: color.validated()?,
            started: AtomicBool::new(false),
        })
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }

    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let rgb = self.color.to_rgb8();
        for &panel in &self.panels {
            trace!(panel = %panel, color = %self.color, "fill panel");
            self.writer.submit(panel, rgb);
        }
    }
}

impl fmt::Debug for SolidFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolidFill")
            .field("panels", &self.panels)
            .field("color", &self.color.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        color::{ColorError, Rgb8},
        transport::recording::RecordingWriter,
    };

    #[test]
    fn reject_undisplayable_color() {
        let writer = Arc::new(RecordingWriter::new());
        let result = SolidFill::new(writer, vec![1], Color::new(1.2, 0., 0.));

        assert!(matches!(
            result,
            Err(ActionError::Color(ColorError::OutOfRange(_)))
        ));
    }

    #[test]
    fn every_panel_gets_one_write() {
        for panels in vec![vec![], vec![1], vec![3, 1, 2], (1..=40).collect::<Vec<_>>()] {
            let writer = Arc::new(RecordingWriter::new());
            let fill = SolidFill::new(writer.clone(), panels.clone(), Color::new(1., 0.5, 0.))
                .unwrap();

            fill.start();

            let writes = writer.writes();
            assert_eq!(writes.len(), panels.len());
            for (&(panel, color), &expected) in writes.iter().zip(panels.iter()) {
                assert_eq!(panel, expected);
                assert_eq!(color, Rgb8::new(255, 128, 0));
            }
        }
    }
}
