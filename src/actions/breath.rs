use std::{fmt, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::ActionError;
use crate::{
    color::Color,
    task::{Task, TaskError},
    transport::PanelWriter,
    PanelId,
};

/// Delay between two rendered frames
pub const BREATH_TICK: Duration = Duration::from_millis(50);

/// Number of frames per second of breath duration
pub const FRAMES_PER_SECOND: u32 = 20;

#[derive(Debug, Clone, Copy)]
struct GradientStop {
    color: Color,
    position: f64,
}

/// Piecewise gradient, blended in HCL space between consecutive stops
#[derive(Debug, Clone)]
struct Gradient(Vec<GradientStop>);

impl Gradient {
    /// Ramp from `from` to `to`, hold, and ramp back
    fn pulse(from: Color, to: Color) -> Self {
        Self(vec![
            GradientStop {
                color: from,
                position: 0.0,
            },
            GradientStop {
                color: to,
                position: 0.2,
            },
            GradientStop {
                color: to,
                position: 0.8,
            },
            GradientStop {
                color: from,
                position: 1.0,
            },
        ])
    }

    fn color_at(&self, t: f64) -> Color {
        for pair in self.0.windows(2) {
            let (a, b) = (pair[0], pair[1]);

            if a.position <= t && t <= b.position {
                let local = (t - a.position) / (b.position - a.position);
                return a.color.blend_hcl(b.color, local as f32);
            }
        }

        // Outside of the gradient (or NaN)
        self.0.last().map(|stop| stop.color).unwrap_or_default()
    }
}

/// Sample the pulse gradient over `seconds * FRAMES_PER_SECOND` steps, highest position
/// first, so the sequence goes `from`, `to`, hold, back to `from`.
fn precompute_frames(from: Color, to: Color, seconds: u32) -> Vec<Color> {
    let gradient = Gradient::pulse(from, to);
    let steps = seconds * FRAMES_PER_SECOND;

    (0..=steps)
        .rev()
        .map(|step| {
            if steps == 0 {
                gradient.color_at(0.)
            } else {
                gradient.color_at(step as f64 / steps as f64)
            }
        })
        .collect()
}

#[derive(Debug)]
enum Lifecycle {
    Idle,
    Running(Task),
    Stopped,
}

/// Continuous breathing pulse between two colors
///
/// Frames are computed once at construction. Once started, a background loop renders
/// one frame every [BREATH_TICK] and wraps around after the last one.
pub struct Breath {
    writer: Arc<dyn PanelWriter>,
    panels: Arc<[PanelId]>,
    frames: Arc<[Color]>,
    state: Mutex<Lifecycle>,
}

impl Breath {
    /// Create a new breath animation
    ///
    /// # Parameters
    ///
    /// * `writer`: destination of the panel writes
    /// * `panels`: panels to animate
    /// * `from`: resting color, first and last frame of a cycle
    /// * `to`: peak color
    /// * `seconds`: duration of one cycle
    pub fn new(
        writer: Arc<dyn PanelWriter>,
        panels: Vec<PanelId>,
        from: Color,
        to: Color,
        seconds: u32,
    ) -> Result<Self, ActionError> {
        let from = from.validated()?;
        let to = to.validated()?;

        Ok(Self {
            writer,
            panels: panels.into(),
            frames: precompute_frames(from, to, seconds).into(),
            state: Mutex::new(Lifecycle::Idle),
        })
    }

    pub fn frames(&self) -> &[Color] {
        &self.frames
    }

    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }

    pub async fn start(&self) {
        let mut state = self.state.lock().await;

        if let Lifecycle::Idle = *state {
            let writer = self.writer.clone();
            let panels = self.panels.clone();
            let frames = self.frames.clone();

            *state = Lifecycle::Running(Task::spawn("breath", move |token| {
                animate(writer, panels, frames, token)
            }));
        }
    }

    /// Stop the animation loop
    ///
    /// Concurrent calls are serialized. If the loop does not exit within `deadline`, it
    /// stays cancelled and a later call waits for it again.
    pub async fn stop(&self, deadline: Duration) -> Result<(), TaskError> {
        let mut state = self.state.lock().await;

        match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Running(mut task) => {
                let result = task.stop(deadline).await;
                if result.is_err() {
                    *state = Lifecycle::Running(task);
                }
                result
            }
            Lifecycle::Idle | Lifecycle::Stopped => Ok(()),
        }
    }
}

impl fmt::Debug for Breath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breath")
            .field("panels", &self.panels)
            .field("frames", &self.frames.len())
            .finish()
    }
}

async fn animate(
    writer: Arc<dyn PanelWriter>,
    panels: Arc<[PanelId]>,
    frames: Arc<[Color]>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(BREATH_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut position = 0;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                if position >= frames.len() {
                    position = 0;
                }

                let color = frames[position];
                trace!(position = %position, color = %color, "tick");

                let rgb = color.to_rgb8();
                for &panel in panels.iter() {
                    writer.submit(panel, rgb);
                }

                position += 1;
            }
        }
    }

    debug!(position = %position, "breath stopped");
}
