//! Panel groups and status-driven action transitions
//!
//! The registry owns one [PanelGroup] per configured thing. Each group sits behind its own
//! lock, so transitions on one group are strictly sequential (the previous action is fully
//! stopped before the next one starts) while different groups transition independently.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{
    actions::{Action, ActionError, SolidFill},
    color::{Color, ColorError},
    models::{StatusConfig, StatusType, ThingConfig},
    transport::PanelWriter,
    PanelId,
};

/// Deadline for stopping the current action of a group during a status transition
pub const TRANSITION_STOP_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("panel {panel} is assigned to both '{first}' and '{second}'")]
    DuplicatePanel {
        panel: PanelId,
        first: String,
        second: String,
    },
    #[error("no panel group for thing '{0}'")]
    NotFound(String),
    #[error("unknown status '{0}'")]
    UnknownStatus(String),
    #[error("status '{status}' has unsupported type '{ty}'")]
    UnsupportedStatusType { status: String, ty: String },
    #[error("invalid color for {location}: {source}")]
    InvalidColor {
        location: String,
        #[source]
        source: ColorError,
    },
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Status currently rendered by a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Panels of one thing, with the action currently rendering them
#[derive(Debug)]
pub struct PanelGroup {
    name: String,
    panels: Vec<PanelId>,
    on_start: Option<String>,
    on_stop: Option<String>,
    state: GroupState,
    action: Action,
}

impl PanelGroup {
    fn new(name: &str, config: &ThingConfig) -> Self {
        Self {
            name: name.to_owned(),
            panels: config.panels.clone(),
            on_start: config.on_start().map(str::to_owned),
            on_stop: config.on_stop().map(str::to_owned),
            state: GroupState {
                status: String::new(),
                updated_at: Utc::now(),
            },
            action: Action::NoOp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }
}

pub struct Registry {
    writer: Arc<dyn PanelWriter>,
    statuses: BTreeMap<String, StatusConfig>,
    groups: BTreeMap<String, Mutex<PanelGroup>>,
}

impl Registry {
    /// Build one panel group per thing, each rendering nothing yet
    ///
    /// Fails if a panel is assigned to more than one thing.
    pub fn new(
        things: &BTreeMap<String, ThingConfig>,
        statuses: BTreeMap<String, StatusConfig>,
        writer: Arc<dyn PanelWriter>,
    ) -> Result<Self, RegistryError> {
        let mut owners: HashMap<PanelId, &str> = HashMap::new();

        for (name, thing) in things {
            for &panel in &thing.panels {
                if let Some(first) = owners.insert(panel, name) {
                    return Err(RegistryError::DuplicatePanel {
                        panel,
                        first: first.to_owned(),
                        second: name.clone(),
                    });
                }
            }
        }

        let groups = things
            .iter()
            .map(|(name, thing)| (name.clone(), Mutex::new(PanelGroup::new(name, thing))))
            .collect();

        Ok(Self {
            writer,
            statuses,
            groups,
        })
    }

    pub fn knows_thing(&self, thing: &str) -> bool {
        self.groups.contains_key(thing)
    }

    pub fn knows_status(&self, status: &str) -> bool {
        self.statuses.contains_key(status)
    }

    pub fn things(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub async fn state(&self, thing: &str) -> Option<GroupState> {
        match self.groups.get(thing) {
            Some(group) => Some(group.lock().await.state.clone()),
            None => None,
        }
    }

    /// Name of the action currently active on a thing's panels
    pub async fn action_name(&self, thing: &str) -> Option<&'static str> {
        match self.groups.get(thing) {
            Some(group) => Some(group.lock().await.action.name()),
            None => None,
        }
    }

    fn fill(&self, location: String, hex: &str, panels: &[PanelId]) -> Result<Action, RegistryError> {
        let color = Color::from_hex(hex)
            .map_err(|source| RegistryError::InvalidColor { location, source })?;

        Ok(Action::SolidFill(SolidFill::new(
            self.writer.clone(),
            panels.to_vec(),
            color,
        )?))
    }

    fn action_for_status(&self, status: &str, panels: &[PanelId]) -> Result<Action, RegistryError> {
        let config = self
            .statuses
            .get(status)
            .ok_or_else(|| RegistryError::UnknownStatus(status.to_owned()))?;

        match config.status_type() {
            Some(StatusType::Solid) => {
                self.fill(format!("status '{}'", status), &config.color, panels)
            }
            None => Err(RegistryError::UnsupportedStatusType {
                status: status.to_owned(),
                ty: config.ty.clone(),
            }),
        }
    }

    /// Paint the `onstart` color of every group that has one
    pub async fn start_all(&self) -> Result<(), RegistryError> {
        for group in self.groups.values() {
            let mut group = group.lock().await;

            if let Some(on_start) = group.on_start.clone() {
                let action =
                    self.fill(format!("thing '{}' onstart", group.name), &on_start, &group.panels)?;

                group.action.stop(TRANSITION_STOP_DEADLINE).await?;
                action.start().await?;
                group.action = action;

                debug!(thing = %group.name, color = %on_start, "started thing");
            }
        }

        Ok(())
    }

    /// Stop the action of every group, then paint its `onstop` color if it has one
    ///
    /// Stops at the first failure.
    pub async fn stop_all(&self, deadline: Duration) -> Result<(), RegistryError> {
        for group in self.groups.values() {
            let mut group = group.lock().await;

            group.action.stop(deadline).await?;

            if let Some(on_stop) = group.on_stop.clone() {
                let action =
                    self.fill(format!("thing '{}' onstop", group.name), &on_stop, &group.panels)?;
                action.start().await?;
                group.action = action;
            }

            debug!(thing = %group.name, "stopped thing");
        }

        Ok(())
    }

    /// Render `status` on the panels of `thing`
    ///
    /// Reporting the status a group already renders does nothing. Otherwise the current
    /// action is stopped before the new one starts; if anything fails on the way, the
    /// error is returned and the group keeps its previous (stopped) action and status.
    #[instrument(skip(self))]
    pub async fn update_thing(&self, thing: &str, status: &str) -> Result<(), RegistryError> {
        let group = self
            .groups
            .get(thing)
            .ok_or_else(|| RegistryError::NotFound(thing.to_owned()))?;

        let mut group = group.lock().await;

        if group.state.status == status {
            debug!("thing already has this status");
            return Ok(());
        }

        group.action.stop(TRANSITION_STOP_DEADLINE).await?;

        let action = self.action_for_status(status, &group.panels)?;
        action.start().await?;

        group.action = action;
        group.state = GroupState {
            status: status.to_owned(),
            updated_at: Utc::now(),
        };

        info!(action = group.action.name(), "updated thing");
        Ok(())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("things", &self.groups.keys().collect::<Vec<_>>())
            .field("statuses", &self.statuses.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{color::Rgb8, transport::recording::RecordingWriter};

    pub(crate) fn thing(panels: &[PanelId], onstart: Option<&str>, onstop: Option<&str>) -> ThingConfig {
        ThingConfig {
            panels: panels.to_vec(),
            onstart: onstart.map(str::to_owned),
            onstop: onstop.map(str::to_owned),
        }
    }

    pub(crate) fn status(color: &str, ty: &str) -> StatusConfig {
        StatusConfig {
            color: color.to_owned(),
            ty: ty.to_owned(),
        }
    }

    fn registry(writer: Arc<RecordingWriter>) -> Registry {
        let mut things = BTreeMap::new();
        things.insert("lb".to_owned(), thing(&[1, 2], Some("#0000ff"), Some("#000000")));
        things.insert("db".to_owned(), thing(&[3], None, None));

        let mut statuses = BTreeMap::new();
        statuses.insert("ok".to_owned(), status("#00ff00", "solid"));
        statuses.insert("down".to_owned(), status("#ff0000", "solid"));
        statuses.insert("weird".to_owned(), status("#ffffff", "sparkle"));
        statuses.insert("broken".to_owned(), status("#nothex", "solid"));

        Registry::new(&things, statuses, writer).unwrap()
    }

    #[test]
    fn reject_duplicate_panels() {
        let mut things = BTreeMap::new();
        things.insert("a".to_owned(), thing(&[1, 2], None, None));
        things.insert("b".to_owned(), thing(&[3, 2], None, None));

        let err = Registry::new(&things, BTreeMap::new(), Arc::new(RecordingWriter::new()))
            .unwrap_err();

        match err {
            RegistryError::DuplicatePanel { panel, first, second } => {
                assert_eq!(panel, 2);
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn groups_start_with_noop() {
        let registry = registry(Arc::new(RecordingWriter::new()));

        assert_eq!(registry.action_name("lb").await, Some("no_op"));
        assert_eq!(registry.state("lb").await.unwrap().status, "");
        assert_eq!(registry.things().collect::<Vec<_>>(), vec!["db", "lb"]);
        assert!(registry.knows_thing("db"));
        assert!(!registry.knows_thing("cache"));
        assert!(registry.knows_status("ok"));
        assert!(!registry.knows_status("meh"));
    }

    #[tokio::test]
    async fn update_renders_status() {
        let writer = Arc::new(RecordingWriter::new());
        let registry = registry(writer.clone());

        registry.update_thing("lb", "ok").await.unwrap();

        assert_eq!(writer.writes_for(1), vec![Rgb8::new(0, 255, 0)]);
        assert_eq!(writer.writes_for(2), vec![Rgb8::new(0, 255, 0)]);
        assert!(writer.writes_for(3).is_empty());
        assert_eq!(registry.state("lb").await.unwrap().status, "ok");
        assert_eq!(registry.action_name("lb").await, Some("solid_fill"));
    }

    #[tokio::test]
    async fn duplicate_status_is_ignored() {
        let writer = Arc::new(RecordingWriter::new());
        let registry = registry(writer.clone());

        registry.update_thing("lb", "ok").await.unwrap();
        let updated_at = registry.state("lb").await.unwrap().updated_at;

        registry.update_thing("lb", "ok").await.unwrap();

        assert_eq!(writer.len(), 2);
        assert_eq!(registry.state("lb").await.unwrap().updated_at, updated_at);

        registry.update_thing("lb", "down").await.unwrap();
        assert_eq!(writer.len(), 4);
        assert_eq!(writer.writes_for(1).last(), Some(&Rgb8::new(255, 0, 0)));
    }

    #[tokio::test]
    async fn update_errors() {
        let writer = Arc::new(RecordingWriter::new());
        let registry = registry(writer.clone());

        registry.update_thing("lb", "ok").await.unwrap();

        assert!(matches!(
            registry.update_thing("cache", "ok").await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.update_thing("lb", "meh").await,
            Err(RegistryError::UnknownStatus(_))
        ));
        assert!(matches!(
            registry.update_thing("lb", "weird").await,
            Err(RegistryError::UnsupportedStatusType { .. })
        ));
        assert!(matches!(
            registry.update_thing("lb", "broken").await,
            Err(RegistryError::InvalidColor { .. })
        ));

        // The group keeps its previous status, and nothing else was rendered
        assert_eq!(registry.state("lb").await.unwrap().status, "ok");
        assert_eq!(registry.action_name("lb").await, Some("solid_fill"));
        assert_eq!(writer.len(), 2);
    }

    #[tokio::test]
    async fn start_and_stop_all() {
        let writer = Arc::new(RecordingWriter::new());
        let registry = registry(writer.clone());

        registry.start_all().await.unwrap();
        assert_eq!(writer.writes_for(1), vec![Rgb8::new(0, 0, 255)]);
        assert_eq!(writer.writes_for(2), vec![Rgb8::new(0, 0, 255)]);
        assert!(writer.writes_for(3).is_empty());
        assert_eq!(registry.action_name("db").await, Some("no_op"));

        // onstart does not count as a status
        assert_eq!(registry.state("lb").await.unwrap().status, "");

        writer.clear();
        registry.update_thing("db", "down").await.unwrap();
        registry.stop_all(Duration::from_secs(1)).await.unwrap();

        assert_eq!(writer.writes_for(1), vec![Rgb8::new(0, 0, 0)]);
        assert_eq!(writer.writes_for(3), vec![Rgb8::new(255, 0, 0)]);
    }

    #[tokio::test]
    async fn groups_update_concurrently() {
        let writer = Arc::new(RecordingWriter::new());
        let registry = registry(writer.clone());

        let (a, b) = tokio::join!(
            registry.update_thing("lb", "ok"),
            registry.update_thing("db", "down")
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(writer.len(), 3);
    }
}
