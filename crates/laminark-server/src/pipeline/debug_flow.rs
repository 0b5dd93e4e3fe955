// crates/laminark-server/src/pipeline/debug_flow.rs
// Debug-path state machine: idle -> potential -> active -> resolved

use super::classifier::DebugSignal;
use crate::config::file::DebugFlowConfig;
use crate::db::{DebugPathStore, WaypointType};
use chrono::{DateTime, Duration, Utc};

/// Signals below this confidence are noise
const MIN_SIGNAL_CONFIDENCE: f64 = 0.3;

/// Sliding window for error accumulation in the potential state
const ERROR_WINDOW_MINUTES: i64 = 5;

/// A buffered error awaiting path activation
#[derive(Debug, Clone)]
struct BufferedError {
    at: DateTime<Utc>,
    observation_id: String,
    content: String,
}

/// Machine state as a tagged union; transition effects go through the store.
enum FlowState {
    Idle,
    Potential { errors: Vec<BufferedError> },
    Active { path_id: String, resolution_streak: u32 },
    Resolved,
}

/// Effects emitted by a transition, for notifications and logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    PathStarted { path_id: String },
    WaypointAdded { path_id: String },
    PathResolved { path_id: String },
}

pub struct DebugFlow {
    state: FlowState,
    store: DebugPathStore,
    config: DebugFlowConfig,
}

impl DebugFlow {
    /// Recover machine state from the repository: an existing active path
    /// resumes `active_debug` with zero counters.
    pub fn recover(store: DebugPathStore, config: DebugFlowConfig) -> crate::Result<Self> {
        let state = match store.active_path()? {
            Some(path) => {
                tracing::info!("Resuming active debug path {}", path.id);
                FlowState::Active { path_id: path.id, resolution_streak: 0 }
            }
            None => FlowState::Idle,
        };
        Ok(Self { state, store, config })
    }

    /// Feed one classified observation through the machine.
    pub fn handle(
        &mut self,
        signal: &DebugSignal,
        observation_id: &str,
        content: &str,
    ) -> crate::Result<Option<FlowEvent>> {
        if signal.confidence < MIN_SIGNAL_CONFIDENCE {
            return Ok(None);
        }
        if !signal.is_error && !signal.is_resolution && signal.waypoint_hint.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        match &mut self.state {
            FlowState::Idle | FlowState::Resolved => {
                if signal.is_error {
                    self.state = FlowState::Potential {
                        errors: vec![BufferedError {
                            at: now,
                            observation_id: observation_id.to_string(),
                            content: content.to_string(),
                        }],
                    };
                    // A single error may already satisfy a lowered threshold
                    return self.maybe_activate();
                }
                Ok(None)
            }
            FlowState::Potential { errors } => {
                if !signal.is_error {
                    return Ok(None);
                }
                let window_start = now - Duration::minutes(ERROR_WINDOW_MINUTES);
                errors.retain(|e| e.at >= window_start);
                errors.push(BufferedError {
                    at: now,
                    observation_id: observation_id.to_string(),
                    content: content.to_string(),
                });
                self.maybe_activate()
            }
            FlowState::Active { path_id, resolution_streak } => {
                let path_id = path_id.clone();
                let waypoint_type = signal.waypoint_hint.unwrap_or(if signal.is_error {
                    WaypointType::Error
                } else if signal.is_resolution {
                    WaypointType::Success
                } else {
                    WaypointType::Failure
                });
                let added = self
                    .store
                    .append_waypoint(&path_id, waypoint_type, content, Some(observation_id))?
                    .is_some();

                if signal.is_resolution {
                    *resolution_streak += 1;
                    if *resolution_streak >= self.config.resolutions_to_close {
                        self.store.resolve(&path_id)?;
                        self.state = FlowState::Resolved;
                        return Ok(Some(FlowEvent::PathResolved { path_id }));
                    }
                } else if signal.is_error {
                    *resolution_streak = 0;
                }

                Ok(added.then_some(FlowEvent::WaypointAdded { path_id }))
            }
        }
    }

    /// Promote potential -> active once enough errors landed in the window.
    fn maybe_activate(&mut self) -> crate::Result<Option<FlowEvent>> {
        let FlowState::Potential { errors } = &self.state else {
            return Ok(None);
        };
        if (errors.len() as u32) < self.config.errors_to_activate {
            return Ok(None);
        }

        let buffered = errors.clone();
        let path = self.store.create()?;
        for error in &buffered {
            self.store.append_waypoint(
                &path.id,
                WaypointType::Error,
                &error.content,
                Some(&error.observation_id),
            )?;
        }
        let path_id = path.id.clone();
        self.state = FlowState::Active { path_id: path.id, resolution_streak: 0 };
        tracing::info!("Debug path {} activated after {} errors", path_id, buffered.len());
        Ok(Some(FlowEvent::PathStarted { path_id }))
    }

    /// True while a path is being tracked.
    pub fn is_active(&self) -> bool {
        matches!(self.state, FlowState::Active { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::Arc;

    fn flow() -> DebugFlow {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = DebugPathStore::new(db, "testhash00000000");
        DebugFlow::recover(store, DebugFlowConfig::default()).unwrap()
    }

    fn error_signal(confidence: f64) -> DebugSignal {
        DebugSignal {
            is_error: true,
            is_resolution: false,
            waypoint_hint: Some(WaypointType::Error),
            confidence,
        }
    }

    fn resolution_signal() -> DebugSignal {
        DebugSignal {
            is_error: false,
            is_resolution: true,
            waypoint_hint: None,
            confidence: 0.9,
        }
    }

    fn drive_to_active(flow: &mut DebugFlow) -> String {
        let mut path_id = None;
        for i in 0..3 {
            let event = flow
                .handle(&error_signal(0.9), &format!("obs{i}"), &format!("error {i}"))
                .unwrap();
            if let Some(FlowEvent::PathStarted { path_id: id }) = event {
                path_id = Some(id);
            }
        }
        path_id.expect("three errors must activate a path")
    }

    #[test]
    fn low_confidence_signals_are_dropped() {
        let mut flow = flow();
        for i in 0..10 {
            let event = flow
                .handle(&error_signal(0.2), &format!("obs{i}"), "error")
                .unwrap();
            assert!(event.is_none());
        }
        assert!(!flow.is_active());
    }

    #[test]
    fn three_errors_activate_with_buffered_waypoints() {
        let mut flow = flow();
        let path_id = drive_to_active(&mut flow);
        assert!(flow.is_active());

        let waypoints = flow.store.waypoints(&path_id).unwrap();
        assert_eq!(waypoints.len(), 3);
        for (i, w) in waypoints.iter().enumerate() {
            assert_eq!(w.sequence_order, i as i64 + 1);
            assert_eq!(w.waypoint_type, WaypointType::Error);
        }
        let path = flow.store.get(&path_id).unwrap().unwrap();
        assert_eq!(path.status, "active");
    }

    #[test]
    fn three_resolutions_close_the_path() {
        let mut flow = flow();
        let path_id = drive_to_active(&mut flow);

        assert!(flow.handle(&resolution_signal(), "r1", "fixed part one").unwrap().is_some());
        assert!(flow.handle(&resolution_signal(), "r2", "fixed part two").unwrap().is_some());
        let event = flow.handle(&resolution_signal(), "r3", "all green").unwrap();
        assert_eq!(event, Some(FlowEvent::PathResolved { path_id: path_id.clone() }));

        let path = flow.store.get(&path_id).unwrap().unwrap();
        assert_eq!(path.status, "resolved");
        assert!(path.resolved_at.is_some());
        assert!(!flow.is_active());
    }

    #[test]
    fn error_resets_resolution_streak() {
        let mut flow = flow();
        let path_id = drive_to_active(&mut flow);

        flow.handle(&resolution_signal(), "r1", "maybe fixed").unwrap();
        flow.handle(&resolution_signal(), "r2", "looking good").unwrap();
        // An error interrupts the streak
        flow.handle(&error_signal(0.9), "e4", "nope, still broken").unwrap();
        flow.handle(&resolution_signal(), "r3", "fixed").unwrap();
        flow.handle(&resolution_signal(), "r4", "fixed again").unwrap();

        let path = flow.store.get(&path_id).unwrap().unwrap();
        assert_eq!(path.status, "active", "streak must restart after an error");
    }

    #[test]
    fn resolved_restarts_on_new_error() {
        let mut flow = flow();
        let first = drive_to_active(&mut flow);
        for i in 0..3 {
            flow.handle(&resolution_signal(), &format!("r{i}"), "fixed").unwrap();
        }
        assert!(!flow.is_active());

        let second = drive_to_active(&mut flow);
        assert_ne!(first, second, "a fresh path must open for the new episode");
    }

    #[test]
    fn recovery_resumes_active_path() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = DebugPathStore::new(db.clone(), "testhash00000000");
        let existing = store.create().unwrap();

        let recovered = DebugFlow::recover(
            DebugPathStore::new(db, "testhash00000000"),
            DebugFlowConfig::default(),
        )
        .unwrap();
        assert!(recovered.is_active());

        let mut recovered = recovered;
        recovered.handle(&error_signal(0.9), "obs", "another failure").unwrap();
        let waypoints = recovered.store.waypoints(&existing.id).unwrap();
        assert_eq!(waypoints.len(), 1, "waypoints land on the recovered path");
    }

    #[test]
    fn resolutions_in_idle_are_ignored() {
        let mut flow = flow();
        for i in 0..5 {
            assert!(flow
                .handle(&resolution_signal(), &format!("r{i}"), "fixed")
                .unwrap()
                .is_none());
        }
        assert!(!flow.is_active());
    }
}
