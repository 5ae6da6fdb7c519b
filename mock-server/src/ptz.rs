//! PTZ motion state per profile
//!
//! Each profile with a PTZ configuration gets an entry holding its per-axis
//! moving flags, last position, presets and the timer of a timed continuous
//! move. Absolute and relative moves are instantaneous: the clamped target
//! becomes the position right away and any continuous motion ends.
//!
//! A timed continuous move spawns a task that clears the moving flags when
//! the timeout elapses. Every later move bumps the entry's generation and
//! aborts the task, so a stale timer never stops a newer motion.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use onvif_api::types::ptz::{
    ContinuousMoveRequest, MoveState, Preset, PtzConfiguration, PtzStatus, SetPresetRequest, StopRequest,
};
use onvif_api::PtzVector;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::{Result, ServerError};
use crate::model::DeviceModel;

/// Which axes are currently moving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionFlags {
    pub pan: bool,
    pub tilt: bool,
    pub zoom: bool,
}

impl MotionFlags {
    pub fn is_idle(&self) -> bool {
        !(self.pan || self.tilt || self.zoom)
    }

    pub fn pan_tilt(&self) -> bool {
        self.pan || self.tilt
    }
}

/// Point-in-time copy of a profile's PTZ state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtzSnapshot {
    pub moving: MotionFlags,
    /// Every component is present
    pub position: PtzVector,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug)]
struct PtzEntry {
    moving: MotionFlags,
    position: PtzVector,
    last_update: DateTime<Utc>,
    presets: Vec<Preset>,
    next_preset: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl PtzEntry {
    fn new(config: &PtzConfiguration, now: DateTime<Utc>) -> Self {
        let home = PtzVector::pan_tilt(0.0, 0.0).with_zoom(config.limits.zoom.min);
        Self {
            moving: MotionFlags::default(),
            position: config.limits.clamp(home),
            last_update: now,
            presets: Vec::new(),
            next_preset: 1,
            generation: 0,
            timer: None,
        }
    }

    /// Invalidate any pending timer.
    fn supersede(&mut self) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
        self.generation
    }

    /// Jump to `target`, keeping the current value of absent components.
    fn move_to(&mut self, config: &PtzConfiguration, target: PtzVector, now: DateTime<Utc>) -> PtzVector {
        self.supersede();
        let merged = PtzVector {
            pan: target.pan.or(self.position.pan),
            tilt: target.tilt.or(self.position.tilt),
            zoom: target.zoom.or(self.position.zoom),
        };
        self.position = config.limits.clamp(merged);
        self.moving = MotionFlags::default();
        self.last_update = now;
        self.position
    }

    fn snapshot(&self) -> PtzSnapshot {
        PtzSnapshot {
            moving: self.moving,
            position: self.position,
            last_update: self.last_update,
        }
    }
}

fn state_of(moving: bool) -> MoveState {
    if moving {
        MoveState::Moving
    } else {
        MoveState::Idle
    }
}

#[derive(Debug)]
pub struct PtzController {
    model: Arc<DeviceModel>,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, Arc<Mutex<PtzEntry>>>>,
}

impl PtzController {
    pub fn new(model: Arc<DeviceModel>, clock: Arc<dyn Clock>) -> Self {
        Self {
            model,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration and state entry of `profile`, creating the entry on
    /// first use.
    fn resolve(&self, profile: &str) -> Result<(PtzConfiguration, Arc<Mutex<PtzEntry>>)> {
        let config = self.model.ptz_configuration_for(profile)?;
        let entry = self
            .entries
            .lock()
            .entry(profile.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(PtzEntry::new(&config, self.clock.now()))))
            .clone();
        Ok((config, entry))
    }

    /// Start moving every axis with a non-zero velocity. A zero component
    /// stops its axis; an absent one leaves it alone.
    pub fn continuous_move(&self, request: &ContinuousMoveRequest) -> Result<MotionFlags> {
        let (_, entry) = self.resolve(&request.profile_token)?;
        let mut state = entry.lock();
        let generation = state.supersede();

        let velocity = request.velocity;
        if let Some(pan) = velocity.pan {
            state.moving.pan = pan != 0.0;
        }
        if let Some(tilt) = velocity.tilt {
            state.moving.tilt = tilt != 0.0;
        }
        if let Some(zoom) = velocity.zoom {
            state.moving.zoom = zoom != 0.0;
        }
        state.last_update = self.clock.now();

        if let Some(timeout) = request.timeout {
            if !state.moving.is_idle() {
                state.timer = Some(self.schedule_stop(Arc::downgrade(&entry), generation, timeout));
            }
        }
        tracing::debug!("{} continuous move {:?}", request.profile_token, state.moving);
        Ok(state.moving)
    }

    fn schedule_stop(&self, entry: Weak<Mutex<PtzEntry>>, generation: u64, timeout: Duration) -> JoinHandle<()> {
        let clock = self.clock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(entry) = entry.upgrade() else {
                return;
            };
            let mut state = entry.lock();
            if state.generation == generation {
                state.moving = MotionFlags::default();
                state.last_update = clock.now();
                state.timer = None;
            }
        })
    }

    /// Move to `position`, clamped into the configured ranges.
    pub fn absolute_move(&self, profile: &str, position: PtzVector) -> Result<PtzVector> {
        let (config, entry) = self.resolve(profile)?;
        let mut state = entry.lock();
        Ok(state.move_to(&config, position, self.clock.now()))
    }

    /// Move by `translation` from the current position, clamped.
    pub fn relative_move(&self, profile: &str, translation: PtzVector) -> Result<PtzVector> {
        let (config, entry) = self.resolve(profile)?;
        let mut state = entry.lock();
        let offset = |delta: Option<f32>, current: Option<f32>| delta.map(|d| current.unwrap_or(0.0) + d);
        let target = PtzVector {
            pan: offset(translation.pan, state.position.pan),
            tilt: offset(translation.tilt, state.position.tilt),
            zoom: offset(translation.zoom, state.position.zoom),
        };
        Ok(state.move_to(&config, target, self.clock.now()))
    }

    /// Clear the selected flags. Stopping an idle profile is a no-op.
    pub fn stop(&self, request: &StopRequest) -> Result<MotionFlags> {
        let (_, entry) = self.resolve(&request.profile_token)?;
        let mut state = entry.lock();
        let before = state.moving;
        if request.stops_pan_tilt() {
            state.moving.pan = false;
            state.moving.tilt = false;
        }
        if request.stops_zoom() {
            state.moving.zoom = false;
        }
        if state.moving.is_idle() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        if state.moving != before {
            state.last_update = self.clock.now();
        }
        Ok(state.moving)
    }

    pub fn status(&self, profile: &str) -> Result<PtzStatus> {
        let snapshot = self.snapshot(profile)?;
        Ok(PtzStatus {
            position: snapshot.position,
            pan_tilt: state_of(snapshot.moving.pan_tilt()),
            zoom: state_of(snapshot.moving.zoom),
            error: None,
            utc_time: self.clock.now(),
        })
    }

    pub fn snapshot(&self, profile: &str) -> Result<PtzSnapshot> {
        let (_, entry) = self.resolve(profile)?;
        let state = entry.lock();
        Ok(state.snapshot())
    }

    pub fn presets(&self, profile: &str) -> Result<Vec<Preset>> {
        let (_, entry) = self.resolve(profile)?;
        let presets = entry.lock().presets.clone();
        Ok(presets)
    }

    /// Store the current position. With a token the existing preset is
    /// overwritten; without one a new preset is created. Names are unique
    /// per profile. Returns the preset token.
    pub fn set_preset(&self, request: &SetPresetRequest) -> Result<String> {
        let (config, entry) = self.resolve(&request.profile_token)?;
        let capacity = self.model.preset_capacity(&config);
        let mut state = entry.lock();
        let position = state.position;

        let name_taken = |presets: &[Preset], name: &str, except: Option<&str>| {
            presets
                .iter()
                .any(|p| p.name == name && Some(p.token.as_str()) != except)
        };

        if let Some(token) = &request.preset_token {
            if let Some(name) = &request.preset_name {
                if name_taken(state.presets.as_slice(), name, Some(token.as_str())) {
                    return Err(ServerError::Conflict(format!("Preset name {}", name)));
                }
            }
            let preset = state
                .presets
                .iter_mut()
                .find(|p| &p.token == token)
                .ok_or_else(|| ServerError::PresetNotFound(token.clone()))?;
            if let Some(name) = &request.preset_name {
                preset.name = name.clone();
            }
            preset.position = Some(position);
            return Ok(token.clone());
        }

        if state.presets.len() >= capacity {
            return Err(ServerError::InvalidArgument(format!(
                "preset limit of {} reached",
                capacity
            )));
        }
        let number = state.next_preset;
        let name = request
            .preset_name
            .clone()
            .unwrap_or_else(|| format!("Preset {}", number));
        if name_taken(state.presets.as_slice(), &name, None) {
            return Err(ServerError::Conflict(format!("Preset name {}", name)));
        }
        state.next_preset += 1;
        let token = format!("preset_{}", number);
        state.presets.push(Preset {
            token: token.clone(),
            name,
            position: Some(position),
        });
        tracing::debug!("{} saved {}", request.profile_token, token);
        Ok(token)
    }

    /// Absolute move to the stored position of `preset`.
    pub fn goto_preset(&self, profile: &str, preset: &str) -> Result<PtzVector> {
        let (config, entry) = self.resolve(profile)?;
        let mut state = entry.lock();
        let target = state
            .presets
            .iter()
            .find(|p| p.token == preset)
            .ok_or_else(|| ServerError::PresetNotFound(preset.to_string()))?
            .position
            .unwrap_or_default();
        Ok(state.move_to(&config, target, self.clock.now()))
    }

    /// Drop the state of a deleted profile, cancelling its timer. A profile
    /// later created under the same token starts from home.
    pub fn forget(&self, profile: &str) {
        let removed = self.entries.lock().remove(profile);
        if let Some(entry) = removed {
            entry.lock().supersede();
            tracing::debug!("dropped PTZ state of {}", profile);
        }
    }

    /// Profiles with PTZ state
    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn remove_preset(&self, profile: &str, preset: &str) -> Result<()> {
        let (_, entry) = self.resolve(profile)?;
        let mut state = entry.lock();
        let index = state
            .presets
            .iter()
            .position(|p| p.token == preset)
            .ok_or_else(|| ServerError::PresetNotFound(preset.to_string()))?;
        state.presets.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use onvif_api::FloatRange;
    use proptest::prelude::*;

    fn controller() -> PtzController {
        PtzController::new(Arc::new(DeviceModel::default()), Arc::new(SystemClock))
    }

    const MAIN: &str = "profile_main";

    #[tokio::test]
    async fn test_continuous_move_then_partial_stop() {
        let ptz = controller();
        let moving = ptz
            .continuous_move(&ContinuousMoveRequest::new(MAIN, PtzVector::pan_tilt(0.5, 0.0).with_zoom(0.2)))
            .unwrap();
        assert!(moving.pan && !moving.tilt && moving.zoom);

        let stopped = ptz
            .stop(&StopRequest {
                profile_token: MAIN.to_string(),
                pan_tilt: Some(true),
                zoom: Some(false),
            })
            .unwrap();
        assert!(!stopped.pan);
        assert!(stopped.zoom);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let ptz = controller();
        let before = ptz.snapshot(MAIN).unwrap();
        ptz.stop(&StopRequest::all(MAIN)).unwrap();
        ptz.stop(&StopRequest::all(MAIN)).unwrap();
        assert_eq!(ptz.snapshot(MAIN).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_motion() {
        let ptz = controller();
        ptz.continuous_move(
            &ContinuousMoveRequest::new(MAIN, PtzVector::pan_tilt(0.5, 0.5)).with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(ptz.snapshot(MAIN).unwrap().moving.pan);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(ptz.snapshot(MAIN).unwrap().moving.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_stop_newer_motion() {
        let ptz = controller();
        ptz.continuous_move(
            &ContinuousMoveRequest::new(MAIN, PtzVector::pan_tilt(0.5, 0.0)).with_timeout(Duration::from_secs(1)),
        )
        .unwrap();
        ptz.continuous_move(&ContinuousMoveRequest::new(MAIN, PtzVector::pan_tilt(-0.5, 0.0)))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(ptz.snapshot(MAIN).unwrap().moving.pan);
    }

    #[test]
    fn test_absolute_move_ends_motion_and_clamps() {
        let ptz = controller();
        let position = ptz
            .absolute_move(MAIN, PtzVector::pan_tilt(3.0, -0.25).with_zoom(-1.0))
            .unwrap();
        assert_eq!(position, PtzVector::pan_tilt(1.0, -0.25).with_zoom(0.0));

        // Absent components keep their value
        let position = ptz.absolute_move(MAIN, PtzVector::zoom(0.5)).unwrap();
        assert_eq!(position, PtzVector::pan_tilt(1.0, -0.25).with_zoom(0.5));
        assert!(ptz.snapshot(MAIN).unwrap().moving.is_idle());
    }

    #[test]
    fn test_relative_move() {
        let ptz = controller();
        ptz.absolute_move(MAIN, PtzVector::pan_tilt(0.5, 0.5)).unwrap();
        let position = ptz.relative_move(MAIN, PtzVector::pan_tilt(0.75, -0.25)).unwrap();
        assert_eq!(position.pan, Some(1.0));
        assert_eq!(position.tilt, Some(0.25));
    }

    #[test]
    fn test_profile_errors() {
        let ptz = controller();
        assert!(matches!(
            ptz.absolute_move("profile_sub", PtzVector::pan_tilt(0.0, 0.0)),
            Err(ServerError::PtzNotSupported(_))
        ));
        assert!(matches!(ptz.status("missing"), Err(ServerError::ProfileNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_profiles_release_state() {
        let model = Arc::new(DeviceModel::default());
        let ptz = PtzController::new(model.clone(), Arc::new(SystemClock));

        for _ in 0..3 {
            let token = model.create_profile("Scratch", None).unwrap().token;
            model.add_ptz_configuration(&token, "ptz_cfg_1").unwrap();
            let request = ContinuousMoveRequest::new(token.as_str(), PtzVector::pan_tilt(0.5, 0.0))
                .with_timeout(Duration::from_secs(1));
            ptz.continuous_move(&request).unwrap();
            assert_eq!(ptz.tracked(), 1);

            model.delete_profile(&token).unwrap();
            ptz.forget(&token);
            assert_eq!(ptz.tracked(), 0);
        }
        ptz.forget("never-moved");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ptz.tracked(), 0);
    }

    #[test]
    fn test_presets() {
        let ptz = controller();
        ptz.absolute_move(MAIN, PtzVector::pan_tilt(0.3, 0.4)).unwrap();
        let door = ptz
            .set_preset(&SetPresetRequest {
                profile_token: MAIN.to_string(),
                preset_name: Some("Door".to_string()),
                preset_token: None,
            })
            .unwrap();

        let duplicate = ptz.set_preset(&SetPresetRequest {
            profile_token: MAIN.to_string(),
            preset_name: Some("Door".to_string()),
            preset_token: None,
        });
        assert!(matches!(duplicate, Err(ServerError::Conflict(_))));

        ptz.absolute_move(MAIN, PtzVector::pan_tilt(-0.9, 0.0)).unwrap();
        let position = ptz.goto_preset(MAIN, &door).unwrap();
        assert_eq!(position.pan, Some(0.3));
        assert_eq!(position.tilt, Some(0.4));

        // Overwrite by token keeps the token
        ptz.absolute_move(MAIN, PtzVector::pan_tilt(0.1, 0.1)).unwrap();
        let overwritten = ptz
            .set_preset(&SetPresetRequest {
                profile_token: MAIN.to_string(),
                preset_name: None,
                preset_token: Some(door.clone()),
            })
            .unwrap();
        assert_eq!(overwritten, door);
        assert_eq!(ptz.presets(MAIN).unwrap()[0].position.unwrap().pan, Some(0.1));

        ptz.remove_preset(MAIN, &door).unwrap();
        assert!(matches!(ptz.goto_preset(MAIN, &door), Err(ServerError::PresetNotFound(_))));
        assert!(matches!(ptz.remove_preset(MAIN, &door), Err(ServerError::PresetNotFound(_))));
    }

    #[test]
    fn test_rejected_preset_keeps_numbering() {
        let ptz = controller();
        let named = |name: &str| SetPresetRequest {
            profile_token: MAIN.to_string(),
            preset_name: Some(name.to_string()),
            preset_token: None,
        };
        assert_eq!(ptz.set_preset(&named("Door")).unwrap(), "preset_1");
        assert!(matches!(ptz.set_preset(&named("Door")), Err(ServerError::Conflict(_))));
        assert_eq!(ptz.set_preset(&named("Gate")).unwrap(), "preset_2");
    }

    proptest! {
        #[test]
        fn prop_absolute_move_clamps(pan in -10.0f32..10.0, tilt in -10.0f32..10.0, zoom in -10.0f32..10.0) {
            let ptz = controller();
            let position = ptz.absolute_move(MAIN, PtzVector::pan_tilt(pan, tilt).with_zoom(zoom)).unwrap();
            prop_assert_eq!(position.pan, Some(FloatRange::NORMALIZED.clamp(pan)));
            prop_assert_eq!(position.tilt, Some(FloatRange::NORMALIZED.clamp(tilt)));
            prop_assert_eq!(position.zoom, Some(FloatRange::UNIT.clamp(zoom)));
        }
    }
}
