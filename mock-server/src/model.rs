//! In-memory device configuration
//!
//! Profiles refer to configurations by token. Every token a profile holds
//! names a configuration that exists in the model: attaching an unknown
//! configuration is rejected, so a profile never dangles.

use std::collections::BTreeMap;
use std::time::Duration;

use onvif_api::types::imaging::{ImagingOptions, ImagingSettings};
use onvif_api::types::media::{Profile, VideoSource, VideoSourceEntry};
use onvif_api::types::ptz::{PtzConfiguration, PtzLimits, PtzNode};
use onvif_api::{PtzVector, Resolution};
use parking_lot::RwLock;

use crate::error::{Result, ServerError};

/// Encoder settings are not modeled beyond what stream URIs need
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfiguration {
    pub token: String,
    pub name: String,
    pub resolution: Resolution,
}

#[derive(Debug, Clone)]
struct ModelState {
    profiles: Vec<Profile>,
    video_sources: Vec<VideoSourceEntry>,
    video_source_configurations: BTreeMap<String, String>,
    video_encoders: BTreeMap<String, VideoEncoderConfiguration>,
    ptz_nodes: Vec<PtzNode>,
    ptz_configurations: BTreeMap<String, PtzConfiguration>,
    imaging: BTreeMap<String, ImagingSettings>,
    imaging_options: ImagingOptions,
    next_profile: u32,
}

/// Device configuration shared by the media, PTZ and imaging handlers
#[derive(Debug)]
pub struct DeviceModel {
    state: RwLock<ModelState>,
}

impl Default for DeviceModel {
    /// A single-sensor PTZ camera: a fixed main profile with PTZ and a
    /// deletable sub profile without.
    fn default() -> Self {
        let mut video_source_configurations = BTreeMap::new();
        video_source_configurations.insert("vsc_1".to_string(), "VideoSourceConfig".to_string());

        let mut video_encoders = BTreeMap::new();
        for (token, name, width, height) in [
            ("vec_main", "MainEncoder", 1920, 1080),
            ("vec_sub", "SubEncoder", 640, 360),
        ] {
            video_encoders.insert(
                token.to_string(),
                VideoEncoderConfiguration {
                    token: token.to_string(),
                    name: name.to_string(),
                    resolution: Resolution::new(width, height),
                },
            );
        }

        let node = PtzNode {
            token: "ptz_node_1".to_string(),
            name: "PTZNode".to_string(),
            limits: PtzLimits::default(),
            maximum_number_of_presets: 32,
            home_supported: true,
        };
        let mut ptz_configurations = BTreeMap::new();
        ptz_configurations.insert(
            "ptz_cfg_1".to_string(),
            PtzConfiguration {
                token: "ptz_cfg_1".to_string(),
                name: "PTZConfig".to_string(),
                node_token: node.token.clone(),
                limits: PtzLimits::default(),
                default_speed: PtzVector::pan_tilt(0.5, 0.5).with_zoom(0.5),
                default_timeout: Some(Duration::from_secs(5)),
            },
        );

        let main = Profile {
            fixed: true,
            video_source_configuration: Some("vsc_1".to_string()),
            video_encoder_configuration: Some("vec_main".to_string()),
            ptz_configuration: Some("ptz_cfg_1".to_string()),
            ..Profile::new("profile_main", "MainStream")
        };
        let sub = Profile {
            video_source_configuration: Some("vsc_1".to_string()),
            video_encoder_configuration: Some("vec_sub".to_string()),
            ..Profile::new("profile_sub", "SubStream")
        };

        let mut imaging = BTreeMap::new();
        imaging.insert(
            "vs_1".to_string(),
            ImagingSettings {
                brightness: Some(50.0),
                color_saturation: Some(50.0),
                contrast: Some(50.0),
                sharpness: Some(50.0),
            },
        );

        Self::from_state(ModelState {
            profiles: vec![main, sub],
            video_sources: vec![VideoSourceEntry {
                token: "vs_1".to_string(),
                source: VideoSource {
                    framerate: 25.0,
                    resolution: Resolution::new(1920, 1080),
                },
            }],
            video_source_configurations,
            video_encoders,
            ptz_nodes: vec![node],
            ptz_configurations,
            imaging,
            imaging_options: ImagingOptions::percent(),
            next_profile: 1,
        })
    }
}

impl DeviceModel {
    fn from_state(state: ModelState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.state.read().profiles.clone()
    }

    pub fn profile(&self, token: &str) -> Result<Profile> {
        self.state
            .read()
            .profiles
            .iter()
            .find(|p| p.token == token)
            .cloned()
            .ok_or_else(|| ServerError::ProfileNotFound(token.to_string()))
    }

    /// Create an empty, deletable profile. A token is generated when none
    /// is given.
    pub fn create_profile(&self, name: &str, token: Option<&str>) -> Result<Profile> {
        if name.trim().is_empty() {
            return Err(ServerError::InvalidArgument("profile name is empty".to_string()));
        }
        let mut state = self.state.write();
        let exists = |state: &ModelState, token: &str| state.profiles.iter().any(|p| p.token == token);

        let token = match token {
            Some(token) if exists(&*state, token) => {
                return Err(ServerError::Conflict(format!("Profile {}", token)));
            }
            Some(token) => token.to_string(),
            None => loop {
                let candidate = format!("profile_{}", state.next_profile);
                state.next_profile += 1;
                if !exists(&*state, &candidate) {
                    break candidate;
                }
            },
        };

        let profile = Profile::new(token, name);
        state.profiles.push(profile.clone());
        tracing::debug!("created profile {}", profile.token);
        Ok(profile)
    }

    pub fn delete_profile(&self, token: &str) -> Result<()> {
        let mut state = self.state.write();
        let index = state
            .profiles
            .iter()
            .position(|p| p.token == token)
            .ok_or_else(|| ServerError::ProfileNotFound(token.to_string()))?;
        if state.profiles[index].fixed {
            return Err(ServerError::FixedProfile(token.to_string()));
        }
        state.profiles.remove(index);
        tracing::debug!("deleted profile {}", token);
        Ok(())
    }

    fn update_profile<F>(&self, token: &str, update: F) -> Result<()>
    where
        F: FnOnce(&ModelState, &mut Profile) -> Result<()>,
    {
        let mut state = self.state.write();
        let index = state
            .profiles
            .iter()
            .position(|p| p.token == token)
            .ok_or_else(|| ServerError::ProfileNotFound(token.to_string()))?;
        let mut profile = state.profiles[index].clone();
        update(&*state, &mut profile)?;
        state.profiles[index] = profile;
        Ok(())
    }

    pub fn add_video_encoder_configuration(&self, profile: &str, configuration: &str) -> Result<()> {
        self.update_profile(profile, |state, p| {
            if !state.video_encoders.contains_key(configuration) {
                return Err(ServerError::ConfigurationNotFound(configuration.to_string()));
            }
            p.video_encoder_configuration = Some(configuration.to_string());
            if p.video_source_configuration.is_none() {
                p.video_source_configuration = state.video_source_configurations.keys().next().cloned();
            }
            Ok(())
        })
    }

    pub fn add_ptz_configuration(&self, profile: &str, configuration: &str) -> Result<()> {
        self.update_profile(profile, |state, p| {
            if !state.ptz_configurations.contains_key(configuration) {
                return Err(ServerError::ConfigurationNotFound(configuration.to_string()));
            }
            p.ptz_configuration = Some(configuration.to_string());
            Ok(())
        })
    }

    /// Detach the PTZ configuration; a profile without one stays valid.
    pub fn remove_ptz_configuration(&self, profile: &str) -> Result<()> {
        self.update_profile(profile, |_, p| {
            p.ptz_configuration = None;
            Ok(())
        })
    }

    pub fn video_sources(&self) -> Vec<VideoSourceEntry> {
        self.state.read().video_sources.clone()
    }

    pub fn video_encoder(&self, token: &str) -> Result<VideoEncoderConfiguration> {
        self.state
            .read()
            .video_encoders
            .get(token)
            .cloned()
            .ok_or_else(|| ServerError::ConfigurationNotFound(token.to_string()))
    }

    pub fn ptz_nodes(&self) -> Vec<PtzNode> {
        self.state.read().ptz_nodes.clone()
    }

    pub fn ptz_configurations(&self) -> Vec<PtzConfiguration> {
        self.state.read().ptz_configurations.values().cloned().collect()
    }

    /// PTZ configuration bound to `profile`
    pub fn ptz_configuration_for(&self, profile: &str) -> Result<PtzConfiguration> {
        let state = self.state.read();
        let p = state
            .profiles
            .iter()
            .find(|p| p.token == profile)
            .ok_or_else(|| ServerError::ProfileNotFound(profile.to_string()))?;
        let token = p
            .ptz_configuration
            .as_deref()
            .ok_or_else(|| ServerError::PtzNotSupported(profile.to_string()))?;
        state
            .ptz_configurations
            .get(token)
            .cloned()
            .ok_or_else(|| ServerError::Internal(format!("profile {} refers to missing PTZ configuration {}", profile, token)))
    }

    /// Maximum presets of the node behind `configuration`
    pub fn preset_capacity(&self, configuration: &PtzConfiguration) -> usize {
        self.state
            .read()
            .ptz_nodes
            .iter()
            .find(|n| n.token == configuration.node_token)
            .map(|n| n.maximum_number_of_presets as usize)
            .unwrap_or(usize::MAX)
    }

    pub fn imaging_settings(&self, source: &str) -> Result<ImagingSettings> {
        self.state
            .read()
            .imaging
            .get(source)
            .copied()
            .ok_or_else(|| ServerError::VideoSourceNotFound(source.to_string()))
    }

    /// Merge `update` into the stored settings. Values outside the options
    /// ranges are rejected and nothing is applied.
    pub fn set_imaging_settings(&self, source: &str, update: &ImagingSettings) -> Result<ImagingSettings> {
        let mut state = self.state.write();
        let options = state.imaging_options;
        let current = state
            .imaging
            .get_mut(source)
            .ok_or_else(|| ServerError::VideoSourceNotFound(source.to_string()))?;
        if let Some((field, value, range)) = update.out_of_range(&options) {
            return Err(ServerError::InvalidArgument(format!(
                "{} {} is outside {}..={}",
                field, value, range.min, range.max
            )));
        }
        current.merge(update);
        Ok(*current)
    }

    pub fn imaging_options(&self, source: &str) -> Result<ImagingOptions> {
        let state = self.state.read();
        if !state.imaging.contains_key(source) {
            return Err(ServerError::VideoSourceNotFound(source.to_string()));
        }
        Ok(state.imaging_options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model() {
        let model = DeviceModel::default();
        let profiles = model.profiles();
        assert_eq!(profiles.len(), 2);
        assert!(profiles[0].fixed && profiles[0].has_ptz());
        assert!(!profiles[1].fixed && !profiles[1].has_ptz());
        assert_eq!(model.ptz_configuration_for("profile_main").unwrap().token, "ptz_cfg_1");
    }

    #[test]
    fn test_ptz_configuration_errors() {
        let model = DeviceModel::default();
        assert!(matches!(
            model.ptz_configuration_for("profile_sub"),
            Err(ServerError::PtzNotSupported(_))
        ));
        assert!(matches!(
            model.ptz_configuration_for("nope"),
            Err(ServerError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn test_create_and_delete_profile() {
        let model = DeviceModel::default();
        let created = model.create_profile("Extra", None).unwrap();
        assert_eq!(created.token, "profile_1");
        assert!(!created.fixed);

        let named = model.create_profile("Named", Some("custom")).unwrap();
        assert_eq!(named.token, "custom");
        assert!(matches!(
            model.create_profile("Again", Some("custom")),
            Err(ServerError::Conflict(_))
        ));
        assert!(matches!(model.create_profile(" ", None), Err(ServerError::InvalidArgument(_))));

        model.delete_profile("custom").unwrap();
        assert!(matches!(model.profile("custom"), Err(ServerError::ProfileNotFound(_))));
        assert!(matches!(
            model.delete_profile("profile_main"),
            Err(ServerError::FixedProfile(_))
        ));
        assert_eq!(model.profiles().len(), 3);
    }

    #[test]
    fn test_unknown_configuration_is_rejected() {
        let model = DeviceModel::default();
        let profile = model.create_profile("Extra", None).unwrap();

        assert!(matches!(
            model.add_ptz_configuration(&profile.token, "ptz_cfg_9"),
            Err(ServerError::ConfigurationNotFound(_))
        ));
        assert!(matches!(
            model.add_video_encoder_configuration(&profile.token, "vec_9"),
            Err(ServerError::ConfigurationNotFound(_))
        ));
        assert_eq!(model.profile(&profile.token).unwrap(), profile);

        model.add_ptz_configuration(&profile.token, "ptz_cfg_1").unwrap();
        model.add_video_encoder_configuration(&profile.token, "vec_sub").unwrap();
        let updated = model.profile(&profile.token).unwrap();
        assert_eq!(updated.ptz_configuration.as_deref(), Some("ptz_cfg_1"));
        assert_eq!(updated.video_source_configuration.as_deref(), Some("vsc_1"));

        model.remove_ptz_configuration(&profile.token).unwrap();
        model.remove_ptz_configuration(&profile.token).unwrap();
        assert!(!model.profile(&profile.token).unwrap().has_ptz());
    }

    #[test]
    fn test_imaging_settings() {
        let model = DeviceModel::default();
        let updated = model
            .set_imaging_settings(
                "vs_1",
                &ImagingSettings {
                    brightness: Some(80.0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.brightness, Some(80.0));
        assert_eq!(updated.contrast, Some(50.0));

        let rejected = model.set_imaging_settings(
            "vs_1",
            &ImagingSettings {
                contrast: Some(10.0),
                sharpness: Some(250.0),
                ..Default::default()
            },
        );
        assert!(matches!(rejected, Err(ServerError::InvalidArgument(_))));
        assert_eq!(model.imaging_settings("vs_1").unwrap().contrast, Some(50.0));

        assert!(matches!(model.imaging_settings("vs_9"), Err(ServerError::VideoSourceNotFound(_))));
        assert!(model.imaging_options("vs_1").is_ok());
    }
}
