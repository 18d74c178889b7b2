//! Audio device enumeration, ambient to the conversion pipeline itself but
//! needed by any caller that wants to pick a device instead of accepting
//! the system default.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;

/// Common sample rates to probe when a device doesn't advertise support for
/// the working rate directly.
pub const COMMON_RATES: &[u32] = &[48_000, 44_100, 96_000, 32_000, 16_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Input,
    Output,
}

/// A snapshot of one audio device's identity and capabilities, detached
/// from the live `cpal::Device` handle (which isn't `Send` in all cases
/// and goes stale the moment hardware is unplugged).
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// `cpal` has no stable device ID; the name doubles as one.
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub is_default: bool,
    /// Sample rates from [`COMMON_RATES`] that fall within some supported
    /// config's range (may be empty if querying failed).
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl AudioDevice {
    fn from_cpal_device(device: &cpal::Device, device_type: DeviceType, is_default: bool) -> Result<Self, DeviceError> {
        let name = device.name().unwrap_or_else(|_| "unknown device".to_string());
        let id = name.clone();
        let (sample_rates, max_channels) = match device_type {
            DeviceType::Input => Self::query_config(device.supported_input_configs()),
            DeviceType::Output => Self::query_config(device.supported_output_configs()),
        };

        Ok(Self {
            id,
            name,
            device_type,
            is_default,
            sample_rates,
            max_channels,
        })
    }

    fn query_config(
        configs: Result<impl Iterator<Item = cpal::SupportedStreamConfigRange>, cpal::SupportedStreamConfigsError>,
    ) -> (Vec<u32>, u16) {
        let Ok(configs) = configs else {
            return (Vec::new(), 0);
        };

        let mut sample_rates = Vec::new();
        let mut max_channels = 0u16;
        for config in configs {
            max_channels = max_channels.max(config.channels());
            let min = config.min_sample_rate().0;
            let max = config.max_sample_rate().0;
            for &rate in COMMON_RATES {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
        }
        sample_rates.sort_unstable();
        (sample_rates, max_channels)
    }

    pub fn enumerate_inputs() -> Result<Vec<AudioDevice>, DeviceError> {
        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());

        let devices = host
            .input_devices()
            .map_err(|e| DeviceError::EnumerationFailed(e.to_string()))?;

        let mut result = Vec::new();
        for device in devices {
            let name = device.name().unwrap_or_default();
            let is_default = default_name.as_deref() == Some(name.as_str());
            if let Ok(audio_device) = Self::from_cpal_device(&device, DeviceType::Input, is_default) {
                result.push(audio_device);
            }
        }
        Ok(result)
    }

    pub fn enumerate_outputs() -> Result<Vec<AudioDevice>, DeviceError> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .output_devices()
            .map_err(|e| DeviceError::EnumerationFailed(e.to_string()))?;

        let mut result = Vec::new();
        for device in devices {
            let name = device.name().unwrap_or_default();
            let is_default = default_name.as_deref() == Some(name.as_str());
            if let Ok(audio_device) = Self::from_cpal_device(&device, DeviceType::Output, is_default) {
                result.push(audio_device);
            }
        }
        Ok(result)
    }

    pub fn enumerate_all() -> Result<Vec<AudioDevice>, DeviceError> {
        let mut all = Self::enumerate_inputs()?;
        all.extend(Self::enumerate_outputs()?);
        Ok(all)
    }

    pub fn default_input() -> Result<AudioDevice, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(DeviceError::NoDefaultInput)?;
        Self::from_cpal_device(&device, DeviceType::Input, true)
    }

    pub fn default_output() -> Result<AudioDevice, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDefaultOutput)?;
        Self::from_cpal_device(&device, DeviceType::Output, true)
    }
}
