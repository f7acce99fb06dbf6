//! Engine-wide limits and runtime configuration.
use crate::error::{ErrorPayload, Result};

/// Size of the fixed slot pool.  Slot handles are `0..MAX_SLOTS`.
pub const MAX_SLOTS: usize = 16;

/// Largest block the engine renders in one go.
///
/// Callback requests larger than this are split into consecutive sub-blocks, each stamped with its own output time.
pub const MAX_BLOCK_FRAMES: usize = 1024;

/// Resolution of the engine's [crate::time::TimeSource].
pub const TICKS_PER_SECOND: u32 = 1_000_000;

pub const DEFAULT_BPM: u16 = 125;

/// Default ticks per line.
pub const DEFAULT_SPEED: u16 = 6;

/// Linear volume scale: `MAX_VOLUME` is unity gain.
pub const MAX_VOLUME: u16 = 256;

/// Capacity of each slot's lock-free live event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 2048;

pub const MAX_PATTERN_TRACKS: usize = 64;
pub const MAX_PATTERN_LINES: usize = 65536;

/// Upper bound on the module arena of one slot, including empty entries.
pub const MAX_MODULES: usize = 1024;

/// Highest pattern index a project file may name, plus one.
pub const MAX_PATTERNS: usize = 4096;

/// Upper end of the normalized controller domain, which is also the pattern `XXYY` value domain.
pub const MAX_CONTROLLER_VALUE: i32 = 0x8000;

/// Internal processing is always stereo.
pub(crate) const INTERNAL_CHANNELS: usize = 2;

/// Live events get their own voices above the pattern tracks so they never cut off pattern notes.
pub(crate) const LIVE_VOICE_BASE: usize = MAX_PATTERN_TRACKS;
pub(crate) const MAX_VOICES: usize = 2 * MAX_PATTERN_TRACKS;

/// How many rendered blocks of position/level history a slot keeps for progress queries.
pub(crate) const POSITION_HISTORY: usize = 64;

/// Sample format of the interleaved buffers exchanged with the render callback.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, derive_more::Display)]
pub enum SampleFormat {
    #[display(fmt = "int16")]
    Int16,
    #[default]
    #[display(fmt = "float32")]
    Float32,
}

/// Runtime configuration of an [crate::Engine].
///
/// Every field has a default, so `EngineConfig::builder().build()` only fails if derive_builder itself changes
/// behavior.  Values are checked when the engine is constructed, not here.
#[derive(Clone, Debug, PartialEq, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct EngineConfig {
    /// Output sample rate.  44100 or higher is recommended.
    #[builder(default = "44100")]
    pub sample_rate: u32,

    /// Interleaved channels of the callback buffers, 1 or 2.
    #[builder(default = "2")]
    pub channels: usize,

    #[builder(default)]
    pub sample_format: SampleFormat,

    /// If set, the client pulls audio with [crate::Engine::render].  Otherwise an output device is opened (requires the
    /// `device` feature).
    #[builder(default = "true")]
    pub user_audio_callback: bool,

    /// Render and control share one thread by construction, so slot locks are only counted and never block.
    #[builder(default)]
    pub one_thread: bool,

    /// Emit the engine's own diagnostics, such as lock discipline warnings.  Errors are returned either way.
    #[builder(default = "true")]
    pub debug_output: bool,

    /// Warn when a structural edit happens outside a slot lock bracket.
    #[builder(default = "true")]
    pub lock_checks: bool,

    /// Requested device buffer size in frames, from the `buffer=` option.
    #[builder(default, setter(strip_option))]
    pub device_buffer_frames: Option<usize>,

    /// Options this engine doesn't interpret, kept for whoever opens the device.
    #[builder(default, setter(skip))]
    pub extra_options: Vec<(String, String)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            sample_format: SampleFormat::Float32,
            user_audio_callback: true,
            one_thread: false,
            debug_output: true,
            lock_checks: true,
            device_buffer_frames: None,
            extra_options: vec![],
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Apply an option string of the form `key=value|key=value`.
    ///
    /// `buffer` sets [EngineConfig::device_buffer_frames]; anything else lands in [EngineConfig::extra_options].
    pub fn apply_options(&mut self, options: &str) -> Result<()> {
        for opt in options.split('|').map(str::trim).filter(|o| !o.is_empty()) {
            let Some((key, value)) = opt.split_once('=') else {
                return Err(ErrorPayload::Config(format!("option '{opt}' is not of the form key=value")).into());
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "buffer" => {
                    let frames = value.parse::<usize>().map_err(|_| {
                        ErrorPayload::Config(format!("buffer size '{value}' is not a frame count"))
                    })?;
                    self.device_buffer_frames = Some(frames);
                }
                _ => {
                    log::debug!("Keeping uninterpreted engine option {key}={value}");
                    self.extra_options.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(8000..=384_000).contains(&self.sample_rate) {
            return Err(ErrorPayload::Config(format!("unsupported sample rate {}", self.sample_rate)).into());
        }

        if !(1..=INTERNAL_CHANNELS).contains(&self.channels) {
            return Err(ErrorPayload::Config(format!("unsupported channel count {}", self.channels)).into());
        }

        if !self.user_audio_callback && !cfg!(feature = "device") {
            return Err(ErrorPayload::Config(
                "device output requested but the device feature is disabled".to_string(),
            )
            .into());
        }

        if self.sample_rate < 44100 && self.debug_output {
            log::warn!(
                "Sample rate {} is below 44100; some modules may alias",
                self.sample_rate
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn builder_defaults_match_default() {
        let built = EngineConfig::builder().build().unwrap();
        assert_eq!(built, EngineConfig::default());
    }

    #[test]
    fn option_string() {
        let mut config = EngineConfig::default();
        config
            .apply_options("buffer=1024|audiodriver=alsa| audiodevice=hw:0,0 |")
            .unwrap();

        assert_eq!(config.device_buffer_frames, Some(1024));
        assert_eq!(
            config.extra_options,
            vec![
                ("audiodriver".to_string(), "alsa".to_string()),
                ("audiodevice".to_string(), "hw:0,0".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_options() {
        let mut config = EngineConfig::default();
        assert!(config.apply_options("buffer").is_err());
        assert!(config.apply_options("buffer=lots").is_err());
    }

    #[test]
    fn validation() {
        assert!(EngineConfig::default().validate().is_ok());

        let config = EngineConfig::builder().channels(3).build().unwrap();
        assert!(config.validate().is_err());

        let config = EngineConfig::builder().sample_rate(100).build().unwrap();
        assert!(config.validate().is_err());
    }
}
