//! Audio output through cpal, for engines that don't drive rendering themselves.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};

use crate::config::SampleFormat;
use crate::dispatcher::OutputBuffer;
use crate::engine::Engine;
use crate::error::ErrorPayload;
use crate::time::ticks_for_frames;

#[derive(Debug, thiserror::Error)]
pub enum AudioDeviceError {
    #[error("No audio device available")]
    NoDevice,
    #[error("The device can't play {channels} channel(s) at {sample_rate} Hz")]
    ConfigNotSupported { sample_rate: u32, channels: usize },
    #[error("Failed to query device configs: {0}")]
    QueryConfigsFailed(#[from] cpal::SupportedStreamConfigsError),
    #[error("Failed to build stream: {0}")]
    BuildStreamFailed(#[from] cpal::BuildStreamError),
    #[error("Failed to start stream: {0}")]
    PlayStreamFailed(#[from] cpal::PlayStreamError),
    #[error("Failed to pause stream: {0}")]
    PauseStreamFailed(#[from] cpal::PauseStreamError),
}

/// An output stream that renders `engine` from the device callback.
pub struct AudioDevice {
    stream: Stream,
}

/// Pick a device configuration with exactly the engine's rate and channel count.  The engine doesn't resample.
fn find_config(
    device: &cpal::Device,
    sample_rate: u32,
    channels: usize,
) -> Result<cpal::SupportedStreamConfig, AudioDeviceError> {
    device
        .supported_output_configs()?
        .filter(|c| c.channels() as usize == channels)
        .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
        .map(|c| c.with_sample_rate(SampleRate(sample_rate)))
        .ok_or(AudioDeviceError::ConfigNotSupported {
            sample_rate,
            channels,
        })
}

fn latency_frames(info: &cpal::OutputCallbackInfo, sample_rate: u32) -> u32 {
    let ts = info.timestamp();
    ts.playback
        .duration_since(&ts.callback)
        .map(|d| (d.as_secs_f64() * sample_rate as f64) as u32)
        .unwrap_or(0)
}

fn render_from_device(engine: &Engine, output: OutputBuffer<'_>, info: &cpal::OutputCallbackInfo) {
    crate::is_render_thread::mark_render_thread();
    let sample_rate = engine.config().sample_rate;
    let latency = latency_frames(info, sample_rate);
    let out_time = engine
        .ticks()
        .wrapping_add(ticks_for_frames(latency as usize, sample_rate, engine.ticks_per_second()));
    if let Err(e) = engine.render(output, latency, out_time) {
        rt_error!("Device render failed: {}", e);
    }
}

impl AudioDevice {
    /// Open the default output device at the engine's rate, channel count and sample format.
    ///
    /// Only engines configured with `user_audio_callback` off may be driven by a device.
    pub fn open(engine: &Engine) -> crate::Result<AudioDevice> {
        let config = engine.config();
        if config.user_audio_callback {
            return Err(ErrorPayload::Config(
                "engine renders through the user audio callback; enable device output in its configuration".into(),
            )
            .into());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioDeviceError::NoDevice)?;
        let supported = find_config(&device, config.sample_rate, config.channels)?;
        let mut stream_config: StreamConfig = supported.into();
        if let Some(frames) = config.device_buffer_frames {
            stream_config.buffer_size = BufferSize::Fixed(frames as u32);
        }

        let err_fn = |err: cpal::StreamError| {
            rt_error!("Audio device error: {}", err);
        };

        let engine = engine.clone();
        let stream = match config.sample_format {
            SampleFormat::Float32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    render_from_device(&engine, OutputBuffer::F32(data), info);
                },
                err_fn,
                None,
            ),
            SampleFormat::Int16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], info: &cpal::OutputCallbackInfo| {
                    render_from_device(&engine, OutputBuffer::I16(data), info);
                },
                err_fn,
                None,
            ),
        }
        .map_err(AudioDeviceError::from)?;

        log::info!(
            "Opened audio device at {} Hz, {} channel(s)",
            stream_config.sample_rate.0,
            stream_config.channels
        );
        Ok(AudioDevice { stream })
    }

    pub fn start(&self) -> crate::Result<()> {
        self.stream.play().map_err(AudioDeviceError::from)?;
        Ok(())
    }

    pub fn pause(&self) -> crate::Result<()> {
        self.stream.pause().map_err(AudioDeviceError::from)?;
        Ok(())
    }
}
