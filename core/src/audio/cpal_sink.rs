//! Speaker output via cpal.
//!
//! Linux build note: you need ALSA development headers for `cpal`.
//! On Debian/Ubuntu:
//!   sudo apt-get update && sudo apt-get install -y libasound2-dev pkg-config
use super::pcm::PcmFormat;
use super::sink::{AudioSink, SinkFactory};
use crate::{Result, VoxlineError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// Opens one cpal output stream per playback on the chosen device.
#[derive(Clone, Debug, Default)]
pub struct CpalSinkFactory {
    /// Optional output device name substring to match
    pub device_name: Option<String>,
}

impl CpalSinkFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(ref needle) = self.device_name {
            let devices = host
                .output_devices()
                .map_err(|e| VoxlineError::Audio(format!("cannot enumerate devices: {}", e)))?;
            for dev in devices {
                if let Ok(name) = dev.name() {
                    if name.to_lowercase().contains(&needle.to_lowercase()) {
                        return Ok(dev);
                    }
                }
            }
            info!(target = "mixer", device = %needle, "Output device not found; using default");
        }
        host.default_output_device()
            .ok_or_else(|| VoxlineError::Audio("no default output device".into()))
    }
}

impl SinkFactory for CpalSinkFactory {
    fn open(&self, line: &str, format: PcmFormat) -> Result<Box<dyn AudioSink>> {
        let device = self.device()?;
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::new(Mutex::new(VecDeque::<f32>::new()));
        let queue_cb = Arc::clone(&queue);
        let line_name = line.to_string();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut q = match queue_cb.lock() {
                        Ok(q) => q,
                        Err(_) => return,
                    };
                    for sample in data.iter_mut() {
                        *sample = q.pop_front().unwrap_or(0.0);
                    }
                },
                move |err| {
                    error!(target = "mixer", line = %line_name, "audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| VoxlineError::Audio(format!("failed to build output stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| VoxlineError::Audio(format!("failed to start output stream: {}", e)))?;

        Ok(Box::new(CpalSink {
            _stream: stream,
            queue,
            high_water: format.samples_for(Duration::from_millis(100)),
        }))
    }
}

struct CpalSink {
    _stream: cpal::Stream,
    queue: Arc<Mutex<VecDeque<f32>>>,
    high_water: usize,
}

impl CpalSink {
    fn queued(&self) -> Result<usize> {
        self.queue
            .lock()
            .map(|q| q.len())
            .map_err(|e| VoxlineError::Audio(format!("playback queue lock poisoned: {}", e)))
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, samples: &[i16]) -> Result<()> {
        while self.queued()? > self.high_water {
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut q = self
            .queue
            .lock()
            .map_err(|e| VoxlineError::Audio(format!("playback queue lock poisoned: {}", e)))?;
        q.extend(samples.iter().map(|&s| s as f32 / i16::MAX as f32));
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        while self.queued()? > 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}
