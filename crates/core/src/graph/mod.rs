//! Fixed output chain shared by every synth backend:
//!
//! ```text
//! backend -> highpass -> lowpass -> gain -> destination
//! ```
//!
//! The filters keep sub-sonic rumble and harsh highs away from the user's
//! speakers; the gain stage carries the main volume.

use tracing::debug;

use crate::audio::{AudioContext, AudioParam, FilterKind, NodeId};
use crate::{FilterConfig, Result};

/// Live processing chain for one audio session.
///
/// Every stage is optional so a chain that failed half way can still be torn
/// down stage by stage.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AudioGraphHandle {
    gain: Option<NodeId>,
    lowpass: Option<NodeId>,
    highpass: Option<NodeId>,
}

impl AudioGraphHandle {
    pub fn gain(&self) -> Option<NodeId> {
        self.gain
    }

    pub fn lowpass(&self) -> Option<NodeId> {
        self.lowpass
    }

    pub fn highpass(&self) -> Option<NodeId> {
        self.highpass
    }

    /// Node synth backends must attach to.
    pub fn input(&self) -> Option<NodeId> {
        self.highpass
    }

    /// Schedules the gain stage to `volume` at the context's current time.
    pub fn set_volume<C: AudioContext>(&self, context: &mut C, volume: f32) {
        if let Some(gain) = self.gain {
            let now = context.current_time();
            context.set_param_at_time(gain, AudioParam::Gain, volume, now);
        }
    }
}

/// Wires the output chain against a context.
#[derive(Debug, Clone)]
pub struct AudioGraphBuilder {
    filters: FilterConfig,
}

impl AudioGraphBuilder {
    pub fn new(filters: FilterConfig) -> Self {
        Self { filters }
    }

    /// Builds and connects the chain. If the context refuses a node, the
    /// stages created so far are disconnected again before the error is
    /// returned.
    pub fn build<C: AudioContext>(&self, context: &mut C, volume: f32) -> Result<AudioGraphHandle> {
        let mut handle = AudioGraphHandle::default();
        match self.wire(context, volume, &mut handle) {
            Ok(()) => {
                debug!(?handle, "audio graph built");
                Ok(handle)
            }
            Err(err) => {
                Self::teardown(context, handle);
                Err(err)
            }
        }
    }

    fn wire<C: AudioContext>(
        &self,
        context: &mut C,
        volume: f32,
        handle: &mut AudioGraphHandle,
    ) -> Result<()> {
        let now = context.current_time();

        let gain = context.create_gain()?;
        context.set_param_at_time(gain, AudioParam::Gain, volume, now);
        let destination = context.destination();
        context.connect(gain, destination);
        handle.gain = Some(gain);

        let lowpass = self.filter(context, FilterKind::Lowpass, self.filters.lowpass_hz, now)?;
        context.connect(lowpass, gain);
        handle.lowpass = Some(lowpass);

        let highpass = self.filter(context, FilterKind::Highpass, self.filters.highpass_hz, now)?;
        context.connect(highpass, lowpass);
        handle.highpass = Some(highpass);

        Ok(())
    }

    fn filter<C: AudioContext>(
        &self,
        context: &mut C,
        kind: FilterKind,
        frequency: f32,
        now: f64,
    ) -> Result<NodeId> {
        let node = context.create_biquad_filter(kind)?;
        context.set_param_at_time(node, AudioParam::Frequency, frequency, now);
        context.set_param_at_time(node, AudioParam::Q, self.filters.q, now);
        Ok(node)
    }

    /// Disconnects every stage present in `handle`. Must run before the
    /// owning context is closed.
    pub fn teardown<C: AudioContext>(context: &mut C, handle: AudioGraphHandle) {
        for node in [handle.gain, handle.lowpass, handle.highpass]
            .into_iter()
            .flatten()
        {
            context.disconnect(node);
        }
    }
}

impl Default for AudioGraphBuilder {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
