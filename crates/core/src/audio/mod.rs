//! Control-plane view of the host audio engine.
//!
//! The coordinator never renders samples itself. It only creates nodes,
//! connects them and schedules parameter values; the host renders on its own
//! real-time thread. [`AudioPlatform`] and [`AudioContext`] describe exactly
//! the calls the coordinator makes, so any engine (a browser bridge, a native
//! graph, the in-memory [`offline`] platform) can sit underneath.

use std::fmt;
use std::future::Future;

use crate::{LatencyHint, Result};

pub mod offline;

pub use offline::OfflineAudioPlatform;

/// Opaque handle to a node living inside an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Wraps a platform-assigned node number.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Platform-assigned node number.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Biquad response used by a filter stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Automatable parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioParam {
    Gain,
    Frequency,
    Q,
}

/// Factory for audio contexts. Creating a context is the only step that may
/// be denied by the host (permissions, exhausted devices).
pub trait AudioPlatform {
    type Context: AudioContext;

    fn create_context(&mut self, latency_hint: LatencyHint) -> Result<Self::Context>;
}

/// One live audio context. All calls return immediately; rendering happens
/// asynchronously on the host's audio thread.
pub trait AudioContext {
    /// Current time on the context clock, in seconds.
    fn current_time(&self) -> f64;

    /// The hardware output node.
    fn destination(&self) -> NodeId;

    /// Creates a gain stage. Fails when the platform is out of nodes.
    fn create_gain(&mut self) -> Result<NodeId>;

    fn create_biquad_filter(&mut self, kind: FilterKind) -> Result<NodeId>;

    /// Routes the output of `from` into `to`.
    fn connect(&mut self, from: NodeId, to: NodeId);

    /// Removes every outgoing connection of `node`.
    fn disconnect(&mut self, node: NodeId);

    /// Schedules `param` of `node` to jump to `value` at `time`.
    fn set_param_at_time(&mut self, node: NodeId, param: AudioParam, value: f32, time: f64);

    /// Restarts processing after [`AudioContext::suspend`].
    fn resume(&mut self);

    /// Pauses processing without releasing any node.
    fn suspend(&mut self);

    /// Releases the context. Completes once the host has let go of the
    /// device; no other context should be created before that.
    fn close(&mut self) -> impl Future<Output = Result<()>>;
}
