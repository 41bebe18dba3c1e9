//! Core library for the synth session coordinator.
//!
//! The crate owns the control plane of an interactive synthesizer: it builds
//! the protective output chain on the host audio engine, keeps the canonical
//! synth parameters, pushes them into the live synthesis backends and tears
//! everything down again without leaking voices or contexts. Sound generation
//! itself happens behind the [`SynthBackend`] trait.

pub mod audio;
pub mod backend;
pub mod binding;
pub mod config;
pub mod error;
pub mod graph;
pub mod params;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use audio::{AudioContext, AudioParam, AudioPlatform, FilterKind, NodeId, OfflineAudioPlatform};
pub use backend::{
    BackendFactory, BackendKind, BackendVoiceParams, BufferVoiceParams, SynthBackend,
    UnisonVoiceParams,
};
pub use binding::{project, BackendBinding};
pub use config::{FilterConfig, LatencyHint, SessionConfig};
pub use error::{Result, SynthSessionError};
pub use graph::{AudioGraphBuilder, AudioGraphHandle};
pub use params::{
    AudioBuffer, BufferFactory, OscillatorType, ParamChange, ParamField, ParameterStore,
    PeriodicWave, SubscriptionId, SynthParameters, VoiceParameters, MAX_POLYPHONY_KEY,
};
pub use session::{SessionState, SynthSession};
pub use storage::{JsonFileSettings, MemorySettings, SettingsStore};
