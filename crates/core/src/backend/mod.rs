//! Interface to the synthesis engines that actually produce voices.
//!
//! Two engines exist: a unison oscillator engine and a sample buffer engine.
//! Both are constructed against the graph's input node, take a complete
//! parameter object and enforce a voice budget.

use std::fmt;

use crate::audio::{AudioContext, NodeId};
use crate::params::{AudioBuffer, BufferFactory, OscillatorType, PeriodicWave, VoiceParameters};
use crate::{Result, SynthSessionError};

/// Selects one of the synthesis engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    Oscillator,
    Buffer,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Oscillator, BackendKind::Buffer];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oscillator => f.write_str("oscillator"),
            Self::Buffer => f.write_str("buffer"),
        }
    }
}

/// Parameters of the unison oscillator engine.
#[derive(Debug, Clone, PartialEq)]
pub struct UnisonVoiceParams {
    pub base: VoiceParameters,
    pub oscillator_type: OscillatorType,
    pub periodic_wave: Option<PeriodicWave>,
    /// Detune range of the stack, in cents.
    pub spread: f32,
    /// Oscillators per voice.
    pub stack_size: usize,
}

/// Parameters of the sample buffer engine.
#[derive(Debug, Clone)]
pub struct BufferVoiceParams {
    pub base: VoiceParameters,
    pub factory: Option<BufferFactory>,
}

impl BufferVoiceParams {
    /// Produces the buffer for a new voice. Failing here, rather than when
    /// the parameters are pushed, lets the factory arrive after the rest of
    /// the patch.
    pub fn create_buffer(&self, frequency: f32) -> Result<AudioBuffer> {
        self.factory
            .as_ref()
            .map(|factory| factory.create(frequency))
            .ok_or(SynthSessionError::MissingBackendFactory)
    }
}

/// Merged parameter object handed to a backend. Always complete; backends
/// replace their previous object wholesale.
#[derive(Debug, Clone)]
pub enum BackendVoiceParams {
    Unison(UnisonVoiceParams),
    Buffer(BufferVoiceParams),
}

impl BackendVoiceParams {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Unison(_) => BackendKind::Oscillator,
            Self::Buffer(_) => BackendKind::Buffer,
        }
    }

    /// Envelope and scheduling fields common to both engines.
    pub fn base(&self) -> &VoiceParameters {
        match self {
            Self::Unison(params) => &params.base,
            Self::Buffer(params) => &params.base,
        }
    }
}

/// A live synthesis engine.
pub trait SynthBackend {
    fn kind(&self) -> BackendKind;

    /// Replaces the parameter object used for voices triggered from now on.
    fn set_voice_params(&mut self, params: BackendVoiceParams);

    /// Sets the voice budget before any voice has been triggered.
    fn set_max_polyphony(&mut self, voices: usize);

    /// Adjusts the voice budget of a running engine, releasing voices above
    /// the new limit. Zero releases everything.
    fn set_polyphony(&mut self, voices: usize);

    fn note_on(&mut self, frequency: f32) -> Result<()>;

    fn note_off(&mut self, frequency: f32);
}

/// Constructs backends attached to a graph input node.
pub trait BackendFactory<C: AudioContext> {
    fn construct(
        &mut self,
        kind: BackendKind,
        context: &mut C,
        input: NodeId,
    ) -> Result<Box<dyn SynthBackend>>;
}

impl<C, F> BackendFactory<C> for F
where
    C: AudioContext,
    F: FnMut(BackendKind, &mut C, NodeId) -> Result<Box<dyn SynthBackend>>,
{
    fn construct(
        &mut self,
        kind: BackendKind,
        context: &mut C,
        input: NodeId,
    ) -> Result<Box<dyn SynthBackend>> {
        self(kind, context, input)
    }
}
