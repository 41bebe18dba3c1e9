//! Routes parameter changes to live backends.
//!
//! Each backend kind declares one dependency set. A change to any field in
//! the set re-projects the complete parameter object for that kind, since
//! backends replace their parameters wholesale. Voice budget changes bypass
//! the sets and fan out to every live backend.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::backend::{
    BackendKind, BackendVoiceParams, BufferVoiceParams, SynthBackend, UnisonVoiceParams,
};
use crate::params::{ParamChange, ParamField, SynthParameters};

const OSCILLATOR_DEPENDENCIES: &[ParamField] = &[
    ParamField::AttackTime,
    ParamField::DecayTime,
    ParamField::SustainLevel,
    ParamField::ReleaseTime,
    ParamField::OscillatorType,
    ParamField::PeriodicWave,
    ParamField::UnisonSpread,
    ParamField::UnisonStackSize,
];

const BUFFER_DEPENDENCIES: &[ParamField] = &[
    ParamField::AttackTime,
    ParamField::DecayTime,
    ParamField::SustainLevel,
    ParamField::ReleaseTime,
    ParamField::BufferFactory,
];

/// Fields whose change requires `kind` to receive a fresh parameter object.
pub fn dependencies(kind: BackendKind) -> &'static [ParamField] {
    match kind {
        BackendKind::Oscillator => OSCILLATOR_DEPENDENCIES,
        BackendKind::Buffer => BUFFER_DEPENDENCIES,
    }
}

/// Merges the shared voice fields with the extension fields of `kind`.
pub fn project(values: &SynthParameters, kind: BackendKind) -> BackendVoiceParams {
    match kind {
        BackendKind::Oscillator => BackendVoiceParams::Unison(UnisonVoiceParams {
            base: values.voice,
            oscillator_type: values.oscillator_type,
            periodic_wave: values.periodic_wave.clone(),
            spread: values.unison_spread,
            stack_size: values.unison_stack_size,
        }),
        BackendKind::Buffer => BackendVoiceParams::Buffer(BufferVoiceParams {
            base: values.voice,
            factory: values.buffer_factory.clone(),
        }),
    }
}

/// Live backends of one session, keyed by kind.
#[derive(Default)]
pub struct BackendBinding {
    backends: BTreeMap<BackendKind, Box<dyn SynthBackend>>,
}

impl BackendBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `backend`, handing it the current voice budget and a full
    /// parameter object. Replaces any backend of the same kind.
    pub fn attach(&mut self, mut backend: Box<dyn SynthBackend>, values: &SynthParameters) {
        let kind = backend.kind();
        backend.set_max_polyphony(values.max_polyphony);
        backend.set_voice_params(project(values, kind));
        debug!(%kind, max_polyphony = values.max_polyphony, "backend attached");
        self.backends.insert(kind, backend);
    }

    /// Propagates one stored change.
    pub fn on_change(&mut self, change: &ParamChange, values: &SynthParameters) {
        if let ParamChange::MaxPolyphony(voices) = change {
            self.set_polyphony(*voices);
            return;
        }

        let field = change.field();
        for (kind, backend) in &mut self.backends {
            if dependencies(*kind).contains(&field) {
                debug!(%kind, ?field, "pushing voice params");
                backend.set_voice_params(project(values, *kind));
            }
        }
    }

    /// Sends `voices` to every live backend.
    pub fn set_polyphony(&mut self, voices: usize) {
        for (kind, backend) in &mut self.backends {
            debug!(%kind, voices, "setting polyphony");
            backend.set_polyphony(voices);
        }
    }

    /// Live backend of `kind`, if one is attached.
    pub fn get_mut(&mut self, kind: BackendKind) -> Option<&mut (dyn SynthBackend + 'static)> {
        self.backends.get_mut(&kind).map(|backend| backend.as_mut())
    }

    /// Kinds of every attached backend, in order.
    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.backends.keys().copied()
    }

    /// True once no backend is attached.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Forces every backend down to zero voices and drops them.
    pub fn release_all(&mut self) {
        self.set_polyphony(0);
        self.backends.clear();
    }
}

impl fmt::Debug for BackendBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBinding")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}
