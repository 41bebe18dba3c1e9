//! Canonical synth parameters and change notification.
//!
//! Every mutation goes through [`ParameterStore::apply`], which writes the new
//! value and then calls each subscribed listener exactly once with that value
//! and a view of the whole record.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::storage::SettingsStore;
use crate::SessionConfig;

/// Settings key holding the persisted voice budget.
pub const MAX_POLYPHONY_KEY: &str = "maxPolyphony";

/// Envelope and scheduling fields shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParameters {
    /// Fixed scheduling compensation, chosen per host.
    pub audio_delay: f64,
    pub attack_time: f64,
    pub decay_time: f64,
    pub sustain_level: f64,
    pub release_time: f64,
}

impl VoiceParameters {
    pub fn with_audio_delay(audio_delay: f64) -> Self {
        Self {
            audio_delay,
            attack_time: 0.01,
            decay_time: 0.3,
            sustain_level: 0.8,
            release_time: 0.01,
        }
    }
}

/// Built-in oscillator shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OscillatorType {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

/// Custom waveform described by its Fourier coefficients.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeriodicWave {
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl PeriodicWave {
    pub fn new(real: Vec<f32>, imag: Vec<f32>) -> Self {
        Self { real, imag }
    }
}

/// Mono sample data produced for one buffer voice.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Produces the sample data a buffer voice plays for a given frequency.
#[derive(Clone)]
pub struct BufferFactory(Arc<dyn Fn(f32) -> AudioBuffer + Send + Sync>);

impl BufferFactory {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(f32) -> AudioBuffer + Send + Sync + 'static,
    {
        Self(Arc::new(factory))
    }

    pub fn create(&self, frequency: f32) -> AudioBuffer {
        (self.0)(frequency)
    }
}

impl fmt::Debug for BufferFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferFactory").finish_non_exhaustive()
    }
}

/// Full parameter record.
#[derive(Debug, Clone)]
pub struct SynthParameters {
    pub voice: VoiceParameters,
    pub oscillator_type: OscillatorType,
    pub periodic_wave: Option<PeriodicWave>,
    pub unison_spread: f32,
    pub unison_stack_size: usize,
    pub buffer_factory: Option<BufferFactory>,
    pub main_volume: f32,
    pub max_polyphony: usize,
}

impl SynthParameters {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            voice: VoiceParameters::with_audio_delay(config.audio_delay),
            oscillator_type: OscillatorType::Sawtooth,
            periodic_wave: None,
            unison_spread: 3.0,
            unison_stack_size: 5,
            buffer_factory: None,
            main_volume: config.main_volume.clamp(0.0, 1.0),
            max_polyphony: config.default_max_polyphony,
        }
    }
}

impl Default for SynthParameters {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Identifies a tracked field without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamField {
    AttackTime,
    DecayTime,
    SustainLevel,
    ReleaseTime,
    OscillatorType,
    PeriodicWave,
    UnisonSpread,
    UnisonStackSize,
    BufferFactory,
    MainVolume,
    MaxPolyphony,
}

/// One logical mutation, carrying the new value.
#[derive(Debug, Clone)]
pub enum ParamChange {
    AttackTime(f64),
    DecayTime(f64),
    SustainLevel(f64),
    ReleaseTime(f64),
    OscillatorType(OscillatorType),
    PeriodicWave(Option<PeriodicWave>),
    UnisonSpread(f32),
    UnisonStackSize(usize),
    BufferFactory(Option<BufferFactory>),
    MainVolume(f32),
    MaxPolyphony(usize),
}

impl ParamChange {
    pub fn field(&self) -> ParamField {
        match self {
            Self::AttackTime(_) => ParamField::AttackTime,
            Self::DecayTime(_) => ParamField::DecayTime,
            Self::SustainLevel(_) => ParamField::SustainLevel,
            Self::ReleaseTime(_) => ParamField::ReleaseTime,
            Self::OscillatorType(_) => ParamField::OscillatorType,
            Self::PeriodicWave(_) => ParamField::PeriodicWave,
            Self::UnisonSpread(_) => ParamField::UnisonSpread,
            Self::UnisonStackSize(_) => ParamField::UnisonStackSize,
            Self::BufferFactory(_) => ParamField::BufferFactory,
            Self::MainVolume(_) => ParamField::MainVolume,
            Self::MaxPolyphony(_) => ParamField::MaxPolyphony,
        }
    }

    /// Clamps into the accepted range. `None` drops the change entirely.
    fn normalize(self) -> Option<Self> {
        let finite = |value: f64| value.is_finite().then_some(value);
        Some(match self {
            Self::AttackTime(v) => Self::AttackTime(finite(v)?),
            Self::DecayTime(v) => Self::DecayTime(finite(v)?),
            Self::SustainLevel(v) => Self::SustainLevel(finite(v)?),
            Self::ReleaseTime(v) => Self::ReleaseTime(finite(v)?),
            Self::UnisonSpread(v) => Self::UnisonSpread(finite(v as f64)? as f32),
            Self::UnisonStackSize(size) => Self::UnisonStackSize(size.max(1)),
            Self::MainVolume(v) => Self::MainVolume(finite(v as f64)?.clamp(0.0, 1.0) as f32),
            other => other,
        })
    }
}

/// Handle returned by [`ParameterStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&ParamChange, &SynthParameters)>;

/// Observable parameter record.
pub struct ParameterStore {
    values: SynthParameters,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl ParameterStore {
    pub fn new(values: SynthParameters) -> Self {
        Self {
            values,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Builds the store from `config`, restores the persisted voice budget
    /// from `settings` and writes every later budget change back to it.
    pub fn load<S>(config: &SessionConfig, settings: S) -> Self
    where
        S: SettingsStore + 'static,
    {
        let mut values = SynthParameters::from_config(config);
        values.max_polyphony = load_max_polyphony(&settings, config.default_max_polyphony);

        let mut store = Self::new(values);
        store.subscribe(persist_max_polyphony(settings));
        store
    }

    pub fn values(&self) -> &SynthParameters {
        &self.values
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ParamChange, &SynthParameters) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Writes `change` and notifies listeners. Returns the change as stored
    /// (after clamping), or `None` if it was rejected.
    pub fn apply(&mut self, change: ParamChange) -> Option<ParamChange> {
        let Some(change) = change.normalize() else {
            debug!("ignoring non-finite parameter value");
            return None;
        };

        let values = &mut self.values;
        match &change {
            ParamChange::AttackTime(v) => values.voice.attack_time = *v,
            ParamChange::DecayTime(v) => values.voice.decay_time = *v,
            ParamChange::SustainLevel(v) => values.voice.sustain_level = *v,
            ParamChange::ReleaseTime(v) => values.voice.release_time = *v,
            ParamChange::OscillatorType(kind) => values.oscillator_type = *kind,
            ParamChange::PeriodicWave(wave) => values.periodic_wave = wave.clone(),
            ParamChange::UnisonSpread(v) => values.unison_spread = *v,
            ParamChange::UnisonStackSize(v) => values.unison_stack_size = *v,
            ParamChange::BufferFactory(factory) => values.buffer_factory = factory.clone(),
            ParamChange::MainVolume(v) => values.main_volume = *v,
            ParamChange::MaxPolyphony(v) => values.max_polyphony = *v,
        }

        for (_, listener) in &mut self.listeners {
            listener(&change, &self.values);
        }
        Some(change)
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("values", &self.values)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("persisted value `{raw}` is not a voice count")]
struct PersistedValueError {
    raw: String,
}

fn parse_max_polyphony(raw: &str) -> Result<usize, PersistedValueError> {
    raw.trim().parse().map_err(|_| PersistedValueError {
        raw: raw.to_string(),
    })
}

fn load_max_polyphony<S: SettingsStore>(settings: &S, default: usize) -> usize {
    let Some(raw) = settings.read(MAX_POLYPHONY_KEY) else {
        return default;
    };
    match parse_max_polyphony(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, default, "falling back to default max polyphony");
            default
        }
    }
}

fn persist_max_polyphony<S>(mut settings: S) -> impl FnMut(&ParamChange, &SynthParameters)
where
    S: SettingsStore + 'static,
{
    move |change, _| {
        if let ParamChange::MaxPolyphony(value) = change {
            if let Err(err) = settings.write(MAX_POLYPHONY_KEY, &value.to_string()) {
                warn!(%err, value, "could not persist max polyphony");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::storage::{JsonFileSettings, MemorySettings};

    #[test]
    fn defaults_match_factory_patch() {
        let values = SynthParameters::default();
        assert_eq!(values.voice.attack_time, 0.01);
        assert_eq!(values.voice.decay_time, 0.3);
        assert_eq!(values.voice.sustain_level, 0.8);
        assert_eq!(values.voice.release_time, 0.01);
        assert_eq!(values.oscillator_type, OscillatorType::Sawtooth);
        assert_eq!(values.unison_spread, 3.0);
        assert_eq!(values.unison_stack_size, 5);
        assert_eq!(values.max_polyphony, 6);
        assert!(values.buffer_factory.is_none());
    }

    #[test]
    fn listeners_see_each_mutation_once_with_new_value() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = ParameterStore::new(SynthParameters::default());
        let sink = seen.clone();
        store.subscribe(move |change, values| {
            sink.borrow_mut().push((change.field(), values.unison_spread));
        });

        store.apply(ParamChange::UnisonSpread(7.0));
        store.apply(ParamChange::UnisonStackSize(3));

        assert_eq!(
            *seen.borrow(),
            vec![
                (ParamField::UnisonSpread, 7.0),
                (ParamField::UnisonStackSize, 7.0)
            ]
        );
    }

    #[test]
    fn unsubscribed_listeners_stay_quiet() {
        let calls = Rc::new(RefCell::new(0));
        let mut store = ParameterStore::new(SynthParameters::default());
        let counter = calls.clone();
        let id = store.subscribe(move |_, _| *counter.borrow_mut() += 1);

        store.apply(ParamChange::AttackTime(0.2));
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.apply(ParamChange::AttackTime(0.3));

        assert_eq!(*calls.borrow(), 1);
        assert_eq!(store.values().voice.attack_time, 0.3);
    }

    #[test]
    fn clamps_volume_and_stack_size() {
        let mut store = ParameterStore::new(SynthParameters::default());

        let stored = store.apply(ParamChange::MainVolume(1.7)).unwrap();
        assert!(matches!(stored, ParamChange::MainVolume(v) if v == 1.0));
        store.apply(ParamChange::UnisonStackSize(0));
        assert_eq!(store.values().unison_stack_size, 1);

        assert!(store.apply(ParamChange::MainVolume(f32::NAN)).is_none());
        assert_eq!(store.values().main_volume, 1.0);
    }

    #[test]
    fn corrupted_polyphony_falls_back_to_default() {
        let settings = MemorySettings::new().with_entry(MAX_POLYPHONY_KEY, "lots");
        let store = ParameterStore::load(&SessionConfig::default(), settings);
        assert_eq!(store.values().max_polyphony, 6);

        let negative = MemorySettings::new().with_entry(MAX_POLYPHONY_KEY, "-3");
        let store = ParameterStore::load(&SessionConfig::default(), negative);
        assert_eq!(store.values().max_polyphony, 6);
    }

    #[test]
    fn polyphony_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = SessionConfig::default();

        let mut store = ParameterStore::load(&config, JsonFileSettings::open(&path).unwrap());
        store.apply(ParamChange::MaxPolyphony(0));
        store.apply(ParamChange::MaxPolyphony(11));

        let reloaded = ParameterStore::load(&config, JsonFileSettings::open(&path).unwrap());
        assert_eq!(reloaded.values().max_polyphony, 11);
    }

    #[test]
    fn numeric_polyphony_in_settings_file_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let config = SessionConfig::default();

        std::fs::write(&path, r#"{ "maxPolyphony": 8 }"#).unwrap();
        let store = ParameterStore::load(&config, JsonFileSettings::open(&path).unwrap());
        assert_eq!(store.values().max_polyphony, 8);

        std::fs::write(&path, r#"{ "maxPolyphony": [8] }"#).unwrap();
        let store = ParameterStore::load(&config, JsonFileSettings::open(&path).unwrap());
        assert_eq!(store.values().max_polyphony, 6);
    }

    #[test]
    fn buffer_factory_is_callable() {
        let factory = BufferFactory::new(|frequency| AudioBuffer {
            sample_rate: 48_000,
            samples: vec![0.0; frequency as usize],
        });
        assert_eq!(factory.create(4.0).samples.len(), 4);
    }
}
