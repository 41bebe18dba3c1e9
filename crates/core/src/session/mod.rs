//! Lifecycle of one audio session: context, output chain and backends are
//! created, suspended and torn down together.

use std::fmt;

use tracing::{debug, info, warn};

use crate::audio::{AudioContext, AudioPlatform};
use crate::backend::{BackendFactory, BackendKind, SynthBackend};
use crate::binding::BackendBinding;
use crate::graph::{AudioGraphBuilder, AudioGraphHandle};
use crate::params::{
    BufferFactory, OscillatorType, ParamChange, ParameterStore, PeriodicWave, SubscriptionId,
    SynthParameters,
};
use crate::storage::SettingsStore;
use crate::{Result, SessionConfig, SynthSessionError};

/// Where a [`SynthSession`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Suspended,
    TornDown,
}

struct LiveSession<C> {
    context: C,
    graph: AudioGraphHandle,
    backends: BackendBinding,
}

/// Owns the audio context, the output chain and every backend, and keeps the
/// backends in step with the parameter store.
pub struct SynthSession<P: AudioPlatform, F> {
    platform: P,
    factory: F,
    config: SessionConfig,
    builder: AudioGraphBuilder,
    params: ParameterStore,
    live: Option<LiveSession<P::Context>>,
    state: SessionState,
}

impl<P, F> SynthSession<P, F>
where
    P: AudioPlatform,
    F: BackendFactory<P::Context>,
{
    /// Creates an idle session. The voice budget is restored from
    /// `settings`, and written back there whenever it changes.
    pub fn new<S>(platform: P, factory: F, config: SessionConfig, settings: S) -> Self
    where
        S: SettingsStore + 'static,
    {
        let params = ParameterStore::load(&config, settings);
        Self::with_params(platform, factory, config, params)
    }

    pub fn with_params(
        platform: P,
        factory: F,
        config: SessionConfig,
        params: ParameterStore,
    ) -> Self {
        Self {
            platform,
            factory,
            builder: AudioGraphBuilder::new(config.filters.clone()),
            config,
            params,
            live: None,
            state: SessionState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Host configuration the session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current parameter values, also kept while no context is open.
    pub fn params(&self) -> &SynthParameters {
        self.params.values()
    }

    /// Output chain of the open context, if any.
    pub fn graph(&self) -> Option<&AudioGraphHandle> {
        self.live.as_ref().map(|live| &live.graph)
    }

    /// Open audio context, if any.
    pub fn context(&self) -> Option<&P::Context> {
        self.live.as_ref().map(|live| &live.context)
    }

    pub fn live_backends(&self) -> Vec<BackendKind> {
        self.live
            .as_ref()
            .map(|live| live.backends.kinds().collect())
            .unwrap_or_default()
    }

    /// Starts audio. On a live session this only resumes the context, which
    /// the host may have suspended in the background.
    pub async fn initialize(&mut self) -> Result<()> {
        if let Some(live) = &mut self.live {
            live.context.resume();
            self.state = SessionState::Active;
            info!("audio session resumed");
            return Ok(());
        }

        let mut context = self.platform.create_context(self.config.latency_hint)?;
        match self.assemble(&mut context) {
            Ok((graph, backends)) => {
                self.live = Some(LiveSession {
                    context,
                    graph,
                    backends,
                });
                self.state = SessionState::Active;
                info!(
                    max_polyphony = self.params.values().max_polyphony,
                    "audio session initialized"
                );
                Ok(())
            }
            Err(err) => {
                if let Err(close_err) = context.close().await {
                    warn!(%close_err, "could not close context after failed initialization");
                }
                Err(err)
            }
        }
    }

    fn assemble(
        &mut self,
        context: &mut P::Context,
    ) -> Result<(AudioGraphHandle, BackendBinding)> {
        let values = self.params.values();
        let graph = self.builder.build(context, values.main_volume)?;
        let Some(input) = graph.input() else {
            AudioGraphBuilder::teardown(context, graph);
            return Err(SynthSessionError::msg("output chain has no input stage"));
        };

        let mut backends = BackendBinding::new();
        for kind in BackendKind::ALL {
            match self.factory.construct(kind, context, input) {
                Ok(backend) => backends.attach(backend, values),
                Err(err) => {
                    AudioGraphBuilder::teardown(context, graph);
                    backends.release_all();
                    return Err(err);
                }
            }
        }
        Ok((graph, backends))
    }

    /// Pauses rendering without releasing anything.
    pub fn suspend(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        if let Some(live) = &mut self.live {
            live.context.suspend();
            self.state = SessionState::Suspended;
            info!("audio session suspended");
        }
    }

    /// Releases every voice and the context. Resolves once the context is
    /// closed; `initialize` must not be called before that.
    pub async fn teardown(&mut self) -> Result<()> {
        let Some(mut live) = self.live.take() else {
            return Ok(());
        };

        AudioGraphBuilder::teardown(&mut live.context, live.graph);
        live.backends.release_all();
        self.state = SessionState::TornDown;

        let closed = live.context.close().await;
        match &closed {
            Ok(()) => info!("audio session torn down"),
            Err(err) => warn!(%err, "audio context did not close cleanly"),
        }
        closed
    }

    /// Stores `change` and pushes it into the live session, if any.
    pub fn update(&mut self, change: ParamChange) {
        let Some(change) = self.params.apply(change) else {
            return;
        };
        let Some(live) = &mut self.live else {
            return;
        };

        if let ParamChange::MainVolume(volume) = change {
            debug!(volume, "scheduling main volume");
            live.graph.set_volume(&mut live.context, volume);
        }
        live.backends.on_change(&change, self.params.values());
    }

    pub fn set_main_volume(&mut self, volume: f32) {
        self.update(ParamChange::MainVolume(volume));
    }

    pub fn set_max_polyphony(&mut self, voices: usize) {
        self.update(ParamChange::MaxPolyphony(voices));
    }

    pub fn set_attack_time(&mut self, seconds: f64) {
        self.update(ParamChange::AttackTime(seconds));
    }

    pub fn set_decay_time(&mut self, seconds: f64) {
        self.update(ParamChange::DecayTime(seconds));
    }

    pub fn set_sustain_level(&mut self, level: f64) {
        self.update(ParamChange::SustainLevel(level));
    }

    pub fn set_release_time(&mut self, seconds: f64) {
        self.update(ParamChange::ReleaseTime(seconds));
    }

    pub fn set_oscillator_type(&mut self, oscillator_type: OscillatorType) {
        self.update(ParamChange::OscillatorType(oscillator_type));
    }

    pub fn set_periodic_wave(&mut self, wave: Option<PeriodicWave>) {
        self.update(ParamChange::PeriodicWave(wave));
    }

    pub fn set_unison_spread(&mut self, spread: f32) {
        self.update(ParamChange::UnisonSpread(spread));
    }

    pub fn set_unison_stack_size(&mut self, stack_size: usize) {
        self.update(ParamChange::UnisonStackSize(stack_size));
    }

    pub fn set_buffer_factory(&mut self, factory: Option<BufferFactory>) {
        self.update(ParamChange::BufferFactory(factory));
    }

    /// Registers a listener for every stored change.
    pub fn subscribe<L>(&mut self, listener: L) -> SubscriptionId
    where
        L: FnMut(&ParamChange, &SynthParameters) + 'static,
    {
        self.params.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.params.unsubscribe(id)
    }

    /// Starts a voice on the backend of `kind`.
    pub fn note_on(&mut self, kind: BackendKind, frequency: f32) -> Result<()> {
        self.active_backend(kind)?.note_on(frequency)
    }

    pub fn note_off(&mut self, kind: BackendKind, frequency: f32) -> Result<()> {
        self.active_backend(kind)?.note_off(frequency);
        Ok(())
    }

    fn active_backend(&mut self, kind: BackendKind) -> Result<&mut (dyn SynthBackend + 'static)> {
        if self.state != SessionState::Active {
            return Err(SynthSessionError::NotActive);
        }
        self.live
            .as_mut()
            .and_then(|live| live.backends.get_mut(kind))
            .ok_or(SynthSessionError::NotActive)
    }
}

impl<P, F> fmt::Debug for SynthSession<P, F>
where
    P: AudioPlatform,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthSession")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("params", &self.params)
            .field("graph", &self.live.as_ref().map(|live| &live.graph))
            .finish_non_exhaustive()
    }
}
