//! Recording doubles for the synthesis engines.

use std::cell::RefCell;
use std::rc::Rc;

use crate::audio::offline::OfflineContext;
use crate::audio::{NodeId, OfflineAudioPlatform};
use crate::backend::{
    BackendFactory, BackendKind, BackendVoiceParams, BufferVoiceParams, SynthBackend,
    UnisonVoiceParams,
};
use crate::Result;

#[derive(Debug, Clone)]
pub enum BackendCall {
    SetVoiceParams(BackendVoiceParams),
    SetMaxPolyphony(usize),
    SetPolyphony(usize),
    NoteOn(f32),
    NoteOff(f32),
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<BackendCall>,
    params: Option<BackendVoiceParams>,
    /// Open context count observed by each `set_polyphony` call.
    open_contexts_at_polyphony: Vec<usize>,
    /// Live connection count observed by each `set_polyphony` call.
    connections_at_polyphony: Vec<usize>,
}

/// Backend that records every call. Clones share the recording.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    kind: BackendKind,
    recording: Rc<RefCell<Recording>>,
    platform: Option<OfflineAudioPlatform>,
}

impl RecordingBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            recording: Rc::default(),
            platform: None,
        }
    }

    pub fn with_platform(kind: BackendKind, platform: OfflineAudioPlatform) -> Self {
        Self {
            platform: Some(platform),
            ..Self::new(kind)
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.recording.borrow().calls.clone()
    }

    pub fn clear(&self) {
        self.recording.borrow_mut().calls.clear();
    }

    pub fn polyphony(&self) -> Option<usize> {
        self.recording
            .borrow()
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                BackendCall::SetPolyphony(voices) => Some(*voices),
                _ => None,
            })
    }

    pub fn open_contexts_at_polyphony(&self) -> Vec<usize> {
        self.recording.borrow().open_contexts_at_polyphony.clone()
    }

    pub fn connections_at_polyphony(&self) -> Vec<usize> {
        self.recording.borrow().connections_at_polyphony.clone()
    }

    pub fn last_unison_params(&self) -> Option<UnisonVoiceParams> {
        match &self.recording.borrow().params {
            Some(BackendVoiceParams::Unison(params)) => Some(params.clone()),
            _ => None,
        }
    }

    pub fn last_buffer_params(&self) -> Option<BufferVoiceParams> {
        match &self.recording.borrow().params {
            Some(BackendVoiceParams::Buffer(params)) => Some(params.clone()),
            _ => None,
        }
    }
}

impl SynthBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn set_voice_params(&mut self, params: BackendVoiceParams) {
        let mut recording = self.recording.borrow_mut();
        recording.calls.push(BackendCall::SetVoiceParams(params.clone()));
        recording.params = Some(params);
    }

    fn set_max_polyphony(&mut self, voices: usize) {
        self.recording
            .borrow_mut()
            .calls
            .push(BackendCall::SetMaxPolyphony(voices));
    }

    fn set_polyphony(&mut self, voices: usize) {
        let observed = self
            .platform
            .as_ref()
            .map(|platform| (platform.open_contexts(), platform.connections().len()));
        let mut recording = self.recording.borrow_mut();
        recording.calls.push(BackendCall::SetPolyphony(voices));
        if let Some((open, connections)) = observed {
            recording.open_contexts_at_polyphony.push(open);
            recording.connections_at_polyphony.push(connections);
        }
    }

    fn note_on(&mut self, frequency: f32) -> Result<()> {
        let mut recording = self.recording.borrow_mut();
        if let Some(BackendVoiceParams::Buffer(params)) = &recording.params {
            params.create_buffer(frequency)?;
        }
        recording.calls.push(BackendCall::NoteOn(frequency));
        Ok(())
    }

    fn note_off(&mut self, frequency: f32) {
        self.recording
            .borrow_mut()
            .calls
            .push(BackendCall::NoteOff(frequency));
    }
}

/// Factory handing out [`RecordingBackend`]s and remembering them.
#[derive(Debug, Clone)]
pub struct RecordingFactory {
    platform: OfflineAudioPlatform,
    built: Rc<RefCell<Vec<(RecordingBackend, NodeId)>>>,
}

impl RecordingFactory {
    pub fn new(platform: OfflineAudioPlatform) -> Self {
        Self {
            platform,
            built: Rc::default(),
        }
    }

    /// Most recently built backend of `kind`.
    pub fn backend(&self, kind: BackendKind) -> Option<RecordingBackend> {
        self.built
            .borrow()
            .iter()
            .rev()
            .find(|(backend, _)| backend.kind == kind)
            .map(|(backend, _)| backend.clone())
    }

    pub fn inputs(&self) -> Vec<NodeId> {
        self.built.borrow().iter().map(|(_, input)| *input).collect()
    }

    pub fn built(&self) -> usize {
        self.built.borrow().len()
    }
}

impl BackendFactory<OfflineContext> for RecordingFactory {
    fn construct(
        &mut self,
        kind: BackendKind,
        _context: &mut OfflineContext,
        input: NodeId,
    ) -> Result<Box<dyn SynthBackend>> {
        let backend = RecordingBackend::with_platform(kind, self.platform.clone());
        self.built.borrow_mut().push((backend.clone(), input));
        Ok(Box::new(backend))
    }
}
