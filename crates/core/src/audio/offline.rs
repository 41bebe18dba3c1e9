//! In-memory audio platform.
//!
//! Nothing is rendered. Every control-plane call is recorded in a shared
//! graph so the command line demo can print the wiring and tests can assert
//! on topology and automation. Cloning an [`OfflineAudioPlatform`]
//! yields another view of the same graph.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::{AudioContext, AudioParam, AudioPlatform, FilterKind, NodeId};
use crate::{LatencyHint, Result, SynthSessionError};

/// What kind of node an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineNodeKind {
    Destination,
    Gain,
    Filter(FilterKind),
}

/// One scheduled parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub node: NodeId,
    pub param: AudioParam,
    pub value: f32,
    pub time: f64,
}

#[derive(Debug, Clone, Copy)]
struct OfflineNode {
    kind: OfflineNodeKind,
    context: u32,
}

/// Recorded state shared by the platform and every context it created.
#[derive(Debug, Default)]
struct OfflineGraph {
    nodes: BTreeMap<NodeId, OfflineNode>,
    connections: BTreeSet<(NodeId, NodeId)>,
    automation: Vec<ParamEvent>,
    open_contexts: BTreeSet<u32>,
    peak_open_contexts: usize,
    contexts_created: u32,
    resumes: usize,
    suspends: usize,
    last_latency_hint: Option<LatencyHint>,
    time: f64,
    next_node: u32,
    deny_reason: Option<String>,
    node_budget: Option<usize>,
}

impl OfflineGraph {
    fn alloc(&mut self, context: u32, kind: OfflineNodeKind) -> Result<NodeId> {
        if kind != OfflineNodeKind::Destination {
            match self.node_budget {
                Some(0) => {
                    return Err(SynthSessionError::unavailable(
                        "offline node budget exhausted",
                    ))
                }
                Some(ref mut left) => *left -= 1,
                None => {}
            }
        }
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, OfflineNode { kind, context });
        Ok(id)
    }

    fn live_node(&self, id: NodeId) -> OfflineNode {
        let node = match self.nodes.get(&id) {
            Some(node) => *node,
            None => panic!("{id} does not belong to any offline context"),
        };
        assert!(
            self.open_contexts.contains(&node.context),
            "{id} used after its context was closed"
        );
        node
    }
}

/// Audio platform that records instead of rendering.
#[derive(Debug, Clone, Default)]
pub struct OfflineAudioPlatform {
    graph: Rc<RefCell<OfflineGraph>>,
}

impl OfflineAudioPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_context` call fail with
    /// [`SynthSessionError::ResourceUnavailable`].
    pub fn deny_contexts(&self, reason: impl Into<String>) {
        self.graph.borrow_mut().deny_reason = Some(reason.into());
    }

    pub fn allow_contexts(&self) {
        self.graph.borrow_mut().deny_reason = None;
    }

    /// Lets only `count` more gain/filter nodes be created.
    pub fn limit_nodes(&self, count: usize) {
        self.graph.borrow_mut().node_budget = Some(count);
    }

    pub fn advance_time(&self, seconds: f64) {
        self.graph.borrow_mut().time += seconds;
    }

    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        self.graph.borrow().connections.iter().copied().collect()
    }

    pub fn node_kind(&self, id: NodeId) -> Option<OfflineNodeKind> {
        self.graph.borrow().nodes.get(&id).map(|node| node.kind)
    }

    pub fn automation(&self) -> Vec<ParamEvent> {
        self.graph.borrow().automation.clone()
    }

    /// Last value scheduled for `param` on `node`, if any.
    pub fn param_value(&self, node: NodeId, param: AudioParam) -> Option<f32> {
        self.graph
            .borrow()
            .automation
            .iter()
            .rev()
            .find(|event| event.node == node && event.param == param)
            .map(|event| event.value)
    }

    pub fn open_contexts(&self) -> usize {
        self.graph.borrow().open_contexts.len()
    }

    pub fn peak_open_contexts(&self) -> usize {
        self.graph.borrow().peak_open_contexts
    }

    pub fn contexts_created(&self) -> u32 {
        self.graph.borrow().contexts_created
    }

    pub fn resumes(&self) -> usize {
        self.graph.borrow().resumes
    }

    pub fn suspends(&self) -> usize {
        self.graph.borrow().suspends
    }

    pub fn last_latency_hint(&self) -> Option<LatencyHint> {
        self.graph.borrow().last_latency_hint
    }
}

impl AudioPlatform for OfflineAudioPlatform {
    type Context = OfflineContext;

    fn create_context(&mut self, latency_hint: LatencyHint) -> Result<OfflineContext> {
        let mut graph = self.graph.borrow_mut();
        if let Some(reason) = &graph.deny_reason {
            return Err(SynthSessionError::unavailable(reason.clone()));
        }

        let id = graph.contexts_created;
        graph.contexts_created += 1;
        graph.open_contexts.insert(id);
        graph.peak_open_contexts = graph.peak_open_contexts.max(graph.open_contexts.len());
        graph.last_latency_hint = Some(latency_hint);
        let destination = graph.alloc(id, OfflineNodeKind::Destination)?;
        drop(graph);

        Ok(OfflineContext {
            id,
            destination,
            graph: self.graph.clone(),
        })
    }
}

/// Context handed out by [`OfflineAudioPlatform`].
#[derive(Debug)]
pub struct OfflineContext {
    id: u32,
    destination: NodeId,
    graph: Rc<RefCell<OfflineGraph>>,
}

impl AudioContext for OfflineContext {
    fn current_time(&self) -> f64 {
        self.graph.borrow().time
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_gain(&mut self) -> Result<NodeId> {
        self.graph
            .borrow_mut()
            .alloc(self.id, OfflineNodeKind::Gain)
    }

    fn create_biquad_filter(&mut self, kind: FilterKind) -> Result<NodeId> {
        self.graph
            .borrow_mut()
            .alloc(self.id, OfflineNodeKind::Filter(kind))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        let mut graph = self.graph.borrow_mut();
        graph.live_node(from);
        graph.live_node(to);
        graph.connections.insert((from, to));
    }

    fn disconnect(&mut self, node: NodeId) {
        let mut graph = self.graph.borrow_mut();
        graph.live_node(node);
        graph.connections.retain(|(from, _)| *from != node);
    }

    fn set_param_at_time(&mut self, node: NodeId, param: AudioParam, value: f32, time: f64) {
        let mut graph = self.graph.borrow_mut();
        graph.live_node(node);
        graph.automation.push(ParamEvent {
            node,
            param,
            value,
            time,
        });
    }

    fn resume(&mut self) {
        self.graph.borrow_mut().resumes += 1;
    }

    fn suspend(&mut self) {
        self.graph.borrow_mut().suspends += 1;
    }

    async fn close(&mut self) -> Result<()> {
        let mut graph = self.graph.borrow_mut();
        if !graph.open_contexts.remove(&self.id) {
            return Err(SynthSessionError::msg("offline context already closed"));
        }
        let id = self.id;
        let nodes = &graph.nodes;
        let connections = graph
            .connections
            .iter()
            .copied()
            .filter(|(from, _)| nodes.get(from).map(|n| n.context) != Some(id))
            .collect();
        graph.connections = connections;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_connections_and_automation() {
        let mut platform = OfflineAudioPlatform::new();
        let mut ctx = platform.create_context(LatencyHint::Interactive).unwrap();

        let gain = ctx.create_gain().unwrap();
        ctx.connect(gain, ctx.destination());
        platform.advance_time(0.5);
        ctx.set_param_at_time(gain, AudioParam::Gain, 0.3, ctx.current_time());

        assert_eq!(platform.connections(), vec![(gain, ctx.destination())]);
        assert_eq!(platform.param_value(gain, AudioParam::Gain), Some(0.3));
        assert_eq!(platform.automation()[0].time, 0.5);
        assert_eq!(platform.node_kind(gain), Some(OfflineNodeKind::Gain));
    }

    #[test]
    fn denied_platform_reports_unavailable() {
        let mut platform = OfflineAudioPlatform::new();
        platform.deny_contexts("no audio permission");

        let err = platform
            .create_context(LatencyHint::Interactive)
            .unwrap_err();
        assert!(matches!(err, SynthSessionError::ResourceUnavailable(_)));
        assert_eq!(platform.open_contexts(), 0);
    }

    #[tokio::test]
    async fn close_releases_context() {
        let mut platform = OfflineAudioPlatform::new();
        let mut ctx = platform.create_context(LatencyHint::Playback).unwrap();
        assert_eq!(platform.open_contexts(), 1);

        ctx.close().await.unwrap();
        assert_eq!(platform.open_contexts(), 0);
        assert!(ctx.close().await.is_err());
    }

    #[test]
    #[should_panic(expected = "used after its context was closed")]
    fn touching_nodes_of_closed_context_panics() {
        let mut platform = OfflineAudioPlatform::new();
        let mut ctx = platform.create_context(LatencyHint::Interactive).unwrap();
        let gain = ctx.create_gain().unwrap();

        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(ctx.close()).unwrap();

        ctx.disconnect(gain);
    }
}
