//! Software rendering of the node graph.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::param::GainParam;
use super::{AudioContext, Effect, Levels, NodeId, StreamSource};
use crate::pcm::{Format, encode_pcm16};
use crate::sample::Sample;

/// Maximum number of frames rendered per pass.
pub const BLOCK_FRAMES: usize = 1024;

/// Plays one sample, resampling linearly to the context rate.
struct BufferPlayer {
    sample: Arc<Sample>,
    looping: bool,
    /// Read position in source frames.
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    stopped: bool,
    ended: bool,
}

impl BufferPlayer {
    fn new(sample: Arc<Sample>, looping: bool, output: Format) -> Self {
        let step = sample.format().sample_rate as f64 / output.sample_rate as f64;
        let ended = sample.frames() == 0;
        Self {
            sample,
            looping,
            position: 0.0,
            step,
            stopped: false,
            ended,
        }
    }

    fn fill(&mut self, buf: &mut [f32], channels: usize) {
        if self.stopped || self.ended {
            return;
        }
        let total = self.sample.frames();
        for frame in buf.chunks_exact_mut(channels) {
            let idx = self.position as usize;
            let frac = (self.position - idx as f64) as f32;
            let next = if idx + 1 < total {
                Some(idx + 1)
            } else if self.looping {
                Some(0)
            } else {
                None
            };
            for (c, out) in frame.iter_mut().enumerate() {
                let a = self.sample.value(idx, c, channels);
                let v = match next {
                    Some(n) if frac > 0.0 => a + (self.sample.value(n, c, channels) - a) * frac,
                    _ => a,
                };
                *out += v;
            }

            self.position += self.step;
            if self.position >= total as f64 {
                if self.looping {
                    self.position %= total as f64;
                } else {
                    self.ended = true;
                    return;
                }
            }
        }
    }
}

enum NodeKind {
    Destination,
    Gain(GainParam),
    Effect(Box<dyn Effect>),
    Buffer(BufferPlayer),
    Stream { source: Box<dyn StreamSource>, stopped: bool },
}

struct Node {
    kind: NodeKind,
    output: Option<NodeId>,
    levels: Levels,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            output: None,
            levels: Levels::default(),
        }
    }
}

struct GraphState {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
    /// Frames rendered so far; the context clock.
    frames: u64,
}

impl GraphState {
    fn add(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        id
    }

    /// True if following outputs from `from` reaches `to`.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut cur = Some(from);
        let mut hops = 0;
        while let Some(id) = cur {
            if id == to {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                return true;
            }
            cur = self.nodes.get(&id).and_then(|n| n.output);
        }
        false
    }
}

/// Renders `id` and everything feeding it into a fresh block.
fn pull(
    nodes: &mut HashMap<NodeId, Node>,
    inputs: &HashMap<NodeId, Vec<NodeId>>,
    id: NodeId,
    format: Format,
    frames: usize,
    start_frame: u64,
) -> Vec<f32> {
    let channels = format.channels();
    let mut buf = vec![0.0f32; frames * channels];
    if let Some(children) = inputs.get(&id) {
        for child in children {
            let block = pull(nodes, inputs, *child, format, frames, start_frame);
            for (o, s) in buf.iter_mut().zip(block) {
                *o += s;
            }
        }
    }

    let Some(node) = nodes.get_mut(&id) else {
        return buf;
    };
    match &mut node.kind {
        NodeKind::Destination => {}
        NodeKind::Gain(param) => {
            let rate = format.sample_rate as f64;
            for (i, frame) in buf.chunks_exact_mut(channels).enumerate() {
                let t = (start_frame + i as u64) as f64 / rate;
                let gain = param.value_at(t);
                for s in frame {
                    *s *= gain;
                }
            }
        }
        NodeKind::Effect(effect) => effect.process(&mut buf, format),
        NodeKind::Buffer(player) => player.fill(&mut buf, channels),
        NodeKind::Stream { source, stopped } => {
            if !*stopped {
                let mut tmp = vec![0.0f32; buf.len()];
                let n = source.read(&mut tmp).min(buf.len());
                for (o, s) in buf[..n].iter_mut().zip(&tmp[..n]) {
                    *o += s;
                }
            }
        }
    }
    node.levels = Levels::measure(&buf);
    buf
}

/// Software [`AudioContext`].
///
/// The clock advances only as frames are rendered, so offline rendering
/// (and tests) are fully deterministic. Implements `Read` producing PCM16 LE.
pub struct RenderContext {
    format: Format,
    destination: NodeId,
    running: AtomicBool,
    state: Mutex<GraphState>,
}

impl RenderContext {
    /// Creates a running context.
    pub fn new(format: Format) -> Arc<Self> {
        let mut state = GraphState {
            nodes: HashMap::new(),
            next_id: 0,
            frames: 0,
        };
        let destination = state.add(NodeKind::Destination);
        Arc::new(Self {
            format,
            destination,
            running: AtomicBool::new(true),
            state: Mutex::new(state),
        })
    }

    /// Suspends the context: rendering outputs silence and the clock stops.
    pub fn suspend(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Number of live nodes, the destination included.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Renders interleaved frames into `out`.
    ///
    /// Returns the number of frames rendered; a trailing partial frame is
    /// left untouched.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let channels = self.format.channels();
        let frames = out.len() / channels;
        if !self.is_running() {
            out[..frames * channels].fill(0.0);
            return frames;
        }

        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(BLOCK_FRAMES);
            let block = self.render_block(n);
            out[done * channels..(done + n) * channels].copy_from_slice(&block);
            done += n;
        }
        frames
    }

    /// Renders and discards audio for `duration`, advancing the clock.
    pub fn advance(&self, duration: Duration) {
        if !self.is_running() {
            return;
        }
        let mut remaining = self.format.frames_in(duration) as usize;
        while remaining > 0 {
            let n = remaining.min(BLOCK_FRAMES);
            self.render_block(n);
            remaining -= n;
        }
    }

    /// Renders PCM16 little-endian into `buf`; returns bytes written.
    pub fn render_pcm16(&self, buf: &mut [u8]) -> usize {
        let frames = (buf.len() / self.format.frame_bytes()).min(BLOCK_FRAMES);
        if frames == 0 {
            return 0;
        }
        let mut tmp = vec![0.0f32; frames * self.format.channels()];
        self.render(&mut tmp);
        encode_pcm16(&tmp, buf)
    }

    fn render_block(&self, frames: usize) -> Vec<f32> {
        let mut state = self.state.lock();
        let start = state.frames;

        let mut inputs: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, node) in &state.nodes {
            if let Some(out) = node.output {
                inputs.entry(out).or_default().push(*id);
            }
        }
        // Stable summing order.
        for children in inputs.values_mut() {
            children.sort();
        }

        let block = pull(
            &mut state.nodes,
            &inputs,
            self.destination,
            self.format,
            frames,
            start,
        );

        state.frames += frames as u64;
        let now = state.frames as f64 / self.format.sample_rate as f64;
        for node in state.nodes.values_mut() {
            if let NodeKind::Gain(param) = &mut node.kind {
                param.settle(now);
            }
        }
        block
    }

    fn now_secs(&self, state: &GraphState) -> f64 {
        state.frames as f64 / self.format.sample_rate as f64
    }
}

#[async_trait]
impl AudioContext for RenderContext {
    fn format(&self) -> Format {
        self.format
    }

    fn current_time(&self) -> Duration {
        self.format.duration_of(self.state.lock().frames)
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_gain(&self, value: f32) -> NodeId {
        self.state.lock().add(NodeKind::Gain(GainParam::new(value)))
    }

    fn create_effect(&self, effect: Box<dyn Effect>) -> NodeId {
        self.state.lock().add(NodeKind::Effect(effect))
    }

    fn create_buffer_source(&self, sample: Arc<Sample>, looping: bool) -> NodeId {
        let player = BufferPlayer::new(sample, looping, self.format);
        self.state.lock().add(NodeKind::Buffer(player))
    }

    fn create_stream_source(&self, source: Box<dyn StreamSource>) -> NodeId {
        self.state.lock().add(NodeKind::Stream {
            source,
            stopped: false,
        })
    }

    fn connect(&self, from: NodeId, to: NodeId) {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&to) || from == self.destination {
            tracing::warn!(from = from.raw(), to = to.raw(), "connect refused: bad endpoint");
            return;
        }
        if state.reaches(to, from) {
            tracing::warn!(from = from.raw(), to = to.raw(), "connect refused: would form a cycle");
            return;
        }
        if let Some(node) = state.nodes.get_mut(&from) {
            node.output = Some(to);
        }
    }

    fn disconnect(&self, node: NodeId) {
        if let Some(n) = self.state.lock().nodes.get_mut(&node) {
            n.output = None;
        }
    }

    fn release(&self, node: NodeId) {
        if node == self.destination {
            return;
        }
        let mut state = self.state.lock();
        state.nodes.remove(&node);
        for n in state.nodes.values_mut() {
            if n.output == Some(node) {
                n.output = None;
            }
        }
    }

    fn gain_value(&self, node: NodeId) -> f32 {
        let state = self.state.lock();
        let now = self.now_secs(&state);
        match state.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Gain(param)) => param.value_at(now),
            _ => 0.0,
        }
    }

    fn set_gain_value(&self, node: NodeId, value: f32) {
        if let Some(Node {
            kind: NodeKind::Gain(param),
            ..
        }) = self.state.lock().nodes.get_mut(&node)
        {
            param.set(value);
        }
    }

    fn linear_ramp(&self, node: NodeId, target: f32, start: Duration, end: Duration) {
        if let Some(Node {
            kind: NodeKind::Gain(param),
            ..
        }) = self.state.lock().nodes.get_mut(&node)
        {
            param.ramp(target, start.as_secs_f64(), end.as_secs_f64());
        }
    }

    fn cancel_ramps(&self, node: NodeId) -> f32 {
        let mut state = self.state.lock();
        let now = self.now_secs(&state);
        match state.nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(NodeKind::Gain(param)) => param.cancel(now),
            _ => 0.0,
        }
    }

    fn stop_source(&self, node: NodeId) {
        match self.state.lock().nodes.get_mut(&node).map(|n| &mut n.kind) {
            Some(NodeKind::Buffer(player)) => player.stopped = true,
            Some(NodeKind::Stream { stopped, .. }) => *stopped = true,
            _ => {}
        }
    }

    fn source_ended(&self, node: NodeId) -> bool {
        match self.state.lock().nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Buffer(player)) => player.ended,
            _ => false,
        }
    }

    fn levels(&self, node: NodeId) -> Levels {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.levels)
            .unwrap_or_default()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}

impl Read for &RenderContext {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.render_pcm16(buf))
    }
}
