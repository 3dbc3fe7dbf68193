//! Rendering capabilities consumed by the mixer.
//!
//! The mixer never touches samples directly. It builds a small node graph
//! through [`AudioContext`]: gain nodes for every volume stage, one buffer
//! source per playing sound, optional effect and stream nodes, all feeding
//! the context's destination. [`RenderContext`] is a software implementation
//! that renders the graph into f32 frames or PCM16 bytes.

mod param;
mod render;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::pcm::{Format, i16_to_f32};
use crate::sample::Sample;

pub use render::{BLOCK_FRAMES, RenderContext};

/// Opaque identifier of a node in an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Signal levels of the last rendered block at a node's output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub peak: f32,
    pub rms: f32,
}

impl Levels {
    /// Measures an interleaved block.
    pub fn measure(buf: &[f32]) -> Self {
        if buf.is_empty() {
            return Self::default();
        }
        let mut peak: f32 = 0.0;
        let mut sum = 0.0f64;
        for s in buf {
            peak = peak.max(s.abs());
            sum += (*s as f64) * (*s as f64);
        }
        Self {
            peak,
            rms: (sum / buf.len() as f64).sqrt() as f32,
        }
    }
}

/// An opaque processing node, e.g. an effects chain.
///
/// `buf` holds interleaved frames in `format`; the effect processes in place.
pub trait Effect: Send {
    fn process(&mut self, buf: &mut [f32], format: Format);
}

/// An external, pull-based source of audio (a media stream).
pub trait StreamSource: Send {
    /// Fills `out` with interleaved samples in the context format and returns
    /// how many were written. Returning 0 means the stream has nothing to
    /// offer right now; the rest of the block stays silent.
    fn read(&mut self, out: &mut [f32]) -> usize;
}

/// Adapts a reader of little-endian PCM16 to a [`StreamSource`].
///
/// The reader must already produce audio in the context format.
pub struct Pcm16Stream<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: Read + Send> Pcm16Stream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }
}

impl<R: Read + Send> StreamSource for Pcm16Stream<R> {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let want = out.len() * 2;
        let mut buf = vec![0u8; want.saturating_sub(self.pending.len())];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "stream source read failed");
                    break;
                }
            }
        }
        self.pending.extend_from_slice(&buf[..filled]);

        let n = (self.pending.len() / 2).min(out.len());
        for (i, b) in self.pending[..n * 2].chunks_exact(2).enumerate() {
            out[i] = i16_to_f32(i16::from_le_bytes([b[0], b[1]]));
        }
        self.pending.drain(..n * 2);
        n
    }
}

/// Node-graph rendering primitives.
///
/// Each node has at most one output connection; a node with inputs sums them.
/// Operations on unknown (or released) nodes are ignored.
#[async_trait]
pub trait AudioContext: Send + Sync {
    /// Output format of the context.
    fn format(&self) -> Format;

    /// Rendered time since the context was created.
    fn current_time(&self) -> Duration;

    /// The final output node.
    fn destination(&self) -> NodeId;

    /// Creates a gain node with an initial value.
    fn create_gain(&self, value: f32) -> NodeId;

    /// Wraps an effect into a node.
    fn create_effect(&self, effect: Box<dyn Effect>) -> NodeId;

    /// Creates a source that starts playing `sample` immediately.
    fn create_buffer_source(&self, sample: Arc<Sample>, looping: bool) -> NodeId;

    /// Creates a node pulling from an external stream.
    fn create_stream_source(&self, source: Box<dyn StreamSource>) -> NodeId;

    /// Connects `from`'s output into `to`, replacing any previous connection.
    fn connect(&self, from: NodeId, to: NodeId);

    /// Disconnects `node`'s output.
    fn disconnect(&self, node: NodeId);

    /// Removes a node. Nodes feeding into it are left unconnected.
    fn release(&self, node: NodeId);

    /// Gain value at the current time, including any running ramp.
    fn gain_value(&self, node: NodeId) -> f32;

    /// Cancels ramps and sets the gain immediately.
    fn set_gain_value(&self, node: NodeId, value: f32);

    /// Schedules a linear ramp to `target`: the gain holds its value until
    /// `start`, then moves linearly to reach `target` at `end`. Replaces any
    /// previously scheduled ramp.
    fn linear_ramp(&self, node: NodeId, target: f32, start: Duration, end: Duration);

    /// Cancels ramps, freezing the gain at its current value, which is returned.
    fn cancel_ramps(&self, node: NodeId) -> f32;

    /// Stops a buffer or stream source.
    fn stop_source(&self, node: NodeId);

    /// True once a non-looping buffer source has played to its end.
    fn source_ended(&self, node: NodeId) -> bool;

    /// Analysis tap: levels of the node's last rendered block.
    fn levels(&self, node: NodeId) -> Levels;

    /// True unless the context is suspended.
    fn is_running(&self) -> bool;

    /// Resumes a suspended context.
    async fn resume(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_levels_measure() {
        let levels = Levels::measure(&[0.5, -0.5, 0.5, -0.5]);
        assert_eq!(levels.peak, 0.5);
        assert!((levels.rms - 0.5).abs() < 1e-6);
        assert_eq!(Levels::measure(&[]), Levels::default());
    }

    #[test]
    fn test_pcm16_stream_reads_available() {
        let bytes: Vec<u8> = [32767i16, -32768, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut stream = Pcm16Stream::new(Cursor::new(bytes));
        let mut out = [9.0f32; 4];
        assert_eq!(stream.read(&mut out), 3);
        assert_eq!(&out[..3], &[1.0, -1.0, 0.0]);
        assert_eq!(stream.read(&mut out), 0);
    }
}
