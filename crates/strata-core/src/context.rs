//! Context streams
//!
//! Scalar samples in `[0, 1]` for one global stream plus any number of named
//! peer streams. A peer's sample can be coupled to the last samples of other
//! peers: `clamp(raw * gain + Σ w * last(src), 0, 1)`.
//!
//! The whole state sits behind a single mutex inside [`ContextService`];
//! the engine owns the service and hands out `Arc` clones to stages that
//! sample it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::ContextConfig;

// ============================================================================
// RAW SOURCES
// ============================================================================

/// Source of raw, unscaled context values
pub trait RawSource: Send {
    /// Raw value for `label` at `now_ms`, in `[0, 1]`
    fn raw(&mut self, label: &str, now_ms: i64) -> f64;
}

/// Bounded pseudo-random combiner of time and a stable label hash
///
/// Each sample draws from a generator seeded by the label and the current
/// time bucket, so two streams never influence each other.
#[derive(Debug, Clone, Default)]
pub struct HashedTimeSource {
    /// Bucket width; samples inside one bucket agree
    pub bucket_ms: i64,
}

impl HashedTimeSource {
    pub fn new(bucket_ms: i64) -> Self {
        Self { bucket_ms }
    }
}

impl RawSource for HashedTimeSource {
    fn raw(&mut self, label: &str, now_ms: i64) -> f64 {
        let bucket = if self.bucket_ms > 0 {
            now_ms.div_euclid(self.bucket_ms)
        } else {
            now_ms
        };
        let seed = label_hash(label) ^ (bucket as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        SmallRng::seed_from_u64(seed).gen_range(0.0..=1.0)
    }
}

/// Constant raw value, for replays and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedSource(pub f64);

impl RawSource for FixedSource {
    fn raw(&mut self, _label: &str, _now_ms: i64) -> f64 {
        self.0
    }
}

/// FNV-1a; stable across processes, unlike the std hasher
fn label_hash(s: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ============================================================================
// TYPES
// ============================================================================

/// Per-stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextParams {
    pub gain: f64,
    pub update_ms: i64,
    /// Ring size, always at least 1
    pub window: usize,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            gain: 1.0,
            update_ms: 200,
            window: 16,
        }
    }
}

impl ContextParams {
    fn new(gain: f64, update_ms: i64, window: i64) -> Self {
        Self {
            gain: if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 },
            update_ms: update_ms.max(0),
            window: if window <= 0 { 1 } else { window as usize },
        }
    }
}

/// Directed coupling `src -> dst`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCoupling {
    pub src: String,
    pub dst: String,
    pub weight: f64,
}

/// Whether a peer sample had any inbound coupling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouplingMode {
    Independent,
    Coupled,
}

impl CouplingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Independent => "independent",
            Self::Coupled => "coupled",
        }
    }
}

/// A peer sample together with what produced it
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSample {
    pub peer: String,
    pub value: f64,
    pub params: ContextParams,
    pub mode: CouplingMode,
    /// Total inbound coupling weight
    pub lambda: f64,
    /// Contribution of coupled peers before clamping
    pub kappa: f64,
}

#[derive(Debug, Clone)]
struct Stream {
    params: ContextParams,
    ring: VecDeque<f64>,
    last: Option<f64>,
}

impl Stream {
    fn new(params: ContextParams) -> Self {
        Self {
            params,
            ring: VecDeque::with_capacity(params.window),
            last: None,
        }
    }

    fn push(&mut self, v: f64) {
        self.last = Some(v);
        self.ring.push_back(v);
        while self.ring.len() > self.params.window {
            self.ring.pop_front();
        }
    }

    fn resize(&mut self, params: ContextParams) {
        self.params = params;
        while self.ring.len() > params.window {
            self.ring.pop_front();
        }
    }
}

struct ContextState {
    global: Stream,
    peers: BTreeMap<String, Stream>,
    couplings: Vec<ContextCoupling>,
    source: Box<dyn RawSource>,
}

// ============================================================================
// CONTEXT SERVICE
// ============================================================================

/// Owned context subsystem
pub struct ContextService {
    state: Mutex<ContextState>,
    clock: Arc<dyn Clock>,
}

impl ContextService {
    /// Create a service with default parameters and the hashed time source
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_source(clock, Box::new(HashedTimeSource::new(1)))
    }

    /// Create a service with a custom raw source
    pub fn with_source(clock: Arc<dyn Clock>, source: Box<dyn RawSource>) -> Self {
        Self {
            state: Mutex::new(ContextState {
                global: Stream::new(ContextParams::default()),
                peers: BTreeMap::new(),
                couplings: Vec::new(),
                source,
            }),
            clock,
        }
    }

    /// Build a service and apply the configured streams
    pub fn from_config(clock: Arc<dyn Clock>, source: Box<dyn RawSource>, config: &ContextConfig) -> Self {
        let service = Self::with_source(clock, source);
        service.init_context(config.gain, config.update_ms, config.window);
        for peer in &config.peers {
            service.register_context_peer(&peer.name, peer.gain, peer.update_ms, peer.window);
        }
        for c in &config.couplings {
            service.set_context_coupling(&c.src, &c.dst, c.weight);
        }
        service
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        // A panic while holding the lock leaves plain numeric state behind,
        // which is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the global stream
    pub fn init_context(&self, gain: f64, update_ms: i64, window: i64) {
        let mut state = self.lock();
        state.global = Stream::new(ContextParams::new(gain, update_ms, window));
    }

    /// Parameters of the global stream
    pub fn context_params(&self) -> ContextParams {
        self.lock().global.params
    }

    /// Sample the global stream
    pub fn sample_context(&self, label: &str) -> f64 {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        let raw = sanitize(state.source.raw(label, now));
        let v = (raw * state.global.params.gain).clamp(0.0, 1.0);
        state.global.push(v);
        v
    }

    /// Global ring, most recent last
    pub fn get_recent_context_samples(&self) -> Vec<f64> {
        self.lock().global.ring.iter().copied().collect()
    }

    /// Create a peer or update its parameters, keeping (and truncating) its ring
    pub fn register_context_peer(&self, name: &str, gain: f64, update_ms: i64, window: i64) {
        let params = ContextParams::new(gain, update_ms, window);
        let mut state = self.lock();
        match state.peers.get_mut(name) {
            Some(stream) => stream.resize(params),
            None => {
                state.peers.insert(name.to_string(), Stream::new(params));
            }
        }
    }

    /// Sample a peer stream and return only the value
    pub fn sample_context_peer(&self, peer: &str, label: &str) -> f64 {
        self.sample_context_peer_detailed(peer, label).value
    }

    /// Sample a peer stream, creating it with default parameters if absent
    pub fn sample_context_peer_detailed(&self, peer: &str, label: &str) -> PeerSample {
        let now = self.clock.now_ms();
        let mut state = self.lock();

        let mut lambda = 0.0;
        let mut kappa = 0.0;
        for c in state.couplings.iter().filter(|c| c.dst == peer) {
            lambda += c.weight;
            if let Some(last) = state.peers.get(&c.src).and_then(|s| s.last) {
                kappa += c.weight * last;
            }
        }

        let raw = sanitize(state.source.raw(label, now));
        let stream = state
            .peers
            .entry(peer.to_string())
            .or_insert_with(|| Stream::new(ContextParams::default()));
        let value = (raw * stream.params.gain + kappa).clamp(0.0, 1.0);
        stream.push(value);

        PeerSample {
            peer: peer.to_string(),
            value,
            params: stream.params,
            mode: if lambda > 0.0 {
                CouplingMode::Coupled
            } else {
                CouplingMode::Independent
            },
            lambda,
            kappa,
        }
    }

    /// Last sample of a peer, if it exists and was sampled
    pub fn peer_last(&self, peer: &str) -> Option<f64> {
        self.lock().peers.get(peer).and_then(|s| s.last)
    }

    /// Ring of a peer, most recent last
    pub fn get_recent_peer_samples(&self, peer: &str) -> Vec<f64> {
        self.lock()
            .peers
            .get(peer)
            .map(|s| s.ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Set or remove (`w == 0`) a coupling edge; `w` is clamped to `[0, 1]`
    pub fn set_context_coupling(&self, src: &str, dst: &str, weight: f64) {
        let w = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
        let mut state = self.lock();
        state.couplings.retain(|c| !(c.src == src && c.dst == dst));
        if w > 0.0 {
            state.couplings.push(ContextCoupling {
                src: src.to_string(),
                dst: dst.to_string(),
                weight: w,
            });
        }
    }

    /// Peer names in sorted order
    pub fn list_context_peers(&self) -> Vec<String> {
        self.lock().peers.keys().cloned().collect()
    }

    pub fn has_peer(&self, peer: &str) -> bool {
        self.lock().peers.contains_key(peer)
    }

    pub fn get_peer_config(&self, peer: &str) -> Option<ContextParams> {
        self.lock().peers.get(peer).map(|s| s.params)
    }

    pub fn get_context_couplings(&self) -> Vec<ContextCoupling> {
        self.lock().couplings.clone()
    }
}

fn sanitize(raw: f64) -> f64 {
    if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 }
}
