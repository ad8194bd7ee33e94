use std::sync::{Arc, Mutex, MutexGuard};

use crate::{config::AnalyserConfig, Analyser, PlayerError, Result};

/// How the call stack that leads to audio work was initiated. Platform audio
/// policy only allows an audio context to be created under a user gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    UserGesture,
    Programmatic,
}

/// Identity of the media element a source node is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaElementId(pub u64);

/// Backend handle of a media-element source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Properties of a created audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextInfo {
    pub sample_rate: u32,
}

/// Endpoints of the processing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    MediaSource(SourceId),
    Analyser,
    Destination,
}

/// Platform seam for the native audio-processing graph.
///
/// Implementations allocate resources that cannot be reclaimed mid-session;
/// the [`AudioGraphManager`] calls each constructor at most once.
pub trait AudioBackend {
    /// Allocates the audio context. Must fail with
    /// [`PlayerError::BlockedByPolicy`] when the platform refuses.
    fn create_context(&mut self, activation: Activation) -> Result<ContextInfo>;

    /// Binds a source node to the media element. A platform only allows one
    /// binding per element for its lifetime.
    fn create_media_source(&mut self, element: MediaElementId) -> Result<SourceId>;

    /// Registers the tap through which played samples reach the analyser.
    fn install_analyser(&mut self, tap: AnalyserTap) -> Result<()>;

    /// Links two nodes so samples flow from `from` into `to`.
    fn connect(&mut self, from: GraphNode, to: GraphNode) -> Result<()>;
}

/// Lifecycle of the playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLifecycle {
    Uninitialized,
    /// The context exists but the graph has not been connected yet.
    Ready,
    Attached,
}

#[derive(Debug)]
enum SessionState {
    Uninitialized,
    Ready(PartialSession),
    Attached(Session),
}

/// Steps of graph construction that already succeeded. A retry resumes
/// after the last completed step, so the element is never bound twice.
#[derive(Debug)]
struct PartialSession {
    context: ContextInfo,
    source: Option<(MediaElementId, SourceId)>,
    node: Option<Arc<Mutex<Analyser>>>,
    links: usize,
}

impl PartialSession {
    fn new(context: ContextInfo) -> Self {
        Self {
            context,
            source: None,
            node: None,
            links: 0,
        }
    }
}

#[derive(Debug)]
struct Session {
    context: ContextInfo,
    element: MediaElementId,
    source: SourceId,
    analyser: AnalyserHandle,
    tap: AnalyserTap,
}

/// Owns the single audio-processing graph of the process:
/// media source -> analyser -> destination.
///
/// The graph is built lazily on the first confirmed play and is never torn
/// down or rebuilt. Switching tracks only reloads the media element.
#[derive(Debug)]
pub struct AudioGraphManager<B> {
    backend: B,
    config: AnalyserConfig,
    state: SessionState,
}

impl<B: AudioBackend> AudioGraphManager<B> {
    /// Creates a manager whose session has not been built yet.
    pub fn new(backend: B, config: AnalyserConfig) -> Self {
        Self {
            backend,
            config,
            state: SessionState::Uninitialized,
        }
    }

    /// Current stage of the session lifecycle.
    pub fn lifecycle(&self) -> SessionLifecycle {
        match self.state {
            SessionState::Uninitialized => SessionLifecycle::Uninitialized,
            SessionState::Ready(_) => SessionLifecycle::Ready,
            SessionState::Attached(_) => SessionLifecycle::Attached,
        }
    }

    /// Borrow the platform backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend, e.g. to configure a test double.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Properties of the audio context, once one has been created.
    pub fn context(&self) -> Option<ContextInfo> {
        match &self.state {
            SessionState::Uninitialized => None,
            SessionState::Ready(partial) => Some(partial.context),
            SessionState::Attached(session) => Some(session.context),
        }
    }

    /// Returns the analysis node handle once the session is attached.
    pub fn analyser(&self) -> Option<AnalyserHandle> {
        match &self.state {
            SessionState::Attached(session) => Some(session.analyser.clone()),
            _ => None,
        }
    }

    /// Returns the write side of the analyser so the host can feed played
    /// samples into it.
    pub fn tap(&self) -> Option<AnalyserTap> {
        match &self.state {
            SessionState::Attached(session) => Some(session.tap.clone()),
            _ => None,
        }
    }

    /// Builds the session on first use and returns its analysis node handle.
    ///
    /// Idempotent: once attached, every call returns the same handle without
    /// touching the backend.
    pub fn ensure_session(
        &mut self,
        element: MediaElementId,
        activation: Activation,
    ) -> Result<AnalyserHandle> {
        if let SessionState::Attached(session) = &self.state {
            if session.element != element {
                tracing::warn!(
                    bound = session.element.0,
                    requested = element.0,
                    "session already bound to another media element"
                );
            }
            return Ok(session.analyser.clone());
        }

        if let SessionState::Uninitialized = self.state {
            if activation != Activation::UserGesture {
                return Err(PlayerError::BlockedByPolicy);
            }
            let context = self.backend.create_context(activation)?;
            self.state = SessionState::Ready(PartialSession::new(context));
        }
        let SessionState::Ready(partial) = &mut self.state else {
            return Err(PlayerError::msg("audio session is in an unexpected state"));
        };

        let (element, source) = match partial.source {
            Some(bound) => bound,
            None => {
                let source = self.backend.create_media_source(element)?;
                partial.source = Some((element, source));
                (element, source)
            }
        };

        let node = match &partial.node {
            Some(node) => node.clone(),
            None => {
                let analyser = Analyser::new(self.config.clone(), partial.context.sample_rate)?;
                let node = Arc::new(Mutex::new(analyser));
                self.backend.install_analyser(AnalyserTap::new(node.clone()))?;
                partial.node = Some(node.clone());
                node
            }
        };

        let links = [
            (GraphNode::MediaSource(source), GraphNode::Analyser),
            (GraphNode::Analyser, GraphNode::Destination),
        ];
        for &(from, to) in &links[partial.links..] {
            self.backend.connect(from, to)?;
            partial.links += 1;
        }

        let context = partial.context;
        tracing::info!(
            sample_rate = context.sample_rate,
            fft_size = self.config.fft_size,
            "audio session attached"
        );

        let handle = AnalyserHandle::new(node.clone());
        self.state = SessionState::Attached(Session {
            context,
            element,
            source,
            analyser: handle.clone(),
            tap: AnalyserTap::new(node),
        });
        Ok(handle)
    }

    /// Source node the session is bound to, if attached.
    pub fn source(&self) -> Option<SourceId> {
        match &self.state {
            SessionState::Attached(session) => Some(session.source),
            _ => None,
        }
    }
}

fn lock_shared(shared: &Mutex<Analyser>) -> Result<MutexGuard<'_, Analyser>> {
    shared
        .lock()
        .map_err(|_| PlayerError::msg("analysis node has been poisoned"))
}

/// Shared, read-only view over the session's analysis node. Any number of
/// renderers may hold one.
#[derive(Clone)]
pub struct AnalyserHandle {
    shared: Arc<Mutex<Analyser>>,
}

impl AnalyserHandle {
    pub(crate) fn new(shared: Arc<Mutex<Analyser>>) -> Self {
        Self { shared }
    }

    /// Number of bins in each spectrum, half the transform size.
    pub fn frequency_bin_count(&self) -> Result<usize> {
        Ok(lock_shared(&self.shared)?.frequency_bin_count())
    }

    /// Centre frequency in hertz of bin `index`.
    pub fn frequency_of_bin(&self, index: usize) -> Result<f32> {
        Ok(lock_shared(&self.shared)?.frequency_of_bin(index))
    }

    /// Whether any played samples have reached the node.
    pub fn has_samples(&self) -> Result<bool> {
        Ok(lock_shared(&self.shared)?.has_samples())
    }

    /// Fills `out` with the current byte spectrum. Returns `false` while the
    /// node has not received any samples.
    pub fn byte_frequency_data(&self, out: &mut Vec<u8>) -> Result<bool> {
        lock_shared(&self.shared)?.byte_frequency_data(out)
    }

    /// Whether both handles refer to the same analysis node.
    pub fn same_node(&self, other: &AnalyserHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for AnalyserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserHandle").finish()
    }
}

/// Write side of the analysis node, handed to the backend and the host's
/// audio path.
#[derive(Clone)]
pub struct AnalyserTap {
    shared: Arc<Mutex<Analyser>>,
}

impl AnalyserTap {
    pub(crate) fn new(shared: Arc<Mutex<Analyser>>) -> Self {
        Self { shared }
    }

    /// Appends played mono samples to the analysis window.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        lock_shared(&self.shared)?.push_samples(samples);
        Ok(())
    }

    /// Whether this tap writes into the node `handle` reads from.
    pub fn feeds(&self, handle: &AnalyserHandle) -> bool {
        Arc::ptr_eq(&self.shared, &handle.shared)
    }
}

impl std::fmt::Debug for AnalyserTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyserTap").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedBackend;

    const ELEMENT: MediaElementId = MediaElementId(1);

    fn manager() -> AudioGraphManager<SimulatedBackend> {
        AudioGraphManager::new(SimulatedBackend::new(44_100), AnalyserConfig::default())
    }

    #[test]
    fn builds_graph_in_order() {
        let mut graph = manager();
        let handle = graph.ensure_session(ELEMENT, Activation::UserGesture).unwrap();

        assert_eq!(graph.lifecycle(), SessionLifecycle::Attached);
        assert_eq!(handle.frequency_bin_count().unwrap(), 128);

        let backend = graph.backend();
        let source = graph.source().unwrap();
        assert_eq!(
            backend.connections(),
            &[
                (GraphNode::MediaSource(source), GraphNode::Analyser),
                (GraphNode::Analyser, GraphNode::Destination),
            ]
        );
        assert!(backend.tap().unwrap().feeds(&handle));
    }

    #[test]
    fn ensure_session_is_idempotent() {
        let mut graph = manager();
        let first = graph.ensure_session(ELEMENT, Activation::UserGesture).unwrap();
        for _ in 0..5 {
            let again = graph.ensure_session(ELEMENT, Activation::Programmatic).unwrap();
            assert!(again.same_node(&first));
        }

        let backend = graph.backend();
        assert_eq!(backend.contexts_created(), 1);
        assert_eq!(backend.sources_created(), 1);
        assert_eq!(backend.connections().len(), 2);
    }

    #[test]
    fn refuses_construction_without_a_gesture() {
        let mut graph = manager();
        let err = graph
            .ensure_session(ELEMENT, Activation::Programmatic)
            .unwrap_err();

        assert!(err.awaits_user_interaction());
        assert_eq!(graph.lifecycle(), SessionLifecycle::Uninitialized);
        assert_eq!(graph.backend().contexts_created(), 0);
        assert!(graph.analyser().is_none());
    }

    #[test]
    fn surfaces_backend_policy_refusal() {
        let mut backend = SimulatedBackend::new(48_000);
        backend.block_contexts(true);
        let mut graph = AudioGraphManager::new(backend, AnalyserConfig::default());

        let err = graph.ensure_session(ELEMENT, Activation::UserGesture).unwrap_err();
        assert!(matches!(err, PlayerError::BlockedByPolicy));
        assert_eq!(graph.lifecycle(), SessionLifecycle::Uninitialized);
    }

    #[test]
    fn retry_after_partial_failure_reuses_context() {
        let mut backend = SimulatedBackend::new(48_000);
        backend.fail_next_source(true);
        let mut graph = AudioGraphManager::new(backend, AnalyserConfig::default());

        assert!(graph.ensure_session(ELEMENT, Activation::UserGesture).is_err());
        assert_eq!(graph.lifecycle(), SessionLifecycle::Ready);
        assert_eq!(graph.context().unwrap().sample_rate, 48_000);

        graph.ensure_session(ELEMENT, Activation::Programmatic).unwrap();
        assert_eq!(graph.lifecycle(), SessionLifecycle::Attached);
        assert_eq!(graph.backend().contexts_created(), 1);
    }

    #[test]
    fn retry_after_failed_connect_keeps_the_bound_source() {
        let mut backend = SimulatedBackend::new(48_000);
        backend.fail_connect_after(0);
        let mut graph = AudioGraphManager::new(backend, AnalyserConfig::default());

        assert!(graph.ensure_session(ELEMENT, Activation::UserGesture).is_err());
        assert_eq!(graph.lifecycle(), SessionLifecycle::Ready);
        assert_eq!(graph.backend().sources_created(), 1);

        let handle = graph.ensure_session(ELEMENT, Activation::Programmatic).unwrap();
        assert_eq!(graph.lifecycle(), SessionLifecycle::Attached);

        let backend = graph.backend();
        assert_eq!(backend.contexts_created(), 1);
        assert_eq!(backend.sources_created(), 1);
        assert_eq!(backend.connections().len(), 2);
        assert!(backend.tap().unwrap().feeds(&handle));
        assert!(graph.tap().unwrap().feeds(&handle));
    }

    #[test]
    fn retry_after_second_link_fails_resumes_at_that_link() {
        let mut graph = manager();
        graph.backend_mut().fail_connect_after(1);

        assert!(graph.ensure_session(ELEMENT, Activation::UserGesture).is_err());
        assert_eq!(graph.backend().connections().len(), 1);

        graph.ensure_session(ELEMENT, Activation::Programmatic).unwrap();
        let source = graph.source().unwrap();
        assert_eq!(
            graph.backend().connections(),
            &[
                (GraphNode::MediaSource(source), GraphNode::Analyser),
                (GraphNode::Analyser, GraphNode::Destination),
            ]
        );
    }

    #[test]
    fn tap_feeds_the_shared_node() {
        let mut graph = manager();
        let handle = graph.ensure_session(ELEMENT, Activation::UserGesture).unwrap();
        assert!(!handle.has_samples().unwrap());

        graph.tap().unwrap().push_samples(&[0.25; 64]).unwrap();
        assert!(handle.has_samples().unwrap());
    }
}
