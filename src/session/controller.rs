//! Session controller: connect, start, feedback loop, teardown

use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::error::SessionError;
use crate::input::{ControllerState, InputSampler, InputSource};
use crate::media::{MediaPipeline, RenderStage, StreamAudioDecoder, VideoSurface};
use crate::session::transport::{
    SessionCallbacks, SessionHandle, SessionTransport, TransportEvent, VideoProfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Active,
    Closing,
}

/// Session notifications surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    /// The session is over; the controller does not reconnect on its own.
    Ended { reason: String },
}

/// Owns the lifecycle of one streaming session.
pub struct SessionController<T: SessionTransport> {
    transport: T,
    state: Arc<Mutex<SessionState>>,
    handle: Option<T::Handle>,
    pipeline: Option<Arc<MediaPipeline>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl<T: SessionTransport> SessionController<T> {
    pub fn new(transport: T) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            transport,
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            handle: None,
            pipeline: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Session notifications: connected, ended. Mid-session transport errors
    /// arrive here as [`SessionEvent::Ended`].
    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events_rx
    }

    /// Establish the session transport and wire the media pipeline.
    ///
    /// Fails fast with a specific reason when the console is not paired,
    /// not powered on, or the transport refuses the connection; no retry.
    pub fn connect(
        &mut self,
        console: &Console,
        pipeline: Arc<MediaPipeline>,
    ) -> Result<(), SessionError> {
        if self.state() != SessionState::Disconnected {
            return Err(SessionError::AlreadyActive);
        }

        let credentials = console.credentials().ok_or(SessionError::NotPaired)?;
        if console.power_state() != crate::console::PowerState::Ready {
            return Err(SessionError::NotReady);
        }
        let addr = console
            .addr()
            .ok_or_else(|| SessionError::Transport("console has no known address".into()))?;

        let prefs = console.prefs();
        let (width, height) = prefs.resolution.dimensions();
        let profile = VideoProfile {
            width,
            height,
            fps: prefs.fps.frames_per_second(),
        };

        info!(
            console = console.name(),
            %addr,
            width,
            height,
            fps = profile.fps,
            "connecting session"
        );

        let callbacks = self.build_callbacks(pipeline.clone());
        let handle = self.transport.connect(addr, credentials, profile, callbacks)?;

        self.handle = Some(handle);
        self.pipeline = Some(pipeline);
        *self.state.lock() = SessionState::Connecting;
        Ok(())
    }

    /// Start the transport worker threads. Only valid after `connect`.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let handle = self.handle.as_mut().ok_or(SessionError::NotConnected)?;
        handle.start()?;
        *self.state.lock() = SessionState::Active;
        info!("session active");
        Ok(())
    }

    /// Per-render-tick feedback: serialize the controller snapshot and send
    /// it best-effort. Never blocks the presentation loop; send failures are
    /// logged and swallowed.
    pub fn tick(&mut self, controller_state: &ControllerState) {
        if self.state() != SessionState::Active {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        let payload = match bincode::serialize(controller_state) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!("failed to serialize feedback: {}", e);
                return;
            }
        };
        if let Err(e) = handle.send_feedback(payload) {
            debug!("feedback send failed: {}", e);
        }
    }

    /// Tear the session down. Idempotent; returns in bounded time even when
    /// the decode thread is blocked on the frame handoff.
    pub fn close(&mut self) {
        if self.handle.is_none() && self.state() == SessionState::Disconnected {
            return;
        }
        *self.state.lock() = SessionState::Closing;

        // Unblock the decode thread before joining it
        if let Some(pipeline) = &self.pipeline {
            pipeline.begin_shutdown();
        }
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
        // Threads are joined; the audio device can go
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.finish_shutdown();
        }

        *self.state.lock() = SessionState::Disconnected;
        info!("session closed");
    }

    fn build_callbacks(&self, pipeline: Arc<MediaPipeline>) -> SessionCallbacks {
        let video_pipeline = pipeline.clone();
        let header_pipeline = pipeline.clone();

        // The compressed audio stream is Opus; the decoder is created when
        // the header announces the format and shared with the packet path.
        let audio_decoder: Arc<Mutex<Option<StreamAudioDecoder>>> = Arc::new(Mutex::new(None));
        let packet_decoder = audio_decoder.clone();

        let events_tx = self.events_tx.clone();
        let state = self.state.clone();

        SessionCallbacks {
            video_frame: Box::new(move |data: Bytes| {
                video_pipeline.video_frame(&data);
            }),
            audio_header: Box::new(move |channels, sample_rate| {
                header_pipeline.audio_format(channels, sample_rate);
                match StreamAudioDecoder::new(sample_rate, channels) {
                    Ok(decoder) => *audio_decoder.lock() = Some(decoder),
                    Err(e) => warn!("audio decoder unavailable: {}", e),
                }
            }),
            audio_packet: Box::new(move |packet: &[u8]| {
                let mut decoder = packet_decoder.lock();
                let Some(decoder) = decoder.as_mut() else {
                    return; // no header yet
                };
                match decoder.decode(packet) {
                    Ok(pcm) => pipeline.queue_samples(pcm),
                    Err(e) => warn!("audio packet dropped: {}", e),
                }
            }),
            event: Box::new(move |event| match event {
                TransportEvent::Connected => {
                    let _ = events_tx.send(SessionEvent::Connected);
                }
                TransportEvent::Ended { reason } => {
                    info!(reason = reason.as_str(), "session ended by transport");
                    *state.lock() = SessionState::Closing;
                    let _ = events_tx.send(SessionEvent::Ended { reason });
                }
            }),
        }
    }
}

impl<T: SessionTransport> Drop for SessionController<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drive the presentation thread: pump input, render one frame, ship
/// feedback. Returns when the platform quits, the pipeline shuts down, or
/// the transport ends the session.
pub fn run_presentation_loop<T, S>(
    session: &mut SessionController<T>,
    stage: &mut RenderStage<S>,
    sampler: &mut InputSampler,
    source: &mut dyn InputSource,
) -> crate::Result<()>
where
    T: SessionTransport,
    S: VideoSurface,
{
    let mut controller_state = ControllerState::default();
    loop {
        if !sampler.pump(source, &mut controller_state) {
            info!("platform quit requested");
            return Ok(());
        }

        match stage.tick() {
            Ok(_) => {}
            Err(crate::error::MediaError::ShutDown) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        session.tick(&controller_state);

        for event in session.events().try_iter() {
            if let SessionEvent::Ended { reason } = event {
                info!(reason = reason.as_str(), "leaving presentation loop");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::registry::shared_registry;
    use crate::console::{PairingCredentials, PowerState, RegistKey, SessionKey};
    use crate::error::MediaError;
    use crate::input::InputEvent;
    use crate::media::render::tests::RecordingSurface;
    use crate::media::video::tests::{picture, ScriptedDecoder};
    use std::collections::VecDeque;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn test_credentials() -> PairingCredentials {
        PairingCredentials {
            regist_key: RegistKey([3; 16]),
            session_key: SessionKey([4; 16]),
            key_type: 1,
        }
    }

    /// Transport test double: records feedback, optionally feeds frames from
    /// a fake network thread.
    #[derive(Default)]
    struct FakeShared {
        feedback: Mutex<Vec<Bytes>>,
        started: AtomicBool,
        stopped: AtomicBool,
    }

    struct FakeTransport {
        shared: Arc<FakeShared>,
        refuse: bool,
    }

    struct FakeHandle {
        shared: Arc<FakeShared>,
        callbacks: Option<SessionCallbacks>,
        pump: Option<thread::JoinHandle<()>>,
        /// Frames the fake network thread pushes through the video callback
        frames_to_send: usize,
    }

    impl SessionTransport for FakeTransport {
        type Handle = FakeHandle;

        fn connect(
            &self,
            _addr: IpAddr,
            _credentials: &PairingCredentials,
            _profile: VideoProfile,
            callbacks: SessionCallbacks,
        ) -> Result<FakeHandle, SessionError> {
            if self.refuse {
                return Err(SessionError::Transport("connection refused".into()));
            }
            Ok(FakeHandle {
                shared: self.shared.clone(),
                callbacks: Some(callbacks),
                pump: None,
                frames_to_send: 0,
            })
        }
    }

    impl SessionHandle for FakeHandle {
        fn start(&mut self) -> Result<(), SessionError> {
            self.shared.started.store(true, Ordering::SeqCst);
            if let Some(mut callbacks) = self.callbacks.take() {
                let frames = self.frames_to_send;
                self.pump = Some(thread::spawn(move || {
                    (callbacks.event)(TransportEvent::Connected);
                    for _ in 0..frames {
                        (callbacks.video_frame)(Bytes::from_static(b"frame"));
                    }
                }));
            }
            Ok(())
        }

        fn send_feedback(&mut self, payload: Bytes) -> Result<(), SessionError> {
            self.shared.feedback.lock().push(payload);
            Ok(())
        }

        fn stop(&mut self) {
            self.shared.stopped.store(true, Ordering::SeqCst);
            if let Some(pump) = self.pump.take() {
                let _ = pump.join();
            }
        }
    }

    fn paired_ready_console() -> crate::console::Console {
        let registry = shared_registry();
        {
            let mut guard = registry.lock();
            let console = guard.upsert("Living Room");
            console.set_power_state(PowerState::Ready);
            console.set_addr(IpAddr::from([10, 0, 0, 5]));
            console.set_credentials(test_credentials());
        }
        let guard = registry.lock();
        guard.find("Living Room").unwrap().clone()
    }

    fn pipeline_with_pictures(count: usize) -> Arc<MediaPipeline> {
        let mut decoder = ScriptedDecoder::accepting();
        for _ in 0..count {
            decoder.pictures.push_back(picture(32, 16));
        }
        Arc::new(MediaPipeline::new(Box::new(decoder)))
    }

    #[test]
    fn connect_rejects_unpaired_and_standby_distinctly() {
        let registry = shared_registry();
        let console = {
            let mut guard = registry.lock();
            let console = guard.upsert("Bedroom");
            console.set_power_state(PowerState::Ready);
            console.set_addr(IpAddr::from([10, 0, 0, 9]));
            console.clone()
        };

        let mut session = SessionController::new(FakeTransport {
            shared: Arc::new(FakeShared::default()),
            refuse: false,
        });
        let err = session
            .connect(&console, pipeline_with_pictures(0))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotPaired));

        let console = {
            let mut guard = registry.lock();
            let console = guard.find_mut("Bedroom").unwrap();
            console.set_credentials(test_credentials());
            console.set_power_state(PowerState::Standby);
            console.clone()
        };
        let err = session
            .connect(&console, pipeline_with_pictures(0))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotReady));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn transport_refusal_surfaces_and_leaves_disconnected() {
        let mut session = SessionController::new(FakeTransport {
            shared: Arc::new(FakeShared::default()),
            refuse: true,
        });
        let err = session
            .connect(&paired_ready_console(), pipeline_with_pictures(0))
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn tick_serializes_the_controller_snapshot() {
        let shared = Arc::new(FakeShared::default());
        let mut session = SessionController::new(FakeTransport {
            shared: shared.clone(),
            refuse: false,
        });

        session
            .connect(&paired_ready_console(), pipeline_with_pictures(0))
            .unwrap();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Active);

        let snapshot = ControllerState {
            buttons: crate::input::buttons::SOUTH,
            left_x: -1200,
            r2: 255,
            ..ControllerState::default()
        };
        session.tick(&snapshot);

        let sent = shared.feedback.lock();
        assert_eq!(sent.len(), 1);
        let decoded: ControllerState = bincode::deserialize(&sent[0]).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn tick_before_start_sends_nothing() {
        let shared = Arc::new(FakeShared::default());
        let mut session = SessionController::new(FakeTransport {
            shared: shared.clone(),
            refuse: false,
        });
        session
            .connect(&paired_ready_console(), pipeline_with_pictures(0))
            .unwrap();

        session.tick(&ControllerState::default());
        assert!(shared.feedback.lock().is_empty());
    }

    #[test]
    fn close_is_idempotent_and_bounded_with_blocked_decoder() {
        let shared = Arc::new(FakeShared::default());
        let mut session = SessionController::new(FakeTransport {
            shared: shared.clone(),
            refuse: false,
        });

        // Enough pictures that the fake network thread blocks on the swap
        // (nothing consumes frames in this test).
        let pipeline = pipeline_with_pictures(8);
        session.connect(&paired_ready_console(), pipeline).unwrap();
        if let Some(handle) = session.handle.as_mut() {
            handle.frames_to_send = 4;
        }
        session.start().unwrap();

        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        session.close();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(shared.stopped.load(Ordering::SeqCst));
        assert_eq!(session.state(), SessionState::Disconnected);

        // Second close is a no-op
        session.close();
    }

    #[test]
    fn presentation_loop_draws_frames_and_stops_on_quit() {
        struct ScriptedInput {
            events: VecDeque<InputEvent>,
            polls: usize,
        }
        impl InputSource for ScriptedInput {
            fn poll(&mut self) -> Option<InputEvent> {
                self.polls += 1;
                // After a while, ask to quit
                if self.polls > 200 {
                    self.events.push_back(InputEvent::Quit);
                }
                self.events.pop_front()
            }
        }

        let shared = Arc::new(FakeShared::default());
        let mut session = SessionController::new(FakeTransport {
            shared: shared.clone(),
            refuse: false,
        });
        let pipeline = pipeline_with_pictures(2);
        let swap = pipeline.swap();
        session.connect(&paired_ready_console(), pipeline).unwrap();
        if let Some(handle) = session.handle.as_mut() {
            handle.frames_to_send = 2;
        }
        session.start().unwrap();

        let mut stage = RenderStage::new(swap, RecordingSurface::default(), 1280, 720)
            .with_frame_wait(Duration::from_millis(5));
        let mut sampler = InputSampler::new();
        let mut source = ScriptedInput {
            events: VecDeque::new(),
            polls: 0,
        };

        run_presentation_loop(&mut session, &mut stage, &mut sampler, &mut source).unwrap();

        assert_eq!(stage.surface().draws.len(), 2);
        // Feedback flowed while the loop ran
        assert!(!shared.feedback.lock().is_empty());

        session.close();
    }

    #[test]
    fn late_transport_end_reaches_the_event_channel() {
        let mut session = SessionController::new(FakeTransport {
            shared: Arc::new(FakeShared::default()),
            refuse: false,
        });
        let pipeline = pipeline_with_pictures(0);
        session.connect(&paired_ready_console(), pipeline).unwrap();

        // Drive the event callback the way the transport would
        let callbacks = session.handle.as_mut().unwrap().callbacks.as_mut().unwrap();
        (callbacks.event)(TransportEvent::Ended {
            reason: "console went away".into(),
        });

        assert_eq!(session.state(), SessionState::Closing);
        let event = session.events().try_recv().unwrap();
        assert_eq!(
            event,
            SessionEvent::Ended {
                reason: "console went away".into()
            }
        );
    }

    #[test]
    fn render_shutdown_error_is_distinct() {
        // Sanity-check the loop's exit-on-shutdown path
        let pipeline = pipeline_with_pictures(0);
        let swap = pipeline.swap();
        pipeline.begin_shutdown();
        let mut stage = RenderStage::new(swap, RecordingSurface::default(), 1280, 720);
        assert!(matches!(stage.tick(), Err(MediaError::ShutDown)));
    }
}
