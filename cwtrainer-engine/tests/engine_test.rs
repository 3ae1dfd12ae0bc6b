use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cwtrainer_engine::{
    AudioCore, AudioEngine, DEFAULT_FREQUENCY, Engine, EngineError, NullEngine, PlaybackStop,
    RadioError, RenderPipeline, Trainer,
};
use cwtrainer_messages::{
    AudioConfig, BandConditionsConfig, Command, Event, Hertz, PlaybackOutcome, RadioMode, Wpm,
};

// Test helpers to reduce boilerplate

/// Shared view into a [`ProbeEngine`].
#[derive(Default)]
struct Probe {
    starts: AtomicUsize,
    running: AtomicBool,
    fault: AtomicBool,
}

/// Null output that reports what was done to it.
struct ProbeEngine {
    inner: NullEngine,
    probe: Arc<Probe>,
}

impl AudioEngine for ProbeEngine {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn start(&mut self, pipeline: RenderPipeline) -> Result<(), EngineError> {
        self.inner.start(pipeline)?;
        self.probe.fault.store(false, Ordering::SeqCst);
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        self.probe.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Option<RenderPipeline> {
        self.probe.running.store(false, Ordering::SeqCst);
        self.inner.stop()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn has_faulted(&self) -> bool {
        self.is_running() && self.probe.fault.load(Ordering::SeqCst)
    }
}

/// Output that can never be started.
struct FailingEngine;

impl AudioEngine for FailingEngine {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn start(&mut self, _pipeline: RenderPipeline) -> Result<(), EngineError> {
        Err(EngineError::NoOutputDevice)
    }

    fn stop(&mut self) -> Option<RenderPipeline> {
        None
    }

    fn is_running(&self) -> bool {
        false
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> AudioConfig {
    AudioConfig {
        buffer_size: 256,
        seed: Some(7),
        ..AudioConfig::default()
    }
}

fn probe_core() -> (AudioCore, Arc<Probe>) {
    init_logging();
    let probe = Arc::new(Probe::default());
    let engine = ProbeEngine {
        inner: NullEngine::new(test_config()),
        probe: probe.clone(),
    };
    (AudioCore::new(test_config(), Box::new(engine)), probe)
}

fn setup_engine(
    core: Arc<AudioCore>,
) -> (
    flume::Sender<Command>,
    flume::Receiver<Event>,
    JoinHandle<anyhow::Result<()>>,
) {
    let (cmd_tx, cmd_rx) = flume::unbounded::<Command>();
    let (event_tx, event_rx) = flume::unbounded::<Event>();
    let stop = Arc::new(PlaybackStop::new());

    let handle = thread::spawn(move || {
        let engine = Engine::new(core, cmd_rx, event_tx, stop);
        engine.run()
    });

    (cmd_tx, event_rx, handle)
}

fn teardown_engine(cmd_tx: flume::Sender<Command>, handle: JoinHandle<anyhow::Result<()>>) {
    cmd_tx.send(Command::Shutdown).unwrap();
    let result = handle.join().expect("Engine thread should not panic");
    assert!(result.is_ok());
}

/// Pull buffers from `tap` until one satisfies `check`.
fn wait_for_buffer(tap: &flume::Receiver<Vec<f32>>, check: impl Fn(&[f32]) -> bool) -> bool {
    for _ in 0..500 {
        match tap.recv_timeout(Duration::from_secs(2)) {
            Ok(buffer) if check(&buffer) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
    false
}

fn is_silent(buffer: &[f32]) -> bool {
    buffer.iter().all(|&s| s == 0.0)
}

#[test]
fn test_engine_sends_state_snapshot() {
    let (core, _probe) = probe_core();
    let (cmd_tx, event_rx, handle) = setup_engine(Arc::new(core));

    let first_event = event_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Should receive StateSnapshot");

    match first_event {
        Event::StateSnapshot(state) => {
            assert_eq!(state.radio.mode, RadioMode::Off);
            assert!(!state.session_active);
            assert_eq!(state.frequency, Hertz(600.0));
            assert_eq!(state.effective_speed, Wpm(18));
            assert!(!state.band_conditions.enabled);
            assert_eq!(state.audio.sample_rate, 44_100);
        }
        _ => panic!("First event should be StateSnapshot, got {:?}", first_event),
    }

    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_engine_replies_to_each_request() {
    let (core, probe) = probe_core();
    let (cmd_tx, event_rx, handle) = setup_engine(Arc::new(core));

    let (reply_tx, reply_rx) = flume::bounded(1);
    cmd_tx
        .send(Command::PlayCharacter {
            character: 'E',
            reply: reply_tx,
        })
        .unwrap();

    let outcome = reply_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("Should receive a reply");
    assert_eq!(outcome, PlaybackOutcome::Completed);
    assert_eq!(probe.starts.load(Ordering::SeqCst), 1);

    let finished = event_rx
        .iter()
        .find_map(|event| match event {
            Event::PlaybackFinished(outcome) => Some(outcome),
            _ => None,
        })
        .expect("Should receive PlaybackFinished");
    assert!(finished.is_completed());

    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_engine_exits_when_callers_disconnect() {
    let (core, _probe) = probe_core();
    core.start_session().unwrap();
    let (cmd_tx, event_rx, handle) = setup_engine(Arc::new(core));

    drop(event_rx);
    drop(cmd_tx);
    let result = handle.join();
    assert!(result.is_ok(), "Engine thread should not panic");
}

#[test]
fn test_session_start_is_idempotent() {
    let (core, probe) = probe_core();

    core.start_session().unwrap();
    core.start_session().unwrap();
    assert!(core.is_session_active());
    assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    assert_eq!(core.radio_state().mode, RadioMode::Receiving);

    core.end_session();
    core.end_session();
    assert!(!core.is_session_active());
    assert!(!probe.running.load(Ordering::SeqCst));
    assert_eq!(core.radio_state().mode, RadioMode::Off);
}

#[test]
fn test_start_failure_leaves_core_clean() {
    init_logging();
    let core = AudioCore::new(test_config(), Box::new(FailingEngine));

    let result = core.start_session();
    assert!(matches!(result, Err(EngineError::NoOutputDevice)));
    assert!(!core.is_session_active());
    assert_eq!(core.radio_state().mode, RadioMode::Off);

    // A later attempt goes through the full start path again.
    assert!(core.start_session().is_err());
}

#[test]
fn test_session_events() {
    let (core, _probe) = probe_core();
    let (event_tx, event_rx) = flume::unbounded();
    let core = core.with_events(event_tx);

    core.start_session().unwrap();
    core.interruption_began();
    core.interruption_ended().unwrap();
    core.end_session();

    let events: Vec<Event> = event_rx.try_iter().collect();
    assert_eq!(events.len(), 4, "unexpected events: {:?}", events);
    assert!(matches!(events[0], Event::SessionStarted));
    assert!(matches!(events[1], Event::Interrupted));
    assert!(matches!(events[2], Event::Resumed));
    assert!(matches!(events[3], Event::SessionEnded));
}

#[test]
fn test_interruption_preserves_mode() {
    let (core, probe) = probe_core();
    core.start_session().unwrap();
    core.stop().unwrap();
    core.start_transmitting().unwrap();
    core.key().unwrap();

    core.interruption_began();
    assert!(core.is_interrupted());
    assert!(core.is_session_active());
    assert!(!probe.running.load(Ordering::SeqCst));
    assert_eq!(core.radio_state().mode, RadioMode::Transmitting);

    core.interruption_ended().unwrap();
    assert!(!core.is_interrupted());
    assert!(probe.running.load(Ordering::SeqCst));
    assert_eq!(probe.starts.load(Ordering::SeqCst), 2);

    let state = core.radio_state();
    assert_eq!(state.mode, RadioMode::Transmitting);
    assert!(!state.is_keying);

    core.end_session();
}

#[test]
fn test_worker_recovers_from_backend_fault() {
    let (core, probe) = probe_core();
    let (event_tx, event_rx) = flume::unbounded();
    let core = Arc::new(core.with_events(event_tx));
    core.start_session().unwrap();
    let (cmd_tx, _engine_events, handle) = setup_engine(core.clone());

    probe.fault.store(true, Ordering::SeqCst);
    let recovered = (0..50).any(|_| {
        thread::sleep(Duration::from_millis(100));
        probe.starts.load(Ordering::SeqCst) == 2 && !core.is_interrupted()
    });
    assert!(recovered, "worker did not restart the faulted output");
    assert!(core.is_session_active());
    assert_eq!(core.radio_state().mode, RadioMode::Receiving);

    let events: Vec<Event> = event_rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, Event::Interrupted)));
    assert!(events.iter().any(|e| matches!(e, Event::Resumed)));

    teardown_engine(cmd_tx, handle);
    assert!(!core.is_session_active());
}

#[test]
fn test_worker_leaves_platform_interruption_alone() {
    let (core, probe) = probe_core();
    let core = Arc::new(core);
    core.start_session().unwrap();
    let (cmd_tx, _event_rx, handle) = setup_engine(core.clone());

    core.interruption_began();
    thread::sleep(Duration::from_millis(350));
    assert!(core.is_interrupted());
    assert_eq!(probe.starts.load(Ordering::SeqCst), 1);

    core.interruption_ended().unwrap();
    assert!(!core.is_interrupted());
    teardown_engine(cmd_tx, handle);
}

#[test]
fn test_interruption_without_session_is_ignored() {
    let (core, probe) = probe_core();
    core.interruption_began();
    assert!(!core.is_interrupted());
    core.interruption_ended().unwrap();
    assert_eq!(probe.starts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_backend_fault_becomes_interruption() {
    let (core, probe) = probe_core();
    core.start_session().unwrap();
    assert!(!core.poll_backend());

    probe.fault.store(true, Ordering::SeqCst);
    assert!(core.poll_backend());
    assert!(core.is_interrupted());
    assert_eq!(core.radio_state().mode, RadioMode::Receiving);

    probe.fault.store(false, Ordering::SeqCst);
    core.interruption_ended().unwrap();
    assert!(!core.is_interrupted());
    core.end_session();
}

#[test]
fn test_receiving_gate_controls_output() {
    init_logging();
    let (tap_tx, tap_rx) = flume::bounded(1);
    let engine = NullEngine::new(test_config()).with_tap(tap_tx).unpaced();
    let core = AudioCore::new(test_config(), Box::new(engine));

    core.start_session().unwrap();
    assert!(wait_for_buffer(&tap_rx, is_silent), "receiving without a tone should be silent");

    core.activate_tone(Hertz(700.0)).unwrap();
    assert_eq!(core.frequency(), Hertz(700.0));
    assert!(
        wait_for_buffer(&tap_rx, |b| b.iter().any(|&s| s.abs() > 0.1)),
        "active tone should be audible"
    );

    core.deactivate_tone().unwrap();
    assert!(wait_for_buffer(&tap_rx, is_silent));

    core.end_session();
}

fn tapped_core(band: BandConditionsConfig) -> (AudioCore, flume::Receiver<Vec<f32>>) {
    init_logging();
    let (tap_tx, tap_rx) = flume::bounded(1);
    let engine = NullEngine::new(test_config()).with_tap(tap_tx).unpaced();
    let core = AudioCore::new(test_config(), Box::new(engine));
    core.configure_band_conditions(band);
    (core, tap_rx)
}

fn noisy_band() -> BandConditionsConfig {
    BandConditionsConfig {
        enabled: true,
        noise_level: 1.0,
        interference_enabled: true,
        interference_level: 1.0,
        ..BandConditionsConfig::default()
    }
}

/// First buffer the backend renders after the graph (re)starts.
fn first_buffer(tap: &flume::Receiver<Vec<f32>>) -> Vec<f32> {
    tap.recv_timeout(Duration::from_secs(2))
        .expect("Should receive a rendered buffer")
}

#[test]
fn test_band_noise_only_on_receive_path() {
    let (core, tap_rx) = tapped_core(noisy_band());

    // No tone is sounding, so anything audible comes from the band.
    core.start_session().unwrap();
    assert!(wait_for_buffer(&tap_rx, |b| b.iter().any(|&s| s != 0.0)
        && b.iter().all(|s| s.abs() <= 1.0)));

    // Transmit is the clean sidetone path: unkeyed means exact silence.
    core.stop().unwrap();
    core.start_transmitting().unwrap();
    assert!(wait_for_buffer(&tap_rx, is_silent));

    core.end_session();
}

#[test]
fn test_session_restart_renders_from_clean_state() {
    let (core, tap_rx) = tapped_core(noisy_band());
    core.start_session().unwrap();
    let first = first_buffer(&tap_rx);
    core.end_session();
    let _ = tap_rx.drain();

    // The parked graph is reused; it must sound exactly like a new one.
    core.start_session().unwrap();
    let restarted = first_buffer(&tap_rx);
    core.end_session();
    assert_eq!(first, restarted);

    let (fresh, fresh_rx) = tapped_core(noisy_band());
    fresh.start_session().unwrap();
    assert_eq!(first_buffer(&fresh_rx), first);
    fresh.end_session();
}

#[test]
fn test_interruption_resumes_from_clean_state() {
    let (core, tap_rx) = tapped_core(noisy_band());
    core.start_session().unwrap();
    let first = first_buffer(&tap_rx);

    core.interruption_began();
    let _ = tap_rx.drain();
    core.interruption_ended().unwrap();

    assert_eq!(first_buffer(&tap_rx), first);
    assert_eq!(core.radio_state().mode, RadioMode::Receiving);
    core.end_session();
}

#[test]
fn test_activate_tone_requires_radio_on() {
    let (core, _probe) = probe_core();
    let before = core.frequency();

    assert_eq!(core.activate_tone(Hertz(750.0)), Err(RadioError::MustBeOn));
    assert_eq!(core.frequency(), before);
    assert!(!core.radio_state().tone_active);
}

#[test]
fn test_settings_are_clamped() {
    let (core, _probe) = probe_core();

    assert_eq!(core.set_frequency(Hertz(1000.0)), Hertz(800.0));
    assert_eq!(core.set_frequency(Hertz(100.0)), Hertz(400.0));
    assert_eq!(core.frequency(), Hertz(400.0));
    assert_eq!(core.set_frequency(Hertz(f32::NAN)), DEFAULT_FREQUENCY);
    assert_eq!(core.set_frequency(Hertz(f32::INFINITY)), DEFAULT_FREQUENCY);

    assert_eq!(core.set_effective_speed(Wpm(5)), Wpm(10));
    assert_eq!(core.set_effective_speed(Wpm(30)), Wpm(18));
    assert_eq!(core.set_effective_speed(Wpm(12)), Wpm(12));
    assert_eq!(core.snapshot().effective_speed, Wpm(12));
}

#[test]
fn test_discrete_tone_leaves_no_graph() {
    let (core, probe) = probe_core();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    let outcome = trainer
        .play_tone(Hertz(650.0), Duration::from_millis(30))
        .unwrap();
    assert_eq!(outcome, PlaybackOutcome::Completed);

    assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    assert!(!probe.running.load(Ordering::SeqCst));
    assert!(!trainer.core().is_session_active());
    assert_eq!(trainer.core().radio_state().mode, RadioMode::Off);

    trainer.shutdown().unwrap();
}

#[test]
fn test_session_playback_uses_tone_gate() {
    let (core, probe) = probe_core();
    core.start_session().unwrap();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    assert_eq!(trainer.play_character('A').unwrap(), PlaybackOutcome::Completed);

    // No extra graph was started for the character.
    assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    let state = trainer.core().radio_state();
    assert_eq!(state.mode, RadioMode::Receiving);
    assert!(!state.tone_active);

    trainer.shutdown().unwrap();
    assert!(!probe.running.load(Ordering::SeqCst));
}

#[test]
fn test_unknown_character_fails() {
    let (core, probe) = probe_core();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    let outcome = trainer.play_character('#').unwrap();
    assert!(matches!(outcome, PlaybackOutcome::Failed(_)));
    assert_eq!(probe.starts.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stop_playback_halts_group() {
    let (core, _probe) = probe_core();
    core.start_session().unwrap();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    let outcome = thread::scope(|s| {
        let playing = s.spawn(|| trainer.play_group("PARIS PARIS PARIS"));
        thread::sleep(Duration::from_millis(100));
        trainer.stop_playback();
        playing.join().expect("player thread should not panic")
    });

    assert_eq!(outcome.unwrap(), PlaybackOutcome::Stopped);
    assert!(!trainer.core().radio_state().tone_active);

    // The next request plays normally.
    assert_eq!(trainer.play_character('E').unwrap(), PlaybackOutcome::Completed);
}

#[test]
fn test_stop_playback_covers_queued_requests() {
    let (core, _probe) = probe_core();
    core.start_session().unwrap();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    let (playing, queued) = thread::scope(|s| {
        let playing = s.spawn(|| trainer.play_group("PARIS PARIS PARIS"));
        thread::sleep(Duration::from_millis(50));
        let queued = s.spawn(|| trainer.play_group("PARIS"));
        thread::sleep(Duration::from_millis(100));
        trainer.stop_playback();
        (
            playing.join().expect("player thread should not panic"),
            queued.join().expect("player thread should not panic"),
        )
    });

    assert_eq!(playing.unwrap(), PlaybackOutcome::Stopped);
    assert_eq!(queued.unwrap(), PlaybackOutcome::Stopped);
    assert!(!trainer.core().radio_state().tone_active);

    // Requests queued after the stop are not affected.
    assert_eq!(trainer.play_character('E').unwrap(), PlaybackOutcome::Completed);
}

#[test]
fn test_requests_play_one_at_a_time() {
    let (core, probe) = probe_core();
    let (event_tx, _event_rx) = flume::unbounded();
    let trainer = Trainer::spawn(core, event_tx);

    // Overlapping discrete tones would be rejected by the backend.
    let outcomes: Vec<PlaybackOutcome> = thread::scope(|s| {
        let players: Vec<_> = ['E', 'T', 'I']
            .into_iter()
            .map(|c| {
                let trainer = &trainer;
                s.spawn(move || trainer.play_character(c))
            })
            .collect();
        players
            .into_iter()
            .map(|p| p.join().unwrap().unwrap())
            .collect()
    });

    assert!(outcomes.iter().all(PlaybackOutcome::is_completed));
    // E, T and the two elements of I.
    assert_eq!(probe.starts.load(Ordering::SeqCst), 4);
}
