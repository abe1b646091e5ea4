use std::cell::RefCell;
use std::rc::Rc;

use samd_core::{
    Amd, AmdConfig, AmdError, AmdEvent, AmdEventKind, AmdState, Beep, BeepConfig, Disposition,
    Vad, VadConfig, VadEvent, VadEventKind,
};

const RATE: u32 = 8_000;
const SAMPLES_PER_MS: usize = (RATE / 1_000) as usize;

// ---------------------------------------------------------------------------
// Signal builders (8 kHz mono)
// ---------------------------------------------------------------------------

fn silence(ms: usize) -> Vec<i16> {
    vec![0; ms * SAMPLES_PER_MS]
}

/// Constant level: loud but without zero crossings, so never beep-like.
fn dc(level: i16, ms: usize) -> Vec<i16> {
    vec![level; ms * SAMPLES_PER_MS]
}

/// 800 Hz square wave starting on the negative half: 8 zero crossings per
/// 10 ms frame, mean absolute amplitude `level`.
fn tone(level: i16, ms: usize) -> Vec<i16> {
    tone_samples(level, ms * SAMPLES_PER_MS)
}

/// Same tone cut after `count` samples, wherever that falls in a frame.
fn tone_samples(level: i16, count: usize) -> Vec<i16> {
    (0..count)
        .map(|i| if i % 10 < 5 { -level } else { level })
        .collect()
}

fn concat(parts: &[Vec<i16>]) -> Vec<i16> {
    parts.concat()
}

fn recorded_amd(config: AmdConfig) -> (Amd, Rc<RefCell<Vec<AmdEvent>>>) {
    let mut amd = Amd::new(config).expect("create amd");
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    amd.set_event_handler(move |e| sink.borrow_mut().push(*e));
    (amd, events)
}

fn run_chunked(amd: &mut Amd, samples: &[i16], channels: u16, chunk: usize) {
    for buf in samples.chunks(chunk) {
        amd.process_buffer(buf, channels).expect("process buffer");
    }
}

fn classify(samples: &[i16]) -> Vec<AmdEvent> {
    let (mut amd, events) = recorded_amd(AmdConfig::default());
    run_chunked(&mut amd, samples, 1, 80);
    let out = events.borrow().clone();
    out
}

fn ev(kind: AmdEventKind, time_ms: u32) -> AmdEvent {
    AmdEvent { kind, time_ms }
}

// ---------------------------------------------------------------------------
// Classification scenarios
// ---------------------------------------------------------------------------

#[test]
fn dead_air_is_no_voice() {
    let events = classify(&silence(3_000));
    assert_eq!(events, vec![ev(AmdEventKind::NoVoice, 2_000)]);
}

#[test]
fn long_unbroken_voice_is_machine() {
    let events = classify(&dc(2_000, 1_500));
    // Voice confirmed at 20 ms, then 1100 ms of voice.
    assert_eq!(events, vec![ev(AmdEventKind::MachineVoice, 1_120)]);
}

#[test]
fn steady_voice_below_ceiling_is_machine() {
    // Above the configured threshold but under the 1300 ceiling, so the
    // adapted threshold decides. Voice starts after the 100 ms initial window.
    for level in [140, 300, 600, 1_000, 1_290] {
        let events = classify(&dc(level, 1_400));
        assert_eq!(
            events,
            vec![ev(AmdEventKind::MachineVoice, 1_220)],
            "level {level}"
        );
    }
}

#[test]
fn steady_voice_keeps_counting_as_voice_after_adjustments() {
    let mut amd = Amd::new(AmdConfig::default()).expect("create amd");
    run_chunked(&mut amd, &dc(600, 1_000), 1, 80);
    let vad = amd.vad();
    assert!(vad.threshold() > VadConfig::default().energy_threshold);
    assert!(vad.threshold() < 600.0);
    // Voice from 110 ms on.
    assert_eq!(vad.total_voice_ms(), 900);
}

#[test]
fn short_greeting_then_pause_is_human() {
    let (mut amd, events) = recorded_amd(AmdConfig::default());
    run_chunked(&mut amd, &concat(&[dc(2_000, 300), silence(700)]), 1, 80);

    // Silence starts at 310 ms and needs 500 ms to register.
    assert_eq!(*events.borrow(), vec![ev(AmdEventKind::HumanSilence, 800)]);
    assert_eq!(amd.state(), AmdState::HumanDetected);
    assert_eq!(amd.disposition(), Disposition::Human);
}

#[test]
fn beep_during_detection_is_machine() {
    let events = classify(&concat(&[tone(2_000, 150), silence(1_000)]));
    assert_eq!(
        events,
        vec![
            ev(AmdEventKind::MachineBeep, 360),
            ev(AmdEventKind::MachineSilence, 650),
        ]
    );
}

#[test]
fn beep_ending_inside_a_frame_is_machine() {
    // The tone stops 56 samples into its 16th frame.
    let samples = concat(&[tone_samples(2_000, 1_256), silence(1_000)]);
    for chunk in [80, 37] {
        let (mut amd, events) = recorded_amd(AmdConfig::default());
        run_chunked(&mut amd, &samples, 1, chunk);
        assert_eq!(
            *events.borrow(),
            vec![
                ev(AmdEventKind::MachineBeep, 370),
                ev(AmdEventKind::MachineSilence, 660),
            ],
            "chunk size {chunk}"
        );
    }
}

#[test]
fn beep_after_human_overrides_classification() {
    let samples = concat(&[dc(2_000, 300), silence(700), tone(2_000, 150), silence(300)]);
    let (mut amd, events) = recorded_amd(AmdConfig::default());
    run_chunked(&mut amd, &samples, 1, 80);

    assert_eq!(
        *events.borrow(),
        vec![
            ev(AmdEventKind::HumanSilence, 800),
            ev(AmdEventKind::HumanVoice, 1_020),
            ev(AmdEventKind::MachineBeep, 1_360),
        ]
    );
    assert_eq!(amd.disposition(), Disposition::Machine);
}

#[test]
fn nothing_after_no_voice() {
    let events = classify(&concat(&[silence(2_500), tone(2_000, 150), silence(500)]));
    assert_eq!(events, vec![ev(AmdEventKind::NoVoice, 2_000)]);
}

// ---------------------------------------------------------------------------
// Stream properties
// ---------------------------------------------------------------------------

fn mixed_call() -> Vec<i16> {
    concat(&[
        silence(400),
        dc(1_500, 250),
        silence(600),
        tone(2_500, 200),
        silence(400),
        dc(900, 1_300),
    ])
}

fn full_log(
    samples: &[i16],
    channels: u16,
    rate: u32,
    chunk: usize,
) -> (Vec<AmdEvent>, Vec<VadEvent>) {
    let config = AmdConfig {
        sample_rate: rate,
        ..AmdConfig::default()
    };
    let (mut amd, amd_events) = recorded_amd(config);
    let vad_events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&vad_events);
    amd.vad_mut()
        .expect("live session")
        .set_event_handler(move |e| sink.borrow_mut().push(*e));

    run_chunked(&mut amd, samples, channels, chunk);

    let amd_log = amd_events.borrow().clone();
    let vad_log = vad_events.borrow().clone();
    (amd_log, vad_log)
}

#[test]
fn events_do_not_depend_on_buffer_sizes() {
    let samples = mixed_call();
    let whole = full_log(&samples, 1, RATE, samples.len());
    assert!(!whole.0.is_empty());
    assert_eq!(whole.1.len(), samples.len() / 80);

    for chunk in [1, 7, 13, 80, 333] {
        assert_eq!(full_log(&samples, 1, RATE, chunk), whole, "chunk size {chunk}");
    }
}

#[test]
fn separate_instances_agree() {
    let samples = mixed_call();
    assert_eq!(
        full_log(&samples, 1, RATE, 80),
        full_log(&samples, 1, RATE, 80)
    );
}

#[test]
fn duplicated_stereo_matches_mono() {
    let mono = mixed_call();
    let stereo: Vec<i16> = mono.iter().flat_map(|&s| [s, s]).collect();
    // Odd chunk sizes split left/right pairs across buffers.
    assert_eq!(full_log(&stereo, 2, RATE, 161), full_log(&mono, 1, RATE, 80));
}

#[test]
fn sixteen_khz_matches_eight_khz() {
    let narrow = mixed_call();
    let wide: Vec<i16> = narrow.iter().flat_map(|&s| [s, s]).collect();
    assert_eq!(full_log(&wide, 1, 16_000, 160), full_log(&narrow, 1, RATE, 80));
}

#[test]
fn threshold_never_decreases() {
    let mut amd = Amd::new(AmdConfig::default()).expect("create amd");
    let mut last = amd.vad().threshold();
    for buf in mixed_call().chunks(80) {
        amd.process_buffer(buf, 1).expect("process buffer");
        let now = amd.vad().threshold();
        assert!(now >= last, "threshold dropped from {last} to {now}");
        assert!(now <= amd.vad().config().max_energy_threshold);
        last = now;
    }
    assert!(last > VadConfig::default().energy_threshold);
}

// ---------------------------------------------------------------------------
// Lifecycle and standalone detectors
// ---------------------------------------------------------------------------

#[test]
fn released_detector_rejects_audio() {
    let (mut amd, events) = recorded_amd(AmdConfig::default());
    amd.process_buffer(&silence(100), 1).expect("process buffer");
    amd.release();
    assert!(matches!(
        amd.process_buffer(&silence(3_000), 1),
        Err(AmdError::Released)
    ));
    assert!(events.borrow().is_empty());
}

#[test]
fn zero_channels_is_rejected() {
    let mut amd = Amd::new(AmdConfig::default()).expect("create amd");
    assert!(matches!(
        amd.process_buffer(&silence(10), 0),
        Err(AmdError::InvalidChannelCount)
    ));
}

#[test]
fn reset_starts_a_new_call() {
    let (mut amd, events) = recorded_amd(AmdConfig::default());
    run_chunked(&mut amd, &silence(2_000), 1, 80);
    amd.reset().expect("reset");
    assert_eq!(amd.disposition(), Disposition::Unknown);
    run_chunked(&mut amd, &dc(2_000, 1_200), 1, 80);
    assert_eq!(
        *events.borrow(),
        vec![
            ev(AmdEventKind::NoVoice, 2_000),
            ev(AmdEventKind::MachineVoice, 1_120),
        ]
    );
}

#[test]
fn standalone_vad_reports_onsets() {
    let mut vad = Vad::new(RATE, VadConfig::default()).expect("create vad");
    let onsets = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&onsets);
    vad.listener_mut()
        .expect("live session")
        .set_event_handler(move |e: &VadEvent| {
            if e.kind.is_begin() {
                sink.borrow_mut().push((e.kind, e.time_ms));
            }
        });

    vad.process_buffer(&concat(&[dc(2_000, 300), silence(700)]), 1)
        .expect("process buffer");

    assert_eq!(
        *onsets.borrow(),
        vec![
            (VadEventKind::VoiceBegin, 20),
            (VadEventKind::SilenceBegin, 800),
        ]
    );
}

#[test]
fn standalone_beep_fires_once() {
    let mut beep = Beep::new(RATE, BeepConfig::default()).expect("create beep");
    let hits = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&hits);
    beep.listener_mut()
        .expect("live session")
        .set_event_handler(move |e| sink.borrow_mut().push(e.time_ms));

    let call = concat(&[tone(2_000, 150), silence(300), tone(2_000, 150), silence(300)]);
    beep.process_buffer(&call, 1).expect("process buffer");

    assert_eq!(*hits.borrow(), vec![360]);
    assert!(beep.listener().is_done());
}

#[test]
fn standalone_beep_handles_partial_last_frame() {
    // Tails between the quiet level and the tone band.
    for extra in [50, 56, 62] {
        let mut beep = Beep::new(RATE, BeepConfig::default()).expect("create beep");
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        beep.listener_mut()
            .expect("live session")
            .set_event_handler(move |e| sink.borrow_mut().push(e.time_ms));

        let call = concat(&[tone_samples(2_000, 1_200 + extra), silence(300)]);
        beep.process_buffer(&call, 1).expect("process buffer");

        assert_eq!(*hits.borrow(), vec![370], "{extra} samples into the last frame");
    }
}

#[test]
fn released_standalone_detectors_are_frozen() {
    let mut vad = Vad::new(RATE, VadConfig::default()).expect("create vad");
    vad.release();
    assert!(matches!(vad.listener_mut(), Err(AmdError::Released)));

    let mut beep = Beep::new(RATE, BeepConfig::default()).expect("create beep");
    beep.release();
    assert!(matches!(beep.listener_mut(), Err(AmdError::Released)));
}
