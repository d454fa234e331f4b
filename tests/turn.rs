//! Turn controller integration tests
//!
//! Drives whole wake → capture → reply turns through scripted audio and
//! fake services.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use planty::audio::{AudioGate, Session};
use planty::dialogue::FALLBACK_REPLY;
use planty::voice::{PhraseWakeDetector, Transcriber};
use planty::{
    AbortReason, Cycle, Emotion, Error, SensorReadings, SharedState, Shutdown, StateUpdate,
    TurnController, TurnOutcome, parse_reply,
};

mod common;
use common::{
    QueuedTranscriber, RecordingGenerator, RecordingSynthesizer, ScriptedDetector,
    ScriptedDevice, fast_settings, frame, frames, services,
};

/// Wake frame, a short burst of speech, then silence from the device
fn spoken_request() -> Vec<Vec<i16>> {
    let mut script = vec![frame(0)];
    script.extend(frames(5000, 4));
    script
}

fn garden() -> SensorReadings {
    SensorReadings {
        humidity: 22.0,
        temperature: 27.5,
        light: 300.0,
        nutrients: 40.0,
    }
}

#[tokio::test]
async fn test_full_turn_speaks_tagged_reply() {
    let state = SharedState::new();
    state.update(StateUpdate::new().sensors(garden()));

    let transcriber = QueuedTranscriber::saying("물 줘");
    let generator = RecordingGenerator::replying("물을 줄게요! [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let gate = AudioGate::new(device);
    let mut controller = TurnController::new(
        gate.clone(),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let shutdown = Shutdown::new();
    let mut listener = shutdown.listener();
    let cycle = controller.cycle(&mut listener).await;

    let Cycle::Turn(TurnOutcome::Spoken {
        emotion,
        text,
        gesture,
    }) = cycle
    else {
        panic!("expected a spoken turn, got {cycle:?}");
    };
    assert_eq!(emotion, Emotion::Happy);
    assert_eq!(text, "물을 줄게요!");
    assert_eq!(gesture, Emotion::Happy.gesture());

    // Generator saw the transcript and the current sensors
    let seen = generator.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "물 줘");
    assert_eq!(seen[0].1, garden());

    // Emotion and speaking flag were published before synthesis
    let during = synthesizer.during.lock().unwrap();
    assert_eq!(during.len(), 1);
    assert_eq!(during[0].emotion, Emotion::Happy);
    assert!(during[0].is_speaking);
    assert!(!during[0].is_listening);
    assert_eq!(synthesizer.texts.lock().unwrap().as_slice(), ["물을 줄게요!"]);

    // Played once, then back to idle with the emotion kept
    assert_eq!(log.lock().unwrap().played.len(), 1);
    let after = state.snapshot();
    assert_eq!(after.emotion, Emotion::Happy);
    assert!(!after.is_listening);
    assert!(!after.is_speaking);
    assert!(!gate.is_busy());
}

#[tokio::test]
async fn test_generator_failure_uses_fallback_reply() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("안녕");
    let generator = RecordingGenerator::failing();
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, _log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    let fallback = parse_reply(FALLBACK_REPLY);
    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Spoken { ref text, emotion, .. })
            if *text == fallback.text && emotion == Emotion::Neutral
    ));
    // Retried up to the policy limit before falling back
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(synthesizer.texts.lock().unwrap()[0], fallback.text);
}

#[tokio::test]
async fn test_silent_capture_aborts_without_transcribing() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("should not be asked");
    let generator = RecordingGenerator::replying("hi [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    // Only the wake frame; the rest is silence until the capture cap
    let (device, log) = ScriptedDevice::new(vec![frame(0)]);
    let detector = ScriptedDetector::new(1);
    let resets = Arc::clone(&detector.resets);
    let mut controller = TurnController::new(
        AudioGate::new(device),
        detector,
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Aborted(AbortReason::NoSpeech))
    ));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(log.lock().unwrap().played.is_empty());
    assert!(resets.load(Ordering::SeqCst) >= 1);

    let after = state.snapshot();
    assert_eq!(after.emotion, Emotion::Neutral);
    assert!(!after.is_listening);
}

#[tokio::test]
async fn test_empty_transcript_aborts_turn() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("   ");
    let generator = RecordingGenerator::replying("hi [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, _log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Aborted(AbortReason::NoSpeech))
    ));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transcriber_outage_aborts_after_retries() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::unavailable();
    let generator = RecordingGenerator::replying("hi [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, _log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Aborted(AbortReason::Transcriber))
    ));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
    assert!(!state.snapshot().is_listening);
}

#[tokio::test]
async fn test_synthesizer_failure_keeps_emotion_and_goes_idle() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("졸려?");
    let generator = RecordingGenerator::replying("조금 졸려요 [sleepy]");
    let synthesizer = RecordingSynthesizer::failing(&state);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Aborted(AbortReason::Synthesizer))
    ));
    assert!(log.lock().unwrap().played.is_empty());
    let after = state.snapshot();
    assert_eq!(after.emotion, Emotion::Sleepy);
    assert!(!after.is_speaking);
}

#[tokio::test]
async fn test_playback_failure_still_counts_as_spoken() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("안녕");
    let generator = RecordingGenerator::replying("안녕하세요! [excited]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device.failing_playback()),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Spoken {
            emotion: Emotion::Excited,
            ..
        })
    ));
    assert_eq!(log.lock().unwrap().played.len(), 1);
    assert!(!state.snapshot().is_speaking);
}

#[tokio::test]
async fn test_busy_device_skips_cycle() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("물 줘");
    let generator = RecordingGenerator::replying("네 [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let gate = AudioGate::new(device);
    let mut controller = TurnController::new(
        gate.clone(),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let held = gate.acquire_output().unwrap();
    assert!(matches!(
        gate.acquire_input(),
        Err(Error::DeviceBusy(Session::Output))
    ));

    let mut listener = Shutdown::new().listener();
    assert!(matches!(controller.cycle(&mut listener).await, Cycle::Skipped));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);

    // Once released the next cycle gets the device
    gate.release(held);
    assert!(matches!(
        controller.cycle(&mut listener).await,
        Cycle::Turn(TurnOutcome::Spoken { .. })
    ));
    assert_eq!(log.lock().unwrap().input_starts, 1);
}

#[tokio::test]
async fn test_phrase_wake_then_turn_uses_one_check_per_segment() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::new(vec![
        Ok("플랜티야".to_string()),
        Ok("오늘 기분 어때?".to_string()),
    ]);
    let generator = RecordingGenerator::replying("햇빛이 좋아서 신나요! [excited]");
    let synthesizer = RecordingSynthesizer::new(&state);

    // Wake phrase: a loud burst and enough silence to close the segment,
    // then the request itself
    let mut script = frames(8000, 12);
    script.extend(frames(0, 16));
    script.extend(frames(5000, 4));

    let detector = PhraseWakeDetector::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        vec!["플랜티".to_string()],
        "ko".to_string(),
        common::FRAME,
        common::SAMPLE_RATE,
    )
    .unwrap();

    let (device, _log) = ScriptedDevice::new(script);
    let mut controller = TurnController::new(
        AudioGate::new(device),
        detector,
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let mut listener = Shutdown::new().listener();
    let cycle = controller.cycle(&mut listener).await;

    assert!(matches!(
        cycle,
        Cycle::Turn(TurnOutcome::Spoken {
            emotion: Emotion::Excited,
            ..
        })
    ));
    // One call for the wake segment, one for the request
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
    assert_eq!(generator.seen.lock().unwrap()[0].0, "오늘 기분 어때?");
}

#[tokio::test]
async fn test_run_stops_on_shutdown_and_returns_to_idle() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("x");
    let generator = RecordingGenerator::replying("x [neutral]");
    let synthesizer = RecordingSynthesizer::new(&state);

    // Detector never fires within the test
    let (device, log) = ScriptedDevice::new(Vec::new());
    let controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(usize::MAX),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        trigger.trigger();
    });

    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        controller.run(shutdown.listener()),
    )
    .await
    .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.input_starts, 1);
    assert_eq!(log.input_stops, 1);
    assert!(!state.snapshot().is_listening);
}

#[tokio::test]
async fn test_shutdown_during_transcription_is_not_retried() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::unavailable();
    let generator = RecordingGenerator::replying("x [neutral]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let shutdown = Shutdown::new();
    transcriber.trigger_on_call(&shutdown);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let mut controller = TurnController::new(
        AudioGate::new(device),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let cycle = controller.cycle(&mut shutdown.listener()).await;

    assert_eq!(cycle, Cycle::Turn(TurnOutcome::Aborted(AbortReason::Shutdown)));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    assert!(synthesizer.texts.lock().unwrap().is_empty());
    assert!(log.lock().unwrap().played.is_empty());
    assert!(!state.snapshot().is_listening);
}

#[tokio::test]
async fn test_shutdown_during_synthesis_skips_playback() {
    let state = SharedState::new();
    let transcriber = QueuedTranscriber::saying("노래 불러줘");
    let generator = RecordingGenerator::replying("라라라~ [happy]");
    let synthesizer = RecordingSynthesizer::new(&state);

    let shutdown = Shutdown::new();
    synthesizer.trigger_on_call(&shutdown);

    let (device, log) = ScriptedDevice::new(spoken_request());
    let gate = AudioGate::new(device);
    let mut controller = TurnController::new(
        gate.clone(),
        ScriptedDetector::new(1),
        services(&transcriber, &generator, &synthesizer),
        state.clone(),
        fast_settings(),
    );

    let cycle = controller.cycle(&mut shutdown.listener()).await;

    assert_eq!(cycle, Cycle::Turn(TurnOutcome::Aborted(AbortReason::Shutdown)));
    assert_eq!(synthesizer.texts.lock().unwrap().len(), 1);
    assert!(log.lock().unwrap().played.is_empty());
    assert!(!gate.is_busy());
    assert!(!state.snapshot().is_speaking);
}
