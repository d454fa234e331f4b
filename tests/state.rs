//! Shared state consistency under concurrent writers

use std::thread;

use planty::{Activity, Emotion, SensorReadings, SharedState, StateUpdate};

fn uniform(v: f64) -> SensorReadings {
    SensorReadings {
        humidity: v,
        temperature: v,
        light: v,
        nutrients: v,
    }
}

#[test]
fn test_snapshots_never_see_partial_updates() {
    let state = SharedState::new();

    let sampler = {
        let state = state.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                state.update(StateUpdate::new().sensors(uniform(f64::from(i))));
            }
        })
    };

    let controller = {
        let state = state.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                let (emotion, activity) = if i % 2 == 0 {
                    (Emotion::Thinking, Activity::Listening)
                } else {
                    (Emotion::Happy, Activity::Speaking)
                };
                state.update(StateUpdate::new().emotion(emotion).activity(activity));
            }
        })
    };

    let reader = {
        let state = state.clone();
        thread::spawn(move || {
            let mut last_revision = 0;
            for _ in 0..4_000 {
                let snap = state.snapshot();
                let s = snap.sensors;
                assert!(
                    s.humidity == s.temperature && s.light == s.nutrients && s.humidity == s.light,
                    "torn sensor readings: {s:?}"
                );
                assert!(!(snap.is_listening && snap.is_speaking));
                assert!(snap.revision >= last_revision);
                last_revision = snap.revision;
            }
        })
    };

    sampler.join().unwrap();
    controller.join().unwrap();
    reader.join().unwrap();

    let last = state.snapshot();
    assert_eq!(last.revision, 4_000);
    assert_eq!(last.sensors, uniform(1_999.0));
}

#[test]
fn test_sensor_updates_leave_conversation_fields_alone() {
    let state = SharedState::new();
    state.update(
        StateUpdate::new()
            .emotion(Emotion::Excited)
            .activity(Activity::Listening),
    );
    state.update(StateUpdate::new().sensors(uniform(42.0)));

    let snap = state.snapshot();
    assert_eq!(snap.emotion, Emotion::Excited);
    assert!(snap.is_listening);
    assert_eq!(snap.sensors, uniform(42.0));
}

#[tokio::test]
async fn test_subscribers_are_woken_by_other_tasks() {
    let state = SharedState::new();
    let mut changes = state.subscribe();

    let writer = state.clone();
    tokio::spawn(async move {
        writer.update(StateUpdate::new().emotion(Emotion::Worried));
    });

    changes.changed().await.unwrap();
    assert_eq!(*changes.borrow_and_update(), 1);
    assert_eq!(state.snapshot().emotion, Emotion::Worried);
}
