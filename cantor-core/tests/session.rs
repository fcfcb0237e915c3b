mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cantor_audio::backend::TestOp;
use cantor_audio::{Completion, SoundSource};
use cantor_core::InterruptEvent;
use cantor_types::{BufferId, PlayOptions};
use common::{session, wait_for};

#[test]
fn test_interrupt_from_feed_thread_pauses_and_resumes() {
    let (voices, session) = session(2, 2);
    session.play_effect(BufferId::new(1), PlayOptions::new()).unwrap();
    voices[0].clear();

    let sender = session.interrupt_sender();
    let feeder = std::thread::spawn(move || sender.began());
    assert!(feeder.join().unwrap());
    assert!(wait_for(|| session.is_interrupted()));
    assert!(session.play_effect(BufferId::new(2), PlayOptions::new()).is_none());

    assert!(session.interrupt_sender().ended());
    assert!(wait_for(|| !session.is_interrupted()));
    assert_eq!(
        voices[0].operations(),
        vec![TestOp::SetPaused(true), TestOp::SetPaused(false)]
    );
}

#[test]
fn test_manual_suspend_survives_interrupt_end() {
    let (_voices, session) = session(2, 1);
    session.set_manually_suspended(true);
    session.handle_interrupt(InterruptEvent::Began);
    session.handle_interrupt(InterruptEvent::Ended);
    assert!(session.is_suspended());
    assert!(session.is_manually_suspended());

    session.set_manually_suspended(false);
    assert!(!session.is_suspended());
}

#[test]
fn test_channel_suspended_on_its_own_stays_down_after_session_resumes() {
    let (_voices, session) = session(4, 1);
    let music = session.new_channel(2);
    let ambience = session.new_channel(1);
    ambience.set_manually_suspended(true);

    session.set_manually_suspended(true);
    assert!(music.is_suspended());
    session.set_manually_suspended(false);

    assert!(!music.is_suspended());
    assert!(ambience.is_suspended());
    assert!(music.play(BufferId::new(1), PlayOptions::new()).is_some());
    assert!(ambience.play(BufferId::new(1), PlayOptions::new()).is_none());
}

#[test]
fn test_force_end_interruption() {
    let (_voices, session) = session(1, 1);
    session.handle_interrupt(InterruptEvent::Began);
    assert!(session.is_suspended());
    session.force_end_interruption();
    assert!(!session.is_suspended());
}

#[test]
fn test_effects_volume_and_mute() {
    let (voices, session) = session(2, 2);
    session.set_effects_volume(0.5);
    session.play_effect(BufferId::new(1), PlayOptions::new()).unwrap();
    assert_eq!(voices[0].last_gain(), Some(0.5));

    session.set_effects_muted(true);
    assert_eq!(voices[0].last_gain(), Some(0.0));
    assert_eq!(session.effects().params().gain, 0.5);
}

#[test]
fn test_reserved_voices_resize() {
    let (_voices, session) = session(6, 4);
    assert_eq!(session.free_voices(), 2);
    assert_eq!(session.set_reserved_voices(2), 2);
    assert_eq!(session.free_voices(), 4);
    assert_eq!(session.set_reserved_voices(10), 6);
    assert_eq!(session.free_voices(), 0);
    assert_eq!(session.new_channel(1).voice_count(), 0);
}

#[test]
fn test_stop_everything_reaches_all_channels() {
    let (voices, session) = session(3, 1);
    let music = session.new_channel(2);
    session.play_effect(BufferId::new(1), PlayOptions::new()).unwrap();
    music.play(BufferId::new(2), PlayOptions::new()).unwrap();

    session.stop_everything();
    assert!(!session.effects().is_playing());
    assert!(!music.is_playing());
    for voice in &voices {
        assert!(voice.operations().contains(&TestOp::Stop));
    }
}

#[test]
fn test_reset_to_default_restores_effects() {
    let (_voices, session) = session(2, 2);
    session.set_effects_volume(0.2);
    session.set_effects_paused(true);
    session.set_manually_suspended(true);

    session.reset_to_default();
    assert_eq!(session.effects().params().gain, 1.0);
    assert!(!session.effects().is_paused());
    assert!(!session.is_suspended());
}

#[test]
fn test_fade_effects_completes_on_ticker() {
    let (voices, session) = session(2, 2);
    session.play_effect(BufferId::new(1), PlayOptions::new()).unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let done: Completion = Box::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    session.fade_effects(0.0, Duration::from_millis(20), Some(done));
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
    assert_eq!(session.effects().params().gain, 0.0);
    assert_eq!(voices[0].last_gain(), Some(0.0));
}

#[test]
fn test_fade_freezes_while_suspended() {
    let (_voices, session) = session(1, 1);
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let done: Completion = Box::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    session.set_manually_suspended(true);
    session.fade_effects(0.0, Duration::from_millis(10), Some(done));
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    session.set_manually_suspended(false);
    assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
}
