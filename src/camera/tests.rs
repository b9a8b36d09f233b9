use super::*;
use crate::config::{CameraConfig, CameraPosition, KioskcamConfig};
use crate::error::CameraError;
use crate::frame::FrameData;

fn low_preset_config() -> CaptureSessionConfig {
    CaptureSessionConfig::for_preset(&KioskcamConfig::default().camera, ResolutionPreset::Low, 5)
}

#[test]
fn test_preset_resolution_comes_from_camera_config() {
    let camera = CameraConfig {
        device_index: 1,
        position: CameraPosition::Back,
        low_resolution: (160, 120),
        medium_resolution: (800, 600),
    };

    let low = CaptureSessionConfig::for_preset(&camera, ResolutionPreset::Low, 5);
    assert_eq!(low.resolution, (160, 120));
    assert_eq!(low.device_index, 1);
    assert_eq!(low.position, CameraPosition::Back);

    let medium = CaptureSessionConfig::for_preset(&camera, ResolutionPreset::Medium, 10);
    assert_eq!(medium.resolution, (800, 600));
    assert_eq!(medium.fps, 10);
}

#[test]
fn test_authorization_state_names() {
    assert_eq!(AuthorizationState::default(), AuthorizationState::NotDetermined);
    assert_eq!(AuthorizationState::Restricted.to_string(), "restricted");
    assert!(AuthorizationState::Authorized.is_authorized());
    assert!(!AuthorizationState::Denied.is_authorized());
}

#[tokio::test]
async fn test_mock_request_access_updates_status() {
    let provider = MockCameraProvider::new(AuthorizationState::NotDetermined);
    assert!(provider.request_access().await);
    assert_eq!(provider.authorization_status(), AuthorizationState::Authorized);

    let denying = MockCameraProvider::new(AuthorizationState::NotDetermined);
    denying.set_grant_on_request(false);
    assert!(!denying.request_access().await);
    assert_eq!(denying.authorization_status(), AuthorizationState::Denied);
    assert_eq!(denying.access_requests(), 1);
}

#[tokio::test]
async fn test_mock_session_receives_pushed_frames() {
    let provider = MockCameraProvider::authorized();
    let mut session = provider.open_session(low_preset_config()).await.unwrap();
    let mut frames = session.take_frames().unwrap();
    assert!(session.take_frames().is_none());

    assert_eq!(provider.push_frame(FrameData::filled_gray(7, 4, 4, 10)), 1);
    let frame = frames.recv().await.unwrap();
    assert_eq!(frame.id, 7);
    assert_eq!(provider.open_sessions(), 1);
}

#[tokio::test]
async fn test_mock_session_drops_frames_when_queue_full() {
    let provider = MockCameraProvider::authorized();
    let mut session = provider.open_session(low_preset_config()).await.unwrap();
    let mut frames = session.take_frames().unwrap();

    for id in 0..(FRAME_QUEUE_DEPTH as u64 + 3) {
        provider.push_frame(FrameData::filled_gray(id, 2, 2, 0));
    }

    let mut received = Vec::new();
    while let Ok(frame) = frames.try_recv() {
        received.push(frame.id);
    }
    assert_eq!(received, vec![0, 1]);
}

#[tokio::test]
async fn test_mock_close_ends_frame_stream() {
    let provider = MockCameraProvider::authorized();
    let mut session = provider.open_session(low_preset_config()).await.unwrap();
    let mut frames = session.take_frames().unwrap();

    session.close().await;
    assert_eq!(provider.open_sessions(), 0);
    assert!(frames.recv().await.is_none());
    assert_eq!(provider.push_frame(FrameData::filled_gray(1, 2, 2, 0)), 0);
}

#[tokio::test]
async fn test_mock_open_failure_is_reported_once() {
    let provider = MockCameraProvider::authorized();
    provider.fail_next_open(CameraError::DeviceUnavailable {
        details: "unplugged".to_string(),
    });

    let first = provider.open_session(low_preset_config()).await;
    assert!(matches!(first, Err(CameraError::DeviceUnavailable { .. })));

    let second = provider.open_session(low_preset_config()).await;
    assert!(second.is_ok());
    assert_eq!(provider.sessions_opened(), 1);
}
