use super::*;
use crate::camera::{AuthorizationState, MockCameraProvider};
use crate::config::KioskcamConfig;
use crate::coordinator::{DetectionCoordinator, DetectionObserver, LoggingIdleController};
use crate::events::DetectionEvent;
use crate::frame::{FrameData, FrameFormat};
use crate::settings::SettingsSnapshot;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn create_test_config() -> KioskcamConfig {
    KioskcamConfig {
        detection: SettingsSnapshot {
            motion_enabled: true,
            wake_on_motion: true,
            ..SettingsSnapshot::default()
        },
        ..KioskcamConfig::default()
    }
}

fn spawn_service(
    camera: &MockCameraProvider,
) -> (DetectionHandle, tokio::task::JoinHandle<()>, CancellationToken) {
    let coordinator = DetectionCoordinator::builder(create_test_config())
        .camera(Arc::new(camera.clone()))
        .build()
        .unwrap();
    let token = CancellationToken::new();
    let (handle, task) = DetectionService::spawn(coordinator, 8, token.clone()).unwrap();
    (handle, task, token)
}

fn gray_frame(id: u64, value: u8) -> FrameData {
    FrameData::filled_gray(id, 10, 10, value)
}

#[tokio::test]
async fn test_handle_drives_lifecycle() {
    let camera = MockCameraProvider::authorized();
    let (handle, _task, _token) = spawn_service(&camera);

    assert!(!handle.status().is_active);

    handle.start().await.unwrap();
    assert!(handle.status().is_active);
    assert_eq!(camera.open_sessions(), 1);

    handle.enable_privacy_mode().await.unwrap();
    assert!(!handle.status().is_active);
    assert_eq!(camera.open_sessions(), 0);

    handle.disable_privacy_mode().await.unwrap();
    handle.restart().await.unwrap();
    handle.update_sensitivity().await.unwrap();
    assert!(handle.status().is_active);
    assert_eq!(camera.open_sessions(), 1);

    handle.stop().await.unwrap();
    assert!(!handle.status().is_active);
}

#[tokio::test]
async fn test_frames_reach_coordinator_through_service() {
    let camera = MockCameraProvider::authorized();
    let (handle, _task, _token) = spawn_service(&camera);
    let mut status = handle.subscribe_status();
    let mut events = handle.events();

    handle.start().await.unwrap();
    camera.push_frame(gray_frame(0, 0));
    camera.push_frame(gray_frame(1, 200));

    let detected = timeout(Duration::from_secs(2), async {
        loop {
            if status.borrow_and_update().motion_detected {
                return true;
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    })
    .await
    .unwrap();
    assert!(detected);

    let mut saw_wake = false;
    while let Ok(event) = events.try_recv() {
        if let DetectionEvent::WakeRequested { source, .. } = event {
            assert_eq!(source, "camera_motion");
            saw_wake = true;
        }
    }
    assert!(saw_wake);
}

#[tokio::test]
async fn test_request_authorization_through_handle() {
    let camera = MockCameraProvider::new(AuthorizationState::NotDetermined);
    camera.set_grant_on_request(false);
    let (handle, _task, _token) = spawn_service(&camera);

    assert!(!handle.request_authorization().await.unwrap());
    assert_eq!(handle.status().authorization_status, AuthorizationState::Denied);
    assert_eq!(camera.access_requests(), 1);
}

#[tokio::test]
async fn test_sensor_reports_through_handle() {
    let camera = MockCameraProvider::authorized();
    let (handle, _task, _token) = spawn_service(&camera);
    handle.start().await.unwrap();

    let reports = handle.sensor_reports().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, "off");
}

#[tokio::test]
async fn test_cancellation_stops_engines() {
    let camera = MockCameraProvider::authorized();
    let (handle, task, token) = spawn_service(&camera);
    handle.start().await.unwrap();
    assert_eq!(camera.open_sessions(), 1);

    token.cancel();
    timeout(Duration::from_secs(2), task).await.unwrap().unwrap();

    assert_eq!(camera.open_sessions(), 0);
    assert!(!handle.status().is_active);
    assert!(handle.start().await.is_err());
}

#[tokio::test]
async fn test_spawn_requires_inbox() {
    let mut coordinator = DetectionCoordinator::builder(create_test_config())
        .camera(Arc::new(MockCameraProvider::authorized()))
        .build()
        .unwrap();
    let _inbox = coordinator.take_inbox();

    let result = DetectionService::spawn(coordinator, 8, CancellationToken::new());
    assert!(result.is_err());
}

#[derive(Default)]
struct CountingObserver {
    motion: AtomicUsize,
}

impl DetectionObserver for CountingObserver {
    fn on_motion_detected(&self) {
        self.motion.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_orchestrator_lifecycle() {
    let camera = MockCameraProvider::authorized();
    let mut orchestrator = KioskcamOrchestrator::new(
        create_test_config(),
        Arc::new(camera.clone()),
        Arc::new(LoggingIdleController),
    )
    .unwrap();

    let observer = Arc::new(CountingObserver::default());
    assert!(orchestrator.add_observer(observer.clone()));
    assert!(orchestrator.handle().is_none());

    orchestrator.start().await.unwrap();
    assert_eq!(
        orchestrator.component_state("detection_service"),
        Some(ComponentState::Running)
    );
    assert!(orchestrator.start().await.is_err());
    assert!(!orchestrator.add_observer(observer.clone()));

    let handle = orchestrator.handle().unwrap();
    assert!(handle.status().is_active);

    camera.push_frame(FrameData::new(
        0,
        SystemTime::now(),
        vec![0; 100],
        10,
        10,
        FrameFormat::Gray8,
    ));
    camera.push_frame(gray_frame(1, 255));
    let mut status = handle.subscribe_status();
    timeout(Duration::from_secs(2), status.wait_for(|s| s.motion_detected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(observer.motion.load(Ordering::SeqCst), 1);

    assert!(orchestrator.request_shutdown(ShutdownReason::UserRequest));
    assert!(!orchestrator.request_shutdown(ShutdownReason::UserRequest));

    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(camera.open_sessions(), 0);
    assert_eq!(
        orchestrator.component_state("detection_service"),
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_settings_changes_apply_on_restart() {
    let camera = MockCameraProvider::authorized();
    let mut orchestrator = KioskcamOrchestrator::new(
        create_test_config(),
        Arc::new(camera.clone()),
        Arc::new(LoggingIdleController),
    )
    .unwrap();
    orchestrator.start().await.unwrap();

    orchestrator
        .settings()
        .update(|s| s.presence_enabled = true);
    let handle = orchestrator.handle().unwrap();
    handle.restart().await.unwrap();

    assert_eq!(camera.open_sessions(), 2);
    orchestrator.shutdown().await.unwrap();
}
