/*!
    End-to-end lifecycle tests against a mock platform EME surface and a
    mock license transport.
*/

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use eme_agent::{
    CapabilityConfiguration, DrmConfig, EmeController, EmeError, EmeEvent, EmeHandle,
    EncryptedEvent, EncryptedEventSender, KeySession, KeySystem, KeySystemAccess,
    KeySystemAccessProvider, KeyStatus, LicenseRequest, LicenseResponse, LicenseTransport,
    MediaElementBinding, MediaKeys, PlatformError, SessionEvent, SessionEventSender,
    TransportError,
};

// ───────────────────────── mock platform ─────────────────────────

#[derive(Default)]
struct PlatformState {
    fail_access: bool,
    fail_generate: bool,
    fail_close: bool,
    /// What `policy_status` reports; None models no policy-query support.
    policy: Option<KeyStatus>,

    access_requests: Mutex<Vec<(KeySystem, Vec<CapabilityConfiguration>)>>,
    generate_requests: Mutex<Vec<(String, Vec<u8>)>>,
    updates: Mutex<Vec<Vec<u8>>>,
    closes: Mutex<u32>,
    key_statuses: Mutex<Vec<(Vec<u8>, KeyStatus)>>,
    session_events: Mutex<Option<SessionEventSender>>,
}

impl PlatformState {
    fn session_created(&self) -> bool {
        self.session_events.lock().unwrap().is_some()
    }

    fn fire_session_event(&self, event: SessionEvent) {
        let sender = self
            .session_events
            .lock()
            .unwrap()
            .clone()
            .expect("no session created yet");
        sender.send(event).unwrap();
    }
}

struct MockProvider(Arc<PlatformState>);

#[async_trait]
impl KeySystemAccessProvider for MockProvider {
    async fn request_access(
        &self,
        key_system: KeySystem,
        configurations: &[CapabilityConfiguration],
    ) -> Result<Box<dyn KeySystemAccess>, PlatformError> {
        self.0
            .access_requests
            .lock()
            .unwrap()
            .push((key_system, configurations.to_vec()));
        if self.0.fail_access {
            return Err(PlatformError("access denied by platform".into()));
        }
        Ok(Box::new(MockAccess(self.0.clone())))
    }
}

struct MockAccess(Arc<PlatformState>);

#[async_trait]
impl KeySystemAccess for MockAccess {
    async fn create_media_keys(&self) -> Result<Box<dyn MediaKeys>, PlatformError> {
        Ok(Box::new(MockMediaKeys(self.0.clone())))
    }
}

struct MockMediaKeys(Arc<PlatformState>);

#[async_trait]
impl MediaKeys for MockMediaKeys {
    async fn policy_status(&self, _min_hdcp_version: &str) -> Option<KeyStatus> {
        self.0.policy
    }

    async fn create_session(
        &self,
        events: SessionEventSender,
    ) -> Result<Box<dyn KeySession>, PlatformError> {
        *self.0.session_events.lock().unwrap() = Some(events);
        Ok(Box::new(MockSession(self.0.clone())))
    }
}

struct MockSession(Arc<PlatformState>);

#[async_trait]
impl KeySession for MockSession {
    async fn generate_request(
        &mut self,
        init_data_type: &str,
        init_data: &[u8],
    ) -> Result<(), PlatformError> {
        if self.0.fail_generate {
            return Err(PlatformError("generateRequest rejected".into()));
        }
        self.0
            .generate_requests
            .lock()
            .unwrap()
            .push((init_data_type.to_owned(), init_data.to_vec()));
        Ok(())
    }

    async fn update(&mut self, license: &[u8]) -> Result<(), PlatformError> {
        self.0.updates.lock().unwrap().push(license.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PlatformError> {
        *self.0.closes.lock().unwrap() += 1;
        if self.0.fail_close {
            return Err(PlatformError("close on uninitialized session".into()));
        }
        Ok(())
    }

    fn key_statuses(&self) -> Vec<(Vec<u8>, KeyStatus)> {
        self.0.key_statuses.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct ElementState {
    encrypted: Mutex<Option<EncryptedEventSender>>,
    /// true = keys attached, false = keys cleared.
    set_keys_calls: Mutex<Vec<bool>>,
}

impl ElementState {
    fn fire_encrypted(&self, init_data: Option<&[u8]>) {
        let sender = self
            .encrypted
            .lock()
            .unwrap()
            .clone()
            .expect("encrypted listener not installed");
        sender
            .send(EncryptedEvent {
                init_data_type: "cenc".into(),
                init_data: init_data.map(|d| d.to_vec()),
            })
            .unwrap();
    }

    fn listener_installed(&self) -> bool {
        self.encrypted.lock().unwrap().is_some()
    }
}

struct MockElement(Arc<ElementState>);

#[async_trait]
impl MediaElementBinding for MockElement {
    fn attach_encrypted_signal(&mut self, events: EncryptedEventSender) {
        *self.0.encrypted.lock().unwrap() = Some(events);
    }

    fn detach_encrypted_signal(&mut self) {
        *self.0.encrypted.lock().unwrap() = None;
    }

    async fn set_media_keys(
        &mut self,
        keys: Option<&dyn MediaKeys>,
    ) -> Result<(), PlatformError> {
        self.0.set_keys_calls.lock().unwrap().push(keys.is_some());
        Ok(())
    }
}

// ───────────────────────── mock transports ─────────────────────────

/// Answers every POST with a scripted status (default 200) and a fixed body.
struct MockTransport {
    statuses: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<LicenseRequest>>,
}

impl MockTransport {
    fn ok() -> Arc<Self> {
        Self::with_statuses([])
    }

    fn with_statuses(statuses: impl IntoIterator<Item = u16>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LicenseTransport for MockTransport {
    async fn post(&self, request: &LicenseRequest) -> Result<LicenseResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(LicenseResponse {
            status,
            body: b"the-license".to_vec(),
        })
    }
}

/// Parks every POST until the gate opens, then answers 200.
struct GatedTransport {
    gate: Notify,
    requests: Mutex<Vec<LicenseRequest>>,
}

impl GatedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LicenseTransport for GatedTransport {
    async fn post(&self, request: &LicenseRequest) -> Result<LicenseResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.gate.notified().await;
        Ok(LicenseResponse {
            status: 200,
            body: b"late-license".to_vec(),
        })
    }
}

// ───────────────────────── harness ─────────────────────────

struct Harness {
    handle: EmeHandle,
    events: mpsc::UnboundedReceiver<EmeEvent>,
    platform: Arc<PlatformState>,
    element: Arc<ElementState>,
}

fn widevine_config() -> DrmConfig {
    DrmConfig {
        widevine_license_url: Some("https://wv.example/license".into()),
        ..Default::default()
    }
}

fn start(
    config: DrmConfig,
    platform: Arc<PlatformState>,
    transport: Arc<dyn LicenseTransport>,
) -> Harness {
    let provider: Arc<dyn KeySystemAccessProvider> = Arc::new(MockProvider(platform.clone()));
    let (mut controller, handle, events) =
        EmeController::new(config, Some(provider), transport, None);
    tokio::spawn(async move { controller.run().await });
    Harness {
        handle,
        events,
        platform,
        element: Arc::new(ElementState::default()),
    }
}

impl Harness {
    fn attach(&self) {
        self.handle
            .attach_media(Box::new(MockElement(self.element.clone())));
    }

    /// Attach, parse metadata and wait for the key session to exist.
    async fn negotiate(&self, audio: &[&str], video: &[&str]) {
        self.attach();
        self.handle.metadata_parsed(
            audio.iter().map(|s| s.to_string()).collect(),
            video.iter().map(|s| s.to_string()).collect(),
        );
        let platform = self.platform.clone();
        eventually(move || platform.session_created(), "key session creation").await;
    }

    async fn next_event(&mut self) -> EmeEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn expect_error(&mut self) -> (EmeError, bool) {
        match self.next_event().await {
            EmeEvent::KeySystemError { error, fatal } => (error, fatal),
            other => panic!("expected KeySystemError, got {other:?}"),
        }
    }

    async fn expect_no_event(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            matches!(self.events.try_recv(), Err(mpsc::error::TryRecvError::Empty)),
            "expected no event"
        );
    }
}

async fn eventually(condition: impl Fn() -> bool, what: &str) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ───────────────────────── tests ─────────────────────────

#[tokio::test]
async fn end_to_end_widevine_license_flow() {
    let platform = Arc::new(PlatformState::default());
    let transport = MockTransport::ok();
    let mut harness = start(widevine_config(), platform.clone(), transport.clone());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;

    // Negotiation offered one configuration with one entry per codec.
    {
        let access_requests = platform.access_requests.lock().unwrap();
        assert_eq!(access_requests.len(), 1);
        let (key_system, configs) = &access_requests[0];
        assert_eq!(*key_system, KeySystem::Widevine);
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].audio_capabilities.len(), 1);
        assert_eq!(
            configs[0].audio_capabilities[0].content_type,
            "audio/mp4; codecs=\"mp4a.40.2\""
        );
        assert_eq!(configs[0].video_capabilities.len(), 1);
        assert_eq!(
            configs[0].video_capabilities[0].content_type,
            "video/mp4; codecs=\"avc1.42E01E\""
        );
    }

    // Encrypted signal → media keys attached once, one generate-request.
    harness.element.fire_encrypted(Some(b"pssh-box"));
    let p = platform.clone();
    eventually(
        move || p.generate_requests.lock().unwrap().len() == 1,
        "generate request",
    )
    .await;
    assert_eq!(
        *harness.element.set_keys_calls.lock().unwrap(),
        vec![true]
    );
    {
        let generate_requests = platform.generate_requests.lock().unwrap();
        assert_eq!(generate_requests[0], ("cenc".to_string(), b"pssh-box".to_vec()));
    }

    // CDM message → exactly one POST whose body is the raw key message.
    platform.fire_session_event(SessionEvent::Message(b"widevine-key-message".to_vec()));
    let t = transport.clone();
    eventually(move || t.request_count() == 1, "license POST").await;
    {
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://wv.example/license");
        assert_eq!(requests[0].body, b"widevine-key-message");
    }

    // License response fed back into the session.
    let p = platform.clone();
    eventually(
        move || p.updates.lock().unwrap().len() == 1,
        "session update",
    )
    .await;
    assert_eq!(platform.updates.lock().unwrap()[0], b"the-license");

    harness.expect_no_event().await;
}

#[tokio::test]
async fn playready_url_selects_playready_with_cenc_init_data() {
    let config = DrmConfig {
        widevine_license_url: Some("https://wv.example/license".into()),
        playready_license_url: Some("https://pr.example/license".into()),
        ..Default::default()
    };
    let platform = Arc::new(PlatformState::default());
    let harness = start(config, platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;

    let access_requests = platform.access_requests.lock().unwrap();
    let (key_system, configs) = &access_requests[0];
    assert_eq!(*key_system, KeySystem::PlayReady);
    assert_eq!(configs[0].init_data_types, vec!["cenc".to_string()]);
}

#[tokio::test]
async fn encrypted_before_negotiation_is_fatal() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(widevine_config(), platform, MockTransport::ok());

    harness.attach();
    let element = harness.element.clone();
    eventually(move || element.listener_installed(), "encrypted listener").await;
    harness.element.fire_encrypted(Some(b"pssh-box"));

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::NoKeys));
    assert!(fatal);
}

#[tokio::test]
async fn encrypted_after_failed_negotiation_converges_to_no_access() {
    let platform = Arc::new(PlatformState {
        fail_access: true,
        ..Default::default()
    });
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    harness.attach();
    harness
        .handle
        .metadata_parsed(vec!["mp4a.40.2".into()], vec!["avc1.42E01E".into()]);
    // Wait until negotiation has reached the platform before firing the
    // encrypted signal, so it lands during or after the rejected attempt.
    let p = platform.clone();
    eventually(
        move || p.access_requests.lock().unwrap().len() == 1,
        "access request",
    )
    .await;
    harness.element.fire_encrypted(Some(b"pssh-box"));

    // Readiness resolves (here: with a rejection), then the encrypted
    // continuation runs against the missing record.
    let (first, fatal) = harness.expect_error().await;
    assert!(matches!(first, EmeError::KeySystemNoAccess(_)));
    assert!(fatal);
    let (second, fatal) = harness.expect_error().await;
    assert!(matches!(second, EmeError::NoAccess));
    assert!(fatal);
}

#[tokio::test]
async fn generate_request_happens_at_most_once() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(Some(b"pssh-box"));
    let p = platform.clone();
    eventually(
        move || p.generate_requests.lock().unwrap().len() == 1,
        "generate request",
    )
    .await;

    // A second encrypted signal is a warning-level no-op.
    harness.element.fire_encrypted(Some(b"pssh-box"));
    harness.expect_no_event().await;
    assert_eq!(platform.generate_requests.lock().unwrap().len(), 1);
    // Media keys were attached exactly once as well.
    assert_eq!(*harness.element.set_keys_calls.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn null_init_data_is_fatal() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(None);

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::NoInitData));
    assert!(fatal);
    assert!(platform.generate_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn generate_request_failure_is_the_only_non_fatal_error() {
    let platform = Arc::new(PlatformState {
        fail_generate: true,
        ..Default::default()
    });
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(Some(b"pssh-box"));

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::GenerateRequestFailed(_)));
    assert!(!fatal);
}

#[tokio::test]
async fn missing_license_url_is_fatal() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(DrmConfig::default(), platform.clone(), MockTransport::ok());

    harness.attach();
    harness
        .handle
        .metadata_parsed(vec!["mp4a.40.2".into()], vec!["avc1.42E01E".into()]);

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::LicenseSystemError(_)));
    assert!(fatal);
    // Negotiation never reached the platform.
    assert!(platform.access_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_access_provider_is_fatal() {
    let transport: Arc<dyn LicenseTransport> = MockTransport::ok();
    let (mut controller, handle, mut events) =
        EmeController::new(widevine_config(), None, transport, None);
    tokio::spawn(async move { controller.run().await });

    let element = Arc::new(ElementState::default());
    handle.attach_media(Box::new(MockElement(element)));
    handle.metadata_parsed(vec!["mp4a.40.2".into()], vec!["avc1.42E01E".into()]);

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match event {
        EmeEvent::KeySystemError { error, fatal } => {
            assert!(matches!(error, EmeError::LicenseSystemError(_)));
            assert!(fatal);
        }
        other => panic!("expected KeySystemError, got {other:?}"),
    }
}

#[tokio::test]
async fn hdcp_policy_below_minimum_discards_cdm() {
    let platform = Arc::new(PlatformState {
        policy: Some(KeyStatus::OutputRestricted),
        ..Default::default()
    });
    let config = DrmConfig {
        widevine_license_url: Some("https://wv.example/license".into()),
        min_output_protection_version: Some("2.2".into()),
        ..Default::default()
    };
    let mut harness = start(config, platform.clone(), MockTransport::ok());

    harness.attach();
    harness
        .handle
        .metadata_parsed(vec!["mp4a.40.2".into()], vec!["avc1.42E01E".into()]);

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::InvalidHdcpVersion(_)));
    assert!(fatal);
    // No session was created for the discarded CDM.
    assert!(!platform.session_created());
}

#[tokio::test]
async fn missing_policy_support_proceeds() {
    let platform = Arc::new(PlatformState {
        policy: None,
        ..Default::default()
    });
    let config = DrmConfig {
        widevine_license_url: Some("https://wv.example/license".into()),
        min_output_protection_version: Some("1.4".into()),
        ..Default::default()
    };
    let mut harness = start(config, platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.expect_no_event().await;
}

#[tokio::test]
async fn license_retry_exhaustion_is_fatal() {
    let platform = Arc::new(PlatformState::default());
    let transport = MockTransport::with_statuses([500, 500, 500, 500]);
    let mut harness = start(widevine_config(), platform.clone(), transport.clone());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(Some(b"pssh-box"));
    let p = platform.clone();
    eventually(
        move || p.generate_requests.lock().unwrap().len() == 1,
        "generate request",
    )
    .await;
    platform.fire_session_event(SessionEvent::Message(b"km".to_vec()));

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(error, EmeError::LicenseRequestFailed { attempts: 4 }));
    assert!(fatal);
    assert_eq!(transport.request_count(), 4);
    assert!(platform.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn output_restricted_key_status_is_fatal() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;

    // A usable-only collection raises nothing.
    *platform.key_statuses.lock().unwrap() = vec![(vec![1; 16], KeyStatus::Usable)];
    platform.fire_session_event(SessionEvent::KeyStatusesChange);
    harness.expect_no_event().await;

    *platform.key_statuses.lock().unwrap() = vec![
        (vec![1; 16], KeyStatus::Usable),
        (vec![2; 16], KeyStatus::OutputRestricted),
    ];
    platform.fire_session_event(SessionEvent::KeyStatusesChange);

    let (error, fatal) = harness.expect_error().await;
    assert!(matches!(
        error,
        EmeError::LicenseInvalidStatus(KeyStatus::OutputRestricted)
    ));
    assert!(fatal);
}

#[tokio::test]
async fn detach_is_idempotent_with_a_single_teardown_signal() {
    let platform = Arc::new(PlatformState::default());
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    // Detaching with nothing attached does nothing.
    harness.handle.detach_media();
    harness.expect_no_event().await;

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(Some(b"pssh-box"));
    let p = platform.clone();
    eventually(
        move || p.generate_requests.lock().unwrap().len() == 1,
        "generate request",
    )
    .await;

    harness.handle.detach_media();
    assert!(matches!(
        harness.next_event().await,
        EmeEvent::DrmTeardownComplete
    ));
    assert_eq!(*platform.closes.lock().unwrap(), 1);
    assert!(!harness.element.listener_installed());
    // Media keys were cleared from the element.
    assert_eq!(
        *harness.element.set_keys_calls.lock().unwrap(),
        vec![true, false]
    );

    // A second detach raises neither an error nor another signal.
    harness.handle.detach_media();
    harness.expect_no_event().await;
}

#[tokio::test]
async fn session_close_failure_during_teardown_is_swallowed() {
    let platform = Arc::new(PlatformState {
        fail_close: true,
        ..Default::default()
    });
    let mut harness = start(widevine_config(), platform.clone(), MockTransport::ok());

    // Session exists but never generated a request; closing it fails.
    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.handle.detach_media();

    assert!(matches!(
        harness.next_event().await,
        EmeEvent::DrmTeardownComplete
    ));
    harness.expect_no_event().await;
}

#[tokio::test]
async fn license_completing_after_detach_is_benign() {
    let platform = Arc::new(PlatformState::default());
    let transport = GatedTransport::new();
    let mut harness = start(widevine_config(), platform.clone(), transport.clone());

    harness.negotiate(&["mp4a.40.2"], &["avc1.42E01E"]).await;
    harness.element.fire_encrypted(Some(b"pssh-box"));
    let p = platform.clone();
    eventually(
        move || p.generate_requests.lock().unwrap().len() == 1,
        "generate request",
    )
    .await;
    platform.fire_session_event(SessionEvent::Message(b"km".to_vec()));
    let t = transport.clone();
    eventually(
        move || t.requests.lock().unwrap().len() == 1,
        "license POST in flight",
    )
    .await;

    // Detach while the POST is parked, then let it complete.
    harness.handle.detach_media();
    assert!(matches!(
        harness.next_event().await,
        EmeEvent::DrmTeardownComplete
    ));
    transport.gate.notify_one();

    // The late license is dropped without error or session update.
    harness.expect_no_event().await;
    assert!(platform.updates.lock().unwrap().is_empty());
}
