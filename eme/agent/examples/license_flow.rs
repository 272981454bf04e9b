//! Drives the full DRM lifecycle against an in-process fake platform and
//! license server: attach → metadata → negotiation → encrypted signal →
//! challenge POST → license update → detach.
//!
//! Run with:
//!     cargo run -p eme-agent --example license_flow

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use eme_agent::{
    CapabilityConfiguration, DrmConfig, EmeController, EmeEvent, EncryptedEvent,
    EncryptedEventSender, KeySession, KeySystem, KeySystemAccess, KeySystemAccessProvider,
    KeyStatus, LicenseRequest, LicenseResponse, LicenseTransport, MediaElementBinding, MediaKeys,
    PlatformError, SessionEvent, SessionEventSender,
};

/// A fake CDM: echoes the init data back as its key message and accepts any
/// license.
struct FakePlatform;

#[async_trait]
impl KeySystemAccessProvider for FakePlatform {
    async fn request_access(
        &self,
        key_system: KeySystem,
        configurations: &[CapabilityConfiguration],
    ) -> Result<Box<dyn KeySystemAccess>, PlatformError> {
        eprintln!(
            "[platform] access granted for {key_system} ({} configuration(s))",
            configurations.len()
        );
        Ok(Box::new(FakeAccess))
    }
}

struct FakeAccess;

#[async_trait]
impl KeySystemAccess for FakeAccess {
    async fn create_media_keys(&self) -> Result<Box<dyn MediaKeys>, PlatformError> {
        Ok(Box::new(FakeMediaKeys))
    }
}

struct FakeMediaKeys;

#[async_trait]
impl MediaKeys for FakeMediaKeys {
    async fn policy_status(&self, _min_hdcp_version: &str) -> Option<KeyStatus> {
        None
    }

    async fn create_session(
        &self,
        events: SessionEventSender,
    ) -> Result<Box<dyn KeySession>, PlatformError> {
        Ok(Box::new(FakeSession { events }))
    }
}

struct FakeSession {
    events: SessionEventSender,
}

#[async_trait]
impl KeySession for FakeSession {
    async fn generate_request(
        &mut self,
        init_data_type: &str,
        init_data: &[u8],
    ) -> Result<(), PlatformError> {
        eprintln!("[cdm] generate-request ({init_data_type}, {} bytes)", init_data.len());
        // The CDM produces its key message asynchronously.
        let _ = self.events.send(SessionEvent::Message(init_data.to_vec()));
        Ok(())
    }

    async fn update(&mut self, license: &[u8]) -> Result<(), PlatformError> {
        eprintln!("[cdm] license applied ({} bytes)", license.len());
        let _ = self.events.send(SessionEvent::KeyStatusesChange);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PlatformError> {
        eprintln!("[cdm] session closed");
        Ok(())
    }

    fn key_statuses(&self) -> Vec<(Vec<u8>, KeyStatus)> {
        vec![(vec![0xA1; 16], KeyStatus::Usable)]
    }
}

/// In-process "license server".
struct FakeLicenseServer;

#[async_trait]
impl LicenseTransport for FakeLicenseServer {
    async fn post(
        &self,
        request: &LicenseRequest,
    ) -> Result<LicenseResponse, eme_agent::TransportError> {
        eprintln!(
            "[server] POST {} ({} bytes)",
            request.url,
            request.body.len()
        );
        Ok(LicenseResponse {
            status: 200,
            body: b"signed-license-blob".to_vec(),
        })
    }
}

#[derive(Default)]
struct FakeVideoElement {
    encrypted: Arc<Mutex<Option<EncryptedEventSender>>>,
}

#[async_trait]
impl MediaElementBinding for FakeVideoElement {
    fn attach_encrypted_signal(&mut self, events: EncryptedEventSender) {
        *self.encrypted.lock().unwrap() = Some(events);
    }

    fn detach_encrypted_signal(&mut self) {
        *self.encrypted.lock().unwrap() = None;
    }

    async fn set_media_keys(&mut self, keys: Option<&dyn MediaKeys>) -> Result<(), PlatformError> {
        eprintln!(
            "[element] media keys {}",
            if keys.is_some() { "attached" } else { "cleared" }
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let config = DrmConfig {
        widevine_license_url: Some("https://license.example.com/widevine".into()),
        ..Default::default()
    };

    let (mut controller, handle, mut events) = EmeController::new(
        config,
        Some(Arc::new(FakePlatform)),
        Arc::new(FakeLicenseServer),
        None,
    );
    let controller_task = tokio::spawn(async move { controller.run().await });

    // Attach the "video element" and keep a hook to its encrypted signal.
    let element = FakeVideoElement::default();
    let encrypted = element.encrypted.clone();
    handle.attach_media(Box::new(element));

    // The player parsed the stream manifest.
    handle.metadata_parsed(vec!["mp4a.40.2".into()], vec!["avc1.42E01E".into()]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The platform notices encrypted media.
    let sender = encrypted
        .lock()
        .unwrap()
        .clone()
        .expect("encrypted listener installed");
    sender.send(EncryptedEvent {
        init_data_type: "cenc".into(),
        init_data: Some(b"fake-pssh-box".to_vec()),
    })?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Tear down and wait for the completion signal.
    handle.detach_media();
    while let Some(event) = events.recv().await {
        eprintln!("[host] event: {event:?}");
        if matches!(event, EmeEvent::DrmTeardownComplete) {
            break;
        }
    }

    drop(handle);
    controller_task.await?;
    Ok(())
}
