/*!
    The lifecycle coordinator: one actor loop owning the whole DRM
    subsystem.

    The loop selects over host commands, the media element's `encrypted`
    signal, session events, and the outcomes of spawned negotiation and
    license-exchange tasks. Long-running platform and transport work is
    spawned and reports back through channels, so the single mutable access
    record is only ever touched from this loop.
*/

use std::sync::Arc;

use tokio::sync::mpsc;

use eme_core::DrmConfig;

use crate::access::{CdmAccessRecord, negotiate_access};
use crate::error::EmeError;
use crate::events::EmeEvent;
use crate::license::LicenseExchanger;
use crate::platform::{
    EncryptedEvent, KeySystemAccessProvider, MediaElementBinding, SessionEvent,
    SessionEventSender,
};
use crate::status::check_key_statuses;
use crate::transport::{LicenseTransport, TransportSetupHook};

/**
    Lifecycle of the subsystem. `Ready` means negotiation has resolved,
    successfully or not; whether a usable CDM exists is the access record's
    business.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Detached,
    Attached,
    Negotiating,
    Ready,
    Detaching,
}

/**
    Commands the host sends the controller.
*/
enum ControllerCommand {
    AttachMedia(Box<dyn MediaElementBinding>),
    DetachMedia,
    MetadataParsed {
        audio_codecs: Vec<String>,
        video_codecs: Vec<String>,
    },
}

/**
    Cloneable handle the host drives the controller through. Dropping every
    handle tears the subsystem down and stops the loop.
*/
#[derive(Clone)]
pub struct EmeHandle {
    commands: mpsc::UnboundedSender<ControllerCommand>,
}

impl EmeHandle {
    /// Bind a media element; installs the `encrypted` signal listener.
    pub fn attach_media(&self, element: Box<dyn MediaElementBinding>) {
        let _ = self.commands.send(ControllerCommand::AttachMedia(element));
    }

    /// Unbind and tear the DRM subsystem down.
    pub fn detach_media(&self) {
        let _ = self.commands.send(ControllerCommand::DetachMedia);
    }

    /**
        Report stream metadata; triggers key-system negotiation. The CDM is
        always requested proactively here, never reactively from the
        `encrypted` signal.
    */
    pub fn metadata_parsed(&self, audio_codecs: Vec<String>, video_codecs: Vec<String>) {
        let _ = self.commands.send(ControllerCommand::MetadataParsed {
            audio_codecs,
            video_codecs,
        });
    }
}

enum NegotiationOutcome {
    Ready(CdmAccessRecord),
    Failed(EmeError),
}

enum LicenseOutcome {
    License(Vec<u8>),
    Failed(EmeError),
}

/**
    The DRM subsystem actor.
*/
pub struct EmeController {
    config: DrmConfig,
    access_provider: Option<Arc<dyn KeySystemAccessProvider>>,
    exchanger: Arc<LicenseExchanger>,

    state: LifecycleState,
    media: Option<Box<dyn MediaElementBinding>>,
    /// The single tracked access record; at most one key system at a time.
    record: Option<CdmAccessRecord>,
    /// Latches true once media keys are attached; reset only by detach.
    has_set_media_keys: bool,
    /// Encrypted event that arrived while negotiation was still in flight.
    pending_encrypted: Option<EncryptedEvent>,

    commands: mpsc::UnboundedReceiver<ControllerCommand>,
    encrypted_tx: mpsc::UnboundedSender<EncryptedEvent>,
    encrypted_rx: mpsc::UnboundedReceiver<EncryptedEvent>,
    session_tx: SessionEventSender,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    negotiation_tx: mpsc::UnboundedSender<NegotiationOutcome>,
    negotiation_rx: mpsc::UnboundedReceiver<NegotiationOutcome>,
    license_tx: mpsc::UnboundedSender<LicenseOutcome>,
    license_rx: mpsc::UnboundedReceiver<LicenseOutcome>,
    events_tx: mpsc::UnboundedSender<EmeEvent>,
}

impl EmeController {
    /**
        Build a controller. `access_provider` is the platform's key-system
        access query; passing None makes every negotiation fail with a fatal
        configuration error. Returns the controller, the host handle, and
        the outbound event stream.
    */
    pub fn new(
        config: DrmConfig,
        access_provider: Option<Arc<dyn KeySystemAccessProvider>>,
        transport: Arc<dyn LicenseTransport>,
        setup_hook: Option<TransportSetupHook>,
    ) -> (Self, EmeHandle, mpsc::UnboundedReceiver<EmeEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (encrypted_tx, encrypted_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let (negotiation_tx, negotiation_rx) = mpsc::unbounded_channel();
        let (license_tx, license_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let exchanger = Arc::new(LicenseExchanger::new(
            config.clone(),
            transport,
            setup_hook,
        ));

        let controller = Self {
            config,
            access_provider,
            exchanger,
            state: LifecycleState::Detached,
            media: None,
            record: None,
            has_set_media_keys: false,
            pending_encrypted: None,
            commands: command_rx,
            encrypted_tx,
            encrypted_rx,
            session_tx,
            session_rx,
            negotiation_tx,
            negotiation_rx,
            license_tx,
            license_rx,
            events_tx,
        };
        let handle = EmeHandle {
            commands: command_tx,
        };
        (controller, handle, events_rx)
    }

    /**
        Run the actor loop until every [`EmeHandle`] is dropped. Teardown
        runs on exit as well, so a dropped host still releases the CDM.
    */
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = self.encrypted_rx.recv() => {
                    self.on_media_encrypted(event).await;
                }
                Some(outcome) = self.negotiation_rx.recv() => {
                    self.on_negotiation_outcome(outcome).await;
                }
                Some(event) = self.session_rx.recv() => {
                    self.on_session_event(event).await;
                }
                Some(outcome) = self.license_rx.recv() => {
                    self.on_license_outcome(outcome).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::AttachMedia(mut element) => {
                if self.media.is_some() {
                    tracing::warn!("media already attached, ignoring attach");
                    return;
                }
                element.attach_encrypted_signal(self.encrypted_tx.clone());
                self.media = Some(element);
                self.state = LifecycleState::Attached;
                tracing::debug!("media attached, encrypted listener installed");
            }
            ControllerCommand::DetachMedia => self.teardown().await,
            ControllerCommand::MetadataParsed {
                audio_codecs,
                video_codecs,
            } => self.on_metadata_parsed(audio_codecs, video_codecs),
        }
    }

    fn on_metadata_parsed(&mut self, audio_codecs: Vec<String>, video_codecs: Vec<String>) {
        match self.state {
            LifecycleState::Detached | LifecycleState::Detaching => {
                tracing::warn!("metadata parsed with no media attached, ignoring");
                return;
            }
            LifecycleState::Negotiating | LifecycleState::Ready => {
                // Negotiation runs at most once per attached lifetime.
                tracing::debug!("key-system negotiation already started, ignoring");
                return;
            }
            LifecycleState::Attached => {}
        }

        let Some(key_system) = self.config.preferred_key_system() else {
            self.emit_error(EmeError::LicenseSystemError(
                "no known license server url configured".into(),
            ));
            return;
        };
        let Some(provider) = self.access_provider.as_ref() else {
            self.emit_error(EmeError::LicenseSystemError(
                "no key-system access query function configured".into(),
            ));
            return;
        };

        tracing::info!(key_system = %key_system, "starting key-system negotiation");
        self.state = LifecycleState::Negotiating;

        let provider = Arc::clone(provider);
        let config = self.config.clone();
        let outcome_tx = self.negotiation_tx.clone();
        tokio::spawn(async move {
            let outcome = match negotiate_access(
                provider.as_ref(),
                &config,
                key_system,
                &audio_codecs,
                &video_codecs,
            )
            .await
            {
                Ok(record) => NegotiationOutcome::Ready(record),
                Err(error) => NegotiationOutcome::Failed(error),
            };
            let _ = outcome_tx.send(outcome);
        });
    }

    async fn on_negotiation_outcome(&mut self, outcome: NegotiationOutcome) {
        if self.media.is_none() {
            // Detached while the negotiation task was in flight.
            tracing::debug!("negotiation resolved after detach, dropping outcome");
            return;
        }

        match outcome {
            NegotiationOutcome::Ready(mut record) => {
                // Session manager: exactly one session per record.
                match record.media_keys.create_session(self.session_tx.clone()).await {
                    Ok(session) => {
                        record.session = Some(session);
                        tracing::debug!(key_system = %record.key_system, "key session created");
                    }
                    Err(e) => {
                        self.emit_error(EmeError::LicenseSystemError(format!(
                            "failed to create key session: {e}"
                        )));
                    }
                }
                self.record = Some(record);
            }
            NegotiationOutcome::Failed(error) => self.emit_error(error),
        }
        self.state = LifecycleState::Ready;

        // Success and failure converge on the same continuation for any
        // encrypted signal that arrived mid-negotiation.
        if let Some(event) = self.pending_encrypted.take() {
            self.process_encrypted(event).await;
        }
    }

    async fn on_media_encrypted(&mut self, event: EncryptedEvent) {
        match self.state {
            LifecycleState::Negotiating => {
                // Park it; the negotiation outcome runs the continuation.
                if self.pending_encrypted.is_none() {
                    self.pending_encrypted = Some(event);
                } else {
                    tracing::debug!("encrypted event already pending, ignoring another");
                }
            }
            LifecycleState::Ready => self.process_encrypted(event).await,
            LifecycleState::Detached | LifecycleState::Attached | LifecycleState::Detaching => {
                // The CDM must be requested at metadata time, never reactively.
                self.emit_error(EmeError::NoKeys);
            }
        }
    }

    /**
        The post-negotiation continuation of the `encrypted` signal: attach
        media keys once, then make the session's single generate-request.
    */
    async fn process_encrypted(&mut self, event: EncryptedEvent) {
        let Some(record) = self.record.as_mut() else {
            self.emit_error(EmeError::NoAccess);
            return;
        };
        let Some(media) = self.media.as_mut() else {
            self.emit_error(EmeError::NoAccess);
            return;
        };

        if !self.has_set_media_keys {
            match media.set_media_keys(Some(record.media_keys.as_ref())).await {
                Ok(()) => {
                    self.has_set_media_keys = true;
                    tracing::debug!("media keys attached to element");
                }
                Err(e) => {
                    self.emit_error(EmeError::LicenseSystemError(format!(
                        "failed to attach media keys: {e}"
                    )));
                    return;
                }
            }
        }

        let Some(init_data) = event.init_data else {
            self.emit_error(EmeError::NoInitData);
            return;
        };
        let Some(session) = record.session.as_mut() else {
            self.emit_error(EmeError::NoSession);
            return;
        };
        if record.session_initialized {
            tracing::warn!("key session already initialized, ignoring encrypted event");
            return;
        }

        match session
            .generate_request(&event.init_data_type, &init_data)
            .await
        {
            Ok(()) => {
                record.session_initialized = true;
                tracing::info!(
                    init_data_type = %event.init_data_type,
                    "license request generation started"
                );
            }
            // The one non-fatal condition: playback may continue without
            // this session's keys.
            Err(e) => self.emit_error(EmeError::GenerateRequestFailed(e.to_string())),
        }
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(key_message) => {
                let Some(record) = self.record.as_ref() else {
                    tracing::debug!("session message after teardown, ignoring");
                    return;
                };
                let key_system = record.key_system;
                let exchanger = Arc::clone(&self.exchanger);
                let outcome_tx = self.license_tx.clone();
                tokio::spawn(async move {
                    let outcome = match exchanger.request_license(key_system, &key_message).await
                    {
                        Ok(license) => LicenseOutcome::License(license),
                        Err(error) => LicenseOutcome::Failed(error),
                    };
                    let _ = outcome_tx.send(outcome);
                });
            }
            SessionEvent::KeyStatusesChange => {
                let Some(session) = self.record.as_ref().and_then(|r| r.session.as_ref()) else {
                    tracing::debug!("key-status change after teardown, ignoring");
                    return;
                };
                if let Err(error) = check_key_statuses(&session.key_statuses()) {
                    self.emit_error(error);
                }
            }
        }
    }

    async fn on_license_outcome(&mut self, outcome: LicenseOutcome) {
        match outcome {
            LicenseOutcome::License(license) => {
                // A request in flight during detach is not cancelled; its
                // late completion lands here with no session left and is a
                // deliberate no-op.
                let Some(session) = self.record.as_mut().and_then(|r| r.session.as_mut()) else {
                    tracing::debug!("license arrived after teardown, ignoring");
                    return;
                };
                match session.update(&license).await {
                    Ok(()) => tracing::info!(bytes = license.len(), "license applied"),
                    Err(e) => {
                        self.emit_error(EmeError::LicenseUpdateFailed(e.to_string()));
                    }
                }
            }
            LicenseOutcome::Failed(error) => self.emit_error(error),
        }
    }

    /**
        Tear the subsystem down. Cleanup failures are swallowed; the
        completion signal is always emitted, exactly once per attached
        lifetime. Detaching with nothing attached is a no-op.
    */
    async fn teardown(&mut self) {
        if self.media.is_none() {
            tracing::debug!("detach with no media bound, nothing to do");
            return;
        }
        self.state = LifecycleState::Detaching;

        if let Some(media) = self.media.as_mut() {
            media.detach_encrypted_signal();
        }

        if let Some(mut record) = self.record.take() {
            if let Some(mut session) = record.session.take() {
                // Closing a session that never generated a request is an
                // expected benign failure.
                if let Err(e) = session.close().await {
                    tracing::debug!(error = %e, "key session close failed during teardown");
                }
            }
        }

        if let Some(mut media) = self.media.take() {
            if let Err(e) = media.set_media_keys(None).await {
                tracing::debug!(error = %e, "clearing media keys failed during teardown");
            }
        }

        self.has_set_media_keys = false;
        self.pending_encrypted = None;
        self.state = LifecycleState::Detached;

        let _ = self.events_tx.send(EmeEvent::DrmTeardownComplete);
        tracing::info!("drm teardown complete");
    }

    fn emit_error(&self, error: EmeError) {
        let fatal = error.fatal();
        if fatal {
            tracing::error!(%error, "key system error");
        } else {
            tracing::warn!(%error, "key system error (non-fatal)");
        }
        let _ = self
            .events_tx
            .send(EmeEvent::KeySystemError { error, fatal });
    }
}
