use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use crate::client::{ImageKind, ImageTransport, UploadRequest};
use crate::config::SlotConfig;
use crate::optimize;
use crate::progress::{ProgressCallback, UploadProgress};
use super::errors::{Result, UploadError};
use super::types::{
    ImagePayload, ImageSource, RemoteDescriptor, SelectionCallback, SelectionChange, SlotEvent,
    SlotId, UploadState,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct SlotInner {
    state: UploadState,
    payload: Option<ImagePayload>,
    preview: Option<String>,
    remote: Option<RemoteDescriptor>,
    error: Option<String>,
    /// Bumped on every selection and removal. A task holding a stale
    /// generation must not touch the slot; this is what makes
    /// abort-and-restart safe even when the abort races completion.
    generation: u64,
    inflight: Option<JoinHandle<()>>,
}

/// Owner of one image-selection lifecycle.
///
/// A slot is a cloneable handle over shared state, but semantically it has
/// a single writer: the form field that created it. The lifecycle is
/// `Idle → Selected → (Optimizing →) Uploading → (Complete | Failed)`;
/// selecting a new file restarts it from any point, aborting whatever
/// transfer was in flight.
#[derive(Clone)]
pub struct ImageSlot {
    id: SlotId,
    config: SlotConfig,
    transport: Arc<dyn ImageTransport>,
    inner: Arc<Mutex<SlotInner>>,
    events: broadcast::Sender<SlotEvent>,
    on_change: Option<SelectionCallback>,
}

impl ImageSlot {
    pub fn new(config: SlotConfig, transport: Arc<dyn ImageTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            id: SlotId::new(),
            config,
            transport,
            inner: Arc::new(Mutex::new(SlotInner {
                state: UploadState::Idle,
                payload: None,
                preview: None,
                remote: None,
                error: None,
                generation: 0,
                inflight: None,
            })),
            events,
            on_change: None,
        }
    }

    /// Register the owning form's callback, invoked whenever the committed
    /// value changes: after a non-auto-upload selection, after a completed
    /// upload, and with an all-`None` change on removal.
    pub fn with_selection_callback(mut self, callback: SelectionCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> UploadState {
        self.inner.lock().state.clone()
    }

    /// The value the UI renders: a data URI before the server confirms,
    /// the remote URL after.
    pub fn preview(&self) -> Option<String> {
        self.inner.lock().preview.clone()
    }

    pub fn remote(&self) -> Option<RemoteDescriptor> {
        self.inner.lock().remote.clone()
    }

    pub fn payload(&self) -> Option<ImagePayload> {
        self.inner.lock().payload.clone()
    }

    /// The human-readable error string, if any. Cleared on every new
    /// selection attempt.
    pub fn error(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    /// Accept a file the user picked or dropped.
    ///
    /// Validates, optimizes when oversized, publishes the preview, and —
    /// when `auto_upload` is set — starts the transfer. Returns once the
    /// transfer is started (or the selection settled); use [`Self::wait`]
    /// or the event stream to observe completion.
    pub async fn select(&self, source: ImageSource) {
        let generation = {
            let mut inner = self.inner.lock();
            if let Some(handle) = inner.inflight.take() {
                // Abort-and-restart: the old transfer is dead to us either way.
                handle.abort();
            }
            inner.generation += 1;
            inner.error = None;
            inner.remote = None;
            inner.preview = None;
            inner.payload = None;
            inner.generation
        };

        if let Err(err) = optimize::validate(&source, &self.config) {
            self.fail(generation, err.user_message());
            return;
        }

        debug!(
            slot_id = %self.id,
            label = %self.config.label,
            filename = %source.filename,
            size = source.size(),
            "file selected"
        );
        self.transition(generation, UploadState::Selected);

        let oversized = source.size() > optimize::OPTIMIZE_THRESHOLD;
        if oversized {
            self.transition(generation, UploadState::Optimizing);
        }

        // Decode/re-encode is CPU-bound; keep it off the reactor.
        let prepared = tokio::task::spawn_blocking(move || optimize::prepare(&source)).await;
        let payload = match prepared {
            Ok(Ok(payload)) => payload,
            Ok(Err(err)) => {
                self.fail(generation, err.user_message());
                return;
            }
            Err(join_err) => {
                self.fail(
                    generation,
                    UploadError::internal(join_err.to_string()).user_message(),
                );
                return;
            }
        };

        let data_uri = optimize::data_uri(&payload);
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                trace!(slot_id = %self.id, "discarding stale selection");
                return;
            }
            inner.payload = Some(payload.clone());
            inner.preview = Some(data_uri.clone());
        }
        if oversized {
            // Optimization settled without a transfer yet.
            self.transition(generation, UploadState::Selected);
        }
        let _ = self.events.send(SlotEvent::PreviewReady {
            slot_id: self.id,
            data_uri: data_uri.clone(),
        });

        if self.config.auto_upload {
            self.start_upload(generation);
        } else if let Some(callback) = &self.on_change {
            // The owner holds the payload and decides when to submit.
            callback(SelectionChange {
                preview: Some(data_uri),
                remote: None,
                payload: Some(payload),
            });
        }
    }

    /// Start uploading the currently selected payload. Used by owners that
    /// configured `auto_upload = false` and submit as part of a larger
    /// form, and to retry the same file after a failed transfer. No-op
    /// when nothing is selected, a transfer is genuinely in flight, or the
    /// selection already completed.
    pub fn upload(&self) {
        let generation = {
            let inner = self.inner.lock();
            if inner.payload.is_none() {
                return;
            }
            // A completed selection must not be submitted twice; a settled
            // (failed or aborted) handle is not an in-flight transfer.
            if inner.state == UploadState::Complete {
                return;
            }
            if let Some(handle) = &inner.inflight {
                if !handle.is_finished() {
                    return;
                }
            }
            inner.generation
        };
        self.start_upload(generation);
    }

    /// Discard the selection. Issues a best-effort remote delete when the
    /// image was stored server-side; the local slot always resets to
    /// `Idle`, and a delete failure only leaves an error string behind.
    pub async fn remove(&self) -> Result<()> {
        let (generation, public_id) = {
            let mut inner = self.inner.lock();
            if let Some(handle) = inner.inflight.take() {
                handle.abort();
            }
            inner.generation += 1;
            let public_id = inner.remote.as_ref().and_then(|r| r.public_id.clone());
            (inner.generation, public_id)
        };

        let mut delete_result = Ok(());
        if let Some(public_id) = public_id {
            if let Err(err) = self.transport.delete(&public_id).await {
                warn!(slot_id = %self.id, %public_id, error = %err, "remote delete failed");
                delete_result = Err(err);
            }
        }

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                // A newer selection took over while we were deleting.
                return delete_result;
            }
            inner.payload = None;
            inner.preview = None;
            inner.remote = None;
            inner.error = delete_result
                .as_ref()
                .err()
                .map(|err| err.user_message());
            let old = std::mem::replace(&mut inner.state, UploadState::Idle);
            drop(inner);
            let _ = self.events.send(SlotEvent::StateChanged {
                slot_id: self.id,
                old,
                new: UploadState::Idle,
            });
        }
        let _ = self.events.send(SlotEvent::Removed { slot_id: self.id });

        if let Some(callback) = &self.on_change {
            callback(SelectionChange::cleared());
        }

        delete_result
    }

    /// Wait for the in-flight transfer, if any, to settle.
    pub async fn wait(&self) {
        let handle = self.inner.lock().inflight.take();
        if let Some(handle) = handle {
            // An aborted task is a settled task.
            let _ = handle.await;
        }
    }

    fn start_upload(&self, generation: u64) {
        let (payload, kind) = {
            let inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            let Some(payload) = inner.payload.clone() else {
                return;
            };
            let kind = ImageKind::from_config(
                &self.config.image_type,
                self.config.target_user_id.clone(),
            );
            (payload, kind)
        };

        let slot = self.clone();
        let handle = tokio::spawn(async move {
            slot.run_upload(generation, payload, kind).await;
        });

        let mut inner = self.inner.lock();
        if inner.generation == generation {
            if let Some(old) = inner.inflight.replace(handle) {
                old.abort();
            }
        } else {
            handle.abort();
        }
    }

    async fn run_upload(&self, generation: u64, payload: ImagePayload, kind: ImageKind) {
        self.transition(generation, UploadState::Uploading(0));

        let progress: ProgressCallback = {
            let slot = self.clone();
            Arc::new(move |p: UploadProgress| {
                {
                    let mut inner = slot.inner.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.state = UploadState::Uploading(p.percent);
                }
                let _ = slot.events.send(SlotEvent::Progress {
                    slot_id: slot.id,
                    percent: p.percent,
                });
            })
        };

        let request = UploadRequest {
            filename: payload.filename.clone(),
            mime: payload.mime.clone(),
            bytes: payload.bytes.clone(),
            kind,
        };

        match self.transport.upload(request, Some(progress)).await {
            Ok(remote) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        trace!(slot_id = %self.id, "discarding stale upload result");
                        return;
                    }
                    inner.remote = Some(remote.clone());
                    // The optimistic data URI gives way to the stored URL.
                    inner.preview = Some(remote.url.clone());
                    let old = std::mem::replace(&mut inner.state, UploadState::Complete);
                    drop(inner);
                    let _ = self.events.send(SlotEvent::StateChanged {
                        slot_id: self.id,
                        old,
                        new: UploadState::Complete,
                    });
                }
                debug!(slot_id = %self.id, url = %remote.url, "upload complete");
                let _ = self.events.send(SlotEvent::Completed {
                    slot_id: self.id,
                    url: remote.url.clone(),
                });
                if let Some(callback) = &self.on_change {
                    callback(SelectionChange {
                        preview: Some(remote.url.clone()),
                        remote: Some(remote),
                        payload: Some(payload),
                    });
                }
            }
            Err(err) => {
                // The preview is deliberately kept: the user still sees the
                // image they chose, just without a success indicator.
                self.fail(generation, err.user_message());
            }
        }
    }

    fn transition(&self, generation: u64, new: UploadState) {
        let old = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            std::mem::replace(&mut inner.state, new.clone())
        };
        let _ = self.events.send(SlotEvent::StateChanged {
            slot_id: self.id,
            old,
            new,
        });
    }

    fn fail(&self, generation: u64, reason: String) {
        let old = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.error = Some(reason.clone());
            std::mem::replace(&mut inner.state, UploadState::Failed(reason.clone()))
        };
        let _ = self.events.send(SlotEvent::StateChanged {
            slot_id: self.id,
            old,
            new: UploadState::Failed(reason.clone()),
        });
        let _ = self.events.send(SlotEvent::Failed {
            slot_id: self.id,
            reason,
        });
    }
}
