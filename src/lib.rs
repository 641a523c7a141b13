pub mod client;
pub mod config;
pub mod core;
pub mod optimize;
pub mod progress;

pub use crate::core::{
    GENERIC_UPLOAD_FAILURE,
    ImagePayload,
    ImageSlot,
    ImageSource,
    RemoteDescriptor,
    Result,
    SelectionCallback,
    SelectionChange,
    SlotEvent,
    SlotId,
    UploadError,
    UploadState,
};

pub use client::{HttpTransport, ImageKind, ImageTransport, UploadRequest};
pub use config::{ClientConfig, Config, SlotConfig};
pub use progress::{ProgressCallback, UploadProgress};
