mod errors;
mod slot;
mod types;

pub use errors::{GENERIC_UPLOAD_FAILURE, Result, UploadError};
pub use slot::ImageSlot;
pub use types::{
    ImagePayload, ImageSource, RemoteDescriptor, SelectionCallback, SelectionChange, SlotEvent,
    SlotId, UploadState,
};
