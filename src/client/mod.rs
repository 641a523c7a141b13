mod http;
mod response;
mod transport;

pub use http::HttpTransport;
pub use response::normalize_upload_response;
pub use transport::{ImageKind, ImageTransport, UploadRequest};
