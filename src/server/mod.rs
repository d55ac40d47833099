mod blobs;
pub mod dto;
mod profile;
pub mod response;
mod router;
pub mod wharf;

pub use blobs::blob_router;
pub use profile::profile_router;
pub use router::{AppState, create_router};
pub use wharf::wharf_router;
