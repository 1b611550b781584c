mod blob_fs;
mod dir_fs;
mod share_fs;

pub use blob_fs::{BlobFS, BlobKind};
pub use dir_fs::DirFS;
pub use share_fs::ShareFS;
