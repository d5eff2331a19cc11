//! Export selection and retrieval
//!
//! Selecting the right export of an avatar, streaming its archive with
//! progress, unpacking it, and building direct download links.

pub mod archive;
pub mod download;
pub mod link;
pub mod select;

pub use archive::{extract_archive, ArchiveContents};
pub use download::{download_with_progress, read_with_progress, total_size, ChunkSource};
pub use link::{
    avatar_file, direct_link, export_links, file_name_from_url, group_export_files, DownloadLink,
};
pub use select::{resolve_export, select_export, FULL_EXPORT_INDEX, VISUAL_EXPORT_INDEX};
