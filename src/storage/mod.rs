mod compressor;
mod layout;
mod manifest;
mod pipeline;
mod sweeper;
mod timestamps;

pub use compressor::compress_dir;
pub use layout::{embedded_date, is_manifest_name, ArchiveLayout, RunStamp};
pub use manifest::{ArchiveManifest, ManifestEntry, RunMetadata, RUN_KEY};
pub use pipeline::{move_into, ArchivePipeline, BatchReport, BatchStatus};
pub use sweeper::{RetentionSweeper, SweepReport};
pub use timestamps::{legacy_cutoff, normalize_legacy_mtimes};
