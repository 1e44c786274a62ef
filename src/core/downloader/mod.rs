pub mod client;

pub use client::{write_stream, DownloadEvent, DownloadProgress, DownloadTask, Downloader};
