pub mod audio_extractor;
pub mod captions;
pub mod config;
pub mod downloader;
pub mod error;
pub mod gcs_client;
pub mod handler;
pub mod job;
pub mod media;
pub mod processor;
pub mod renderer;
pub mod scratch;
pub mod transcriber;
pub mod video_processor;

pub use captions::{build_caption_clips, CaptionClip, CaptionStyle};
pub use config::{AppConfig, ConfigLoader};
pub use error::JobError;
pub use gcs_client::{GcsClient, ObjectStore, StorageCredentials};
pub use job::{JobOutcome, JobRequest};
pub use media::{FfmpegToolkit, MediaToolkit, VideoHandle, VideoInfo};
pub use processor::CaptionPipeline;
pub use renderer::{CompositeTimeline, RenderProfile};
pub use transcriber::{AssemblyAiClient, PollPolicy, Transcript, TranscriptStatus, TranscriptionApi, Word};
