//! Archive storage for framevault.
//!
//! An archive is a line-oriented text stream of frames. This module handles
//! the stream mechanics only: replicated frame writes, separator runs and
//! per-object flushing on the way out; bounded line reading on the way in.
//! It never opens files and never interprets frame contents.
//!
//! # Design Principles
//! - Works over any `Write` / `BufRead`, so callers decide where bytes live
//! - A damaged line never affects the lines around it
//! - Memory use is bounded by the longest accepted line

pub mod archive;

pub use archive::{ArchiveLine, ArchiveReader, ArchiveWriter, DEFAULT_MAX_LINE_LENGTH, MAX_REPLICAS};
