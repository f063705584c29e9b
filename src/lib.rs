//! A chunked-source media playback engine core.
//!
//! Given an opaque byte-addressable source (local file or ranged HTTP),
//! this crate demultiplexes a container, decodes video, audio, and
//! subtitle streams, and drives presentation from an audio-master clock.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! * **I/O**
//!   - [`source`]: chunked, cached, range-addressable reads
//!   - [`cache`]: chunk-aligned LRU byte cache
//!   - [`preload`]: read-ahead/read-behind policy
//!
//! * **Demuxing**
//!   - [`demux`]: container parsing behind a foreign-call-style boundary
//!   - [`codec`]: codec/color normalization and HDR detection
//!
//! * **Decoding**
//!   - [`decode`]: hardware and software decoder variants
//!
//! * **Orchestration**
//!   - [`track`]: track selection and switching
//!   - [`clock`]: the audio-master clock
//!   - [`controller`]: the playback state machine
//!
//! * **Output**
//!   - [`sink`]: video/audio/subtitle presentation contracts
//!   - [`output`]: a `rodio`/`cpal`-backed [`sink::AudioSink`]
//!
//! * **Utilities**
//!   - [`error`]: error types and handling
//!   - [`config`]: engine configuration
//!   - [`events`]: observer fan-out for state/error/time events
//!   - [`util`]: general helper functions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mediacore::{config::Config, controller::Controller, source::FileSource};
//!
//! async fn example() -> mediacore::error::Result<()> {
//!     let config = Config::default();
//!     let source: Arc<dyn mediacore::source::Source> = Arc::new(FileSource::open("movie.mp4")?);
//!
//!     let mut controller = Controller::new(&config);
//!     controller.load(source).await?;
//!     controller.play().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Errors are handled through the types in the [`error`] module, with
//! most functions returning [`Result`](error::Result).
//!
//! # Concurrency
//!
//! The crate uses async/await for concurrency and is designed to work
//! with the Tokio runtime on a single-threaded cooperative model: the
//! controller, demuxer, decoders, and preloader all yield at well-defined
//! suspension points rather than running on separate threads.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![doc(test(attr(ignore)))]

#[macro_use]
extern crate log;

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod controller;
pub mod decode;
pub mod demux;
pub mod error;
pub mod events;
pub mod output;
pub mod preload;
pub mod signal;
pub mod sink;
pub mod source;
pub mod track;
pub mod util;
