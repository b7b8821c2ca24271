//! # ASL-context library
//!
//! This crate writes BIDS `*_aslcontext.tsv` sidecars for Arterial Spin
//! Labeling acquisitions that have already been converted to NIfTI and moved
//! into a BIDS dataset.
//!
//! Each acquisition's description carries an `aslContext` property, one label
//! per volume of the ASL series. The labels are checked against the number of
//! volumes in the image and against the known vocabulary:
//!  - BIDS volume types: `cbf`, `control`, `deltam`, `label`, `m0scan`
//!  - `discard`, which marks a volume for removal
//!
//! Volumes labelled `discard` are left out of the sidecar and removed from the
//! image, which is rewritten in place. The rewrite goes through a temporary
//! file so the original is only replaced once the new image is complete.
//!
//! Acquisitions are processed one at a time. Running two passes over the same
//! dataset concurrently is not supported.
//!
//! # Examples
//!
//! ## Writing sidecars for a dataset
//!
//! ```no_run
//! # use asl_context::{acquisition::{Acquisition, FirstNiftiResolver}, pipeline::{process, Options}, volume_loader::NiftiImageIo};
//! # use std::path::Path;
//! # let acquisitions: Vec<Acquisition> = Vec::new();
//! let options = Options { include_aslcontext_json: true };
//! let report = process(
//!     Path::new("bids"),
//!     &acquisitions,
//!     &NiftiImageIo,
//!     &FirstNiftiResolver,
//!     &options,
//! );
//! assert!(report.is_success());
//! ```

pub mod acquisition;
pub mod aslcontext;
pub mod enums;
pub mod pipeline;
pub mod volume;
pub mod volume_loader;
