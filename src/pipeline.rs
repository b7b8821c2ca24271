use crate::{
    acquisition::{Acquisition, FileResolver, find_asl_acquisitions},
    aslcontext::{AslContextError, Aslcontext},
    volume_loader::ImageIo,
};

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Also write `*_aslcontext.json` next to each `*_aslcontext.tsv`.
    pub include_aslcontext_json: bool,
}

#[derive(Debug)]
pub enum Outcome {
    Written {
        tsv: PathBuf,
        json: Option<PathBuf>,
        /// Indices of the volumes removed from the image.
        discarded: Vec<usize>,
    },
    Skipped {
        reason: AslContextError,
    },
    Failed {
        error: AslContextError,
    },
}

#[derive(Debug)]
pub struct AcquisitionReport {
    pub dst_root: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub acquisitions: Vec<AcquisitionReport>,
}

impl ProcessReport {
    pub fn written(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &AslContextError)> {
        self.acquisitions.iter().filter_map(|report| match &report.outcome {
            Outcome::Failed { error } => Some((report.dst_root.as_path(), error)),
            _ => None,
        })
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.acquisitions
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// Write aslcontext sidecars for every ASL acquisition in `acquisitions` and
/// strip volumes labelled `discard` from their images.
///
/// Acquisitions are handled one after the other. A failing acquisition is
/// recorded in the report and does not stop the remaining ones.
pub fn process(
    out_dir: &Path,
    acquisitions: &[Acquisition],
    image_io: &dyn ImageIo,
    resolver: &dyn FileResolver,
    options: &Options,
) -> ProcessReport {
    let mut report = ProcessReport::default();

    for acquisition in find_asl_acquisitions(acquisitions) {
        info!(
            "Found ASL acquisition associated with file [{}]. Writing aslcontext files.",
            acquisition.src_file.display()
        );

        let outcome = match process_acquisition(out_dir, acquisition, image_io, resolver, options)
        {
            Ok(outcome) => outcome,
            Err(reason @ AslContextError::MissingAslContext { .. }) => {
                warn!(
                    dst_root = %acquisition.dst_root.display(),
                    "Skipping acquisition: {reason}"
                );
                Outcome::Skipped { reason }
            }
            Err(error) => {
                error!(
                    dst_root = %acquisition.dst_root.display(),
                    "Failed to process acquisition: {error}"
                );
                Outcome::Failed { error }
            }
        };

        report.acquisitions.push(AcquisitionReport {
            dst_root: acquisition.dst_root.clone(),
            outcome,
        });
    }

    info!(
        written = report.written(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Finished writing aslcontext files"
    );
    report
}

fn process_acquisition(
    out_dir: &Path,
    acquisition: &Acquisition,
    image_io: &dyn ImageIo,
    resolver: &dyn FileResolver,
    options: &Options,
) -> Result<Outcome, AslContextError> {
    let aslcontext = Aslcontext::from_acquisition(acquisition)?;

    let asl_file = resolver
        .find_image_file(out_dir, acquisition)
        .ok_or_else(|| AslContextError::ImageNotFound {
            dst_root: acquisition.dst_root.clone(),
        })?;

    let volume_count = image_io.volume_count(&asl_file)?;
    aslcontext.validate(&asl_file, volume_count)?;
    debug!(asl_file = %asl_file.display(), volume_count, "Validated aslContext");

    let tsv = aslcontext.write_bids_tsv(out_dir)?;
    debug!(path = %tsv.display(), "Wrote aslcontext tsv");
    let json = if options.include_aslcontext_json {
        let json = aslcontext.write_bids_json(out_dir)?;
        debug!(path = %json.display(), "Wrote aslcontext json");
        Some(json)
    } else {
        None
    };

    let mut discarded = Vec::new();
    if aslcontext.should_discard_volumes() {
        let reasons: Vec<String> = aslcontext
            .discarded_labels()
            .into_iter()
            .map(|(index, label)| format!("volume at index [{index}] with label [{label}]"))
            .collect();
        info!(
            "ASL context for acquisition [{}] has non-BIDS-compliant aslContext labels. Removing volumes: {}",
            acquisition.dst_root.display(),
            reasons.join(",")
        );
        discarded = discard_volumes(image_io, &asl_file, &aslcontext)?;
    }

    Ok(Outcome::Written {
        tsv,
        json,
        discarded,
    })
}

/// Remove the volumes labelled for discarding from `asl_file`, in place.
///
/// Returns the removed indices. When nothing is to be discarded the file is
/// not touched.
///
/// # Errors
///
/// Returns error if no volume would remain, or if the image cannot be read or
/// written
pub fn discard_volumes(
    image_io: &dyn ImageIo,
    asl_file: &Path,
    aslcontext: &Aslcontext,
) -> Result<Vec<usize>, AslContextError> {
    let keep = aslcontext.keep_indices();
    if keep.len() == aslcontext.labels().len() {
        return Ok(Vec::new());
    }
    if keep.is_empty() {
        return Err(AslContextError::NoRetainedVolumes {
            file: asl_file.to_path_buf(),
        });
    }

    let image = image_io.load(asl_file)?;
    let edited = image.select_volumes(&keep)?;
    image_io.save(&edited, asl_file)?;

    Ok(aslcontext.discard_indices())
}
