use crate::{
    acquisition::{ASL_CONTEXT_PROPERTY, Acquisition},
    enums::{BidsLabel, TaggedLabel, UnknownLabel},
    volume_loader::ImageError,
};

use serde::Serialize;
use serde_json::Value;
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AslContextError {
    #[error(
        "Description at index [{description_index}] is missing the required property [aslContext]"
    )]
    MissingAslContext { description_index: usize },

    #[error(
        "Description at index [{description_index}] has an [aslContext] property that is not a list of strings"
    )]
    MalformedAslContext { description_index: usize },

    #[error(
        "File [{}] has a mismatch between the number of volumes in the acquisition [{volume_count}] and the number of volume_type labels [{label_count}] in the associated description",
        .file.display()
    )]
    Configuration {
        file: PathBuf,
        volume_count: usize,
        label_count: usize,
    },

    #[error(
        "Unknown aslcontext label [{label}]. BIDS-compliant labels are: cbf, control, deltam, label, m0scan; discard is also allowed"
    )]
    InvalidLabel { label: String },

    #[error(
        "Could not find ASL NIfTI file for the acquisition with dst_root [{}]",
        .dst_root.display()
    )]
    ImageNotFound { dst_root: PathBuf },

    #[error("File [{}] would have no volumes left after discarding", .file.display())]
    NoRetainedVolumes { file: PathBuf },

    #[error("Could not write [{}]: {source}", .path.display())]
    Sidecar {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),
}

#[derive(Serialize)]
struct VolumeTypeRow {
    volume_type: BidsLabel,
}

#[derive(Serialize)]
struct SidecarDescription {
    volume_type: VolumeTypeColumn,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeTypeColumn {
    long_name: &'static str,
    description: &'static str,
    levels: VolumeTypeLevels,
    #[serde(rename = "TermURL")]
    term_url: &'static str,
}

#[derive(Serialize)]
struct VolumeTypeLevels {
    control: &'static str,
    label: &'static str,
    m0scan: &'static str,
    deltam: &'static str,
    cbf: &'static str,
}

const SIDECAR_DESCRIPTION: SidecarDescription = SidecarDescription {
    volume_type: VolumeTypeColumn {
        long_name: "Volume type",
        description: "Labels identifying the volume type of each volume in the corresponding *_asl.nii[.gz] file. Volume types are based on DICOM Tag (0018,9257) ASL Context.",
        levels: VolumeTypeLevels {
            control: "The control image is acquired in the exact same way as the label image, except that the magnetization of the blood flowing into the imaging region has not been inverted.",
            label: "The label image is acquired in the exact same way as the control image, except that the blood magnetization flowing into the imaging region has been inverted.",
            m0scan: "The M0 image is a calibration image, used to estimate the equilibrium magnetization of blood.",
            deltam: "The deltaM image is a perfusion-weighted image, obtained by the subtraction of control - label.",
            cbf: "The cerebral blood flow (CBF) image is produced by dividing the deltaM by the M0, quantified into mL/100g/min (See also doi:10.1002/mrm.25197).",
        },
        term_url: "https://bids-specification.readthedocs.io/en/v1.6.0/04-modality-specific-files/01-magnetic-resonance-imaging-data.html#_aslcontexttsv",
    },
};

/// The per-volume labels of one ASL acquisition.
///
/// `labels` are kept exactly as given; they are classified on demand and
/// checked against the image by [`Aslcontext::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aslcontext {
    labels: Vec<String>,
    file_root: PathBuf,
}

impl Aslcontext {
    /// `file_root` is the destination path without modality suffix, relative
    /// to the dataset root (e.g. `sub-01/perf/sub-01`).
    pub fn new(labels: Vec<String>, file_root: impl Into<PathBuf>) -> Self {
        Self {
            labels,
            file_root: file_root.into(),
        }
    }

    /// Read the `aslContext` property of the acquisition's description.
    ///
    /// # Errors
    ///
    /// Returns error if the property is absent or is not a list of strings
    pub fn from_acquisition(acquisition: &Acquisition) -> Result<Self, AslContextError> {
        let description_index = acquisition.description.index;
        let value = acquisition
            .description
            .get(ASL_CONTEXT_PROPERTY)
            .ok_or(AslContextError::MissingAslContext { description_index })?;

        let labels = labels_from_value(value)
            .ok_or(AslContextError::MalformedAslContext { description_index })?;

        Ok(Self::new(labels, acquisition.dst_root_no_modality()))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn file_root(&self) -> &Path {
        &self.file_root
    }

    pub fn tsv_file(&self) -> PathBuf {
        self.sidecar_file("tsv")
    }

    pub fn json_file(&self) -> PathBuf {
        self.sidecar_file("json")
    }

    fn sidecar_file(&self, extension: &str) -> PathBuf {
        let mut name = self
            .file_root
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        name.push("_aslcontext.");
        name.push(extension);
        self.file_root.with_file_name(name)
    }

    /// Check the labels against the image at `file` holding `volume_count`
    /// volumes. The count is checked before the vocabulary.
    pub fn validate(&self, file: &Path, volume_count: usize) -> Result<(), AslContextError> {
        let label_count = self.labels.len();
        if volume_count != label_count {
            return Err(AslContextError::Configuration {
                file: file.to_path_buf(),
                volume_count,
                label_count,
            });
        }
        self.tagged_labels()?;
        Ok(())
    }

    /// Classify every label, failing on the first unknown one.
    pub fn tagged_labels(&self) -> Result<Vec<TaggedLabel>, AslContextError> {
        self.labels
            .iter()
            .map(|label| {
                label
                    .parse::<TaggedLabel>()
                    .map_err(|err| AslContextError::InvalidLabel { label: err.0 })
            })
            .collect()
    }

    /// Indices of volumes labelled for removal, ascending.
    pub fn discard_indices(&self) -> Vec<usize> {
        self.indices_where(|tagged| matches!(tagged, Ok(TaggedLabel::Extra(_))))
    }

    /// Indices of volumes that stay in the image, ascending.
    pub fn keep_indices(&self) -> Vec<usize> {
        self.indices_where(|tagged| !matches!(tagged, Ok(TaggedLabel::Extra(_))))
    }

    fn indices_where<F>(&self, predicate: F) -> Vec<usize>
    where
        F: Fn(&Result<TaggedLabel, UnknownLabel>) -> bool,
    {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| predicate(&label.parse::<TaggedLabel>()))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn should_discard_volumes(&self) -> bool {
        !self.discard_indices().is_empty()
    }

    /// `(index, label)` of every volume that will be discarded.
    pub fn discarded_labels(&self) -> Vec<(usize, &str)> {
        self.discard_indices()
            .into_iter()
            .map(|index| (index, self.labels[index].as_str()))
            .collect()
    }

    /// Render `*_aslcontext.tsv`: a `volume_type` column with one row per
    /// retained volume.
    pub fn tsv(&self) -> Result<String, AslContextError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .terminator(csv::Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(["volume_type"])?;
        for tagged in self.tagged_labels()? {
            if let TaggedLabel::Bids(volume_type) = tagged {
                writer.serialize(VolumeTypeRow { volume_type })?;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Render `*_aslcontext.json`. The content does not depend on the labels.
    pub fn json(&self) -> Result<String, AslContextError> {
        let mut json = serde_json::to_string_pretty(&SIDECAR_DESCRIPTION)?;
        json.push('\n');
        Ok(json)
    }

    pub fn write_tsv(&self, path: &Path) -> Result<PathBuf, AslContextError> {
        write_sidecar(path, &self.tsv()?)
    }

    pub fn write_json(&self, path: &Path) -> Result<PathBuf, AslContextError> {
        write_sidecar(path, &self.json()?)
    }

    pub fn write_bids_tsv(&self, dataset_dir: &Path) -> Result<PathBuf, AslContextError> {
        self.write_tsv(&dataset_dir.join(self.tsv_file()))
    }

    pub fn write_bids_json(&self, dataset_dir: &Path) -> Result<PathBuf, AslContextError> {
        self.write_json(&dataset_dir.join(self.json_file()))
    }
}

fn write_sidecar(path: &Path, content: &str) -> Result<PathBuf, AslContextError> {
    fs::write(path, content).map_err(|source| AslContextError::Sidecar {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path.to_path_buf())
}

/// Parse a JSON list of labels, as found in a description.
pub fn labels_from_value(value: &Value) -> Option<Vec<String>> {
    value.as_array().and_then(|items| {
        items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::Description;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn context(labels: &[&str]) -> Aslcontext {
        Aslcontext::new(
            labels.iter().map(|l| l.to_string()).collect(),
            "sub-01/perf/sub-01",
        )
    }

    fn acquisition(description: Value) -> Acquisition {
        let Value::Object(data) = description else {
            panic!("description must be an object");
        };
        Acquisition {
            dst_root: PathBuf::from("sub-01/perf/sub-01_asl"),
            src_file: PathBuf::from("/dicom/out/003.nii.gz"),
            description: Description::new(7, data),
        }
    }

    #[test]
    fn reads_labels_from_acquisition() {
        let acq = acquisition(json!({
            "dataType": "perf",
            "modalityLabel": "asl",
            "aslContext": ["control", "label", "m0scan"],
        }));
        let ctx = Aslcontext::from_acquisition(&acq).unwrap();
        assert_eq!(ctx.labels(), ["control", "label", "m0scan"]);
        assert_eq!(ctx.file_root(), Path::new("sub-01/perf/sub-01"));
    }

    #[test]
    fn missing_labels_report_description_index() {
        let acq = acquisition(json!({"dataType": "perf", "modalityLabel": "asl"}));
        let err = Aslcontext::from_acquisition(&acq).unwrap_err();
        assert!(matches!(
            err,
            AslContextError::MissingAslContext { description_index: 7 }
        ));
        assert!(err.to_string().contains("index [7]"));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        let acq = acquisition(json!({"modalityLabel": "asl", "aslContext": "control"}));
        assert!(matches!(
            Aslcontext::from_acquisition(&acq),
            Err(AslContextError::MalformedAslContext { description_index: 7 })
        ));
        let acq = acquisition(json!({"modalityLabel": "asl", "aslContext": ["control", 1]}));
        assert!(matches!(
            Aslcontext::from_acquisition(&acq),
            Err(AslContextError::MalformedAslContext { .. })
        ));
    }

    #[test]
    fn sidecar_files_sit_next_to_the_image() {
        let ctx = context(&["control"]);
        assert_eq!(ctx.tsv_file(), PathBuf::from("sub-01/perf/sub-01_aslcontext.tsv"));
        assert_eq!(ctx.json_file(), PathBuf::from("sub-01/perf/sub-01_aslcontext.json"));
    }

    #[test]
    fn sidecar_names_keep_dots_in_the_root() {
        let ctx = Aslcontext::new(vec!["control".to_string()], "sub-01/perf/sub-01_acq-2.5mm");
        assert_eq!(
            ctx.tsv_file(),
            PathBuf::from("sub-01/perf/sub-01_acq-2.5mm_aslcontext.tsv")
        );
    }

    #[cfg(unix)]
    #[test]
    fn sidecar_names_keep_non_utf8_roots() {
        use std::{ffi::OsString, os::unix::ffi::OsStringExt};

        let mut root = PathBuf::from("sub-01/perf");
        root.push(OsString::from_vec(b"sub-\xff01".to_vec()));
        let ctx = Aslcontext::new(vec!["control".to_string()], root);

        let expected = PathBuf::from("sub-01/perf")
            .join(OsString::from_vec(b"sub-\xff01_aslcontext.json".to_vec()));
        assert_eq!(ctx.json_file(), expected);
    }

    #[test]
    fn validate_accepts_matching_standard_labels() {
        let ctx = context(&["control", "label", "m0scan"]);
        ctx.validate(Path::new("sub-01_asl.nii.gz"), 3).unwrap();
        assert!(!ctx.should_discard_volumes());
        assert_eq!(ctx.keep_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn validate_rejects_too_few_labels() {
        let err = context(&["control", "label"])
            .validate(Path::new("sub-01_asl.nii.gz"), 3)
            .unwrap_err();
        assert!(matches!(
            err,
            AslContextError::Configuration {
                volume_count: 3,
                label_count: 2,
                ..
            }
        ));
        assert!(err.to_string().contains("sub-01_asl.nii.gz"));
    }

    #[test]
    fn validate_rejects_too_many_labels() {
        let err = context(&["control", "label", "control", "label"])
            .validate(Path::new("sub-01_asl.nii"), 2)
            .unwrap_err();
        assert!(matches!(
            err,
            AslContextError::Configuration {
                volume_count: 2,
                label_count: 4,
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_unknown_label() {
        let err = context(&["control", "bolus", "label"])
            .validate(Path::new("sub-01_asl.nii"), 3)
            .unwrap_err();
        assert!(matches!(err, AslContextError::InvalidLabel { ref label } if label == "bolus"));
    }

    #[test]
    fn count_mismatch_wins_over_unknown_label() {
        let err = context(&["bolus"])
            .validate(Path::new("sub-01_asl.nii"), 2)
            .unwrap_err();
        assert!(matches!(err, AslContextError::Configuration { .. }));
    }

    #[test]
    fn discard_labels_are_planned_for_removal() {
        let ctx = context(&["control", "label", "discard", "m0scan"]);
        ctx.validate(Path::new("sub-01_asl.nii"), 4).unwrap();

        assert!(ctx.should_discard_volumes());
        assert_eq!(ctx.discard_indices(), vec![2]);
        assert_eq!(ctx.keep_indices(), vec![0, 1, 3]);
        assert_eq!(ctx.discarded_labels(), vec![(2, "discard")]);
    }

    #[test]
    fn several_discards_are_all_planned_for_removal() {
        let ctx = context(&["discard", "control", "label", "discard", "m0scan"]);
        ctx.validate(Path::new("sub-01_asl.nii"), 5).unwrap();

        assert_eq!(ctx.discard_indices(), vec![0, 3]);
        assert_eq!(ctx.keep_indices(), vec![1, 2, 4]);
        assert_eq!(
            ctx.discarded_labels(),
            vec![(0, "discard"), (3, "discard")]
        );
    }

    #[test]
    fn tsv_lists_standard_labels_in_order() {
        let ctx = context(&["m0scan", "control", "label", "deltam", "cbf"]);
        assert_eq!(
            ctx.tsv().unwrap(),
            "volume_type\nm0scan\ncontrol\nlabel\ndeltam\ncbf\n"
        );
    }

    #[test]
    fn tsv_leaves_out_discarded_volumes() {
        let ctx = context(&["discard", "control", "label", "discard", "m0scan"]);
        assert_eq!(ctx.tsv().unwrap(), "volume_type\ncontrol\nlabel\nm0scan\n");
    }

    #[test]
    fn tsv_rejects_unknown_label() {
        assert!(matches!(
            context(&["control", "bolus"]).tsv(),
            Err(AslContextError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn json_does_not_depend_on_labels() {
        let a = context(&["control", "label"]).json().unwrap();
        let b = context(&["discard", "m0scan", "cbf"]).json().unwrap();
        let c = context(&[]).json().unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn sidecars_use_unix_line_endings() {
        let ctx = context(&["control", "label"]);
        let tsv = ctx.tsv().unwrap();
        let json = ctx.json().unwrap();

        assert!(!tsv.contains('\r'));
        assert!(!json.contains('\r'));
        assert!(json.starts_with("{\n  \""));
        assert!(json.ends_with("}\n"));
    }

    #[test]
    fn json_describes_volume_type_levels() {
        let json: Value = serde_json::from_str(&context(&[]).json().unwrap()).unwrap();
        let column = &json["volume_type"];
        assert_eq!(column["LongName"], "Volume type");
        for level in ["control", "label", "m0scan", "deltam", "cbf"] {
            assert!(column["Levels"][level].is_string(), "missing level {level}");
        }
        assert!(
            column["TermURL"]
                .as_str()
                .unwrap()
                .ends_with("#_aslcontexttsv")
        );
    }

    #[test]
    fn writes_sidecars_under_dataset_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub-01/perf")).unwrap();
        let ctx = context(&["control", "label"]);

        let tsv = ctx.write_bids_tsv(dir.path()).unwrap();
        let json = ctx.write_bids_json(dir.path()).unwrap();

        assert_eq!(tsv, dir.path().join("sub-01/perf/sub-01_aslcontext.tsv"));
        assert_eq!(std::fs::read_to_string(&tsv).unwrap(), "volume_type\ncontrol\nlabel\n");
        assert_eq!(std::fs::read_to_string(&json).unwrap(), ctx.json().unwrap());
    }

    #[test]
    fn writing_overwrites_existing_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old_aslcontext.tsv");
        std::fs::write(&path, "stale content\n").unwrap();

        context(&["cbf"]).write_tsv(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "volume_type\ncbf\n");
    }

    #[test]
    fn labels_from_value_requires_strings() {
        assert_eq!(
            labels_from_value(&json!(["control", "label"])),
            Some(vec!["control".to_string(), "label".to_string()])
        );
        assert_eq!(labels_from_value(&json!(["control", null])), None);
        assert_eq!(labels_from_value(&json!({"a": 1})), None);
    }
}
