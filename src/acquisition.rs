use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const ASL_CONTEXT_PROPERTY: &str = "aslContext";
pub const MODALITY_LABEL_PROPERTY: &str = "modalityLabel";
pub const DATA_TYPE_PROPERTY: &str = "dataType";

const ASL_MODALITY_LABEL: &str = "asl";
const NIFTI_EXTENSIONS: [&str; 2] = [".nii.gz", ".nii"];

/// One entry of the conversion configuration, as matched against an acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Position of the description in the configuration file.
    pub index: usize,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Description {
    pub fn new(index: usize, data: Map<String, Value>) -> Self {
        Self { index, data }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.data.get(property)
    }

    pub fn data_type(&self) -> Option<&str> {
        self.get(DATA_TYPE_PROPERTY).and_then(Value::as_str)
    }

    /// Modality label without any leading underscore, e.g. `asl`.
    pub fn modality_label(&self) -> Option<&str> {
        self.get(MODALITY_LABEL_PROPERTY)
            .and_then(Value::as_str)
            .map(|label| label.trim_start_matches('_'))
    }
}

/// A converted file that has been moved into the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// Destination path relative to the dataset root, without extension
    /// (e.g. `sub-01/perf/sub-01_asl`).
    pub dst_root: PathBuf,
    pub src_file: PathBuf,
    pub description: Description,
}

impl Acquisition {
    /// `dst_root` with the trailing `_<modality>` removed from the file name.
    pub fn dst_root_no_modality(&self) -> PathBuf {
        let Some(modality) = self.description.modality_label() else {
            return self.dst_root.clone();
        };
        let Some(name) = self.dst_root.file_name().and_then(|s| s.to_str()) else {
            return self.dst_root.clone();
        };
        match name.strip_suffix(&format!("_{modality}")) {
            Some(stem) if !stem.is_empty() => self.dst_root.with_file_name(stem),
            _ => self.dst_root.clone(),
        }
    }
}

pub fn is_asl(acquisition: &Acquisition) -> bool {
    acquisition.description.modality_label() == Some(ASL_MODALITY_LABEL)
}

/// ASL acquisitions, in their original order.
pub fn find_asl_acquisitions(acquisitions: &[Acquisition]) -> Vec<&Acquisition> {
    acquisitions.iter().filter(|acq| is_asl(acq)).collect()
}

/// Locates the image file written for an acquisition.
pub trait FileResolver {
    fn find_image_file(&self, out_dir: &Path, acquisition: &Acquisition) -> Option<PathBuf>;
}

/// Resolves `<out_dir>/<dst_root>.nii.gz`, falling back to `.nii`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstNiftiResolver;

impl FileResolver for FirstNiftiResolver {
    fn find_image_file(&self, out_dir: &Path, acquisition: &Acquisition) -> Option<PathBuf> {
        first_nii(&out_dir.join(&acquisition.dst_root))
    }
}

/// First existing NIfTI file for an extension-less path.
pub fn first_nii(path: &Path) -> Option<PathBuf> {
    NIFTI_EXTENSIONS
        .iter()
        .map(|ext| {
            let mut candidate = path.as_os_str().to_owned();
            candidate.push(ext);
            PathBuf::from(candidate)
        })
        .find(|candidate| candidate.is_file())
}
