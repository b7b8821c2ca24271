use crate::volume::{AslImage, VolumeData, header_volume_count, with_array};

use nifti::{
    NiftiHeader, NiftiObject, NiftiType, ReaderOptions, volume::ndarray::IntoNdArray,
    writer::WriterOptions,
};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unsupported NIfTI datatype {0}")]
    UnsupportedDatatype(String),

    #[error("Expected a 4-D image, found {ndim} dimensions")]
    NotFourDimensional { ndim: usize },

    #[error("Volume index [{index}] out of range for an image with {count} volumes")]
    VolumeOutOfRange { index: usize, count: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("Could not replace image file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Reading and writing of ASL image series.
pub trait ImageIo {
    fn load(&self, path: &Path) -> Result<AslImage, ImageError>;

    /// Number of volumes in the image at `path`.
    fn volume_count(&self, path: &Path) -> Result<usize, ImageError> {
        Ok(self.load(path)?.volume_count())
    }

    /// Write `image` to `path`, replacing any file already there.
    fn save(&self, image: &AslImage, path: &Path) -> Result<(), ImageError>;
}

/// [`ImageIo`] for NIfTI-1 files (`.nii` and `.nii.gz`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NiftiImageIo;

impl NiftiImageIo {
    fn has_scaling(header: &NiftiHeader) -> bool {
        header.scl_slope != 0.0 && (header.scl_slope != 1.0 || header.scl_inter != 0.0)
    }

    fn suffix(path: &Path) -> &'static str {
        let gzipped = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
        if gzipped { ".nii.gz" } else { ".nii" }
    }
}

impl ImageIo for NiftiImageIo {
    /// Load an image keeping its on-disk datatype where that is exact.
    ///
    /// Scaled integer data is converted to `f32` with the scaling applied.
    fn load(&self, path: &Path) -> Result<AslImage, ImageError> {
        let object = ReaderOptions::new().read_file(path)?;
        let header = object.header().clone();
        let datatype = header.data_type()?;
        let volume = object.into_volume();

        let data = if Self::has_scaling(&header) && datatype != NiftiType::Float64 {
            VolumeData::F32(volume.into_ndarray::<f32>()?)
        } else {
            match datatype {
                NiftiType::Uint8 => VolumeData::U8(volume.into_ndarray::<u8>()?),
                NiftiType::Int8 => VolumeData::I8(volume.into_ndarray::<i8>()?),
                NiftiType::Int16 => VolumeData::I16(volume.into_ndarray::<i16>()?),
                NiftiType::Uint16 => VolumeData::U16(volume.into_ndarray::<u16>()?),
                NiftiType::Int32 => VolumeData::I32(volume.into_ndarray::<i32>()?),
                NiftiType::Uint32 => VolumeData::U32(volume.into_ndarray::<u32>()?),
                NiftiType::Int64 => VolumeData::I64(volume.into_ndarray::<i64>()?),
                NiftiType::Uint64 => VolumeData::U64(volume.into_ndarray::<u64>()?),
                NiftiType::Float32 => VolumeData::F32(volume.into_ndarray::<f32>()?),
                NiftiType::Float64 => VolumeData::F64(volume.into_ndarray::<f64>()?),
                other => return Err(ImageError::UnsupportedDatatype(format!("{other:?}"))),
            }
        };

        Ok(AslImage::new(data, header))
    }

    fn volume_count(&self, path: &Path) -> Result<usize, ImageError> {
        let header = NiftiHeader::from_file(path)?;
        Ok(header_volume_count(&header))
    }

    /// The image is first written to a temporary sibling of `path` and then
    /// renamed over it, so a failed write leaves the original file intact.
    fn save(&self, image: &AslImage, path: &Path) -> Result<(), ImageError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staged = tempfile::Builder::new()
            .prefix(".aslcontext-")
            .suffix(Self::suffix(path))
            .tempfile_in(dir)?;

        // voxel values are already scaled
        let mut header = image.header.clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        let writer = WriterOptions::new(staged.path()).reference_header(&header);
        with_array!(&image.data, array => writer.write_nifti(array))?;

        // the staged file is created owner-only; keep the mode of the file it replaces
        if let Ok(metadata) = fs::metadata(path) {
            staged.as_file().set_permissions(metadata.permissions())?;
        }
        staged.persist(path)?;
        Ok(())
    }
}
