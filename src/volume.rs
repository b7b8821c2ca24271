use crate::volume_loader::ImageError;

use ndarray::{ArrayD, Axis};
use nifti::NiftiHeader;

/// Axis along which an ASL series stacks its volumes (x, y, z, t).
pub const VOLUME_AXIS: usize = 3;

/// Voxel data in the type it is stored with on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeData {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    U32(ArrayD<u32>),
    I64(ArrayD<i64>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

macro_rules! with_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            VolumeData::U8($array) => $body,
            VolumeData::I8($array) => $body,
            VolumeData::I16($array) => $body,
            VolumeData::U16($array) => $body,
            VolumeData::I32($array) => $body,
            VolumeData::U32($array) => $body,
            VolumeData::I64($array) => $body,
            VolumeData::U64($array) => $body,
            VolumeData::F32($array) => $body,
            VolumeData::F64($array) => $body,
        }
    };
}

macro_rules! map_array {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            VolumeData::U8($array) => VolumeData::U8($body),
            VolumeData::I8($array) => VolumeData::I8($body),
            VolumeData::I16($array) => VolumeData::I16($body),
            VolumeData::U16($array) => VolumeData::U16($body),
            VolumeData::I32($array) => VolumeData::I32($body),
            VolumeData::U32($array) => VolumeData::U32($body),
            VolumeData::I64($array) => VolumeData::I64($body),
            VolumeData::U64($array) => VolumeData::U64($body),
            VolumeData::F32($array) => VolumeData::F32($body),
            VolumeData::F64($array) => VolumeData::F64($body),
        }
    };
}

pub(crate) use with_array;

impl VolumeData {
    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of volumes; a 3-D image counts as a single volume.
    pub fn volume_count(&self) -> usize {
        match self.shape().get(VOLUME_AXIS) {
            Some(&count) => count,
            None => 1,
        }
    }

    fn select_volumes(&self, keep: &[usize]) -> VolumeData {
        map_array!(self, array => array.select(Axis(VOLUME_AXIS), keep))
    }
}

/// A loaded ASL series: voxel data plus the header it was read with.
#[derive(Debug, Clone)]
pub struct AslImage {
    pub data: VolumeData,
    pub header: NiftiHeader,
}

impl AslImage {
    pub fn new(data: VolumeData, header: NiftiHeader) -> Self {
        Self { data, header }
    }

    pub fn volume_count(&self) -> usize {
        self.data.volume_count()
    }

    /// Voxel to world transform. The sform rows are used when present,
    /// otherwise a scaling matrix is built from the voxel sizes.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        let header = &self.header;
        if header.sform_code > 0 {
            let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
            [
                row(&header.srow_x),
                row(&header.srow_y),
                row(&header.srow_z),
                [0.0, 0.0, 0.0, 1.0],
            ]
        } else {
            let p = &header.pixdim;
            [
                [p[1] as f64, 0.0, 0.0, 0.0],
                [0.0, p[2] as f64, 0.0, 0.0],
                [0.0, 0.0, p[3] as f64, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    /// Build a new image holding only the volumes at `keep`, in the order given.
    /// The header is carried over with its volume dimension updated.
    ///
    /// # Errors
    ///
    /// Returns error if the image is not 4-D or an index is out of range
    pub fn select_volumes(&self, keep: &[usize]) -> Result<AslImage, ImageError> {
        let ndim = self.data.ndim();
        if ndim != 4 {
            return Err(ImageError::NotFourDimensional { ndim });
        }
        let count = self.volume_count();
        if let Some(&index) = keep.iter().find(|&&index| index >= count) {
            return Err(ImageError::VolumeOutOfRange { index, count });
        }

        let mut header = self.header.clone();
        header.dim[VOLUME_AXIS + 1] = keep.len() as u16;

        Ok(AslImage::new(self.data.select_volumes(keep), header))
    }
}

/// Volume count as recorded in a NIfTI header.
pub fn header_volume_count(header: &NiftiHeader) -> usize {
    if header.dim[0] >= 4 {
        header.dim[4] as usize
    } else {
        1
    }
}
