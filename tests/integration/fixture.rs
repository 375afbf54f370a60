//! Writer for small level-5 MAT-files and the beam files built from it.

use flate2::write::ZlibEncoder;
use ndarray::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tfbeam::STAT_NAMES;

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_CHAR: u32 = 4;
const MX_DOUBLE: u32 = 6;

pub const NVOX: usize = 4;
pub const NTIME: usize = 3;
pub const NFREQ: usize = 2;

/// A MATLAB value to write. Cells are written as `1 x n` and structs as
/// `1 x 1`.
#[derive(Clone, Debug)]
pub enum Mat {
    Num(ArrayD<f64>),
    Char(String),
    Cell(Vec<Mat>),
    Struct(Vec<(&'static str, Mat)>),
    Empty,
}

impl Mat {
    pub fn num<D: Dimension>(array: Array<f64, D>) -> Mat {
        Mat::Num(array.into_dyn())
    }
}

fn element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn small_element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) {
    assert!(data.len() <= 4);
    out.extend_from_slice(&((data.len() as u32) << 16 | data_type).to_le_bytes());
    let mut packed = [0; 4];
    packed[..data.len()].copy_from_slice(data);
    out.extend_from_slice(&packed);
}

/// Encodes `value` as a complete `miMATRIX` element.
pub fn matrix(name: &str, value: &Mat) -> Vec<u8> {
    let mut out = Vec::new();
    let (class, dims) = match value {
        Mat::Empty => {
            element(&mut out, MI_MATRIX, &[]);
            return out;
        }
        Mat::Num(array) => (MX_DOUBLE, array.shape().to_vec()),
        Mat::Char(s) => (MX_CHAR, vec![1, s.encode_utf16().count()]),
        Mat::Cell(items) => (MX_CELL, vec![1, items.len()]),
        Mat::Struct(_) => (MX_STRUCT, vec![1, 1]),
    };

    let mut body = Vec::new();
    let mut flags = class.to_le_bytes().to_vec();
    flags.extend_from_slice(&[0; 4]);
    element(&mut body, MI_UINT32, &flags);
    let dims: Vec<u8> = dims
        .iter()
        .flat_map(|&d| (d as i32).to_le_bytes())
        .collect();
    element(&mut body, MI_INT32, &dims);
    element(&mut body, MI_INT8, name.as_bytes());

    match value {
        Mat::Num(array) => {
            // Column-major order.
            let data: Vec<u8> = array.t().iter().flat_map(|v| v.to_le_bytes()).collect();
            element(&mut body, MI_DOUBLE, &data);
        }
        Mat::Char(s) => {
            let data: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
            element(&mut body, MI_UINT16, &data);
        }
        Mat::Cell(items) => {
            for item in items {
                body.extend(matrix("", item));
            }
        }
        Mat::Struct(fields) => {
            small_element(&mut body, MI_INT32, &32i32.to_le_bytes());
            let mut names = Vec::new();
            for (name, _) in fields {
                let mut padded = name.as_bytes().to_vec();
                padded.resize(32, 0);
                names.extend(padded);
            }
            element(&mut body, MI_INT8, &names);
            for (_, field) in fields {
                body.extend(matrix("", field));
            }
        }
        Mat::Empty => unreachable!(),
    }
    element(&mut out, MI_MATRIX, &body);
    out
}

/// A named cell array declaring `dims` but holding no items.
pub fn hollow_cell(name: &str, dims: &[i32]) -> Vec<u8> {
    hollow(name, MX_CELL, dims, &[])
}

/// A named struct array declaring `dims` and `fields` but holding no values.
pub fn hollow_struct(name: &str, dims: &[i32], fields: &[&str]) -> Vec<u8> {
    hollow(name, MX_STRUCT, dims, fields)
}

fn hollow(name: &str, class: u32, dims: &[i32], fields: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut flags = class.to_le_bytes().to_vec();
    flags.extend_from_slice(&[0; 4]);
    element(&mut body, MI_UINT32, &flags);
    let dims: Vec<u8> = dims.iter().flat_map(|d| d.to_le_bytes()).collect();
    element(&mut body, MI_INT32, &dims);
    element(&mut body, MI_INT8, name.as_bytes());
    if class == MX_STRUCT {
        small_element(&mut body, MI_INT32, &32i32.to_le_bytes());
        let mut names = Vec::new();
        for field in fields {
            let mut padded = field.as_bytes().to_vec();
            padded.resize(32, 0);
            names.extend(padded);
        }
        element(&mut body, MI_INT8, &names);
    }
    let mut out = Vec::new();
    element(&mut out, MI_MATRIX, &body);
    out
}

/// The 128-byte file header with the given version and endian indicator.
pub fn header_with(version: u16, indicator: &[u8; 2]) -> Vec<u8> {
    let mut header = b"MATLAB 5.0 MAT-file, written by the tfbeam test suite".to_vec();
    header.resize(116, b' ');
    header.extend_from_slice(&[0; 8]);
    header.extend_from_slice(&version.to_le_bytes());
    header.extend_from_slice(indicator);
    header
}

#[derive(Default)]
pub struct MatFileBuilder {
    variables: Vec<u8>,
}

impl MatFileBuilder {
    pub fn new() -> MatFileBuilder {
        MatFileBuilder::default()
    }

    pub fn variable(mut self, name: &str, value: &Mat) -> MatFileBuilder {
        self.variables.extend(matrix(name, value));
        self
    }

    /// Adds an already encoded top-level element.
    pub fn raw(mut self, element: Vec<u8>) -> MatFileBuilder {
        self.variables.extend(element);
        self
    }

    /// Adds a variable wrapped in an `miCOMPRESSED` element, as MATLAB's
    /// `-v7` format does.
    pub fn compressed(mut self, name: &str, value: &Mat) -> MatFileBuilder {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&matrix(name, value)).unwrap();
        let data = encoder.finish().unwrap();
        self.variables.extend_from_slice(&MI_COMPRESSED.to_le_bytes());
        self.variables
            .extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.variables.extend(data);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = header_with(0x0100, b"IM");
        bytes.extend_from_slice(&self.variables);
        bytes
    }

    pub fn write(&self, path: &Path) {
        fs::write(path, self.to_bytes()).unwrap();
    }
}

/// A signal whose ratio to `signal(c)` is `k / c` everywhere.
pub fn signal(k: f64) -> ArrayD<f64> {
    Array3::from_shape_fn((NVOX, NTIME, NFREQ), |(v, t, f)| {
        k * (1 + v + 10 * t + 100 * f) as f64
    })
    .into_dyn()
}

pub fn voxels() -> Array2<f64> {
    Array2::from_shape_fn((NVOX, 3), |(v, c)| (10 * v + c) as f64)
}

pub fn bands() -> Array2<f64> {
    array![[4., 8.], [8., 13.]]
}

pub fn timepts() -> Array1<f64> {
    array![0., 0.1, 0.2]
}

/// Fields of a beam whose `F dB` comparison is `10 * log10(2)` everywhere.
pub fn base_fields() -> Vec<(&'static str, Mat)> {
    vec![
        ("s", Mat::Cell(vec![Mat::Num(signal(4.)), Mat::Num(signal(2.))])),
        ("voxels", Mat::num(voxels())),
        ("voxelsize", Mat::num(array![[5., 5., 5.]])),
        ("srate", Mat::num(array![[1200.]])),
        ("timewindow", Mat::num(array![[0., 0.25]])),
        ("bands", Mat::num(bands())),
        ("timepts", Mat::num(timepts().insert_axis(Axis(1)))),
        ("coreg", Mat::Struct(vec![("norm_mripath", Mat::Char("T1.nii".to_owned()))])),
        ("sa", Mat::Empty),
    ]
}

/// Distinct data for the `index`th statistic.
pub fn stat(index: usize) -> ArrayD<f64> {
    Array3::from_shape_fn((NVOX, NTIME, NFREQ), |(v, t, f)| {
        index as f64 + (v * NTIME * NFREQ + t * NFREQ + f) as f64 / 100.
    })
    .into_dyn()
}

/// An `snpm` struct holding the first `count` statistics.
pub fn snpm(count: usize) -> Mat {
    Mat::Struct(
        STAT_NAMES
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, &name)| (name, Mat::Num(stat(i))))
            .collect(),
    )
}

pub fn beam_with(fields: Vec<(&'static str, Mat)>) -> MatFileBuilder {
    MatFileBuilder::new().variable("beam", &Mat::Struct(fields))
}

/// Writes a beam file without statistics.
pub fn write_base_beam(path: &Path) {
    beam_with(base_fields()).write(path);
}

/// Writes a beam file carrying the first `count` statistics.
pub fn write_stats_beam(path: &Path, count: usize) {
    let mut fields = base_fields();
    fields.push(("snpm", snpm(count)));
    beam_with(fields).write(path);
}
