//! The frozen embedding matrix loaded at startup.
//!
//! # Storage Formats
//!
//! - `.npy`: NumPy array file (format versions 1-3), dtype float32, C order,
//!   2-D shape `(rows, dimension)`. Memory-mapped and copied once into a
//!   contiguous row-major buffer.
//! - `.json`: an array of arrays of numbers, one inner array per row.
//!
//! Rows are expected to be L2-normalized by the producer. Non-finite values
//! are rejected; rows whose norm is not close to one are counted so the
//! loader can report them.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use sha2::{Digest, Sha256};

use crate::vector::types::{RowIndex, VectorDimension, VectorError};

/// Magic prefix of every NumPy array file.
const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Allowed deviation of a row norm from 1.0 before the row is reported.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Byte order of the float payload declared by an npy header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

/// Parsed npy header.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NpyHeader {
    byte_order: ByteOrder,
    rows: usize,
    dimension: usize,
    data_offset: usize,
}

/// Dense row-major matrix of unit-length embedding vectors.
///
/// Read-only after construction; the row count and dimension never change.
#[derive(Debug, Clone)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dimension: VectorDimension,
    fingerprint: String,
}

impl EmbeddingMatrix {
    /// Creates a matrix with no rows.
    #[must_use]
    pub fn empty(dimension: VectorDimension) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            dimension,
            fingerprint: fingerprint_of(&[]),
        }
    }

    /// Creates a matrix from a flat row-major buffer.
    ///
    /// # Errors
    /// Returns an error if the buffer length is not a multiple of the
    /// dimension or contains NaN or infinity.
    pub fn from_flat(data: Vec<f32>, dimension: VectorDimension) -> Result<Self, VectorError> {
        let dim = dimension.get();
        if data.len() % dim != 0 {
            return Err(VectorError::InvalidDimension {
                dimension: dim,
                reason: "Buffer length is not a multiple of the dimension",
            });
        }
        if let Some(position) = data.iter().position(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite {
                context: "embedding matrix",
                position,
            });
        }

        let rows = data.len() / dim;
        let fingerprint = fingerprint_of(&data);
        Ok(Self {
            data,
            rows,
            dimension,
            fingerprint,
        })
    }

    /// Creates a matrix from individual rows.
    ///
    /// # Errors
    /// Returns an error if `rows` is empty (the dimension cannot be inferred),
    /// if rows disagree on their length, or if any value is non-finite.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, VectorError> {
        let first_len = rows.first().map(Vec::len).unwrap_or(0);
        let dimension = VectorDimension::new(first_len)?;

        let mut data = Vec::with_capacity(rows.len() * first_len);
        for row in &rows {
            dimension.validate_vector(row)?;
            data.extend_from_slice(row);
        }
        Self::from_flat(data, dimension)
    }

    /// Loads a matrix, choosing the format from the file extension.
    ///
    /// `.json` files are read as arrays of arrays; everything else is
    /// treated as an npy file.
    pub fn load(path: &Path) -> Result<Self, VectorError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::load_json(path)
        } else {
            Self::load_npy(path)
        }
    }

    /// Loads a matrix from a NumPy `.npy` file.
    pub fn load_npy(path: &Path) -> Result<Self, VectorError> {
        let file = File::open(path).map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| VectorError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        if len == 0 {
            return Err(invalid(path, "file is empty"));
        }

        // SAFETY: the snapshot is a frozen file produced offline; it is not
        // modified while the process runs, and the map is dropped before return.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_npy_bytes(&mmap).map_err(|e| match e {
            VectorError::InvalidFormat { reason, .. } => VectorError::InvalidFormat {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parses an in-memory npy buffer.
    pub fn from_npy_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        let header = parse_npy_header(bytes)?;
        let dimension = VectorDimension::new(header.dimension)?;

        let payload = &bytes[header.data_offset..];
        let expected = header
            .rows
            .checked_mul(header.dimension)
            .and_then(|n| n.checked_mul(BYTES_PER_F32))
            .ok_or_else(|| VectorError::InvalidFormat {
                path: PathBuf::new(),
                reason: format!(
                    "shape ({}, {}) is too large to address",
                    header.rows, header.dimension
                ),
            })?;
        if payload.len() != expected {
            return Err(VectorError::InvalidFormat {
                path: PathBuf::new(),
                reason: format!(
                    "payload is {} bytes, shape ({}, {}) needs {expected}",
                    payload.len(),
                    header.rows,
                    header.dimension
                ),
            });
        }

        let data: Vec<f32> = payload
            .chunks_exact(BYTES_PER_F32)
            .map(|chunk| {
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                match header.byte_order {
                    ByteOrder::Little => f32::from_le_bytes(bytes),
                    ByteOrder::Big => f32::from_be_bytes(bytes),
                }
            })
            .collect();

        Self::from_flat(data, dimension)
    }

    /// Loads a matrix from a JSON array of arrays.
    pub fn load_json(path: &Path) -> Result<Self, VectorError> {
        let json = std::fs::read_to_string(path).map_err(|source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rows: Vec<Vec<f32>> =
            serde_json::from_str(&json).map_err(|e| invalid(path, &e.to_string()))?;
        if rows.is_empty() {
            return Err(invalid(path, "JSON matrix has no rows to infer a dimension from"));
        }
        Self::from_rows(rows)
    }

    /// Writes the matrix as a version 1.0 little-endian float32 npy file.
    pub fn save_npy(&self, path: &Path) -> Result<(), VectorError> {
        let io_err = |source| VectorError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::create(path).map_err(io_err)?;
        file.write_all(&self.to_npy_bytes()).map_err(io_err)?;
        file.flush().map_err(io_err)
    }

    /// Serializes the matrix to npy bytes.
    #[must_use]
    pub fn to_npy_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            self.rows,
            self.dimension.get()
        );
        // magic(6) + version(2) + header_len(2) + header + '\n', padded to 64
        let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
        let padding = (64 - unpadded % 64) % 64;
        header.push_str(&" ".repeat(padding));
        header.push('\n');

        let mut bytes = Vec::with_capacity(10 + header.len() + self.data.len() * BYTES_PER_F32);
        bytes.extend_from_slice(NPY_MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Number of rows (N).
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Vector dimension (D).
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns one row, or `None` when out of range.
    #[must_use]
    pub fn row(&self, row: RowIndex) -> Option<&[f32]> {
        let dim = self.dimension.get();
        let start = row.as_usize().checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// The whole row-major buffer.
    #[must_use]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Hex SHA-256 of the little-endian f32 payload.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Rows whose L2 norm deviates from 1.0 by more than [`UNIT_NORM_TOLERANCE`].
    #[must_use]
    pub fn non_unit_rows(&self) -> Vec<RowIndex> {
        self.data
            .chunks_exact(self.dimension.get())
            .enumerate()
            .filter(|(_, row)| {
                let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
                (norm - 1.0).abs() > UNIT_NORM_TOLERANCE
            })
            .filter_map(|(i, _)| RowIndex::from_usize(i))
            .collect()
    }
}

fn invalid(path: &Path, reason: &str) -> VectorError {
    VectorError::InvalidFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn fingerprint_of(data: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in data {
        hasher.update(value.to_le_bytes());
    }
    let result = hasher.finalize();
    format!("{result:x}")
}

fn parse_npy_header(bytes: &[u8]) -> Result<NpyHeader, VectorError> {
    let bad = |reason: String| VectorError::InvalidFormat {
        path: PathBuf::new(),
        reason,
    };

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(bad("missing NUMPY magic bytes".to_string()));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(bad("truncated header length".to_string()));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        other => return Err(bad(format!("unsupported npy format version {other}"))),
    };

    let data_offset = header_start + header_len;
    if bytes.len() < data_offset {
        return Err(bad("truncated header".to_string()));
    }
    let header = std::str::from_utf8(&bytes[header_start..data_offset])
        .map_err(|_| bad("header is not valid UTF-8".to_string()))?;

    let descr = header_value(header, "descr")
        .and_then(|v| v.strip_prefix('\''))
        .and_then(|v| v.split('\'').next())
        .ok_or_else(|| bad("header has no 'descr'".to_string()))?;
    let byte_order = match descr {
        "<f4" | "=f4" => ByteOrder::Little,
        ">f4" => ByteOrder::Big,
        other => return Err(bad(format!("dtype {other} is not float32"))),
    };

    let fortran = header_value(header, "fortran_order")
        .ok_or_else(|| bad("header has no 'fortran_order'".to_string()))?;
    if fortran.starts_with("True") {
        return Err(bad("Fortran-ordered arrays are not supported".to_string()));
    }

    let shape = header_value(header, "shape")
        .and_then(|v| v.strip_prefix('('))
        .and_then(|v| v.split(')').next())
        .ok_or_else(|| bad("header has no 'shape'".to_string()))?;
    let dims = shape
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| bad(format!("invalid shape ({shape}): {e}")))?;

    match dims.as_slice() {
        [rows, dimension] => Ok(NpyHeader {
            byte_order,
            rows: *rows,
            dimension: *dimension,
            data_offset,
        }),
        _ => Err(bad(format!("expected a 2-D array, got shape ({shape})"))),
    }
}

/// Returns the text following `'key':` in a Python dict literal.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}
