use crate::error::{Result, ShardKnnError};
use crate::types::GlobalDocId;
use rand::Rng;
use std::sync::Arc;

/// A vector with a global id and floating-point data.
/// The data is stored in an Arc for cheap cloning.
#[derive(Clone, Debug)]
pub struct Vector {
    pub id: GlobalDocId,
    pub data: Arc<[f32]>,
}

impl Vector {
    /// Create a new vector with the given ID and data.
    pub fn new(id: impl Into<GlobalDocId>, data: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    /// Create a random unit-length vector drawn from `rng`.
    pub fn random_unit<R: Rng + ?Sized>(id: impl Into<GlobalDocId>, dim: usize, rng: &mut R) -> Self {
        Self::new(id, random_unit_data(dim, rng))
    }

    /// Return the dimensionality of this vector.
    pub fn dim(&self) -> usize {
        self.data.len()
    }
}

/// Components uniformly drawn from [-1, 1], then scaled to unit length.
pub fn random_unit_data<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> Vec<f32> {
    let mut data: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
    normalize(&mut data);
    data
}

/// Scale `data` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(data: &mut [f32]) {
    let norm = data.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in data.iter_mut() {
            *x /= norm;
        }
    }
}

/// A dense collection of equal-length vectors stored row-major in one buffer.
///
/// This is the in-memory form of a `.vec` file: row `i` is the vector at
/// position `i` of the file, which is also its global document id when the
/// set holds a full document collection.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorSet {
    dim: usize,
    data: Vec<f32>,
}

impl VectorSet {
    /// Create an empty set of `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    /// Wrap a flat buffer. Its length must be a multiple of `dim`.
    pub fn from_flat(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            return Err(ShardKnnError::invalid_parameter("dimension must be >= 1"));
        }
        if data.len() % dim != 0 {
            return Err(ShardKnnError::invalid_format(format!(
                "flat buffer of {} floats is not a multiple of dim {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { dim, data })
    }

    /// Build a set from individual rows, all of which must have length `dim`.
    pub fn from_rows<I, V>(dim: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
    {
        let mut set = Self::new(dim);
        for row in rows {
            set.push(row.as_ref())?;
        }
        Ok(set)
    }

    /// Generate `n` random unit vectors.
    pub fn random_unit<R: Rng + ?Sized>(n: usize, dim: usize, rng: &mut R) -> Self {
        let mut data = Vec::with_capacity(n * dim);
        for _ in 0..n {
            data.extend(random_unit_data(dim, rng));
        }
        Self { dim, data }
    }

    /// Append one row.
    pub fn push(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(ShardKnnError::dimension_mismatch(self.dim, row.len()));
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Append every row of `other`.
    pub fn extend_from(&mut self, other: &VectorSet) -> Result<()> {
        if other.dim != self.dim {
            return Err(ShardKnnError::dimension_mismatch(self.dim, other.dim));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Copy rows `start..end` into a new set.
    pub fn slice(&self, start: usize, end: usize) -> VectorSet {
        VectorSet {
            dim: self.dim,
            data: self.data[start * self.dim..end * self.dim].to_vec(),
        }
    }

    /// Row `i`.
    #[inline]
    pub fn get(&self, i: usize) -> &[f32] {
        let start = i * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Iterate rows in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dim)
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Return true if the set holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying row-major buffer.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Consume the set, returning the row-major buffer.
    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }
}
