//! Chunk scalar fields and fragment emission
//!
//! The field of a chunk holds one material word per sample (0 = air) on a
//! `(resolution + 1)^3` lattice, so consumers can read one sample past the
//! chunk's upper faces. The terrain generator is integer-only value noise and
//! is mirrored sample-for-sample by `construct_field` in `svo_builder.wgsl`.

use glam::UVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::{ChunkIndex, Result};
use crate::voxel::svo::fragment::FragmentEntry;

/// Surface material color (0xRRGGBB)
pub const GRASS: u32 = 0x5DA130;
/// Material of the few voxels below the surface
pub const DIRT: u32 = 0x7A5230;
/// Material of everything deeper
pub const STONE: u32 = 0x7F7F7F;

/// Depth (in voxels) of the dirt layer below the surface voxel
pub const DIRT_DEPTH: u32 = 4;

/// Anything that can say which material occupies a world voxel (0 = air)
pub trait FieldSource: Send + Sync {
    fn material_at(&self, world: UVec3) -> u32;
}

impl<F> FieldSource for F
where
    F: Fn(UVec3) -> u32 + Send + Sync,
{
    fn material_at(&self, world: UVec3) -> u32 {
        self(world)
    }
}

/// Parameters of the procedural heightfield
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    pub seed: u32,
    /// Height of the lowest possible surface, in voxels
    pub base_height: u32,
    /// Height added by the first octave at full strength, in voxels
    pub amplitude: u32,
    /// Lattice cell size of the first octave, in voxels
    pub feature_size: u32,
    /// Octaves; each halves cell size and amplitude
    pub octaves: u32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            base_height: 24,
            amplitude: 64,
            feature_size: 96,
            octaves: 4,
        }
    }
}

impl TerrainParams {
    pub fn validate(&self) -> Result<()> {
        if self.amplitude > u16::MAX as u32 {
            return Err(Error::Config(format!(
                "terrain.amplitude must be <= {}, got {}",
                u16::MAX,
                self.amplitude
            )));
        }
        if self.feature_size == 0 || self.feature_size > 4096 {
            return Err(Error::Config(format!(
                "terrain.feature_size must be in 1..=4096, got {}",
                self.feature_size
            )));
        }
        if self.octaves > 8 {
            return Err(Error::Config(format!(
                "terrain.octaves must be <= 8, got {}",
                self.octaves
            )));
        }
        Ok(())
    }
}

/// Integer hash of a 2D lattice point
#[inline]
fn hash2(x: u32, z: u32, seed: u32) -> u32 {
    let mut h = x.wrapping_mul(0x8DA6_B343) ^ z.wrapping_mul(0xD816_3841) ^ seed.wrapping_mul(0xCB1A_B31F);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    h
}

/// Bilinear value noise in 0..=65535 with lattice spacing `cell`
fn value_noise(x: u32, z: u32, cell: u32, seed: u32) -> u32 {
    let (cx, cz) = (x / cell, z / cell);
    let (fx, fz) = (x % cell, z % cell);

    let a = hash2(cx, cz, seed) & 0xFFFF;
    let b = hash2(cx + 1, cz, seed) & 0xFFFF;
    let c = hash2(cx, cz + 1, seed) & 0xFFFF;
    let d = hash2(cx + 1, cz + 1, seed) & 0xFFFF;

    let near = (a * (cell - fx) + b * fx) / cell;
    let far = (c * (cell - fx) + d * fx) / cell;
    (near * (cell - fz) + far * fz) / cell
}

/// Procedural heightfield terrain
#[derive(Clone, Debug)]
pub struct TerrainField {
    params: TerrainParams,
}

impl TerrainField {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Surface height at a world column; voxels with `y < height` are solid
    pub fn height_at(&self, x: u32, z: u32) -> u32 {
        let p = &self.params;
        let mut height = p.base_height;
        let mut cell = p.feature_size;
        let mut amplitude = p.amplitude;

        for octave in 0..p.octaves {
            if cell == 0 || amplitude == 0 {
                break;
            }
            let n = value_noise(x, z, cell, p.seed.wrapping_add(octave));
            height += (n * amplitude) >> 16;
            cell >>= 1;
            amplitude >>= 1;
        }
        height
    }
}

impl FieldSource for TerrainField {
    fn material_at(&self, world: UVec3) -> u32 {
        let height = self.height_at(world.x, world.z);
        if world.y >= height {
            return 0;
        }
        match height - 1 - world.y {
            0 => GRASS,
            d if d < DIRT_DEPTH => DIRT,
            _ => STONE,
        }
    }
}

/// Dense material samples of one chunk, reused from chunk to chunk
pub struct ChunkField {
    resolution: u32,
    samples: Vec<u32>,
}

impl ChunkField {
    pub fn new(resolution: u32) -> Self {
        let edge = resolution as usize + 1;
        Self {
            resolution,
            samples: vec![0; edge * edge * edge],
        }
    }

    /// Sample lattice edge length
    pub fn edge(&self) -> u32 {
        self.resolution + 1
    }

    /// Fill every sample of `chunk` from `source`
    pub fn construct(&mut self, source: &dyn FieldSource, chunk: ChunkIndex) {
        let edge = self.edge();
        let origin = chunk * self.resolution;
        self.samples.par_iter_mut().enumerate().for_each(|(i, sample)| {
            let local = delinearize(i as u32, edge);
            *sample = source.material_at(origin + local);
        });
    }

    /// Material at a lattice sample (0..=resolution on every axis)
    pub fn sample(&self, local: UVec3) -> u32 {
        let edge = self.edge();
        self.samples[(local.x + local.y * edge + local.z * edge * edge) as usize]
    }

    /// Emit one fragment per occupied cell into `out` (cleared first).
    /// Returns the fragment count.
    pub fn create_fragments(&self, out: &mut Vec<FragmentEntry>) -> u32 {
        let resolution = self.resolution;
        let cells = resolution * resolution * resolution;

        out.clear();
        out.par_extend((0..cells).into_par_iter().filter_map(|i| {
            let local = delinearize(i, resolution);
            match self.sample(local) {
                0 => None,
                material => Some(FragmentEntry::new(local, material)),
            }
        }));
        out.len() as u32
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }
}

/// Linear index to coordinate, x varying fastest
#[inline]
fn delinearize(i: u32, edge: u32) -> UVec3 {
    UVec3::new(i % edge, (i / edge) % edge, i / (edge * edge))
}
