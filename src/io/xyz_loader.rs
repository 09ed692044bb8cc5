// Copyright @yucwang 2026

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::core::error::{try_reserve, RenderError};
use crate::math::constants::Float;
use crate::volumes::density_field::DensityField;

/// Header of a `.xyz` grid: dimensions followed by the voxel size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyzHeader {
    pub dims: [usize; 3],
    pub voxel_size: [f64; 3],
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, RenderError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64, RenderError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

pub fn load_xyz_from_file<P: AsRef<Path>>(path: P) -> Result<DensityField, RenderError> {
    let path = path.as_ref();
    log::info!("Loading density grid from: {}.", path.display());
    let mut reader = BufReader::new(File::open(path)?);
    load_xyz(&mut reader)
}

/// Reads a dense grid stored z fastest and rescales it to [0, 1] with the
/// minimum taken as `min(0, min value)`.
pub fn load_xyz<R: Read>(reader: &mut R) -> Result<DensityField, RenderError> {
    let nx = read_u32(reader)? as usize;
    let ny = read_u32(reader)? as usize;
    let nz = read_u32(reader)? as usize;
    let header = XyzHeader {
        dims: [nx, ny, nz],
        voxel_size: [read_f64(reader)?, read_f64(reader)?, read_f64(reader)?],
    };
    let total = nx.checked_mul(ny)
        .and_then(|v| v.checked_mul(nz))
        .ok_or_else(|| RenderError::Parse(format!("grid dimensions overflow: {:?}", header.dims)))?;

    let mut raw = Vec::new();
    try_reserve(&mut raw, total * 4, "xyz file data")?;
    reader.take((total * 4) as u64).read_to_end(&mut raw)?;
    if raw.len() != total * 4 {
        return Err(RenderError::Parse(format!("xyz data truncated: {} of {} bytes", raw.len(), total * 4)));
    }

    let mut data: Vec<Float> = Vec::new();
    try_reserve(&mut data, total, "density field")?;
    data.resize(total, 0.0);
    for (i, chunk) in raw.chunks_exact(4).enumerate() {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let z = i % nz;
        let y = (i / nz) % ny;
        let x = i / (nz * ny);
        data[x + (y + z * ny) * nx] = value;
    }

    let min_value = data.iter().cloned().fold(0.0, Float::min);
    let max_value = data.iter().cloned().fold(Float::MIN, Float::max);
    let range = max_value - min_value;
    if range > 0.0 {
        data.iter_mut().for_each(|v| *v = (*v - min_value) / range);
    }

    log::info!("Density grid {}x{}x{}, voxel size {:?}.", nx, ny, nz, header.voxel_size);
    Ok(DensityField::new(header.dims, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(dims: [u32; 3], values_z_fastest: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for d in dims.iter() {
            bytes.extend_from_slice(&d.to_le_bytes());
        }
        for s in [0.5f64, 0.5, 0.5].iter() {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        for v in values_z_fastest {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_transposes_and_normalizes() {
        // 2x1x3 grid, value = x * 10 + z in file order (z fastest).
        let mut values = Vec::new();
        for x in 0..2 {
            for z in 0..3 {
                values.push((x * 10 + z) as f32);
            }
        }
        let bytes = encode([2, 1, 3], &values);
        let field = load_xyz(&mut &bytes[..]).unwrap();
        assert_eq!(field.dims(), [2, 1, 3]);
        assert_eq!(field.value(1, 0, 2), 1.0);
        assert_eq!(field.value(0, 0, 0), 0.0);
        assert!((field.value(1, 0, 0) - 10.0 / 12.0).abs() < 1e-6);
        assert!((field.value(0, 0, 2) - 2.0 / 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_truncated_data_is_an_error() {
        let mut bytes = encode([2, 2, 2], &[1.0; 8]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(load_xyz(&mut &bytes[..]), Err(RenderError::Parse(_))));
        assert!(matches!(load_xyz(&mut &bytes[..10]), Err(RenderError::Io(_))));
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let bytes = encode([0, 4, 4], &[]);
        assert!(matches!(load_xyz(&mut &bytes[..]), Err(RenderError::Config(_))));
    }
}
