//! IDX file reading
//!
//! Header fields are big-endian `u32`s: magic, item count, then (images
//! only) rows and columns. Pixels follow as one byte each.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;

pub const TRAIN_IMAGES: &str = "train-images.idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels.idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images.idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels.idx1-ubyte";

/// Images read from an IDX3 file, pixels scaled to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct IdxImages {
    pub pixels: Vec<f32>,
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> io::Result<u32> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "IDX header is truncated"))?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn check_magic(found: u32, expected: u32) -> io::Result<()> {
    if found != expected {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("bad IDX magic number {} (expected {})", found, expected),
        ));
    }
    Ok(())
}

/// Parses an in-memory IDX3 image file, keeping at most `limit` images.
pub fn parse_idx_images(data: &[u8], limit: Option<usize>) -> io::Result<IdxImages> {
    let mut offset = 0usize;
    check_magic(read_be_u32(data, &mut offset)?, IMAGE_MAGIC)?;
    let total_images = read_be_u32(data, &mut offset)? as usize;
    let rows = read_be_u32(data, &mut offset)? as usize;
    let cols = read_be_u32(data, &mut offset)? as usize;

    let count = limit.map_or(total_images, |limit| limit.min(total_images));
    let src = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .and_then(|n| n.checked_add(offset))
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "IDX image file is truncated"))?;

    Ok(IdxImages {
        pixels: src.iter().map(|&pixel| pixel as f32 / 255.0).collect(),
        count,
        rows,
        cols,
    })
}

/// Parses an in-memory IDX1 label file, keeping at most `limit` labels.
pub fn parse_idx_labels(data: &[u8], limit: Option<usize>) -> io::Result<Vec<u8>> {
    let mut offset = 0usize;
    check_magic(read_be_u32(data, &mut offset)?, LABEL_MAGIC)?;
    let total_labels = read_be_u32(data, &mut offset)? as usize;

    let count = limit.map_or(total_labels, |limit| limit.min(total_labels));
    offset
        .checked_add(count)
        .and_then(|end| data.get(offset..end))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "IDX label file is truncated"))
}

pub fn read_idx_images<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<IdxImages> {
    parse_idx_images(&fs::read(path)?, limit)
}

pub fn read_idx_labels<P: AsRef<Path>>(path: P, limit: Option<usize>) -> io::Result<Vec<u8>> {
    parse_idx_labels(&fs::read(path)?, limit)
}

#[cfg(test)]
pub(crate) fn encode_idx_images(images: &[u8], count: usize, rows: usize, cols: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for value in [IMAGE_MAGIC, count as u32, rows as u32, cols as u32] {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data.extend_from_slice(images);
    data
}

#[cfg(test)]
pub(crate) fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&LABEL_MAGIC.to_be_bytes());
    data.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    data.extend_from_slice(labels);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images_scales_pixels() {
        let data = encode_idx_images(&[0, 255, 51, 102, 0, 0, 0, 0], 2, 2, 2);
        let images = parse_idx_images(&data, None).unwrap();

        assert_eq!((images.count, images.rows, images.cols), (2, 2, 2));
        assert_eq!(images.pixels[..4], [0.0, 1.0, 0.2, 0.4]);
    }

    #[test]
    fn test_parse_images_limit() {
        let data = encode_idx_images(&[1; 12], 3, 2, 2);
        let images = parse_idx_images(&data, Some(1)).unwrap();
        assert_eq!(images.count, 1);
        assert_eq!(images.pixels.len(), 4);
    }

    #[test]
    fn test_truncated_images() {
        let data = encode_idx_images(&[1; 5], 3, 2, 2);
        let err = parse_idx_images(&data, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_header_is_invalid_data() {
        let mut data = Vec::new();
        for value in [IMAGE_MAGIC, u32::MAX, u32::MAX, u32::MAX] {
            data.extend_from_slice(&value.to_be_bytes());
        }
        let err = parse_idx_images(&data, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let mut labels = Vec::new();
        for value in [LABEL_MAGIC, u32::MAX] {
            labels.extend_from_slice(&value.to_be_bytes());
        }
        let err = parse_idx_labels(&labels, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_bad_magic() {
        let data = encode_idx_labels(&[1, 2, 3]);
        assert!(parse_idx_images(&data, None).is_err());
        assert_eq!(parse_idx_labels(&data, Some(2)).unwrap(), vec![1, 2]);
    }
}
