// Copyright 2020 @TwoCookingMice

use super::constants::Vector3f;

use std::ops;
use std::vec::Vec;

#[derive(Debug, Clone)]
pub struct Bitmap {
    data: Vec<Vector3f>,
    height: usize,
    width: usize
}

impl ops::Index<(usize, usize)> for Bitmap {
    type Output = Vector3f;

    fn index(&self, index: (usize, usize)) -> &Vector3f {
        &self.data[index.0 + self.width * index.1]
    }
}

impl ops::IndexMut<(usize, usize)> for Bitmap {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Vector3f {
        &mut self.data[index.0 + self.width * index.1]
    }
}

impl Bitmap {
    pub fn new(width: usize, height: usize) -> Self {
        Self { data: vec![Vector3f::zeros(); width * height],
               width,
               height }
    }

    pub fn from_pixels(width: usize, height: usize, data: Vec<Vector3f>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self { data, width, height }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[Vector3f] {
        &self.data
    }

    /// Mean over all pixels and channels.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter()
            .map(|p| p.x as f64 + p.y as f64 + p.z as f64)
            .sum();
        sum / (3.0 * self.data.len() as f64)
    }
}

/* Test for Bitmap */
#[cfg(test)]
mod tests {
    use super::Bitmap;
    use super::{ Vector3f };

    #[test]
    fn test_bitmap_basic_functions() {
        let mut bitmap = Bitmap::new(256usize, 256usize);
        assert_eq!(bitmap.width(), 256);
        assert_eq!(bitmap.height(), 256);

        bitmap[(5, 6)] = Vector3f::new(1.0, 0.5, 0.6);
        assert_eq!(bitmap[(5, 6)][0], 1.0);
        assert_eq!(bitmap[(2, 6)][0], 0.0);
    }

    #[test]
    fn test_bitmap_mean() {
        let mut bitmap = Bitmap::new(2, 1);
        bitmap[(0, 0)] = Vector3f::new(1.0, 1.0, 1.0);
        assert!((bitmap.mean() - 0.5).abs() < 1e-9);
    }
}
