use ndarray::Array4;

use super::config::{PreprocessingConfig, TensorLayout};
use super::model::ClassifierError;

/// Decode `image`, resize it to the model resolution and scale pixels to [0, 1].
pub fn preprocess(image: &[u8], config: &PreprocessingConfig) -> Result<Array4<f32>, ClassifierError> {
    let decoded = image::load_from_memory(image)
        .map_err(|e| ClassifierError::InvalidImage(e.to_string()))?;

    let (width, height) = (config.width(), config.height());
    let filter = config
        .filter()
        .map_err(|e| ClassifierError::InvalidImage(e.to_string()))?;
    let rgb = decoded.resize_exact(width, height, filter).to_rgb8();
    if rgb.width() != width || rgb.height() != height {
        return Err(ClassifierError::InvalidImage(format!(
            "resize produced {}x{}, expected {}x{}",
            rgb.width(),
            rgb.height(),
            width,
            height
        )));
    }

    let scale = config.normalization.scale;
    let (w, h) = (width as usize, height as usize);
    let tensor = match config.image.layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / scale
        }),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
            f32::from(rgb.get_pixel(x as u32, y as u32)[c]) / scale
        }),
    };
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::png_bytes;

    #[test]
    fn nhwc_tensor_is_scaled_to_unit_range() {
        let config = PreprocessingConfig::default();
        let tensor = preprocess(&png_bytes(40, 30, [255, 0, 128]), &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(tensor[[0, 10, 10, 0]] > 0.99);
        assert!(tensor[[0, 10, 10, 1]] < 0.01);
    }

    #[test]
    fn nchw_layout_moves_channels_first() {
        let mut config = PreprocessingConfig::default();
        config.image.layout = TensorLayout::Nchw;
        config.image.size = vec![32, 16];
        let tensor = preprocess(&png_bytes(8, 8, [0, 255, 0]), &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 32]);
        assert!(tensor[[0, 1, 5, 5]] > 0.99);
        assert!(tensor[[0, 0, 5, 5]] < 0.01);
    }

    #[test]
    fn undecodable_bytes_are_invalid_image() {
        let config = PreprocessingConfig::default();
        let err = preprocess(b"definitely not a png", &config).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidImage(_)));
    }
}
