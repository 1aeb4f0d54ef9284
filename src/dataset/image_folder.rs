//! Class-per-directory image dataset
//!
//! The directory should be structured as:
//! ```text
//! root_dir/
//! ├── class_a/
//! │   ├── image1.jpg
//! │   └── image2.png
//! ├── class_b/
//! │   └── ...
//! └── ...
//! ```
//! Class directories are sorted by name to assign label indices.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::imageops::FilterType;
use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::dataset::tensor_dataset::TensorDataset;
use crate::utils::error::{LabError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Image files discovered under a root directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    /// Class names in label order
    pub classes: Vec<String>,
    /// Image path and label index
    pub samples: Vec<(PathBuf, usize)>,
}

impl ImageFolder {
    /// Scan `root_dir` for class directories and their images
    pub fn scan<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(LabError::PathNotFound(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let mut files: Vec<PathBuf> = WalkDir::new(root_dir.join(class_name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| is_image(p))
                .collect();
            files.sort();

            debug!("Class '{}' (label {}): {} images", class_name, label, files.len());
            samples.extend(files.into_iter().map(|p| (p, label)));
        }

        info!("Found {} classes, {} images", classes.len(), samples.len());

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Decode every image in parallel, resized exactly to `height x width`
    ///
    /// Files that fail to decode are skipped with a warning.
    pub fn load(&self, height: usize, width: usize) -> Result<TensorDataset> {
        if self.samples.is_empty() {
            return Err(LabError::Dataset(format!(
                "No images found under {:?}",
                self.root_dir
            )));
        }

        let total = self.samples.len();
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .map_err(|e| LabError::Config(format!("Invalid progress template: {}", e)))?
                .progress_chars("#>-"),
        );

        let loaded = AtomicUsize::new(0);
        let decoded: Vec<Option<(Vec<f32>, usize)>> = self
            .samples
            .par_iter()
            .map(|(path, label)| {
                let result = match load_chw(path, height, width) {
                    Ok(pixels) => Some((pixels, *label)),
                    Err(e) => {
                        warn!("Skipping {}", e);
                        None
                    }
                };
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect();

        let mut features = Vec::with_capacity(total * 3 * height * width);
        let mut labels = Vec::with_capacity(total);
        for (pixels, label) in decoded.into_iter().flatten() {
            features.extend_from_slice(&pixels);
            labels.push(label);
        }
        pb.finish_with_message(format!("Loaded {} images", labels.len()));

        if labels.is_empty() {
            return Err(LabError::Dataset(format!(
                "None of the {} images under {:?} could be decoded",
                total, self.root_dir
            )));
        }

        TensorDataset::new(features, labels, [3, height, width], self.num_classes())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Decode an image into CHW RGB values in `[0, 1]`
pub fn load_chw(path: &Path, height: usize, width: usize) -> Result<Vec<f32>> {
    let img = ImageReader::open(path)
        .map_err(|e| LabError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| LabError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .resize_exact(width as u32, height as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = height * width;
    let mut pixels = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            pixels[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_image(path: &Path, color: [u8; 3]) {
        let img = RgbImage::from_pixel(8, 6, Rgb(color));
        img.save(path).unwrap();
    }

    #[test]
    fn test_scan_and_load() {
        let dir = tempdir().unwrap();
        for class in ["dog", "cat"] {
            std::fs::create_dir_all(dir.path().join(class)).unwrap();
        }
        write_image(&dir.path().join("cat/a.png"), [255, 0, 0]);
        write_image(&dir.path().join("cat/b.png"), [255, 0, 0]);
        write_image(&dir.path().join("dog/c.png"), [0, 0, 255]);
        std::fs::write(dir.path().join("dog/notes.txt"), "not an image").unwrap();
        std::fs::write(dir.path().join("dog/broken.jpg"), "garbage").unwrap();

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.classes, vec!["cat", "dog"]);
        // The text file is filtered out, the broken jpg is not (yet)
        assert_eq!(folder.samples.len(), 4);

        let ds = folder.load(4, 5).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.shape(), [3, 4, 5]);
        assert_eq!(ds.class_counts(), vec![2, 1]);

        let cat = ds.get(0).unwrap();
        assert_eq!(cat.label, 0);
        assert!((cat.pixels[0] - 1.0).abs() < 1e-6);
        assert!(cat.pixels[20..40].iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_missing_root() {
        let result = ImageFolder::scan("/definitely/not/here");
        assert!(matches!(result, Err(LabError::PathNotFound(_))));
    }

    #[test]
    fn test_empty_folder_fails_to_load() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("only_class")).unwrap();
        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert!(folder.load(4, 4).is_err());
    }
}
