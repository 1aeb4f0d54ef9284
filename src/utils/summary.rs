//! TensorBoard summary writer
//!
//! Writes scalar and image summaries to an `events.out.tfevents.*` file using
//! TFRecord framing:
//!
//! ```text
//! u64  length (little endian)
//! u32  masked crc32c(length)
//! [u8] protobuf-encoded Event
//! u32  masked crc32c(data)
//! ```

use std::{
    fs::{self, File},
    io::{BufWriter, Cursor, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::BytesMut;
use image::{ImageFormat, RgbImage};
use prost::Message;

use crate::utils::error::{LabError, Result};

const FILE_VERSION: &str = "brain.Event:2";

/// Append-only TensorBoard event file
pub struct SummaryWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl SummaryWriter {
    /// Create a new event file inside `dir` and write the version header
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let filename = format!(
            "events.out.tfevents.{}.{}",
            current_unix_timestamp(),
            hostname()
        );
        let path = dir.join(filename);
        let file = File::create(&path).map_err(|err| {
            LabError::Summary(format!("failed to create {}: {err}", path.display()))
        })?;

        let mut writer = Self {
            writer: BufWriter::new(file),
            path,
        };
        writer.write_event(&Event {
            wall_time: current_wall_time(),
            step: 0,
            file_version: Some(FILE_VERSION.to_string()),
            summary: None,
        })?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a scalar value under `tag` at `step`
    pub fn add_scalar(&mut self, tag: &str, value: f64, step: i64) -> Result<()> {
        self.write_summary(
            step,
            summary::Value {
                tag: tag.to_string(),
                simple_value: Some(value as f32),
                image: None,
            },
        )
    }

    /// Record a PNG-encoded image under `tag` at `step`
    pub fn add_image(&mut self, tag: &str, image: EncodedImage, step: i64) -> Result<()> {
        self.write_summary(
            step,
            summary::Value {
                tag: tag.to_string(),
                simple_value: None,
                image: Some(summary::Image {
                    height: image.height as i32,
                    width: image.width as i32,
                    colorspace: 3,
                    encoded_image_string: image.png,
                }),
            },
        )
    }

    fn write_summary(&mut self, step: i64, value: summary::Value) -> Result<()> {
        self.write_event(&Event {
            wall_time: current_wall_time(),
            step,
            file_version: None,
            summary: Some(Summary { value: vec![value] }),
        })
    }

    fn write_event(&mut self, event: &Event) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(event.encoded_len());
        event
            .encode(&mut buffer)
            .map_err(|err| LabError::Summary(format!("failed to encode event: {err}")))?;

        let data = buffer.freeze();
        let len_bytes = (data.len() as u64).to_le_bytes();

        self.writer.write_all(&len_bytes)?;
        self.writer.write_all(&masked_crc32c(&len_bytes).to_le_bytes())?;
        self.writer.write_all(&data)?;
        self.writer.write_all(&masked_crc32c(&data).to_le_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// PNG bytes with their dimensions
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub png: Vec<u8>,
    pub height: u32,
    pub width: u32,
}

/// Tile CHW images with values in `[0, 1]` into a single RGB PNG
///
/// Single-channel images are replicated across RGB. Images are laid out
/// row by row, `cols` per row.
pub fn encode_grid(
    images: &[Vec<f32>],
    shape: [usize; 3],
    cols: usize,
) -> Result<EncodedImage> {
    let [channels, height, width] = shape;
    if images.is_empty() || cols == 0 {
        return Err(LabError::Summary("no images to tile".to_string()));
    }
    if channels != 1 && channels != 3 {
        return Err(LabError::Summary(format!(
            "cannot render {} channel images",
            channels
        )));
    }

    let cols = cols.min(images.len());
    let rows = images.len().div_ceil(cols);
    let grid_w = (cols * width) as u32;
    let grid_h = (rows * height) as u32;
    let plane = height * width;

    let mut grid = RgbImage::new(grid_w, grid_h);
    for (i, pixels) in images.iter().enumerate() {
        if pixels.len() != channels * plane {
            return Err(LabError::Summary(format!(
                "image {} has {} values, expected {}",
                i,
                pixels.len(),
                channels * plane
            )));
        }
        let x0 = (i % cols) * width;
        let y0 = (i / cols) * height;

        for y in 0..height {
            for x in 0..width {
                let offset = y * width + x;
                let rgb = [0usize, 1, 2].map(|c| {
                    let channel = if channels == 1 { 0 } else { c };
                    to_u8(pixels[channel * plane + offset])
                });
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, image::Rgb(rgb));
            }
        }
    }

    let mut png = Vec::new();
    grid.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| LabError::Summary(format!("failed to encode PNG: {err}")))?;

    Ok(EncodedImage {
        png,
        height: grid_h,
        width: grid_w,
    })
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Masked CRC-32C as used by TFRecord framing
fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(0xa282_ead8)
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn current_wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.0)
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

#[derive(Clone, PartialEq, Message)]
struct Event {
    #[prost(double, tag = "1")]
    wall_time: f64,
    #[prost(int64, tag = "2")]
    step: i64,
    #[prost(string, optional, tag = "3")]
    file_version: Option<String>,
    #[prost(message, optional, tag = "5")]
    summary: Option<Summary>,
}

#[derive(Clone, PartialEq, Message)]
struct Summary {
    #[prost(message, repeated, tag = "1")]
    value: Vec<summary::Value>,
}

mod summary {
    use prost::Message;

    #[derive(Clone, PartialEq, Message)]
    pub struct Value {
        #[prost(string, tag = "1")]
        pub tag: String,
        #[prost(float, optional, tag = "2")]
        pub simple_value: Option<f32>,
        #[prost(message, optional, tag = "4")]
        pub image: Option<Image>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct Image {
        #[prost(int32, tag = "1")]
        pub height: i32,
        #[prost(int32, tag = "2")]
        pub width: i32,
        #[prost(int32, tag = "3")]
        pub colorspace: i32,
        #[prost(bytes = "vec", tag = "4")]
        pub encoded_image_string: Vec<u8>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Split a TFRecord stream into its payloads, checking both CRCs
    fn read_records(bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut records = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let len_bytes = &bytes[pos..pos + 8];
            let len = u64::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            let len_crc = u32::from_le_bytes(bytes[pos + 8..pos + 12].try_into().unwrap());
            assert_eq!(len_crc, masked_crc32c(len_bytes));

            let data = &bytes[pos + 12..pos + 12 + len];
            let data_crc =
                u32::from_le_bytes(bytes[pos + 12 + len..pos + 16 + len].try_into().unwrap());
            assert_eq!(data_crc, masked_crc32c(data));

            records.push(data.to_vec());
            pos += 16 + len;
        }
        records
    }

    #[test]
    fn test_crc32c_check_value() {
        assert_eq!(crc32c::crc32c(b"123456789"), 0xE306_9283);
        assert_eq!(masked_crc32c(b""), 0xa282_ead8);
    }

    #[test]
    fn test_event_file_layout() {
        let dir = tempdir().unwrap();
        let path = {
            let mut writer = SummaryWriter::create(dir.path()).unwrap();
            writer.add_scalar("Train/loss", 0.5, 3).unwrap();
            writer.add_scalar("Val/accuracy", 0.75, 1).unwrap();
            writer.path().to_path_buf()
        };

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("events.out.tfevents."));

        let records = read_records(&std::fs::read(&path).unwrap());
        assert_eq!(records.len(), 3);

        let header = Event::decode(records[0].as_slice()).unwrap();
        assert_eq!(header.file_version.as_deref(), Some(FILE_VERSION));

        let scalar = Event::decode(records[1].as_slice()).unwrap();
        assert_eq!(scalar.step, 3);
        let value = &scalar.summary.unwrap().value[0];
        assert_eq!(value.tag, "Train/loss");
        assert_eq!(value.simple_value, Some(0.5));
    }

    #[test]
    fn test_image_summary() {
        let dir = tempdir().unwrap();
        let mut writer = SummaryWriter::create(dir.path()).unwrap();

        let images = vec![vec![0.0f32; 3 * 4 * 5], vec![1.0f32; 3 * 4 * 5], vec![0.5f32; 3 * 4 * 5]];
        let grid = encode_grid(&images, [3, 4, 5], 2).unwrap();
        assert_eq!((grid.width, grid.height), (10, 8));
        assert_eq!(&grid.png[1..4], b"PNG");

        writer.add_image("results", grid, 0).unwrap();
        let path = writer.path().to_path_buf();
        drop(writer);

        let records = read_records(&std::fs::read(path).unwrap());
        let event = Event::decode(records[1].as_slice()).unwrap();
        let image = event.summary.unwrap().value[0].image.clone().unwrap();
        assert_eq!(image.width, 10);
        assert_eq!(image.height, 8);
    }

    #[test]
    fn test_grid_rejects_bad_input() {
        assert!(encode_grid(&[], [3, 2, 2], 4).is_err());
        assert!(encode_grid(&[vec![0.0; 3]], [3, 2, 2], 4).is_err());
        assert!(encode_grid(&[vec![0.0; 8]], [2, 2, 2], 4).is_err());
        // Grayscale is expanded to RGB
        assert!(encode_grid(&[vec![0.3; 4]], [1, 2, 2], 4).is_ok());
    }
}
