//! Offline frame stacking: turn a directory of recorded frames into images
//! holding `n_stack` consecutive frames concatenated vertically.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, GenericImage, RgbImage};
use tracing::{debug, info};

use crate::error::FrameStackError;

/// One piece of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    Text(String),
    Number(u64),
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Number(a), KeyPart::Number(b)) => a.cmp(b),
            (KeyPart::Text(a), KeyPart::Text(b)) => a.cmp(b),
            (KeyPart::Number(_), KeyPart::Text(_)) => Ordering::Less,
            (KeyPart::Text(_), KeyPart::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Split a name into alternating text and digit runs, starting with a
/// (possibly empty) text run, so "10.jpg" sorts after "2.jpg".
pub fn natural_key(name: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut digits = String::from(c);
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            parts.push(KeyPart::Text(std::mem::take(&mut text)));
            parts.push(match digits.parse() {
                Ok(n) => KeyPart::Number(n),
                Err(_) => KeyPart::Text(digits),
            });
        } else {
            text.push(c);
        }
    }
    parts.push(KeyPart::Text(text));
    parts
}

/// Files in `dir` ending in `.<extension>`, in natural order.
pub fn list_frames(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, FrameStackError> {
    let suffix = format!(".{extension}");
    let read_dir_err = |e: std::io::Error| FrameStackError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        if !entry.file_type().map_err(read_dir_err)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(&suffix) {
                names.push(name.to_string());
            }
        }
    }

    names.sort_by_cached_key(|name| natural_key(name));
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// What a stacking pass produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackReport {
    pub frames_read: usize,
    pub windows_written: usize,
}

pub struct FrameStacker {
    n_stack: usize,
    extension: String,
}

impl FrameStacker {
    pub fn new(n_stack: usize, extension: impl Into<String>) -> Self {
        FrameStacker {
            n_stack,
            extension: extension.into(),
        }
    }

    /// Write `0.<ext>` from the first `n_stack` frames, then slide the window
    /// one frame at a time, writing `1.<ext>`, `2.<ext>`, ...
    pub fn run(&self, from: &Path, to: &Path) -> Result<StackReport, FrameStackError> {
        if self.n_stack == 0 {
            return Err(FrameStackError::EmptyStack);
        }

        let frames = list_frames(from, &self.extension)?;
        info!("{} images", frames.len());
        if frames.len() < self.n_stack {
            return Err(FrameStackError::NotEnoughFrames {
                found: frames.len(),
                needed: self.n_stack,
            });
        }
        fs::create_dir_all(to)?;

        let mut window = load_frame(&frames[0])?;
        for path in &frames[1..self.n_stack] {
            debug!("{}", path.display());
            window = stack_below(&window, 0, &load_frame(path)?, path)?;
        }
        info!("window is {}x{}", window.width(), window.height());
        self.save(&window, to, 0)?;
        let mut written = 1;

        for i in self.n_stack..=(frames.len() - self.n_stack) {
            let path = &frames[i];
            let frame = load_frame(path)?;
            let drop_rows = frame.height().min(window.height());
            window = stack_below(&window, drop_rows, &frame, path)?;
            self.save(&window, to, i - self.n_stack + 1)?;
            written += 1;
        }

        Ok(StackReport {
            frames_read: frames.len(),
            windows_written: written,
        })
    }

    fn save(&self, window: &RgbImage, dir: &Path, index: usize) -> Result<(), FrameStackError> {
        let path = dir.join(format!("{index}.{}", self.extension));
        window
            .save(&path)
            .map_err(|source| FrameStackError::Image { path, source })
    }
}

fn load_frame(path: &Path) -> Result<RgbImage, FrameStackError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| FrameStackError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// `top` without its first `skip_rows` rows, with `frame` appended below.
fn stack_below(
    top: &RgbImage,
    skip_rows: u32,
    frame: &RgbImage,
    frame_path: &Path,
) -> Result<RgbImage, FrameStackError> {
    if frame.width() != top.width() {
        return Err(FrameStackError::WidthMismatch {
            path: frame_path.to_path_buf(),
            expected: top.width(),
            found: frame.width(),
        });
    }
    let width = top.width();
    let kept_rows = top.height() - skip_rows;
    let kept = imageops::crop_imm(top, 0, skip_rows, width, kept_rows).to_image();

    let mut stacked = RgbImage::new(width, kept_rows + frame.height());
    let image_err = |source: image::ImageError| FrameStackError::Image {
        path: frame_path.to_path_buf(),
        source,
    };
    stacked.copy_from(&kept, 0, 0).map_err(image_err)?;
    stacked.copy_from(frame, 0, kept_rows).map_err(image_err)?;
    Ok(stacked)
}
