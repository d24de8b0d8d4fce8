// ============================================================
// Layer 4 - Image Folder Loader
// ============================================================
// Lists the images below a root directory laid out as
//
//   root/
//     apple/    img_000.png img_001.jpg ...
//     banana/   ...
//
// Every immediate sub-directory is a class. Class labels follow
// the sorted directory names. Images are found recursively
// inside each class directory and listed in path order, so the
// same tree always yields the same sample list.
//
// Only the listing happens here; no image is decoded.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{class_index::ClassIndex, image_sample::ImageSample, traits::SampleSource};

/// Extensions accepted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

pub struct ImageFolder {
    root: PathBuf,
}

impl ImageFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SampleSource for ImageFolder {
    fn load_all(&self) -> Result<(Vec<ImageSample>, ClassIndex)> {
        if !self.root.is_dir() {
            bail!("Image directory '{}' does not exist", self.root.display());
        }

        // Directory names are only labels; scanning uses the real path so
        // names that are not valid UTF-8 still resolve.
        let mut class_dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read directory '{}'", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                class_dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
            }
        }

        if class_dirs.is_empty() {
            bail!(
                "No class sub-directories found in '{}'",
                self.root.display()
            );
        }
        class_dirs.sort();

        for pair in class_dirs.windows(2) {
            if pair[0].0 == pair[1].0 {
                tracing::warn!(
                    "Directories '{}' and '{}' share the class name '{}'; merging them",
                    pair[0].1.display(),
                    pair[1].1.display(),
                    pair[0].0
                );
            }
        }

        let classes = ClassIndex::from_names(class_dirs.iter().map(|(name, _)| name.as_str()));
        let mut per_class: Vec<Vec<PathBuf>> = vec![Vec::new(); classes.len()];

        for (name, dir) in &class_dirs {
            let label = classes
                .label_of(name)
                .with_context(|| format!("Class '{name}' missing from the class index"))?;
            collect_images(dir, &mut per_class[label])?;
        }

        let mut samples = Vec::new();
        for (label, mut files) in per_class.into_iter().enumerate() {
            files.sort();
            tracing::debug!(
                "Class {} '{}': {} images",
                label,
                classes.names()[label],
                files.len()
            );
            samples.extend(files.into_iter().map(|path| ImageSample::new(path, label)));
        }

        if samples.is_empty() {
            bail!(
                "Found 0 images belonging to {} classes in '{}'",
                classes.len(),
                self.root.display()
            );
        }

        tracing::info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            classes.len()
        );
        Ok((samples, classes))
    }
}

/// True when the file extension is one of `IMAGE_EXTENSIONS`.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_images(&path, out)?;
        } else if is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}
