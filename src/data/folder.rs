// ============================================================
// Layer 4 - Image Folder Scanner
// ============================================================
// Discovers labelled images laid out one directory per class:
//
//   root/
//   ├── train/
//   │   ├── ants/  *.jpg
//   │   └── bees/  *.jpg
//   └── val/
//       ├── ants/  *.jpg
//       └── bees/  *.jpg
//
// Class names are the sorted sub-directory names and the label
// of an image is the index of its class in that order.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One image on disk and its class label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSample {
    pub path:  PathBuf,
    pub label: usize,
}

/// All labelled images under one phase directory.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root:    PathBuf,
    classes: Vec<String>,
    samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root` for class sub-directories and their images.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            bail!("Image folder '{}' does not exist", root.display());
        }

        let mut classes = Vec::new();
        for entry in std::fs::read_dir(&root)
            .with_context(|| format!("Cannot read directory '{}'", root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                classes.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        classes.sort();

        if classes.is_empty() {
            bail!("No class directories found in '{}'", root.display());
        }

        let mut samples = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let before = samples.len();
            for entry in WalkDir::new(root.join(class))
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.with_context(|| format!("Cannot walk class '{class}'"))?;
                if entry.file_type().is_file() && is_image(entry.path()) {
                    samples.push(ImageSample { path: entry.into_path(), label });
                }
            }
            tracing::debug!("Class '{}' (label {}): {} images", class, label, samples.len() - before);
        }

        tracing::info!(
            "Scanned '{}': {} classes, {} images",
            root.display(),
            classes.len(),
            samples.len()
        );

        Ok(Self { root, classes, samples })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn class_names(&self) -> &[String] {
        &self.classes
    }

    pub fn samples(&self) -> &[ImageSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of images per class, indexed by label
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for s in &self.samples {
            counts[s.label] += 1;
        }
        counts
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn labels_follow_sorted_class_names() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("bees/b1.jpg"));
        touch(&dir.path().join("ants/a2.PNG"));
        touch(&dir.path().join("ants/a1.jpeg"));
        touch(&dir.path().join("ants/notes.txt"));

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.class_names(), ["ants", "bees"]);
        assert_eq!(folder.len(), 3);
        assert_eq!(folder.class_counts(), vec![2, 1]);

        let names: Vec<_> = folder
            .samples()
            .iter()
            .map(|s| (s.path.file_name().unwrap().to_string_lossy().into_owned(), s.label))
            .collect();
        assert_eq!(
            names,
            vec![("a1.jpeg".into(), 0), ("a2.PNG".into(), 0), ("b1.jpg".into(), 1)]
        );
    }

    #[test]
    fn nested_images_are_found() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("cats/inner/c.bmp"));
        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(ImageFolder::scan(dir.path().join("nope")).is_err());
    }

    #[test]
    fn root_without_classes_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("loose.jpg"));
        assert!(ImageFolder::scan(dir.path()).is_err());
    }
}
