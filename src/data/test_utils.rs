// Helpers shared by tests that need a real image directory.

use std::path::Path;

use image::{Rgb, RgbImage};

/// Write `count` solid-colour PNGs of `size`x`size` into `root/<class>/`
/// for every `(class, count)` pair. Each class gets its own colour.
pub fn write_image_tree(root: &Path, classes: &[(&str, usize)], size: u32) {
    for (class_id, (class, count)) in classes.iter().enumerate() {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        let shade = (40 + class_id * 60).min(255) as u8;
        for i in 0..*count {
            let img = RgbImage::from_fn(size, size, |x, y| {
                Rgb([shade, ((x + y) as u8).wrapping_mul(3), (i as u8).wrapping_mul(17)])
            });
            img.save(dir.join(format!("img_{i:03}.png"))).unwrap();
        }
    }
}
