//! Connected-component labeling and blob statistics.
//!
//! The labeling pass walks the image once, consulting the left, upper-left,
//! upper, and upper-right neighbours of every foreground pixel. Label
//! equivalences go through a parent table that is re-flattened on every
//! merge, so a label's entry is always its root; a final compaction rewrites
//! the label image to a dense `1..=n` range.

use opensight_geometry::{Point, Rect};

use crate::VisionError;
use crate::image::{FrameView, PixelFormat};
use crate::settings::Rgb;

/// A maximal connected region of foreground pixels.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Dense 1-based label of the blob in the processed image.
    pub id: u32,
    /// Bounding rectangle in image coordinates.
    pub rect: Rect,
    /// Foreground pixel count.
    pub area: u32,
    /// `area / rect.area()`: 1.0 for a filled rectangle.
    pub fullness: f64,
    /// Mean colour over the blob's pixels.
    pub color_mean: Rgb,
    /// Per-channel standard deviation over the blob's pixels.
    pub color_std_dev: Rgb,
}

/// Connected-component counter over thresholded or colour frames.
#[derive(Debug, Clone)]
pub struct BlobCounter {
    /// Apply the size filter after collecting blobs.
    pub filter_blobs: bool,
    /// Couple the min/max checks: a blob is dropped only when both
    /// dimensions are below the minimum or both above the maximum.
    pub coupled_size_filtering: bool,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Per-channel background threshold; a pixel is foreground when any
    /// channel exceeds its threshold.
    pub background_threshold: Rgb,

    width: u32,
    height: u32,
    labels: Vec<u32>,
    blobs: Vec<Blob>,
    processed: bool,
}

impl Default for BlobCounter {
    fn default() -> Self {
        Self {
            filter_blobs: true,
            coupled_size_filtering: false,
            min_width: 1,
            min_height: 1,
            max_width: u32::MAX,
            max_height: u32::MAX,
            background_threshold: Rgb::new(0, 0, 0),
            width: 0,
            height: 0,
            labels: Vec::new(),
            blobs: Vec::new(),
            processed: false,
        }
    }
}

impl BlobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blobs found by the last [`process`](Self::process) call, ordered by id.
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Label the frame's foreground pixels and collect blob statistics.
    pub fn process(&mut self, view: &FrameView<'_>) -> Result<(), VisionError> {
        if view.width() < 2 {
            return Err(VisionError::ImageTooNarrow(view.width()));
        }

        self.width = view.width();
        self.height = view.height();

        let thr = self.background_threshold;
        let map = match view.format() {
            PixelFormat::Gray8 => self.label_pixels(|x, y| view.rgb(x, y).0 > thr.r, view),
            PixelFormat::Bgr24 | PixelFormat::Bgra32 => self.label_pixels(
                |x, y| {
                    let (r, g, b) = view.rgb(x, y);
                    r > thr.r || g > thr.g || b > thr.b
                },
                view,
            ),
        };

        self.compact_labels(&map);
        self.collect_blobs(view);
        if self.filter_blobs {
            self.apply_size_filter();
        }
        self.processed = true;
        Ok(())
    }

    /// Single labeling pass. Returns the flat equivalence table; raw labels
    /// land in `self.labels`.
    fn label_pixels<F: Fn(u32, u32) -> bool>(&mut self, is_fg: F, view: &FrameView<'_>) -> Vec<u32> {
        let w = view.width() as usize;
        let h = view.height() as usize;
        self.labels.clear();
        self.labels.resize(w * h, 0);

        // map[label] is always the root of its equivalence class.
        let mut map: Vec<u32> = vec![0];

        for y in 0..h {
            for x in 0..w {
                if !is_fg(x as u32, y as u32) {
                    continue;
                }
                let idx = y * w + x;

                // Neighbour priority: left, upper-left, upper, upper-right.
                let mut neighbours = [0u32; 4];
                if x > 0 {
                    neighbours[0] = self.labels[idx - 1];
                }
                if y > 0 {
                    if x > 0 {
                        neighbours[1] = self.labels[idx - w - 1];
                    }
                    neighbours[2] = self.labels[idx - w];
                    if x + 1 < w {
                        neighbours[3] = self.labels[idx - w + 1];
                    }
                }

                let mut label = 0;
                for &n in &neighbours {
                    if n == 0 {
                        continue;
                    }
                    if label == 0 {
                        label = n;
                    } else if map[n as usize] != map[label as usize] {
                        merge(&mut map, label, n);
                    }
                }

                if label == 0 {
                    label = map.len() as u32;
                    map.push(label);
                }
                self.labels[idx] = label;
            }
        }

        map
    }

    /// Rewrite raw labels to a dense `1..=n` range.
    fn compact_labels(&mut self, map: &[u32]) {
        let mut remap = vec![0u32; map.len()];
        let mut count = 0;
        for &root in &map[1..] {
            if remap[root as usize] == 0 {
                count += 1;
                remap[root as usize] = count;
            }
        }
        for label in &mut self.labels {
            if *label != 0 {
                *label = remap[map[*label as usize] as usize];
            }
        }
    }

    fn collect_blobs(&mut self, view: &FrameView<'_>) {
        let count = self.labels.iter().copied().max().unwrap_or(0) as usize;

        #[derive(Clone)]
        struct Acc {
            min_x: i32,
            min_y: i32,
            max_x: i32,
            max_y: i32,
            area: u32,
            sum: [u64; 3],
            sum_sq: [u64; 3],
        }
        let empty = Acc {
            min_x: i32::MAX,
            min_y: i32::MAX,
            max_x: i32::MIN,
            max_y: i32::MIN,
            area: 0,
            sum: [0; 3],
            sum_sq: [0; 3],
        };
        let mut accs = vec![empty; count];

        for y in 0..self.height {
            for x in 0..self.width {
                let label = self.labels[(y * self.width + x) as usize];
                if label == 0 {
                    continue;
                }
                let acc = &mut accs[label as usize - 1];
                acc.min_x = acc.min_x.min(x as i32);
                acc.min_y = acc.min_y.min(y as i32);
                acc.max_x = acc.max_x.max(x as i32);
                acc.max_y = acc.max_y.max(y as i32);
                acc.area += 1;
                let (r, g, b) = view.rgb(x, y);
                for (i, c) in [r, g, b].into_iter().enumerate() {
                    acc.sum[i] += c as u64;
                    acc.sum_sq[i] += c as u64 * c as u64;
                }
            }
        }

        self.blobs = accs
            .into_iter()
            .enumerate()
            .map(|(i, acc)| {
                let rect =
                    Rect::from_corners(Point::new(acc.min_x, acc.min_y), Point::new(acc.max_x, acc.max_y));
                let n = acc.area as f64;
                let mut mean = [0.0f64; 3];
                let mut stddev = [0.0f64; 3];
                for c in 0..3 {
                    mean[c] = acc.sum[c] as f64 / n;
                    stddev[c] = (acc.sum_sq[c] as f64 / n - mean[c] * mean[c]).max(0.0).sqrt();
                }
                Blob {
                    id: i as u32 + 1,
                    rect,
                    area: acc.area,
                    fullness: acc.area as f64 / rect.area() as f64,
                    color_mean: Rgb::new(
                        mean[0].round() as u8,
                        mean[1].round() as u8,
                        mean[2].round() as u8,
                    ),
                    color_std_dev: Rgb::new(
                        stddev[0].round() as u8,
                        stddev[1].round() as u8,
                        stddev[2].round() as u8,
                    ),
                }
            })
            .collect();
    }

    fn blob_passes_filter(&self, blob: &Blob) -> bool {
        let w = blob.rect.width as u32;
        let h = blob.rect.height as u32;
        if self.coupled_size_filtering {
            !((w < self.min_width && h < self.min_height)
                || (w > self.max_width && h > self.max_height))
        } else {
            w >= self.min_width && h >= self.min_height && w <= self.max_width && h <= self.max_height
        }
    }

    /// Drop out-of-size blobs, then remap surviving labels densely and
    /// renumber the blobs.
    fn apply_size_filter(&mut self) {
        let old = std::mem::take(&mut self.blobs);
        let mut remap = vec![0u32; old.len() + 1];
        let mut kept = Vec::with_capacity(old.len());
        for blob in old {
            if self.blob_passes_filter(&blob) {
                let new_id = kept.len() as u32 + 1;
                remap[blob.id as usize] = new_id;
                kept.push(Blob { id: new_id, ..blob });
            }
        }
        self.blobs = kept;

        for label in &mut self.labels {
            if *label != 0 {
                *label = remap[*label as usize];
            }
        }
    }

    /// Edge points of a blob: the outermost foreground pixel per row on each
    /// side, plus per-column top/bottom pixels that the row sweep missed.
    pub fn blob_edge_points(&self, blob: &Blob) -> Result<Vec<Point>, VisionError> {
        if !self.processed {
            return Err(VisionError::NotProcessed);
        }

        let rect = blob.rect;
        let row_base = rect.y;
        let rows = rect.height as usize;
        let mut left: Vec<Option<i32>> = vec![None; rows];
        let mut right: Vec<Option<i32>> = vec![None; rows];
        let mut points = Vec::new();

        for y in rect.y..rect.bottom() {
            let row = (y - row_base) as usize;
            for x in rect.x..rect.right() {
                if self.label_at(x, y) == blob.id {
                    left[row] = Some(x);
                    break;
                }
            }
            for x in (rect.x..rect.right()).rev() {
                if self.label_at(x, y) == blob.id {
                    right[row] = Some(x);
                    break;
                }
            }
            if let Some(lx) = left[row] {
                points.push(Point::new(lx, y));
            }
            if let (Some(lx), Some(rx)) = (left[row], right[row])
                && rx != lx
            {
                points.push(Point::new(rx, y));
            }
        }

        for x in rect.x..rect.right() {
            let mut top = None;
            for y in rect.y..rect.bottom() {
                if self.label_at(x, y) == blob.id {
                    top = Some(y);
                    break;
                }
            }
            let Some(top) = top else { continue };
            let mut bottom = top;
            for y in (rect.y..rect.bottom()).rev() {
                if self.label_at(x, y) == blob.id {
                    bottom = y;
                    break;
                }
            }

            let row = (top - row_base) as usize;
            if left[row] != Some(x) && right[row] != Some(x) {
                points.push(Point::new(x, top));
            }
            if bottom != top {
                let row = (bottom - row_base) as usize;
                if left[row] != Some(x) && right[row] != Some(x) {
                    points.push(Point::new(x, bottom));
                }
            }
        }

        Ok(points)
    }

    fn label_at(&self, x: i32, y: i32) -> u32 {
        self.labels[(y as u32 * self.width + x as u32) as usize]
    }
}

/// Merge the equivalence classes of `a` and `b`, keeping the table flat:
/// every label pointing at `b`'s root is re-pointed at `a`'s root.
fn merge(map: &mut [u32], a: u32, b: u32) {
    let root_a = map[a as usize];
    let root_b = map[b as usize];
    if root_a == root_b {
        return;
    }
    for entry in map.iter_mut() {
        if *entry == root_b {
            *entry = root_a;
        }
    }
}
