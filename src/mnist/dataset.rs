use crate::backend::Element;
use burn_dataset::network::downloader::download_file_as_bytes;
use burn_dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use flate2::read::GzDecoder;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

// byte length of the IDX headers preceding the records
const IMAGES_HEADER_LEN: u64 = 16;
const LABELS_HEADER_LEN: u64 = 8;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;

/// One grayscale digit image with its class label.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistItem {
    /// Image as a flat, row-major array of brightness values, each in
    /// between 0.0 and 255.0.
    ///
    /// # Shape
    /// [HEIGHT * WIDTH]
    pub image: Vec<Element>,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<MnistItemRaw, MnistItem> for BytesToImage {
    /// Convert a raw MNIST item (image bytes) to a MNIST item (float array image).
    fn map(&self, item: &MnistItemRaw) -> MnistItem {
        // Ensure the image dimensions are correct.
        debug_assert_eq!(item.image_bytes.len(), HEIGHT * WIDTH);

        let image: Vec<Element> = item
            .image_bytes
            .iter()
            .map(|brightness| {
                let element: Element = (*brightness).as_();
                element
            })
            .collect();

        MnistItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset = MapperDataset<InMemDataset<MnistItemRaw>, BytesToImage, MnistItemRaw>;

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes (one for each digit), with 7,000
/// images per class. There are 60,000 training images and 10,000 test images.
///
/// The data is downloaded from the web from the [CVDF mirror](https://github.com/cvdfoundation/mnist).
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl MnistDataset {
    /// Creates a new train dataset.
    pub fn train() -> Self {
        Self::new("train")
    }

    /// Creates a new test dataset.
    pub fn test() -> Self {
        Self::new("test")
    }

    fn new(split: &str) -> Self {
        // Download dataset
        let root = MnistDataset::download(split);

        // MNIST is tiny so we can load it in-memory
        // Train images (u8): 28 * 28 * 60000 = 47.04Mb
        // Test images (u8): 28 * 28 * 10000 = 7.84Mb
        let images = read_idx(
            &root.join(images_file(split)),
            IMAGES_HEADER_LEN,
            HEIGHT * WIDTH,
        );
        let labels = read_idx(&root.join(labels_file(split)), LABELS_HEADER_LEN, 1);

        // Collect as vector of MnistItemRaw
        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .map(|(image_bytes, label)| MnistItemRaw {
                image_bytes,
                label: label[0],
            })
            .collect();

        let dataset = InMemDataset::new(items);
        let dataset = MapperDataset::new(dataset, BytesToImage);

        Self { dataset }
    }

    /// Download the MNIST dataset files from the web.
    /// Panics if the download cannot be completed or the content of the file cannot be written to disk.
    fn download(split: &str) -> PathBuf {
        // Dataset files are stored in the burn-dataset cache directory
        let cache_dir = dirs::home_dir()
            .expect("Could not get home directory")
            .join(".cache")
            .join("burn-dataset");
        let split_dir = cache_dir.join("mnist").join(split);

        if !split_dir.exists() {
            create_dir_all(&split_dir).expect("Failed to create base directory");
        }

        MnistDataset::download_file(images_file(split), &split_dir);
        MnistDataset::download_file(labels_file(split), &split_dir);

        split_dir
    }

    /// Download a file from the MNIST dataset URL to the destination directory.
    /// File download progress is reported with the help of a [progress bar](indicatif).
    fn download_file<P: AsRef<Path>>(name: &str, dest_dir: &P) -> PathBuf {
        // Output file name
        let file_name = dest_dir.as_ref().join(name);

        if !file_name.exists() {
            // Download gzip file
            let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);

            // Create file to write the downloaded content to
            let mut output_file = File::create(&file_name).unwrap();

            // Decode gzip file content and write to disk
            let mut gz_buffer = GzDecoder::new(&bytes[..]);
            std::io::copy(&mut gz_buffer, &mut output_file).unwrap();
        }

        file_name
    }
}

fn images_file(split: &str) -> &'static str {
    match split {
        "train" => TRAIN_IMAGES,
        "test" => TEST_IMAGES,
        _ => panic!("Invalid split specified {split}"),
    }
}

fn labels_file(split: &str) -> &'static str {
    match split {
        "train" => TRAIN_LABELS,
        "test" => TEST_LABELS,
        _ => panic!("Invalid split specified {split}"),
    }
}

/// Decode the records of an IDX file.
///
/// Both the images and the labels files carry their record count as a
/// big-endian u32 at byte offset 4; the records start right after the
/// `header_len`-byte header and are `record_len` bytes each.
fn read_idx(path: &Path, header_len: u64, record_len: usize) -> Vec<Vec<u8>> {
    let mut f = File::open(path).expect("Should be able to open the IDX file");

    let mut buf = [0u8; 4];
    let _ = f.seek(SeekFrom::Start(4)).unwrap();
    f.read_exact(&mut buf)
        .expect("Should be able to read the IDX file header");
    let count = u32::from_be_bytes(buf) as usize;

    let mut records: Vec<u8> = vec![0u8; record_len * count];
    let _ = f.seek(SeekFrom::Start(header_len)).unwrap();
    f.read_exact(&mut records)
        .expect("Should be able to read the IDX file records");

    records
        .chunks(record_len)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_idx_decodes_image_records() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("images-idx3-ubyte");

        // magic, count = 2, rows = 2, cols = 2, then 2 records of 4 pixels
        let mut bytes = vec![0, 0, 8, 3, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0, 2];
        bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        std::fs::write(&path, bytes).unwrap();

        let records = read_idx(&path, 16, 4);
        assert_eq!(records, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn read_idx_decodes_label_records() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("labels-idx1-ubyte");

        // magic, count = 3, then one byte per label
        let bytes = vec![0, 0, 8, 1, 0, 0, 0, 3, 7, 0, 9];
        std::fs::write(&path, bytes).unwrap();

        let records = read_idx(&path, 8, 1);
        assert_eq!(records, vec![vec![7], vec![0], vec![9]]);
    }

    #[test]
    fn split_file_names() {
        assert_eq!(images_file("train"), TRAIN_IMAGES);
        assert_eq!(labels_file("test"), TEST_LABELS);
    }
}
