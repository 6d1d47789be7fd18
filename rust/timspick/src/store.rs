use std::fs;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

// stored u64 offsets are reopened in place as usize slices
const _: () = assert!(std::mem::size_of::<usize>() == 8);

mod sealed {
    pub trait Sealed {}
}

/// Element types the store knows how to persist. Values are written as
/// little-endian bytes next to a small JSON manifest naming the dtype,
/// so a reopened file can be checked before it is mapped.
pub trait StoredElement: sealed::Sealed + Copy + 'static {
    const DTYPE: &'static str;

    fn extend_le(self, out: &mut Vec<u8>);
}

macro_rules! stored_element {
    ($type:ty, $dtype:literal) => {
        impl sealed::Sealed for $type {}

        impl StoredElement for $type {
            const DTYPE: &'static str = $dtype;

            fn extend_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

stored_element!(u32, "u32");
stored_element!(u64, "u64");
stored_element!(i64, "i64");
stored_element!(f32, "f32");
stored_element!(f64, "f64");

impl sealed::Sealed for usize {}

impl StoredElement for usize {
    const DTYPE: &'static str = "u64";

    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self as u64).to_le_bytes());
    }
}

#[derive(Serialize, Deserialize)]
struct ArrayManifest {
    dtype: String,
    length: usize,
}

/// A stored array mapped back into memory. Dereferences to a slice of
/// the element type it was written with.
#[derive(Debug)]
pub struct ArrayView<T> {
    mmap: Option<Mmap>,
    length: usize,
    marker: PhantomData<T>,
}

impl<T: StoredElement> ArrayView<T> {
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.mmap {
            None => &[],
            Some(mmap) => unsafe {
                std::slice::from_raw_parts(mmap.as_ptr() as *const T, self.length)
            },
        }
    }
}

impl<T: StoredElement> Deref for ArrayView<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

/// Directory-backed result store.
///
/// Arrays live under slash-separated keys mirrored onto the file
/// system, one raw `.bin` file plus a `.json` manifest per array.
/// Groups carry free-form attributes in a `_attributes.json` file; the
/// empty group name addresses the store root.
pub struct ArrayStore {
    root: PathBuf,
}

impl ArrayStore {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            source,
            path: Some(root.clone()),
        })?;
        Ok(Self { root })
    }

    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "store directory does not exist",
                ),
                path: Some(root),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn put_array<T: StoredElement>(
        &self,
        key: &str,
        values: &[T],
    ) -> Result<(), StoreError> {
        let data_path = self.array_path(key, "bin");
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                source,
                path: Some(parent.to_path_buf()),
            })?;
        }
        let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<T>());
        for &value in values {
            value.extend_le(&mut bytes);
        }
        write_file(&data_path, &bytes)?;
        let manifest = ArrayManifest {
            dtype: T::DTYPE.to_string(),
            length: values.len(),
        };
        write_file(&self.array_path(key, "json"), &serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }

    pub fn open_array<T: StoredElement>(&self, key: &str) -> Result<ArrayView<T>, StoreError> {
        let manifest_bytes = match fs::read(self.array_path(key, "json")) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingKey {
                    key: key.to_string(),
                })
            }
            Err(source) => {
                return Err(StoreError::Io {
                    source,
                    path: Some(self.array_path(key, "json")),
                })
            }
        };
        let manifest: ArrayManifest = serde_json::from_slice(&manifest_bytes)?;
        if manifest.dtype != T::DTYPE {
            return Err(StoreError::DtypeMismatch {
                key: key.to_string(),
                expected: T::DTYPE,
                got: manifest.dtype,
            });
        }
        let data_path = self.array_path(key, "bin");
        let file = fs::File::open(&data_path).map_err(|source| StoreError::Io {
            source,
            path: Some(data_path.clone()),
        })?;
        let expected_bytes = manifest.length * std::mem::size_of::<T>();
        let got_bytes = file
            .metadata()
            .map_err(|source| StoreError::Io {
                source,
                path: Some(data_path.clone()),
            })?
            .len() as usize;
        if got_bytes != expected_bytes {
            return Err(StoreError::LengthMismatch {
                key: key.to_string(),
                expected_bytes,
                got_bytes,
            });
        }
        let mmap = if manifest.length == 0 {
            None
        } else {
            Some(unsafe {
                Mmap::map(&file).map_err(|source| StoreError::Io {
                    source,
                    path: Some(data_path),
                })?
            })
        };
        Ok(ArrayView {
            mmap,
            length: manifest.length,
            marker: PhantomData,
        })
    }

    pub fn set_attr<V: Serialize>(
        &self,
        group: &str,
        name: &str,
        value: &V,
    ) -> Result<(), StoreError> {
        let path = self.attributes_path(group);
        let mut attributes = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                serde_json::Map::new()
            }
            Err(source) => {
                return Err(StoreError::Io {
                    source,
                    path: Some(path),
                })
            }
        };
        attributes.insert(name.to_string(), serde_json::to_value(value)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                source,
                path: Some(parent.to_path_buf()),
            })?;
        }
        write_file(&path, &serde_json::to_vec_pretty(&attributes)?)
    }

    pub fn read_attr<V: DeserializeOwned>(
        &self,
        group: &str,
        name: &str,
    ) -> Result<V, StoreError> {
        let path = self.attributes_path(group);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingAttr {
                    group: group.to_string(),
                    name: name.to_string(),
                })
            }
            Err(source) => {
                return Err(StoreError::Io {
                    source,
                    path: Some(path),
                })
            }
        };
        let attributes: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes)?;
        let value = attributes.get(name).ok_or_else(|| StoreError::MissingAttr {
            group: group.to_string(),
            name: name.to_string(),
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    fn array_path(&self, key: &str, extension: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/') {
            path.push(part);
        }
        path.set_extension(extension);
        path
    }

    fn attributes_path(&self, group: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in group.split('/').filter(|part| !part.is_empty()) {
            path.push(part);
        }
        path.push("_attributes.json");
        path
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    fs::write(path, bytes).map_err(|source| StoreError::Io {
        source,
        path: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(name: &str) -> ArrayStore {
        let root = std::env::temp_dir()
            .join("timspick_store_tests")
            .join(format!("{}_{}", name, std::process::id()));
        if root.exists() {
            fs::remove_dir_all(&root).unwrap();
        }
        ArrayStore::create(root).unwrap()
    }

    #[test]
    fn arrays_round_trip_through_the_file_system() {
        let store = scratch_store("round_trip");
        store
            .put_array("clustering/raw_pointers/indices", &[3u64, 1, 4, 1, 5])
            .unwrap();
        let reopened = ArrayStore::open(store.root()).unwrap();
        let view = reopened
            .open_array::<u64>("clustering/raw_pointers/indices")
            .unwrap();
        assert_eq!(&view[..], &[3, 1, 4, 1, 5]);
    }

    #[test]
    fn usize_arrays_reopen_as_u64() {
        let store = scratch_store("usize_as_u64");
        store.put_array("offsets", &[0usize, 2, 5]).unwrap();
        let view = store.open_array::<u64>("offsets").unwrap();
        assert_eq!(&view[..], &[0, 2, 5]);
    }

    #[test]
    fn empty_arrays_are_valid() {
        let store = scratch_store("empty");
        store.put_array::<f64>("metrics/none", &[]).unwrap();
        let view = store.open_array::<f64>("metrics/none").unwrap();
        assert!(view.is_empty());
        assert_eq!(&view[..], &[] as &[f64]);
    }

    #[test]
    fn the_manifest_dtype_is_enforced() {
        let store = scratch_store("dtype");
        store.put_array("values", &[1.5f32, 2.5]).unwrap();
        let err = store.open_array::<f64>("values").unwrap_err();
        match err {
            StoreError::DtypeMismatch { key, expected, got } => {
                assert_eq!(key, "values");
                assert_eq!(expected, "f64");
                assert_eq!(got, "f32");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn missing_keys_are_reported_by_name() {
        let store = scratch_store("missing");
        let err = store.open_array::<u32>("no/such/array").unwrap_err();
        match err {
            StoreError::MissingKey { key } => assert_eq!(key, "no/such/array"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn attributes_accumulate_per_group() {
        let store = scratch_store("attributes");
        store.set_attr("", "sample_name", &"sample_1").unwrap();
        store.set_attr("smoothing", "ppm_tolerance", &30.0f64).unwrap();
        store.set_attr("smoothing", "im_tolerance", &0.004f64).unwrap();
        let name: String = store.read_attr("", "sample_name").unwrap();
        assert_eq!(name, "sample_1");
        let ppm: f64 = store.read_attr("smoothing", "ppm_tolerance").unwrap();
        assert_eq!(ppm, 30.0);
        let im: f64 = store.read_attr("smoothing", "im_tolerance").unwrap();
        assert_eq!(im, 0.004);
        let err = store.read_attr::<f64>("smoothing", "rt_tolerance").unwrap_err();
        match err {
            StoreError::MissingAttr { group, name } => {
                assert_eq!(group, "smoothing");
                assert_eq!(name, "rt_tolerance");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
