//! Model and reference-image locations: a local directory or an HTTP(S) prefix.
//!
//! Remote models are downloaded once into the user cache directory, under a
//! subdirectory keyed by the URL prefix, and loaded from there. Remote
//! images are fetched on every build.

use image::GrayImage;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid asset URL {0}")]
    InvalidUrl(String),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode image {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: image::ImageError,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Where assets live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLocation {
    Dir(PathBuf),
    /// Base URL, always ending in `/`.
    Url(String),
}

impl AssetLocation {
    /// `http://` and `https://` prefixes are URLs, anything else a directory.
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            let mut base = s.to_string();
            if !base.ends_with('/') {
                base.push('/');
            }
            AssetLocation::Url(base)
        } else {
            AssetLocation::Dir(PathBuf::from(s))
        }
    }

    /// Human-readable location of `relative` (path or full URL).
    pub fn describe(&self, relative: &str) -> String {
        match self {
            AssetLocation::Dir(dir) => dir.join(relative).display().to_string(),
            AssetLocation::Url(_) => self
                .url_for(relative)
                .unwrap_or_else(|_| format!("{self}{relative}")),
        }
    }

    fn url_for(&self, relative: &str) -> Result<String, AssetError> {
        let AssetLocation::Url(base) = self else {
            return Err(AssetError::InvalidUrl(relative.to_string()));
        };
        let base = reqwest::Url::parse(base).map_err(|_| AssetError::InvalidUrl(base.clone()))?;
        base.join(relative)
            .map(String::from)
            .map_err(|_| AssetError::InvalidUrl(format!("{base}{relative}")))
    }

    /// Read the raw bytes of `relative`.
    pub fn fetch(&self, relative: &str) -> Result<Vec<u8>, AssetError> {
        match self {
            AssetLocation::Dir(dir) => {
                let path = dir.join(relative);
                if !path.exists() {
                    return Err(AssetError::NotFound(path.display().to_string()));
                }
                fs::read(&path).map_err(|source| AssetError::Read { path, source })
            }
            AssetLocation::Url(_) => {
                let url = self.url_for(relative)?;
                tracing::debug!(%url, "fetching asset");
                let response = reqwest::blocking::get(&url)
                    .and_then(|r| r.error_for_status())
                    .map_err(|source| AssetError::Download { url: url.clone(), source })?;
                let bytes = response
                    .bytes()
                    .map_err(|source| AssetError::Download { url, source })?;
                Ok(bytes.to_vec())
            }
        }
    }

    /// Fetch and decode an image as 8-bit luma.
    pub fn fetch_gray_image(&self, relative: &str) -> Result<GrayImage, AssetError> {
        let bytes = self.fetch(relative)?;
        image::load_from_memory(&bytes)
            .map(|img| img.to_luma8())
            .map_err(|source| AssetError::Decode {
                location: self.describe(relative),
                source,
            })
    }

    /// Local path of the model file `name`, downloading it first when the
    /// location is remote and the cache does not have it yet.
    pub fn resolve_model(&self, name: &str) -> Result<PathBuf, AssetError> {
        match self {
            AssetLocation::Dir(dir) => Ok(dir.join(name)),
            AssetLocation::Url(_) => {
                let cache_dir = model_cache_dir()?.join(cache_key(self));
                resolve_into(self, name, &cache_dir)
            }
        }
    }
}

impl std::fmt::Display for AssetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetLocation::Dir(dir) => write!(f, "{}", dir.display()),
            AssetLocation::Url(url) => f.write_str(url),
        }
    }
}

/// `$XDG_CACHE_HOME/facewatch/models` (or the platform equivalent).
pub fn model_cache_dir() -> Result<PathBuf, AssetError> {
    dirs::cache_dir()
        .map(|d| d.join("facewatch").join("models"))
        .ok_or(AssetError::NoCacheDir)
}

/// Short hex digest of the location, so that models with the same file
/// name from different prefixes get separate cache entries.
fn cache_key(location: &AssetLocation) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location.to_string().as_bytes());
    hasher.finalize()[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn resolve_into(location: &AssetLocation, name: &str, cache_dir: &Path) -> Result<PathBuf, AssetError> {
    let cached = cache_dir.join(name);
    if cached.exists() {
        return Ok(cached);
    }

    fs::create_dir_all(cache_dir).map_err(|source| AssetError::Write {
        path: cache_dir.to_path_buf(),
        source,
    })?;

    tracing::info!(model = name, from = %location, "downloading model");
    let bytes = location.fetch(name)?;

    store(&bytes, &cached)?;

    tracing::info!(path = %cached.display(), bytes = bytes.len(), "model cached");
    Ok(cached)
}

/// Write `bytes` to `dest` through a `.part` file, so a partial download is
/// never picked up. The `.part` file is removed again on failure.
fn store(bytes: &[u8], dest: &Path) -> Result<(), AssetError> {
    let temp = dest.with_extension("part");
    let stored = fs::File::create(&temp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.flush()
        })
        .map_err(|source| AssetError::Write {
            path: temp.clone(),
            source,
        })
        .and_then(|_| {
            fs::rename(&temp, dest).map_err(|source| AssetError::Write {
                path: dest.to_path_buf(),
                source,
            })
        });
    if stored.is_err() {
        let _ = fs::remove_file(&temp);
    }
    stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_dir_and_url() {
        assert_eq!(AssetLocation::parse("models"), AssetLocation::Dir(PathBuf::from("models")));
        assert_eq!(
            AssetLocation::parse("https://example.org/models"),
            AssetLocation::Url("https://example.org/models/".into())
        );
    }

    #[test]
    fn test_url_describe_encodes_spaces() {
        let loc = AssetLocation::parse("http://localhost:3000/images/");
        assert_eq!(
            loc.describe("Adi Martha/1.jpg"),
            "http://localhost:3000/images/Adi%20Martha/1.jpg"
        );
    }

    #[test]
    fn test_dir_fetch_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let loc = AssetLocation::Dir(tmp.path().to_path_buf());
        assert!(matches!(loc.fetch("Seno/1.jpg"), Err(AssetError::NotFound(_))));
    }

    #[test]
    fn test_dir_fetch_gray_image() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Seno")).unwrap();
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]));
        img.save(tmp.path().join("Seno/1.png")).unwrap();

        let loc = AssetLocation::Dir(tmp.path().to_path_buf());
        let gray = loc.fetch_gray_image("Seno/1.png").unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
    }

    #[test]
    fn test_dir_fetch_undecodable_image() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.jpg"), b"not an image").unwrap();
        let loc = AssetLocation::Dir(tmp.path().to_path_buf());
        assert!(matches!(
            loc.fetch_gray_image("broken.jpg"),
            Err(AssetError::Decode { .. })
        ));
    }

    #[test]
    fn test_resolve_into_prefers_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cached = tmp.path().join("det_10g.onnx");
        fs::write(&cached, b"cached model").unwrap();

        // Unreachable URL: resolution must not touch the network.
        let loc = AssetLocation::parse("http://127.0.0.1:9/models");
        let resolved = resolve_into(&loc, "det_10g.onnx", tmp.path()).unwrap();
        assert_eq!(resolved, cached);
    }

    #[test]
    fn test_cache_key_differs_per_location() {
        let a = AssetLocation::parse("https://models.example.org/v1");
        let b = AssetLocation::parse("https://models.example.org/v2");
        assert_eq!(cache_key(&a), cache_key(&a.clone()));
        assert_ne!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a).len(), 16);
        assert!(cache_key(&a).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_name_from_other_location_is_not_reused() {
        let tmp = TempDir::new().unwrap();
        let first = AssetLocation::parse("http://127.0.0.1:9/v1");
        let second = AssetLocation::parse("http://127.0.0.1:9/v2");

        let first_dir = tmp.path().join(cache_key(&first));
        fs::create_dir_all(&first_dir).unwrap();
        fs::write(first_dir.join("det_10g.onnx"), b"v1 model").unwrap();

        assert!(resolve_into(&first, "det_10g.onnx", &first_dir).is_ok());
        // Nothing cached for the second prefix, and its server is unreachable.
        let second_dir = tmp.path().join(cache_key(&second));
        assert!(matches!(
            resolve_into(&second, "det_10g.onnx", &second_dir),
            Err(AssetError::Download { .. })
        ));
        assert!(!second_dir.join("det_10g.onnx").exists());
        assert!(!second_dir.join("det_10g.part").exists());
    }

    #[test]
    fn test_store_writes_and_removes_part_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("det_10g.onnx");
        store(b"model bytes", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"model bytes");
        assert!(!tmp.path().join("det_10g.part").exists());
    }

    #[test]
    fn test_failed_store_leaves_no_part_file() {
        let tmp = TempDir::new().unwrap();
        // A file cannot be renamed over a non-empty directory.
        let dest = tmp.path().join("det_10g.onnx");
        fs::create_dir_all(dest.join("occupied")).unwrap();

        assert!(matches!(
            store(b"model bytes", &dest),
            Err(AssetError::Write { .. })
        ));
        assert!(!tmp.path().join("det_10g.part").exists());
    }

    #[test]
    fn test_resolve_model_dir_is_joined() {
        let loc = AssetLocation::parse("/opt/facewatch/models");
        assert_eq!(
            loc.resolve_model("w600k_r50.onnx").unwrap(),
            PathBuf::from("/opt/facewatch/models/w600k_r50.onnx")
        );
    }
}
